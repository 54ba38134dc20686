//! Roster core types: partner/assignment/withdrawn records, the weekly
//! occupancy grid, favorites, and the dataset snapshot shared by every crate.

#![forbid(unsafe_code)]

use chrono::{NaiveDateTime, NaiveTime};
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub mod columns;
pub mod dates;
pub mod filter;
pub mod taxonomy;

pub use columns::{normalize_header, FromRow, RowMap, SheetTable};
pub use filter::{AvailabilityFilter, SortDirection, SortKey, WithdrawnFilter};

pub mod prelude {
    pub use super::{
        AssignmentRecord, FavoriteSet, Grid, GridCell, OperatingStatus, PartnerRecord, Snapshot, Weekday,
        WithdrawnRecord,
    };
    pub use super::filter::{AvailabilityFilter, SortDirection, SortKey, WithdrawnFilter};
}

// ---------------- Weekdays ----------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Weekday { Mon, Tue, Wed, Thu, Fri, Sat, Sun }

impl Weekday {
    pub const ALL: [Weekday; 7] = [Self::Mon, Self::Tue, Self::Wed, Self::Thu, Self::Fri, Self::Sat, Self::Sun];

    pub fn index(self) -> usize { self as usize }

    /// Single-character label used in grid column headers (`月_09`).
    pub fn label(self) -> &'static str {
        match self {
            Self::Mon => "月",
            Self::Tue => "火",
            Self::Wed => "水",
            Self::Thu => "木",
            Self::Fri => "金",
            Self::Sat => "土",
            Self::Sun => "日",
        }
    }

    /// Accepts both the short form (`月`) and the long form (`月曜日`).
    pub fn from_label(s: &str) -> Option<Self> {
        let s = s.trim();
        let short = s.strip_suffix("曜日").unwrap_or(s);
        Self::ALL.into_iter().find(|d| d.label() == short)
    }
}

impl TryFrom<String> for Weekday {
    type Error = String;
    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_label(&value).ok_or_else(|| format!("unknown weekday: {}", value))
    }
}

impl From<Weekday> for String {
    fn from(d: Weekday) -> Self { d.label().to_string() }
}

impl std::fmt::Display for Weekday {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { f.write_str(self.label()) }
}

// ---------------- Occupancy grid ----------------

pub const HOURS_PER_DAY: u8 = 24;
const GRID_CELLS: usize = 7 * HOURS_PER_DAY as usize;

/// One day-hour slot. Anything other than `"0"`/`"1"` is `Unknown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum GridCell {
    Free,
    Occupied,
    #[default]
    Unknown,
}

impl GridCell {
    pub fn parse(raw: &str) -> Self {
        match raw.trim() {
            "0" => Self::Free,
            "1" => Self::Occupied,
            _ => Self::Unknown,
        }
    }
}

/// 7 x 24 occupancy matrix, row-major by weekday.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grid { cells: Vec<GridCell> }

impl Default for Grid {
    fn default() -> Self { Self { cells: vec![GridCell::Unknown; GRID_CELLS] } }
}

impl Grid {
    /// Column header for a slot; hours are rendered as two digits.
    pub fn cell_key(day: Weekday, hour: u8) -> String { format!("{}_{:02}", day.label(), hour) }

    /// Hours outside `0..24` have no column and read as `Unknown`.
    pub fn get(&self, day: Weekday, hour: u8) -> GridCell {
        if hour >= HOURS_PER_DAY { return GridCell::Unknown; }
        self.cells[day.index() * HOURS_PER_DAY as usize + hour as usize]
    }

    pub fn set(&mut self, day: Weekday, hour: u8, cell: GridCell) {
        if hour >= HOURS_PER_DAY { return; }
        self.cells[day.index() * HOURS_PER_DAY as usize + hour as usize] = cell;
    }

    /// Convenience for tests and fixtures: mark `[from, to]` of `day` with `cell`.
    pub fn with_range(mut self, day: Weekday, from: u8, to: u8, cell: GridCell) -> Self {
        for h in from..=to { self.set(day, h, cell); }
        self
    }
}

// ---------------- Partner status ----------------

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum OperatingStatus {
    /// 稼働
    Active,
    /// 未稼働
    Inactive,
    Other(String),
}

impl OperatingStatus {
    pub fn label(&self) -> &str {
        match self {
            Self::Active => "稼働",
            Self::Inactive => "未稼働",
            Self::Other(s) => s.as_str(),
        }
    }

    pub fn defaults() -> Vec<Self> { vec![Self::Active, Self::Inactive] }
}

impl From<String> for OperatingStatus {
    fn from(s: String) -> Self {
        match s.trim() {
            "稼働" => Self::Active,
            "未稼働" => Self::Inactive,
            _ => Self::Other(s),
        }
    }
}

impl From<&str> for OperatingStatus {
    fn from(s: &str) -> Self { Self::from(s.to_string()) }
}

impl From<OperatingStatus> for String {
    fn from(s: OperatingStatus) -> Self { s.label().to_string() }
}

// ---------------- Records ----------------

/// Availability dataset row (パートナー情報).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PartnerRecord {
    pub id: String,
    pub name: String,
    pub kana_name: String,
    /// `None` when the sheet value is empty or not numeric.
    pub age: Option<f64>,
    pub gender: String,
    pub status: OperatingStatus,
    pub prefecture: String,
    pub city: String,
    pub address: String,
    pub phone: String,
    pub approval_date: Option<NaiveDateTime>,
    pub license_expiry: Option<NaiveDateTime>,
    pub insurance_expiry: Option<NaiveDateTime>,
    pub inspection_expiry: Option<NaiveDateTime>,
    pub last_worked: Option<NaiveDateTime>,
    pub last_project: String,
    pub remarks: String,
    pub grid: Grid,
    /// Columns without a canonical field, keyed by normalized header.
    pub extra: BTreeMap<String, String>,
}

impl Default for OperatingStatus {
    fn default() -> Self { Self::Other(String::new()) }
}

/// Active work assignment (稼働中案件) linked to a partner by id.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AssignmentRecord {
    pub id: String,
    pub partner_id: String,
    pub name: String,
    pub comment: String,
    pub prefecture: String,
    pub city: String,
    pub start_date: String,
    /// Short weekday labels; holidays appear as `祝`.
    pub working_days: Vec<String>,
    pub planned_days: String,
    pub start_time: Option<NaiveTime>,
    pub end_time: Option<NaiveTime>,
    pub contract_price: Option<f64>,
    pub contract_unit: String,
    pub consignment_price: Option<f64>,
    pub consignment_unit: String,
}

impl AssignmentRecord {
    pub fn working_days_label(&self) -> String { self.working_days.join(",") }

    /// Scheduled hours, wrapping past midnight (22:00 -> 06:00 is 8h).
    pub fn duration_hours(&self) -> Option<f64> {
        let (start, end) = (self.start_time?, self.end_time?);
        let mut minutes = (end - start).num_minutes();
        if minutes < 0 { minutes += 24 * 60; }
        Some(minutes as f64 / 60.0)
    }

    /// First character of the billing category, e.g. `日` for `日額`.
    pub fn unit_label(category: &str) -> String { category.chars().next().map(String::from).unwrap_or_default() }
}

/// Assignments referencing `partner_id`, in sheet order.
pub fn assignments_for<'a>(assignments: &'a [AssignmentRecord], partner_id: &'a str) -> impl Iterator<Item = &'a AssignmentRecord> + 'a {
    assignments.iter().filter(move |a| !partner_id.is_empty() && a.partner_id == partner_id)
}

/// Withdrawn dataset row (離脱パートナー).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WithdrawnRecord {
    /// Favorites key: id, or `{name}-{approval}` when the id is empty.
    pub key: String,
    pub id: String,
    pub name: String,
    pub kana_name: String,
    pub age: Option<f64>,
    pub gender: String,
    /// `MailingState`, falling back to `都道府県`.
    pub prefecture: String,
    /// `MailingCity`, falling back to `市区町村`.
    pub city: String,
    pub mailing_state: String,
    pub mailing_city: String,
    pub street: String,
    pub address: String,
    pub phone: String,
    pub remarks: String,
    pub exit_reason: String,
    pub reason_large: String,
    pub reason_medium: String,
    pub reason_small: String,
    pub reason_detail: String,
    pub recent_project: String,
    pub recent_work: String,
    pub approval_date: Option<NaiveDateTime>,
    pub last_worked: Option<NaiveDateTime>,
    pub exit_date: Option<NaiveDateTime>,
    pub extra: BTreeMap<String, String>,
}

impl WithdrawnRecord {
    /// Mailing address when any part of it is present, else the free-form address.
    pub fn address_label(&self) -> String {
        if self.mailing_state.is_empty() && self.mailing_city.is_empty() && self.street.is_empty() {
            return self.address.clone();
        }
        format!("{}{}{}", self.mailing_state, self.mailing_city, self.street)
    }
}

// ---------------- Favorites ----------------

/// Ordered set of favorite partner keys. Order is insertion order so the
/// persisted list round-trips unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FavoriteSet {
    order: Vec<String>,
    index: FxHashSet<String>,
}

impl FavoriteSet {
    pub fn new() -> Self { Self::default() }

    pub fn from_ids<I: IntoIterator<Item = String>>(ids: I) -> Self {
        let mut me = Self::default();
        for id in ids { if me.index.insert(id.clone()) { me.order.push(id); } }
        me
    }

    pub fn contains(&self, id: &str) -> bool { self.index.contains(id) }
    pub fn len(&self) -> usize { self.order.len() }
    pub fn is_empty(&self) -> bool { self.order.is_empty() }
    pub fn ids(&self) -> &[String] { &self.order }

    /// Flip membership; returns whether `id` is a favorite afterwards.
    pub fn toggle(&mut self, id: &str) -> bool {
        if self.index.remove(id) {
            self.order.retain(|x| x != id);
            false
        } else {
            self.index.insert(id.to_string());
            self.order.push(id.to_string());
            true
        }
    }
}

// ---------------- Snapshot ----------------

/// Immutable dataset published after each fetch; replaced wholesale on refetch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot<R> {
    pub epoch: u64,
    pub rows: Vec<R>,
}

impl<R> Default for Snapshot<R> {
    fn default() -> Self { Self { epoch: 0, rows: Vec::new() } }
}
