//! Sheet ingestion: header normalization, padded rows, and the mapping from
//! source column names to canonical record fields.
//!
//! Source headers are inconsistent (full-width spaces, stray padding, a few
//! Japanese aliases). Every header passes through [`normalize_header`] once and
//! is then resolved through [`canonical_header`]; records never carry the raw form.

#![forbid(unsafe_code)]

use std::collections::BTreeMap;

use crate::dates;
use crate::{AssignmentRecord, Grid, GridCell, OperatingStatus, PartnerRecord, Weekday, WithdrawnRecord};

// ---------------- Canonical column names ----------------
// Partner
pub const COL_ID: &str = "SF_ID__c";
pub const COL_NAME: &str = "Name";
pub const COL_KANA: &str = "Name__c";
pub const COL_AGE: &str = "Now_Age__c";
pub const COL_GENDER: &str = "Gender__c";
pub const COL_STATUS: &str = "OperatingStatus__c";
pub const COL_PREF: &str = "都道府県";
pub const COL_CITY: &str = "市区町村";
pub const COL_ADDRESS: &str = "Address__c";
pub const COL_PHONE: &str = "MobilePhone";
pub const COL_APPROVAL: &str = "ApprovalDate__c";
pub const COL_LICENSE: &str = "LicenseRenewalFinal__c";
pub const COL_INSURANCE: &str = "InsuranceExpirationDate__c";
pub const COL_INSPECTION: &str = "InspectionExpirationDate__c";
pub const COL_LAST_WORKED: &str = "最終稼働日";
pub const COL_LAST_PROJECT: &str = "最終案件名";
pub const COL_REMARKS: &str = "DriverSituation__c";

// Withdrawn
pub const COL_MAIL_STATE: &str = "MailingState";
pub const COL_MAIL_CITY: &str = "MailingCity";
pub const COL_MAIL_STREET: &str = "MailingStreet";
pub const COL_QUIT_DAI: &str = "Quit_Dai__c";
pub const COL_QUIT_CHU: &str = "Quit_chu__c";
pub const COL_QUIT_SHO: &str = "Quit_sho__c";
pub const COL_QUIT_DETAIL: &str = "Quit_detail__c";
pub const COL_EXIT_REASON: [&str; 3] = ["ExitReason__c", "離脱理由", "退職理由"];
pub const COL_RECENT_PROJECT: &str = "直近案件";
pub const COL_RECENT_WORK: &str = "直近稼働";
pub const COL_EXIT_DATE: [&str; 2] = ["WithdrawalDate__c", "DeclineChangeDate__c"];

// Assignment
pub const COL_ASSIGN_ID: &str = "Id";
pub const COL_ASSIGN_PARTNER: &str = "Partner__r.ID_18__c";
pub const COL_ASSIGN_COMMENT: &str = "Haisyasinsei_komento__c";
pub const COL_ASSIGN_PREF: &str = "PrefecturesFree__c";
pub const COL_ASSIGN_CITY: &str = "CityFree__c";
pub const COL_ASSIGN_START: &str = "OperationStartDate__c";
pub const COL_ASSIGN_DAYS: &str = "WorkingDay__c";
pub const COL_ASSIGN_PLANNED: &str = "KADO_YOTEI_NISSUU_AUTO__c";
pub const COL_ASSIGN_TIME_FROM: &str = "OperationStartTime__c";
pub const COL_ASSIGN_TIME_TO: &str = "OperationEndTime__c";
pub const COL_CONTRACT_PRICE: &str = "ContractPrice__c";
pub const COL_CONTRACT_UNIT: &str = "BillingCategory__c";
pub const COL_CONSIGN_PRICE: &str = "ConsignmentPrice__c";
pub const COL_CONSIGN_UNIT: &str = "BillingCategorys__c";

/// Known header variants, applied after normalization.
const HEADER_ALIASES: &[(&str, &str)] = &[
    ("ID", COL_ID),
    ("SFID", COL_ID),
    ("氏名", COL_NAME),
    ("フリガナ", COL_KANA),
    ("年齢", COL_AGE),
    ("性別", COL_GENDER),
    ("稼働状況", COL_STATUS),
    ("住所", COL_ADDRESS),
    ("携帯電話", COL_PHONE),
    ("承認日", COL_APPROVAL),
    ("離脱日", "WithdrawalDate__c"),
];

/// Replace U+3000 with a space, fold full-width ASCII to half-width, trim,
/// then drop every remaining whitespace character.
pub fn normalize_header(raw: &str) -> String {
    raw.chars()
        .map(|c| match c {
            '\u{3000}' => ' ',
            '\u{FF01}'..='\u{FF5E}' => char::from_u32(c as u32 - 0xFEE0).unwrap_or(c),
            _ => c,
        })
        .collect::<String>()
        .trim()
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect()
}

/// Normalized header resolved through the alias table.
pub fn canonical_header(raw: &str) -> String {
    let n = normalize_header(raw);
    HEADER_ALIASES.iter().find(|(from, _)| *from == n).map(|(_, to)| to.to_string()).unwrap_or(n)
}

/// `None` for empty or non-numeric input; never an error.
pub fn parse_number(raw: &str) -> Option<f64> {
    let t = raw.trim();
    if t.is_empty() { return None; }
    t.replace(',', "").parse::<f64>().ok().filter(|v| v.is_finite())
}

// ---------------- Sheet table ----------------

/// Header row plus data rows, each padded with `""` to header length.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SheetTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl SheetTable {
    /// First row is the header; a missing header yields an empty table.
    pub fn from_values(mut values: Vec<Vec<String>>) -> Self {
        if values.is_empty() { return Self::default(); }
        let headers: Vec<String> = values.remove(0).iter().map(|h| canonical_header(h)).collect();
        let width = headers.len();
        let rows = values
            .into_iter()
            .map(|mut r| { r.resize(width, String::new()); r })
            .collect();
        Self { headers, rows }
    }

    pub fn len(&self) -> usize { self.rows.len() }
    pub fn is_empty(&self) -> bool { self.rows.is_empty() }

    /// Rows as column maps. Duplicate headers: the rightmost value wins.
    pub fn row_maps(&self) -> impl Iterator<Item = RowMap> + '_ {
        self.rows.iter().map(move |r| {
            let mut m = BTreeMap::new();
            for (h, v) in self.headers.iter().zip(r.iter()) { m.insert(h.clone(), v.clone()); }
            RowMap(m)
        })
    }

    pub fn records<R: FromRow>(&self) -> Vec<R> { self.row_maps().map(R::from_row).collect() }
}

/// One row keyed by canonical header. Fields are consumed by `take`/`pick`;
/// whatever is left becomes the record's `extra` map.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RowMap(pub BTreeMap<String, String>);

impl RowMap {
    pub fn take(&mut self, key: &str) -> String { self.0.remove(key).unwrap_or_default() }

    /// First candidate whose trimmed value is non-empty. All candidates are consumed.
    pub fn pick(&mut self, keys: &[&str]) -> String {
        let mut out = String::new();
        for k in keys {
            let v = self.take(k);
            if out.is_empty() && !v.trim().is_empty() { out = v; }
        }
        out
    }

    pub fn get(&self, key: &str) -> &str { self.0.get(key).map(String::as_str).unwrap_or("") }

    /// Remove every `{曜}_{HH}` column and fold it into a grid.
    pub fn take_grid(&mut self) -> Grid {
        let mut grid = Grid::default();
        let keys: Vec<String> = self.0.keys().filter(|k| grid_slot(k).is_some()).cloned().collect();
        for k in keys {
            if let (Some((day, hour)), Some(v)) = (grid_slot(&k), self.0.remove(&k)) {
                grid.set(day, hour, GridCell::parse(&v));
            }
        }
        grid
    }

    pub fn into_extra(self) -> BTreeMap<String, String> { self.0 }
}

fn grid_slot(key: &str) -> Option<(Weekday, u8)> {
    let (d, h) = key.split_once('_')?;
    let day = Weekday::from_label(d)?;
    if h.is_empty() || h.len() > 2 || !h.bytes().all(|b| b.is_ascii_digit()) { return None; }
    let hour: u8 = h.parse().ok()?;
    (hour < 24).then_some((day, hour))
}

pub trait FromRow {
    fn from_row(row: RowMap) -> Self;
}

impl FromRow for PartnerRecord {
    fn from_row(mut r: RowMap) -> Self {
        let grid = r.take_grid();
        Self {
            id: r.take(COL_ID).trim().to_string(),
            name: r.take(COL_NAME),
            kana_name: r.take(COL_KANA),
            age: parse_number(&r.take(COL_AGE)),
            gender: r.take(COL_GENDER),
            status: OperatingStatus::from(r.take(COL_STATUS)),
            prefecture: r.take(COL_PREF),
            city: r.take(COL_CITY),
            address: r.take(COL_ADDRESS),
            phone: r.take(COL_PHONE),
            approval_date: dates::parse(&r.take(COL_APPROVAL)),
            license_expiry: dates::parse(&r.take(COL_LICENSE)),
            insurance_expiry: dates::parse(&r.take(COL_INSURANCE)),
            inspection_expiry: dates::parse(&r.take(COL_INSPECTION)),
            last_worked: dates::parse(&r.take(COL_LAST_WORKED)),
            last_project: r.take(COL_LAST_PROJECT),
            remarks: r.take(COL_REMARKS),
            grid,
            extra: r.into_extra(),
        }
    }
}

impl FromRow for WithdrawnRecord {
    fn from_row(mut r: RowMap) -> Self {
        let id = r.take(COL_ID).trim().to_string();
        let name = r.take(COL_NAME);
        let approval_raw = r.take(COL_APPROVAL);
        let key = if id.is_empty() {
            format!("{}-{}", if name.is_empty() { "NONAME" } else { name.as_str() }, approval_raw)
        } else {
            id.clone()
        };
        Self {
            key,
            id,
            name,
            kana_name: r.take(COL_KANA),
            age: parse_number(&r.take(COL_AGE)),
            gender: r.take(COL_GENDER),
            mailing_state: r.get(COL_MAIL_STATE).to_string(),
            mailing_city: r.get(COL_MAIL_CITY).to_string(),
            prefecture: r.pick(&[COL_MAIL_STATE, COL_PREF]),
            city: r.pick(&[COL_MAIL_CITY, COL_CITY]),
            street: r.take(COL_MAIL_STREET),
            address: r.take(COL_ADDRESS),
            phone: r.take(COL_PHONE),
            remarks: r.take(COL_REMARKS),
            exit_reason: r.pick(&COL_EXIT_REASON),
            reason_large: r.take(COL_QUIT_DAI),
            reason_medium: r.take(COL_QUIT_CHU),
            reason_small: r.take(COL_QUIT_SHO),
            reason_detail: r.take(COL_QUIT_DETAIL),
            recent_project: r.take(COL_RECENT_PROJECT),
            recent_work: r.take(COL_RECENT_WORK),
            approval_date: dates::parse(&approval_raw),
            last_worked: dates::parse(&r.take(COL_LAST_WORKED)),
            exit_date: dates::parse(&r.pick(&COL_EXIT_DATE)),
            extra: r.into_extra(),
        }
    }
}

/// `月曜日;水曜日;祝日` -> `["月", "水", "祝"]`. Unknown tokens pass through trimmed.
pub fn working_days(raw: &str) -> Vec<String> {
    raw.split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| match Weekday::from_label(s) {
            Some(d) => d.label().to_string(),
            None if s == "祝日" || s == "祝" => "祝".to_string(),
            None => s.to_string(),
        })
        .collect()
}

impl FromRow for AssignmentRecord {
    fn from_row(mut r: RowMap) -> Self {
        Self {
            id: r.take(COL_ASSIGN_ID),
            partner_id: r.take(COL_ASSIGN_PARTNER).trim().to_string(),
            name: r.take(COL_NAME),
            comment: r.take(COL_ASSIGN_COMMENT),
            prefecture: r.take(COL_ASSIGN_PREF),
            city: r.take(COL_ASSIGN_CITY),
            start_date: r.take(COL_ASSIGN_START),
            working_days: working_days(&r.take(COL_ASSIGN_DAYS)),
            planned_days: r.take(COL_ASSIGN_PLANNED),
            start_time: dates::parse_time(&r.take(COL_ASSIGN_TIME_FROM)),
            end_time: dates::parse_time(&r.take(COL_ASSIGN_TIME_TO)),
            contract_price: parse_number(&r.take(COL_CONTRACT_PRICE)),
            contract_unit: r.take(COL_CONTRACT_UNIT),
            consignment_price: parse_number(&r.take(COL_CONSIGN_PRICE)),
            consignment_unit: r.take(COL_CONSIGN_UNIT),
        }
    }
}
