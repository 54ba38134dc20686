//! Roster search: filter, sort and page the in-memory partner datasets.
//! Pure functions over snapshot rows; results are row indices.

#![forbid(unsafe_code)]

use std::time::Instant;

use roster_core::{AvailabilityFilter, FavoriteSet, PartnerRecord, WithdrawnFilter, WithdrawnRecord};
use tracing::debug;

pub mod filter;
pub mod grid;
pub mod location;
pub mod pager;
pub mod sort;

pub use filter::{filter_availability, filter_withdrawn, validate, FilterDebugInfo};
pub use grid::{is_day_fully_free, matches, HourRange};
pub use location::LocationHierarchy;
pub use pager::{page_links, paginate, PageLink, PageWindow, Pager, DEFAULT_PAGE_SIZE};
pub use sort::{collate, sort_indices, sorted, SortValue, Sortable};

/// A search was rejected before any filtering ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error, serde::Serialize)]
pub enum Precondition {
    #[error("都道府県を1つ以上選択してください。")]
    MissingRegion,
    #[error("曜日を1つ以上選択してください。")]
    MissingWeekday,
}

/// Filtered rows in row order (`raw`) and in display order (`sorted`).
#[derive(Debug, Clone, Default)]
pub struct SearchOutcome {
    pub raw: Vec<usize>,
    pub sorted: Vec<usize>,
    pub debug: FilterDebugInfo,
    pub elapsed_ms: u64,
}

fn finish(surface: &'static str, raw: Vec<usize>, sorted: Vec<usize>, dbg: FilterDebugInfo, t0: Instant) -> SearchOutcome {
    let elapsed = t0.elapsed();
    metrics::histogram!("search_eval_ms", elapsed.as_secs_f64() * 1_000.0, "surface" => surface);
    metrics::gauge!("search_results", sorted.len() as f64, "surface" => surface);
    debug!(surface, total = dbg.total, results = sorted.len(), took_ms = %elapsed.as_millis(), "search: evaluated");
    SearchOutcome { raw, sorted, debug: dbg, elapsed_ms: elapsed.as_millis() as u64 }
}

/// Validate, filter and sort the availability dataset.
pub fn search_availability(rows: &[PartnerRecord], f: &AvailabilityFilter, favorites: &FavoriteSet) -> Result<SearchOutcome, Precondition> {
    validate(f)?;
    let t0 = Instant::now();
    let (raw, dbg) = filter_availability(rows, f, favorites);
    let order = sorted(rows, &raw, &f.sort_key, f.sort_direction, favorites);
    Ok(finish("availability", raw, order, dbg, t0))
}

/// Filter and sort the withdrawn dataset. Never rejected.
pub fn search_withdrawn(rows: &[WithdrawnRecord], f: &WithdrawnFilter, favorites: &FavoriteSet) -> SearchOutcome {
    let t0 = Instant::now();
    let (raw, dbg) = filter_withdrawn(rows, f, favorites);
    let order = sorted(rows, &raw, &f.sort_key, f.sort_direction, favorites);
    finish("withdrawn", raw, order, dbg, t0)
}
