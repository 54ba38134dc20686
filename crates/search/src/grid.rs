//! Weekly availability matching over the 7 x 24 occupancy grid.

use roster_core::{Grid, GridCell, Weekday, HOURS_PER_DAY};

/// Inclusive hour window inside `0..=23`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HourRange { from: u8, to: u8 }

impl HourRange {
    /// Bounds are clamped to `0..=23`; a reversed pair is swapped.
    pub fn new(from: u8, to: u8) -> Self {
        let (a, b) = (from.min(HOURS_PER_DAY - 1), to.min(HOURS_PER_DAY - 1));
        if a <= b { Self { from: a, to: b } } else { Self { from: b, to: a } }
    }

    pub fn full_day() -> Self { Self { from: 0, to: HOURS_PER_DAY - 1 } }
    pub fn hours(&self) -> std::ops::RangeInclusive<u8> { self.from..=self.to }
}

impl Default for HourRange {
    fn default() -> Self { Self::full_day() }
}

/// Every hour in `range` is known free. Occupied or unknown cells fail the day.
pub fn is_day_fully_free(grid: &Grid, day: Weekday, range: HourRange) -> bool {
    range.hours().all(|h| grid.get(day, h) == GridCell::Free)
}

/// `strict` requires all `days` to be fully free, otherwise any one suffices.
/// Callers skip the matcher entirely when no day is selected; an empty
/// `days` returns `true` so the two behave the same.
pub fn matches(grid: &Grid, days: &[Weekday], range: HourRange, strict: bool) -> bool {
    if days.is_empty() { return true; }
    if strict {
        days.iter().all(|d| is_day_fully_free(grid, *d, range))
    } else {
        days.iter().any(|d| is_day_fully_free(grid, *d, range))
    }
}
