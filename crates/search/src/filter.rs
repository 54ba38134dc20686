//! Conjunctive predicate pipelines for the availability and withdrawn datasets.
//!
//! Each row walks a fixed predicate order and stops at the first failure.
//! Stage counters record how many rows survived each predicate.

use serde::Serialize;

use roster_core::{AvailabilityFilter, FavoriteSet, PartnerRecord, WithdrawnFilter, WithdrawnRecord};

use crate::grid::{self, HourRange};
use crate::Precondition;

/// Name markers for partners who must never appear in availability results.
pub const EXCLUDED_NAME_MARKERS: [&str; 2] = ["支援終了", "離脱"];

/// Availability searches outside favorites mode need a region and a weekday.
pub fn validate(f: &AvailabilityFilter) -> Result<(), Precondition> {
    if f.favorites_only { return Ok(()); }
    if f.regions.is_empty() { return Err(Precondition::MissingRegion); }
    if f.weekdays.is_empty() { return Err(Precondition::MissingWeekday); }
    Ok(())
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FilterDebugInfo {
    pub total: usize,
    pub after_favorites: usize,
    pub after_exclusions: usize,
    pub after_status: usize,
    pub after_region: usize,
    pub after_sub_region: usize,
    pub after_age: usize,
    pub after_categories: usize,
    pub after_keywords: usize,
    pub after_grid: usize,
}

/// `[min, max]` with either end open. With any bound set, an unknown age fails.
pub fn age_in_range(age: Option<f64>, min: Option<u32>, max: Option<u32>) -> bool {
    if min.is_none() && max.is_none() { return true; }
    let Some(a) = age else { return false };
    min.map_or(true, |m| a >= m as f64) && max.map_or(true, |m| a <= m as f64)
}

fn member(selected: &[String], value: &str) -> bool { selected.is_empty() || selected.iter().any(|s| s == value) }

/// Indices of availability rows passing every active predicate, in row order.
pub fn filter_availability(rows: &[PartnerRecord], f: &AvailabilityFilter, favorites: &FavoriteSet) -> (Vec<usize>, FilterDebugInfo) {
    let mut dbg = FilterDebugInfo { total: rows.len(), ..Default::default() };
    let range = HourRange::new(f.hour_from, f.hour_to);
    let mut out = Vec::new();
    for (i, p) in rows.iter().enumerate() {
        if f.favorites_only && !favorites.contains(&p.id) { continue; }
        dbg.after_favorites += 1;
        if EXCLUDED_NAME_MARKERS.iter().any(|m| p.name.contains(m)) { continue; }
        dbg.after_exclusions += 1;
        if !f.statuses.contains(&p.status) { continue; }
        dbg.after_status += 1;
        if !member(&f.regions, &p.prefecture) { continue; }
        dbg.after_region += 1;
        if !member(&f.sub_regions, &p.city) { continue; }
        dbg.after_sub_region += 1;
        if !age_in_range(p.age, f.age_min, f.age_max) { continue; }
        dbg.after_age += 1;
        dbg.after_categories += 1;
        dbg.after_keywords += 1;
        if !f.weekdays.is_empty() && !grid::matches(&p.grid, &f.weekdays, range, f.strict) { continue; }
        dbg.after_grid += 1;
        out.push(i);
    }
    (out, dbg)
}

/// Lowercased text searched by the withdrawn free-text keyword.
pub fn withdrawn_haystack(w: &WithdrawnRecord) -> String {
    [
        &w.name,
        &w.kana_name,
        &w.address,
        &w.remarks,
        &w.exit_reason,
        &w.mailing_state,
        &w.mailing_city,
        &w.street,
        &w.reason_detail,
        &w.recent_project,
        &w.recent_work,
    ]
    .into_iter()
    .filter(|s| !s.is_empty())
    .map(String::as_str)
    .collect::<Vec<_>>()
    .join(" ")
    .to_lowercase()
}

/// Indices of withdrawn rows passing every active predicate, in row order.
/// No region or weekday precondition applies here.
pub fn filter_withdrawn(rows: &[WithdrawnRecord], f: &WithdrawnFilter, favorites: &FavoriteSet) -> (Vec<usize>, FilterDebugInfo) {
    let mut dbg = FilterDebugInfo { total: rows.len(), ..Default::default() };
    // Blank queries are inactive; non-blank ones match as typed, spaces included.
    let keyword = (!f.keyword.trim().is_empty()).then(|| f.keyword.to_lowercase());
    let detail = (!f.detail_keyword.trim().is_empty()).then(|| f.detail_keyword.to_lowercase());
    let mut out = Vec::new();
    for (i, w) in rows.iter().enumerate() {
        if !member(&f.regions, &w.prefecture) { continue; }
        dbg.after_region += 1;
        if !member(&f.sub_regions, &w.city) { continue; }
        dbg.after_sub_region += 1;
        if !age_in_range(w.age, f.age_min, f.age_max) { continue; }
        dbg.after_age += 1;
        if !member(&f.reason_large, &w.reason_large)
            || !member(&f.reason_medium, &w.reason_medium)
            || !member(&f.reason_small, &w.reason_small)
        {
            continue;
        }
        dbg.after_categories += 1;
        if detail.as_ref().is_some_and(|d| !w.reason_detail.to_lowercase().contains(d)) { continue; }
        if keyword.as_ref().is_some_and(|k| !withdrawn_haystack(w).contains(k)) { continue; }
        dbg.after_keywords += 1;
        if f.favorites_only && !favorites.contains(&w.key) { continue; }
        dbg.after_favorites += 1;
        out.push(i);
    }
    (out, dbg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use roster_core::{Grid, GridCell, OperatingStatus, Weekday};

    fn partner(id: &str, name: &str, pref: &str) -> PartnerRecord {
        PartnerRecord {
            id: id.into(),
            name: name.into(),
            prefecture: pref.into(),
            status: OperatingStatus::Active,
            age: Some(40.0),
            grid: Grid::default().with_range(Weekday::Mon, 9, 10, GridCell::Free),
            ..Default::default()
        }
    }

    fn search(days: &[Weekday]) -> AvailabilityFilter {
        AvailabilityFilter { regions: vec!["東京都".into()], weekdays: days.to_vec(), hour_from: 9, hour_to: 10, ..Default::default() }
    }

    #[test]
    fn validation_messages_and_favorites_bypass() {
        let mut f = AvailabilityFilter::default();
        assert_eq!(validate(&f), Err(Precondition::MissingRegion));
        f.regions.push("東京都".into());
        assert_eq!(validate(&f).unwrap_err().to_string(), "曜日を1つ以上選択してください。");
        let fav = AvailabilityFilter { favorites_only: true, ..Default::default() };
        assert_eq!(validate(&fav), Ok(()));
    }

    #[test]
    fn exclusion_markers_always_apply() {
        let rows = vec![partner("1", "山田【支援終了】", "東京都"), partner("2", "離脱 佐藤", "東京都"), partner("3", "鈴木", "東京都")];
        let (ids, dbg) = filter_availability(&rows, &search(&[Weekday::Mon]), &FavoriteSet::new());
        assert_eq!(ids, vec![2]);
        assert_eq!(dbg.after_exclusions, 1);
    }

    #[test]
    fn age_bounds() {
        assert!(age_in_range(None, None, None));
        assert!(!age_in_range(None, Some(20), None));
        assert!(age_in_range(Some(20.0), Some(20), Some(20)));
        assert!(!age_in_range(Some(61.0), None, Some(60)));
    }

    #[test]
    fn stage_counts_track_survivors() {
        let mut rows = vec![partner("1", "a", "東京都"), partner("2", "b", "大阪府")];
        rows[0].status = OperatingStatus::Other("休止".into());
        let (ids, dbg) = filter_availability(&rows, &search(&[]), &FavoriteSet::new());
        assert!(ids.is_empty());
        assert_eq!((dbg.total, dbg.after_status, dbg.after_region), (2, 1, 0));
    }

    #[test]
    fn withdrawn_keyword_is_case_insensitive() {
        let rows = vec![
            WithdrawnRecord { key: "k1".into(), name: "Alpha".into(), exit_reason: "Moved".into(), ..Default::default() },
            WithdrawnRecord { key: "k2".into(), name: "Beta".into(), reason_detail: "体調不良".into(), ..Default::default() },
        ];
        let f = WithdrawnFilter { keyword: "MOVED".into(), ..Default::default() };
        assert_eq!(filter_withdrawn(&rows, &f, &FavoriteSet::new()).0, vec![0]);
        let blank = WithdrawnFilter { keyword: "   ".into(), ..Default::default() };
        assert_eq!(filter_withdrawn(&rows, &blank, &FavoriteSet::new()).0, vec![0, 1]);
        let f = WithdrawnFilter { detail_keyword: "体調".into(), ..Default::default() };
        assert_eq!(filter_withdrawn(&rows, &f, &FavoriteSet::new()).0, vec![1]);
        let f = WithdrawnFilter { favorites_only: true, ..Default::default() };
        let favs = FavoriteSet::from_ids(vec!["k2".to_string()]);
        assert_eq!(filter_withdrawn(&rows, &f, &favs).0, vec![1]);
    }

    #[test]
    fn empty_status_selection_matches_nothing() {
        let rows = vec![partner("1", "a", "東京都")];
        let all = search(&[Weekday::Mon]);
        assert_eq!(filter_availability(&rows, &all, &FavoriteSet::new()).0, vec![0]);
        let none = AvailabilityFilter { statuses: vec![], ..all };
        let (ids, dbg) = filter_availability(&rows, &none, &FavoriteSet::new());
        assert!(ids.is_empty());
        assert_eq!(dbg.after_status, 0);
    }

    #[test]
    fn withdrawn_keyword_reads_mailing_address_only() {
        let mut w = WithdrawnRecord { key: "k".into(), name: "山田".into(), prefecture: "東京都".into(), city: "港区".into(), ..Default::default() };
        assert!(!withdrawn_haystack(&w).contains("港区"));
        w.mailing_city = "港区".into();
        w.street = "芝公園".into();
        assert_eq!(withdrawn_haystack(&w), "山田 港区 芝公園");
        let rows = vec![w];
        let padded = WithdrawnFilter { keyword: " 港区".into(), ..Default::default() };
        assert_eq!(filter_withdrawn(&rows, &padded, &FavoriteSet::new()).0, vec![0]);
        let trailing = WithdrawnFilter { keyword: "芝公園 ".into(), ..Default::default() };
        assert!(filter_withdrawn(&rows, &trailing, &FavoriteSet::new()).0.is_empty());
    }

    #[test]
    fn withdrawn_debug_skips_stages_it_lacks() {
        let rows = vec![WithdrawnRecord { key: "k".into(), ..Default::default() }];
        let (ids, dbg) = filter_withdrawn(&rows, &WithdrawnFilter::default(), &FavoriteSet::new());
        assert_eq!(ids, vec![0]);
        assert_eq!((dbg.total, dbg.after_region, dbg.after_favorites), (1, 1, 1));
        assert_eq!((dbg.after_exclusions, dbg.after_status, dbg.after_grid), (0, 0, 0));
    }
}
