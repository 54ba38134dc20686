//! Two-level region -> sub-region lookup (prefecture -> city).

use rustc_hash::{FxHashMap, FxHashSet};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocationHierarchy {
    // Regions in first-seen order, each with first-seen unique sub-regions.
    entries: Vec<(String, Vec<String>)>,
    index: FxHashMap<String, usize>,
}

impl LocationHierarchy {
    /// Group `(region, sub_region)` pairs. Empty regions are skipped; an empty
    /// sub-region still registers its region.
    pub fn build<I, A, B>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (A, B)>,
        A: AsRef<str>,
        B: AsRef<str>,
    {
        let mut me = Self::default();
        for (region, sub) in pairs {
            let (region, sub) = (region.as_ref().trim(), sub.as_ref().trim());
            if region.is_empty() { continue; }
            let i = match me.index.get(region) {
                Some(i) => *i,
                None => {
                    me.entries.push((region.to_string(), Vec::new()));
                    me.index.insert(region.to_string(), me.entries.len() - 1);
                    me.entries.len() - 1
                }
            };
            let subs = &mut me.entries[i].1;
            if !sub.is_empty() && !subs.iter().any(|s| s == sub) { subs.push(sub.to_string()); }
        }
        me
    }

    /// Build from sheet rows; only the first two cells of each row are used.
    pub fn from_rows(rows: &[Vec<String>]) -> Self {
        Self::build(rows.iter().map(|r| {
            (r.first().map(String::as_str).unwrap_or(""), r.get(1).map(String::as_str).unwrap_or(""))
        }))
    }

    pub fn is_empty(&self) -> bool { self.entries.is_empty() }

    pub fn regions(&self) -> impl Iterator<Item = &str> + '_ { self.entries.iter().map(|(r, _)| r.as_str()) }

    pub fn sub_regions_of(&self, region: &str) -> &[String] {
        self.index.get(region).map(|i| self.entries[*i].1.as_slice()).unwrap_or(&[])
    }

    /// Union of sub-regions for `selected` (all regions when empty), first-seen order.
    pub fn sub_region_candidates(&self, selected: &[String]) -> Vec<String> {
        let targets: Vec<&[String]> = if selected.is_empty() {
            self.entries.iter().map(|(_, subs)| subs.as_slice()).collect()
        } else {
            selected.iter().map(|r| self.sub_regions_of(r)).collect()
        };
        let mut seen: FxHashSet<&str> = FxHashSet::default();
        let mut out = Vec::new();
        for s in targets.into_iter().flatten() {
            if seen.insert(s.as_str()) { out.push(s.clone()); }
        }
        out
    }

    /// Keep the entries of `previous` that are still reachable from `selected`,
    /// in their original order. No candidates at all means nothing survives.
    pub fn sanitize(&self, selected: &[String], previous: &[String]) -> Vec<String> {
        let valid: FxHashSet<String> = self.sub_region_candidates(selected).into_iter().collect();
        if valid.is_empty() { return Vec::new(); }
        previous.iter().filter(|s| valid.contains(s.as_str())).cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(xs: &[&str]) -> Vec<String> { xs.iter().map(|s| s.to_string()).collect() }

    fn sample() -> LocationHierarchy {
        LocationHierarchy::build(vec![
            ("東京都", "港区"),
            ("東京都", "新宿区"),
            ("東京都", "港区"),
            ("大阪府", ""),
            ("", "どこか"),
            ("大阪府", "北区"),
            ("北海道", "北区"),
        ])
    }

    #[test]
    fn build_dedupes_in_first_seen_order() {
        let h = sample();
        assert_eq!(h.regions().collect::<Vec<_>>(), vec!["東京都", "大阪府", "北海道"]);
        assert_eq!(h.sub_regions_of("東京都"), &v(&["港区", "新宿区"])[..]);
        assert_eq!(h.sub_regions_of("大阪府"), &v(&["北区"])[..]);
        assert!(h.sub_regions_of("沖縄県").is_empty());
    }

    #[test]
    fn candidates_union_all_when_unselected() {
        let h = sample();
        assert_eq!(h.sub_region_candidates(&[]), v(&["港区", "新宿区", "北区"]));
        assert_eq!(h.sub_region_candidates(&v(&["北海道", "東京都"])), v(&["北区", "港区", "新宿区"]));
    }

    #[test]
    fn sanitize_keeps_order_and_is_idempotent() {
        let h = sample();
        let prev = v(&["新宿区", "北区", "港区"]);
        let once = h.sanitize(&v(&["東京都"]), &prev);
        assert_eq!(once, v(&["新宿区", "港区"]));
        assert_eq!(h.sanitize(&v(&["東京都"]), &once), once);
        assert!(LocationHierarchy::default().sanitize(&[], &prev).is_empty());
        assert!(h.sanitize(&v(&["沖縄県"]), &prev).is_empty());
    }
}
