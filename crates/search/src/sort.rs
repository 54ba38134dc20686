//! Stable multi-type ordering for result sets.
//!
//! Results are sorted as indices into the snapshot rows; the rows themselves
//! are never moved.

use std::borrow::Cow;
use std::cmp::Ordering;

use roster_core::columns::{COL_ADDRESS, COL_CITY, COL_GENDER, COL_KANA, COL_PHONE, COL_PREF, COL_STATUS};
use roster_core::dates::timestamp_ms;
use icu_collator::{Collator, CollatorOptions, Strength};
use icu_locid::locale;
use roster_core::{FavoriteSet, PartnerRecord, SortDirection, SortKey, WithdrawnRecord};

thread_local! {
    static COLLATOR: Option<Collator> = {
        let mut options = CollatorOptions::new();
        options.strength = Some(Strength::Tertiary);
        Collator::try_new(&locale!("ja").into(), options).ok()
    };
}

/// Case-sensitive `ja` collation. Falls back to codepoint order if the
/// collation data cannot be loaded.
pub fn collate(a: &str, b: &str) -> Ordering {
    COLLATOR.with(|c| match c {
        Some(c) => c.compare(a, b),
        None => a.cmp(b),
    })
}

/// Comparable projection of one field. Missing numbers and dates sort as the minimum.
#[derive(Debug, Clone, PartialEq)]
pub enum SortValue<'a> {
    Text(Cow<'a, str>),
    Number(Option<f64>),
    Date(Option<i64>),
}

impl SortValue<'_> {
    fn compare(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Text(a), Self::Text(b)) => collate(a, b),
            (Self::Number(a), Self::Number(b)) => a.unwrap_or(f64::NEG_INFINITY).total_cmp(&b.unwrap_or(f64::NEG_INFINITY)),
            (Self::Date(a), Self::Date(b)) => a.unwrap_or(i64::MIN).cmp(&b.unwrap_or(i64::MIN)),
            _ => Ordering::Equal,
        }
    }
}

pub trait Sortable {
    /// Identifier looked up in the favorites set.
    fn favorite_key(&self) -> &str;
    fn display_name(&self) -> &str;
    fn sort_value(&self, key: &SortKey) -> SortValue<'_>;
}

fn text(s: &str) -> SortValue<'_> { SortValue::Text(Cow::Borrowed(s)) }

impl Sortable for PartnerRecord {
    fn favorite_key(&self) -> &str { &self.id }
    fn display_name(&self) -> &str { &self.name }
    fn sort_value(&self, key: &SortKey) -> SortValue<'_> {
        match key {
            SortKey::Favorite | SortKey::Name => text(&self.name),
            SortKey::Age => SortValue::Number(self.age),
            SortKey::ApprovalDate => SortValue::Date(self.approval_date.as_ref().map(timestamp_ms)),
            SortKey::LastWorked => SortValue::Date(self.last_worked.as_ref().map(timestamp_ms)),
            SortKey::ExitDate => SortValue::Date(None),
            SortKey::Address => text(&self.address),
            SortKey::Column(c) => match c.as_str() {
                COL_KANA => text(&self.kana_name),
                COL_GENDER => text(&self.gender),
                COL_STATUS => text(self.status.label()),
                COL_PREF => text(&self.prefecture),
                COL_CITY => text(&self.city),
                COL_PHONE => text(&self.phone),
                other => text(self.extra.get(other).map(String::as_str).unwrap_or("")),
            },
        }
    }
}

impl Sortable for WithdrawnRecord {
    fn favorite_key(&self) -> &str { &self.key }
    fn display_name(&self) -> &str { &self.name }
    fn sort_value(&self, key: &SortKey) -> SortValue<'_> {
        match key {
            SortKey::Favorite | SortKey::Name => text(&self.name),
            SortKey::Age => SortValue::Number(self.age),
            SortKey::ApprovalDate => SortValue::Date(self.approval_date.as_ref().map(timestamp_ms)),
            SortKey::LastWorked => SortValue::Date(self.last_worked.as_ref().map(timestamp_ms)),
            SortKey::ExitDate => SortValue::Date(self.exit_date.as_ref().map(timestamp_ms)),
            SortKey::Address => SortValue::Text(Cow::Owned(self.address_label())),
            SortKey::Column(c) => match c.as_str() {
                COL_KANA => text(&self.kana_name),
                COL_GENDER => text(&self.gender),
                COL_PREF => text(&self.prefecture),
                COL_CITY => text(&self.city),
                COL_PHONE => text(&self.phone),
                COL_ADDRESS => SortValue::Text(Cow::Owned(self.address_label())),
                other => text(self.extra.get(other).map(String::as_str).unwrap_or("")),
            },
        }
    }
}

/// Compare two rows under `key`/`dir`. For `Favorite`, favorites lead under
/// `Asc` and trail under `Desc`; ties always fall back to name ascending.
pub fn compare<R: Sortable>(a: &R, b: &R, key: &SortKey, dir: SortDirection, favorites: &FavoriteSet) -> Ordering {
    let directed = |o: Ordering| if dir == SortDirection::Desc { o.reverse() } else { o };
    if *key == SortKey::Favorite {
        let (fa, fb) = (favorites.contains(a.favorite_key()), favorites.contains(b.favorite_key()));
        if fa != fb { return directed(if fa { Ordering::Less } else { Ordering::Greater }); }
        return collate(a.display_name(), b.display_name());
    }
    directed(a.sort_value(key).compare(&b.sort_value(key)))
}

/// Stable in-place sort of `order` (indices into `rows`).
pub fn sort_indices<R: Sortable>(rows: &[R], order: &mut [usize], key: &SortKey, dir: SortDirection, favorites: &FavoriteSet) {
    order.sort_by(|&i, &j| compare(&rows[i], &rows[j], key, dir, favorites));
}

/// Sorted copy of `order`; the input is left untouched.
pub fn sorted<R: Sortable>(rows: &[R], order: &[usize], key: &SortKey, dir: SortDirection, favorites: &FavoriteSet) -> Vec<usize> {
    let mut out = order.to_vec();
    sort_indices(rows, &mut out, key, dir, favorites);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(id: &str, name: &str, age: Option<f64>) -> PartnerRecord {
        PartnerRecord { id: id.into(), name: name.into(), age, ..Default::default() }
    }

    #[test]
    fn favorite_tie_break_is_name_ascending() {
        let rows = vec![p("2", "い", None), p("1", "あ", None)];
        let none = FavoriteSet::new();
        assert_eq!(sorted(&rows, &[0, 1], &SortKey::Favorite, SortDirection::Asc, &none), vec![1, 0]);
        assert_eq!(sorted(&rows, &[0, 1], &SortKey::Favorite, SortDirection::Desc, &none), vec![1, 0]);
        let favs = FavoriteSet::from_ids(vec!["2".to_string()]);
        assert_eq!(sorted(&rows, &[1, 0], &SortKey::Favorite, SortDirection::Asc, &favs), vec![0, 1]);
        assert_eq!(sorted(&rows, &[0, 1], &SortKey::Favorite, SortDirection::Desc, &favs), vec![1, 0]);
    }

    #[test]
    fn non_numeric_age_sorts_first_ascending() {
        let rows = vec![p("a", "a", Some(40.0)), p("b", "b", None), p("c", "c", Some(25.0))];
        let f = FavoriteSet::new();
        assert_eq!(sorted(&rows, &[0, 1, 2], &SortKey::Age, SortDirection::Asc, &f), vec![1, 2, 0]);
        assert_eq!(sorted(&rows, &[0, 1, 2], &SortKey::Age, SortDirection::Desc, &f), vec![0, 2, 1]);
    }

    #[test]
    fn stable_for_equal_keys() {
        let rows = vec![p("a", "same", None), p("b", "same", None), p("c", "other", None)];
        let f = FavoriteSet::new();
        let once = sorted(&rows, &[0, 1, 2], &SortKey::Name, SortDirection::Asc, &f);
        assert_eq!(once, vec![2, 0, 1]);
        assert_eq!(sorted(&rows, &once, &SortKey::Name, SortDirection::Asc, &f), once);
        let desc = sorted(&rows, &[1, 0, 2], &SortKey::Name, SortDirection::Desc, &f);
        assert_eq!(desc, vec![1, 0, 2]);
    }

    #[test]
    fn withdrawn_address_label_key() {
        let a = WithdrawnRecord { address: "Z".into(), ..Default::default() };
        let b = WithdrawnRecord { mailing_state: "A".into(), address: "Y".into(), ..Default::default() };
        let f = FavoriteSet::new();
        assert_eq!(compare(&a, &b, &SortKey::Address, SortDirection::Asc, &f), Ordering::Greater);
    }

    #[test]
    fn names_follow_locale_collation() {
        let rows = vec![p("1", "Beta", None), p("2", "alpha", None), p("3", "イ", None), p("4", "あ", None), p("5", "ア", None)];
        let f = FavoriteSet::new();
        let order = sorted(&rows, &[0, 1, 2, 3, 4], &SortKey::Name, SortDirection::Asc, &f);
        let names: Vec<&str> = order.iter().map(|&i| rows[i].name.as_str()).collect();
        assert_eq!(&names[..2], &["alpha", "Beta"]);
        assert_eq!(names[4], "イ");
        assert_eq!(collate("あ", "イ"), Ordering::Less);
        assert_eq!(collate("ア", "イ"), Ordering::Less);
    }

    #[test]
    fn favorite_ties_use_collation_too() {
        let rows = vec![p("1", "Beta", None), p("2", "alpha", None)];
        let order = sorted(&rows, &[0, 1], &SortKey::Favorite, SortDirection::Asc, &FavoriteSet::new());
        assert_eq!(order, vec![1, 0]);
    }
}
