//! Filter state for both search surfaces.
//!
//! Field names serialize in the camelCase vocabulary the filter cache and
//! search-history snapshots use (`selectedPrefs`, `ageMin`, ...), so a stored
//! blob deserializes straight into these types.

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::{OperatingStatus, Weekday};

// ---------------- Sort ----------------

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SortKey {
    Favorite,
    Name,
    Age,
    ApprovalDate,
    LastWorked,
    ExitDate,
    Address,
    /// Any other column; compared as text.
    Column(String),
}

impl SortKey {
    pub fn parse(raw: &str) -> Self {
        match raw.trim() {
            "favorite" | "_favorite" => Self::Favorite,
            "Name" => Self::Name,
            "Now_Age__c" => Self::Age,
            "ApprovalDate__c" => Self::ApprovalDate,
            "最終稼働日" => Self::LastWorked,
            "ExitDate__c" => Self::ExitDate,
            "Address__c" => Self::Address,
            other => Self::Column(other.to_string()),
        }
    }

    pub fn as_key(&self) -> &str {
        match self {
            Self::Favorite => "favorite",
            Self::Name => "Name",
            Self::Age => "Now_Age__c",
            Self::ApprovalDate => "ApprovalDate__c",
            Self::LastWorked => "最終稼働日",
            Self::ExitDate => "ExitDate__c",
            Self::Address => "Address__c",
            Self::Column(c) => c.as_str(),
        }
    }
}

impl std::str::FromStr for SortKey {
    type Err = std::convert::Infallible;
    fn from_str(s: &str) -> Result<Self, Self::Err> { Ok(Self::parse(s)) }
}

impl Serialize for SortKey {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> { s.serialize_str(self.as_key()) }
}

impl<'de> Deserialize<'de> for SortKey {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> { Ok(Self::parse(&String::deserialize(d)?)) }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "asc" => Some(Self::Asc),
            "desc" => Some(Self::Desc),
            _ => None,
        }
    }
}

// ---------------- Age bounds ----------------

/// Age bounds are stored as strings (`""` when unset) for compatibility with
/// stored snapshots; numbers and `null` are accepted on input.
pub mod age_bound {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(v: &Option<u32>, s: S) -> Result<S::Ok, S::Error> {
        match v { Some(n) => s.serialize_str(&n.to_string()), None => s.serialize_str("") }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<u32>, D::Error> {
        Ok(from_value(&serde_json::Value::deserialize(d)?))
    }

    pub fn from_value(v: &serde_json::Value) -> Option<u32> {
        match v {
            serde_json::Value::Number(n) => n.as_f64().filter(|x| *x >= 0.0).map(|x| x as u32),
            serde_json::Value::String(s) => parse(s),
            _ => None,
        }
    }

    pub fn parse(s: &str) -> Option<u32> {
        let t = s.trim();
        if t.is_empty() { return None; }
        t.parse::<f64>().ok().filter(|x| x.is_finite() && *x >= 0.0).map(|x| x as u32)
    }
}

// ---------------- Availability ----------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AvailabilityFilter {
    #[serde(rename = "selectedPrefs")]
    pub regions: Vec<String>,
    #[serde(rename = "selectedDistricts", alias = "selectedCities")]
    pub sub_regions: Vec<String>,
    #[serde(rename = "selectedDays")]
    pub weekdays: Vec<Weekday>,
    #[serde(rename = "timeFrom")]
    pub hour_from: u8,
    #[serde(rename = "timeTo")]
    pub hour_to: u8,
    #[serde(rename = "selectedStatus")]
    pub statuses: Vec<OperatingStatus>,
    #[serde(rename = "strictMode")]
    pub strict: bool,
    #[serde(with = "age_bound")]
    pub age_min: Option<u32>,
    #[serde(with = "age_bound")]
    pub age_max: Option<u32>,
    #[serde(rename = "showFavOnly")]
    pub favorites_only: bool,
    pub sort_key: SortKey,
    #[serde(rename = "sortOrder")]
    pub sort_direction: SortDirection,
}

impl Default for AvailabilityFilter {
    fn default() -> Self {
        Self {
            regions: Vec::new(),
            sub_regions: Vec::new(),
            weekdays: Vec::new(),
            hour_from: 0,
            hour_to: 23,
            statuses: OperatingStatus::defaults(),
            strict: false,
            age_min: None,
            age_max: None,
            favorites_only: false,
            sort_key: SortKey::Name,
            sort_direction: SortDirection::Asc,
        }
    }
}

// ---------------- Withdrawn ----------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WithdrawnFilter {
    #[serde(rename = "selectedPrefs")]
    pub regions: Vec<String>,
    #[serde(rename = "selectedCities", alias = "selectedDistricts")]
    pub sub_regions: Vec<String>,
    #[serde(rename = "selectedDai")]
    pub reason_large: Vec<String>,
    #[serde(rename = "selectedChu")]
    pub reason_medium: Vec<String>,
    #[serde(rename = "selectedSho")]
    pub reason_small: Vec<String>,
    #[serde(with = "age_bound")]
    pub age_min: Option<u32>,
    #[serde(with = "age_bound")]
    pub age_max: Option<u32>,
    pub keyword: String,
    #[serde(rename = "quitDetailKeyword")]
    pub detail_keyword: String,
    #[serde(alias = "showFavOnly")]
    pub favorites_only: bool,
    pub sort_key: SortKey,
    #[serde(rename = "sortOrder")]
    pub sort_direction: SortDirection,
}

impl Default for WithdrawnFilter {
    fn default() -> Self {
        Self {
            regions: Vec::new(),
            sub_regions: Vec::new(),
            reason_large: Vec::new(),
            reason_medium: Vec::new(),
            reason_small: Vec::new(),
            age_min: None,
            age_max: None,
            keyword: String::new(),
            detail_keyword: String::new(),
            favorites_only: false,
            sort_key: SortKey::ExitDate,
            sort_direction: SortDirection::Desc,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sort_keys_parse_both_favorite_spellings() {
        assert_eq!(SortKey::parse("_favorite"), SortKey::Favorite);
        assert_eq!(SortKey::parse("favorite").as_key(), "favorite");
        assert_eq!(SortKey::parse("Gender__c"), SortKey::Column("Gender__c".into()));
        assert_eq!(SortDirection::parse("DESC"), Some(SortDirection::Desc));
        assert_eq!(SortDirection::parse(""), None);
    }

    #[test]
    fn withdrawn_filter_serializes_with_stored_names() {
        let f = WithdrawnFilter { regions: vec!["東京都".into()], age_min: Some(30), ..Default::default() };
        let v = serde_json::to_value(&f).unwrap();
        assert_eq!(v["selectedPrefs"][0], "東京都");
        assert_eq!(v["ageMin"], "30");
        assert_eq!(v["ageMax"], "");
        assert_eq!(v["sortKey"], "ExitDate__c");
        assert_eq!(v["sortOrder"], "desc");
        assert_eq!(v["favoritesOnly"], false);
        let back: WithdrawnFilter = serde_json::from_value(v).unwrap();
        assert_eq!(back, f);
    }

    #[test]
    fn missing_fields_take_defaults() {
        let f: WithdrawnFilter = serde_json::from_str(r#"{"selectedDistricts":["港区"],"ageMax":null,"showFavOnly":true}"#).unwrap();
        assert_eq!(f.sub_regions, vec!["港区".to_string()]);
        assert_eq!(f.age_max, None);
        assert!(f.favorites_only);
        assert_eq!(f.sort_key, SortKey::ExitDate);
        let a: AvailabilityFilter = serde_json::from_str("{}").unwrap();
        assert_eq!(a, AvailabilityFilter::default());
        assert_eq!(a.statuses, vec![OperatingStatus::Active, OperatingStatus::Inactive]);
    }
}
