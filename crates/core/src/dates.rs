//! Date and time coercion for sheet values.
//!
//! Accepted inputs: `YYYY-MM-DD`, `YYYY/MM/DD` (optionally with a time),
//! RFC 3339, `YYYY年M月D日`, and spreadsheet serial day numbers counted from
//! 1899-12-30. Anything else is `None`.

use chrono::{DateTime, Duration, Local, NaiveDate, NaiveDateTime, NaiveTime};

const DATETIME_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y/%m/%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y/%m/%d %H:%M", "%Y-%m-%d %H:%M"];
const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%Y年%m月%d日", "%Y.%m.%d"];

// Serial numbers above this are not plausible dates (year 9999).
const MAX_SERIAL: f64 = 2_958_465.0;

pub fn parse(raw: &str) -> Option<NaiveDateTime> {
    let s = raw.trim();
    if s.is_empty() { return None; }
    if let Ok(n) = s.parse::<f64>() { return from_serial(n); }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) { return Some(dt.naive_local()); }
    for f in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, f) { return Some(dt); }
    }
    for f in DATE_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(s, f) { return d.and_hms_opt(0, 0, 0); }
    }
    None
}

fn from_serial(days: f64) -> Option<NaiveDateTime> {
    if !days.is_finite() || !(0.0..=MAX_SERIAL).contains(&days) { return None; }
    let base = NaiveDate::from_ymd_opt(1899, 12, 30)?.and_hms_opt(0, 0, 0)?;
    base.checked_add_signed(Duration::seconds((days * 86_400.0).round() as i64))
}

/// Milliseconds since the Unix epoch, used as a sort key.
pub fn timestamp_ms(dt: &NaiveDateTime) -> i64 { dt.and_utc().timestamp_millis() }

/// `2024年4月1日`
pub fn format_ja(dt: &NaiveDateTime) -> String {
    use chrono::Datelike;
    format!("{}年{}月{}日", dt.year(), dt.month(), dt.day())
}

/// Display form for an optional date, with `なし` for missing values.
pub fn display_or_none(dt: Option<&NaiveDateTime>) -> String { dt.map(format_ja).unwrap_or_else(|| "なし".to_string()) }

/// A missing expiration counts as expired.
pub fn is_expired(dt: Option<&NaiveDateTime>, today: NaiveDate) -> bool {
    match dt { Some(d) => d.date() < today, None => true }
}

pub fn today() -> NaiveDate { Local::now().date_naive() }

/// `HH:MM:SS` or `HH:MM`.
pub fn parse_time(raw: &str) -> Option<NaiveTime> {
    let s = raw.trim();
    NaiveTime::parse_from_str(s, "%H:%M:%S").or_else(|_| NaiveTime::parse_from_str(s, "%H:%M")).ok()
}

pub fn format_hm(t: &NaiveTime) -> String { t.format("%H:%M").to_string() }
