//! Search history: keyword summaries, fire-and-forget recording, replay of a
//! stored snapshot into live filter state, and the history panel.

use std::sync::Arc;

use async_trait::async_trait;
use metrics::counter;
use regex::Regex;
use roster_core::filter::age_bound;
use roster_core::{SortDirection, SortKey, WithdrawnFilter, WithdrawnRecord};
use roster_persist::{self as persist, HistoryRecord, HistoryStore, HistoryUpdate, KvStore, NewHistory};
use serde::Serialize;
use serde_json::{Map, Value};
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::session::{PageView, WithdrawnSession};
use crate::{RosterError, RosterResult};

pub const PAGE_KEY_WITHDRAWN: &str = "withdrawn";

const NO_CONDITIONS: &str = "(条件なし)";
const LINE_MAX_CHARS: usize = 120;
const TOKEN_MISSING: &str = "アクセストークンが取得できませんでした。ログインし直してください。";

/// A stored entry with its parameters parsed.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    #[serde(flatten)]
    pub record: HistoryRecord,
    pub search_params: Value,
}

impl HistoryEntry {
    /// Unparseable `searchParamsJson` yields an empty object.
    pub fn from_record(record: HistoryRecord) -> Self {
        let search_params = match serde_json::from_str::<Value>(&record.search_params_json) {
            Ok(v @ Value::Object(_)) => v,
            Ok(_) => Value::Object(Map::new()),
            Err(e) => {
                if !record.search_params_json.trim().is_empty() {
                    warn!(id = %record.id, error = %e, "history: searchParamsJson unreadable");
                }
                Value::Object(Map::new())
            }
        };
        Self { record, search_params }
    }

    pub fn id(&self) -> &str { &self.record.id }
}

/// History collaborator.
#[async_trait]
pub trait HistoryApi: Send + Sync {
    /// Entries for `user_id`, newest first. An empty `page_key` means every page.
    async fn get_histories(&self, user_id: &str, page_key: &str) -> RosterResult<Vec<HistoryEntry>>;
    async fn add_history(&self, new: NewHistory) -> RosterResult<HistoryEntry>;
    /// Soft update: only the flags that are `Some` change.
    async fn update_history(&self, upd: HistoryUpdate) -> RosterResult<Option<HistoryEntry>>;
}

/// [`HistoryApi`] over a local [`HistoryStore`]. Every call needs a token.
pub struct LocalHistoryApi {
    store: Arc<dyn HistoryStore>,
    token: Option<String>,
}

impl LocalHistoryApi {
    pub fn new(store: Arc<dyn HistoryStore>, token: Option<String>) -> Self { Self { store, token } }

    fn ensure_token(&self) -> RosterResult<()> {
        match self.token.as_deref() {
            Some(t) if !t.is_empty() => Ok(()),
            _ => Err(RosterError::Reauth(TOKEN_MISSING.into())),
        }
    }
}

#[async_trait]
impl HistoryApi for LocalHistoryApi {
    async fn get_histories(&self, user_id: &str, page_key: &str) -> RosterResult<Vec<HistoryEntry>> {
        if user_id.trim().is_empty() { return Err(RosterError::Validation("userId は必須です".into())); }
        self.ensure_token()?;
        let rows = self.store.get_histories(user_id, page_key).map_err(RosterError::internal)?;
        Ok(rows.into_iter().map(HistoryEntry::from_record).collect())
    }

    async fn add_history(&self, new: NewHistory) -> RosterResult<HistoryEntry> {
        if new.user_id.trim().is_empty() { return Err(RosterError::Validation("userId は必須です".into())); }
        self.ensure_token()?;
        self.store.add_history(new).map(HistoryEntry::from_record).map_err(RosterError::internal)
    }

    async fn update_history(&self, upd: HistoryUpdate) -> RosterResult<Option<HistoryEntry>> {
        if upd.id.trim().is_empty() { return Err(RosterError::Validation("id は必須です".into())); }
        self.ensure_token()?;
        Ok(self.store.update_history(upd).map_err(RosterError::internal)?.map(HistoryEntry::from_record))
    }
}

// ---------------- Recording ----------------

/// Appends one entry per executed search without blocking it.
#[derive(Clone)]
pub struct Recorder {
    api: Arc<dyn HistoryApi>,
    user_id: Option<String>,
    page_key: String,
    page_url: String,
}

impl Recorder {
    pub fn new(api: Arc<dyn HistoryApi>, user_id: Option<String>, page_key: &str) -> Self {
        Self { api, user_id, page_key: page_key.to_string(), page_url: format!("/{}", page_key) }
    }

    /// Spawn the append on the current runtime. Skipped (returns `None`) when
    /// there is no user or no runtime; failures are logged and counted only.
    pub fn record(&self, params: &Value, keyword: &str, result_count: usize, elapsed_ms: u64) -> Option<JoinHandle<()>> {
        let Some(user_id) = self.user_id.clone().filter(|u| !u.is_empty()) else {
            debug!(page = %self.page_key, "history: no user; not recorded");
            return None;
        };
        let rt = match tokio::runtime::Handle::try_current() {
            Ok(rt) => rt,
            Err(_) => {
                warn!(page = %self.page_key, "history: no runtime; not recorded");
                return None;
            }
        };
        let new = NewHistory {
            user_id,
            page_key: self.page_key.clone(),
            search_params_json: params.to_string(),
            executed_at: chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
            result_count: result_count as u64,
            elapsed_ms,
            page_url: self.page_url.clone(),
            keyword: keyword.to_string(),
        };
        let api = Arc::clone(&self.api);
        Some(rt.spawn(async move {
            match api.add_history(new).await {
                Ok(e) => debug!(id = %e.record.id, "history: recorded"),
                Err(e) => {
                    counter!("history_record_failures_total", 1u64);
                    error!(error = %e, "history: record failed");
                }
            }
        }))
    }
}

/// One-line summary of the non-default criteria, `" | "`-separated.
pub fn keyword_summary(f: &WithdrawnFilter) -> String {
    let mut parts: Vec<String> = Vec::new();
    if f.favorites_only { parts.push("お気に入りのみ".into()); }
    for (label, list) in [
        ("都道府県", &f.regions),
        ("市区町村", &f.sub_regions),
        ("離脱大分類", &f.reason_large),
        ("離脱中分類", &f.reason_medium),
        ("離脱小分類", &f.reason_small),
    ] {
        if !list.is_empty() { parts.push(format!("{}:{}", label, list.join("/"))); }
    }
    if f.age_min.is_some() || f.age_max.is_some() {
        let show = |v: Option<u32>| v.map(|n| n.to_string()).unwrap_or_else(|| "--".into());
        parts.push(format!("年齢:{}〜{}", show(f.age_min), show(f.age_max)));
    }
    if !f.keyword.trim().is_empty() { parts.push(format!("キーワード:{}", f.keyword.trim())); }
    if !f.detail_keyword.trim().is_empty() { parts.push(format!("離脱理由詳細:{}", f.detail_keyword.trim())); }
    if parts.is_empty() { NO_CONDITIONS.to_string() } else { parts.join(" | ") }
}

// ---------------- Replay ----------------

fn string_list(v: Option<&Value>) -> Option<Vec<String>> {
    let arr = v?.as_array()?;
    Some(
        arr.iter()
            .filter_map(|x| match x {
                Value::String(s) => Some(s.clone()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
            .collect(),
    )
}

fn text(v: &Value) -> String {
    match v {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn truthy(v: &Value) -> bool {
    match v {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|x| x != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Merge a stored snapshot into `f`. Only fields present in `params` change.
pub fn apply_withdrawn_params(f: &mut WithdrawnFilter, params: &Value) {
    let Some(obj) = params.as_object() else { return };
    if let Some(v) = string_list(obj.get("selectedPrefs")) { f.regions = v; }
    if let Some(v) = string_list(obj.get("selectedCities")).or_else(|| string_list(obj.get("selectedDistricts"))) { f.sub_regions = v; }
    if let Some(v) = string_list(obj.get("selectedDai")) { f.reason_large = v; }
    if let Some(v) = string_list(obj.get("selectedChu")) { f.reason_medium = v; }
    if let Some(v) = string_list(obj.get("selectedSho")) { f.reason_small = v; }
    if let Some(v) = obj.get("ageMin") { f.age_min = age_bound::from_value(v); }
    if let Some(v) = obj.get("ageMax") { f.age_max = age_bound::from_value(v); }
    if let Some(v) = obj.get("keyword") { f.keyword = text(v); }
    if let Some(v) = obj.get("quitDetailKeyword") { f.detail_keyword = text(v); }
    if let Some(v) = obj.get("favoritesOnly") { f.favorites_only = truthy(v); }
    if let Some(s) = obj.get("sortKey").and_then(Value::as_str).filter(|s| !s.is_empty()) { f.sort_key = SortKey::parse(s); }
    if let Some(d) = obj.get("sortOrder").and_then(Value::as_str).and_then(SortDirection::parse) { f.sort_direction = d; }
}

/// Cached withdrawn filter. Each field falls back to its default when missing
/// or of the wrong type; an unreadable blob yields the defaults.
pub fn load_filter_cache(kv: &dyn KvStore) -> WithdrawnFilter {
    let mut f = WithdrawnFilter::default();
    let raw = match kv.get(persist::KEY_WITHDRAWN_FILTERS) {
        Ok(Some(raw)) => raw,
        Ok(None) => return f,
        Err(e) => {
            warn!(error = %e, "history: filter cache read failed");
            return f;
        }
    };
    let v: Value = match serde_json::from_str(&raw) {
        Ok(v) => v,
        Err(e) => {
            warn!(error = %e, "history: filter cache unreadable; using defaults");
            return f;
        }
    };
    let Some(obj) = v.as_object() else { return f };
    let list = |k: &str| obj.get(k).and_then(Value::as_array).map(|a| a.iter().filter_map(|x| x.as_str().map(str::to_string)).collect::<Vec<_>>());
    let string = |k: &str| obj.get(k).and_then(Value::as_str);
    if let Some(v) = list("selectedPrefs") { f.regions = v; }
    if let Some(v) = list("selectedCities") { f.sub_regions = v; }
    if let Some(v) = list("selectedDai") { f.reason_large = v; }
    if let Some(v) = list("selectedChu") { f.reason_medium = v; }
    if let Some(v) = list("selectedSho") { f.reason_small = v; }
    if let Some(s) = string("ageMin") { f.age_min = age_bound::parse(s); }
    if let Some(s) = string("ageMax") { f.age_max = age_bound::parse(s); }
    if let Some(s) = string("keyword") { f.keyword = s.to_string(); }
    if let Some(s) = string("quitDetailKeyword") { f.detail_keyword = s.to_string(); }
    if let Some(b) = obj.get("showFavOnly").or_else(|| obj.get("favoritesOnly")).and_then(Value::as_bool) { f.favorites_only = b; }
    if let Some(s) = string("sortKey") { f.sort_key = SortKey::parse(s); }
    if let Some(d) = string("sortOrder").and_then(SortDirection::parse) { f.sort_direction = d; }
    f
}

// ---------------- Display ----------------

fn clamp_text(s: &str) -> String {
    if s.chars().count() > LINE_MAX_CHARS {
        format!("{}...", s.chars().take(LINE_MAX_CHARS).collect::<String>())
    } else {
        s.to_string()
    }
}

/// Items three per line, `" / "`-joined. With `max_lines`, the overflow is
/// summarised on the last line as `他N件`.
fn group_by_three(items: &[String], max_lines: Option<usize>) -> Vec<String> {
    let limit = max_lines.map(|m| m * 3).filter(|n| *n > 0).unwrap_or(items.len()).min(items.len());
    let mut lines: Vec<String> = items[..limit].chunks(3).map(|c| c.join(" / ")).collect();
    if let (Some(m), Some(last)) = (max_lines, lines.last_mut()) {
        if m > 0 && items.len() > m * 3 {
            last.push_str(&format!(" / 他{}件", items.len() - m * 3));
        }
    }
    lines
}

fn summary_line_pattern() -> Option<Regex> { Regex::new("(都道府県|市区町村|離脱[大中小]区分|年齢|お気に入り):").ok() }

/// Human-readable condition lines for one entry.
pub fn display_lines(entry: &HistoryEntry) -> Vec<String> {
    let p = &entry.search_params;
    let page_key = if entry.record.page_key.is_empty() { p.get("pageKey").map(text).unwrap_or_default() } else { entry.record.page_key.clone() };
    let withdrawn = page_key.to_lowercase() == PAGE_KEY_WITHDRAWN;
    let mut lines = Vec::new();

    let prefs = string_list(p.get("selectedPrefs")).unwrap_or_default();
    lines.extend(group_by_three(&prefs, if withdrawn { None } else { Some(1) }).iter().map(|l| clamp_text(l)));
    let cities = string_list(p.get("selectedDistricts")).or_else(|| string_list(p.get("selectedCities"))).unwrap_or_default();
    lines.extend(group_by_three(&cities, if withdrawn { None } else { Some(3) }).iter().map(|l| clamp_text(l)));

    if withdrawn {
        for (label, key) in [("離脱大区分", "selectedDai"), ("離脱中区分", "selectedChu"), ("離脱小区分", "selectedSho")] {
            let n = p.get(key).and_then(Value::as_array).map_or(0, Vec::len);
            let count = if n > 0 { format!("{}件選択", n) } else { "選択なし".to_string() };
            lines.push(clamp_text(&format!("{}: {}", label, count)));
        }
        let min = p.get("ageMin").map(text).unwrap_or_default();
        let max = p.get("ageMax").map(text).unwrap_or_default();
        let (min, max) = (min.trim(), max.trim());
        let age = if min.is_empty() && max.is_empty() {
            "年齢: 指定なし".to_string()
        } else {
            format!("年齢: {}〜{}", if min.is_empty() { "__" } else { min }, if max.is_empty() { "__" } else { max })
        };
        lines.push(clamp_text(&age));
        if p.get("favoritesOnly").is_some_and(truthy) { lines.push("お気に入りのみ".to_string()); }
        let kw = p.get("keyword").map(text).unwrap_or_default();
        let kw = kw.trim();
        if !kw.is_empty() && !summary_line_pattern().is_some_and(|re| re.is_match(kw)) {
            lines.push(clamp_text(&format!("キーワード: {}", kw)));
        }
        let detail = p.get("quitDetailKeyword").map(text).unwrap_or_default();
        if !detail.trim().is_empty() { lines.push(clamp_text(&format!("詳細: {}", detail.trim()))); }
        if lines.is_empty() { lines.push(NO_CONDITIONS.to_string()); }
        return lines;
    }

    if let Some(days) = string_list(p.get("weekSelections")).filter(|d| !d.is_empty()) {
        lines.push(clamp_text(&format!("曜日: {}", days.join(" / "))));
    }
    let from = p.get("timeFrom");
    let to = p.get("timeTo");
    if from.is_some_and(truthy) || to.is_some_and(truthy) {
        let show = |v: Option<&Value>| match v { None | Some(Value::Null) => "--".to_string(), Some(v) => text(v) };
        lines.push(clamp_text(&format!("時間: {}〜{}", show(from), show(to))));
    }
    if let Some(st) = string_list(p.get("statusFilter")).filter(|s| !s.is_empty()) {
        lines.push(clamp_text(&format!("状態: {}", st.join(" / "))));
    }
    if p.get("favoritesOnly").is_some_and(truthy) { lines.push("お気に入りのみ".to_string()); }
    if p.get("strictMatch").is_some_and(truthy) { lines.push("完全一致".to_string()); }
    if lines.is_empty() {
        let stored = p.get("keyword").map(text).unwrap_or_default();
        let fallback = [entry.record.keyword.as_str(), stored.as_str()].into_iter().find(|s| !s.is_empty()).unwrap_or(NO_CONDITIONS);
        lines.push(clamp_text(fallback));
    }
    lines
}

/// `850ms`, `1.25s`.
pub fn format_elapsed(ms: u64) -> String {
    if ms < 1000 { format!("{}ms", ms) } else { format!("{:.2}s", ms as f64 / 1000.0) }
}

/// Local time for an RFC 3339 stamp; anything else is shown verbatim.
pub fn format_executed_at(raw: &str) -> String {
    match chrono::DateTime::parse_from_rfc3339(raw) {
        Ok(dt) => dt.with_timezone(&chrono::Local).format("%Y/%m/%d %H:%M:%S").to_string(),
        Err(_) => raw.to_string(),
    }
}

// ---------------- Panel ----------------

/// The history list for one user and page, with optimistic favorite/delete.
pub struct HistoryPanel {
    api: Arc<dyn HistoryApi>,
    kv: Arc<dyn KvStore>,
    user_id: Option<String>,
    page_key: String,
    entries: Vec<HistoryEntry>,
    auto_search: bool,
    error: Option<String>,
}

impl HistoryPanel {
    pub fn new(api: Arc<dyn HistoryApi>, kv: Arc<dyn KvStore>, user_id: Option<String>, page_key: &str) -> Self {
        let auto_search = persist::load_flag(kv.as_ref(), persist::KEY_HISTORY_AUTO_SEARCH, true);
        Self { api, kv, user_id, page_key: page_key.to_string(), entries: Vec::new(), auto_search, error: None }
    }

    pub fn entries(&self) -> &[HistoryEntry] { &self.entries }
    pub fn error(&self) -> Option<&str> { self.error.as_deref() }
    pub fn auto_search(&self) -> bool { self.auto_search }

    pub fn set_auto_search(&mut self, on: bool) {
        self.auto_search = on;
        if let Err(e) = persist::save_flag(self.kv.as_ref(), persist::KEY_HISTORY_AUTO_SEARCH, on) {
            warn!(error = %e, "history: auto-search flag not saved");
        }
    }

    /// Refresh from the collaborator. Deleted entries are not listed.
    pub async fn load(&mut self) -> &[HistoryEntry] {
        let Some(user) = self.user_id.clone().filter(|u| !u.is_empty()) else { return &self.entries };
        self.error = None;
        match self.api.get_histories(&user, &self.page_key).await {
            Ok(list) => self.entries = list.into_iter().filter(|e| !e.record.is_deleted).collect(),
            Err(e) => {
                error!(error = %e, "history: load failed");
                self.error = Some("検索履歴の取得に失敗しました".into());
                self.entries.clear();
            }
        }
        &self.entries
    }

    fn position(&self, id: &str) -> RosterResult<usize> {
        self.entries.iter().position(|e| e.id() == id).ok_or_else(|| RosterError::NotFound(format!("history entry {}", id)))
    }

    /// Flip the favorite flag locally, confirm remotely, then reload either way.
    pub async fn toggle_favorite(&mut self, id: &str) -> RosterResult<bool> {
        let pos = self.position(id)?;
        let next = !self.entries[pos].record.favorite_flag;
        self.entries[pos].record.favorite_flag = next;
        let res = self.api.update_history(HistoryUpdate { id: id.to_string(), favorite_flag: Some(next), is_deleted: None }).await;
        self.load().await;
        if let Err(e) = &res {
            error!(id, error = %e, "history: favorite update failed");
            self.error = Some("お気に入りの更新に失敗しました".into());
        }
        res.map(|_| next)
    }

    /// Remove locally, soft-delete remotely, then reload either way.
    pub async fn delete(&mut self, id: &str) -> RosterResult<()> {
        let pos = self.position(id)?;
        self.entries.remove(pos);
        let res = self.api.update_history(HistoryUpdate { id: id.to_string(), favorite_flag: None, is_deleted: Some(true) }).await;
        self.load().await;
        if let Err(e) = &res {
            error!(id, error = %e, "history: delete failed");
            self.error = Some("検索履歴の削除に失敗しました".into());
        }
        res.map(|_| ())
    }

    /// Replay an entry into `session`; runs the search when auto-search is on.
    pub fn select(&self, id: &str, session: &mut WithdrawnSession) -> RosterResult<Option<PageView<WithdrawnRecord>>> {
        let pos = self.position(id)?;
        Ok(session.replay(&self.entries[pos].search_params, self.auto_search))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use roster_persist::MemoryStore;
    use serde_json::json;

    fn entry(page_key: &str, params: Value) -> HistoryEntry {
        HistoryEntry::from_record(HistoryRecord {
            id: "h1".into(),
            user_id: "u".into(),
            page_key: page_key.into(),
            search_params_json: params.to_string(),
            favorite_flag: false,
            is_deleted: false,
            executed_at: String::new(),
            result_count: 0,
            elapsed_ms: 0,
            page_url: String::new(),
            keyword: String::new(),
        })
    }

    #[test]
    fn summary_lists_only_active_criteria() {
        assert_eq!(keyword_summary(&WithdrawnFilter::default()), "(条件なし)");
        let f = WithdrawnFilter {
            regions: vec!["東京都".into(), "大阪府".into()],
            age_min: Some(30),
            keyword: " 軽貨物 ".into(),
            favorites_only: true,
            ..Default::default()
        };
        assert_eq!(keyword_summary(&f), "お気に入りのみ | 都道府県:東京都/大阪府 | 年齢:30〜-- | キーワード:軽貨物");
    }

    #[test]
    fn replay_is_a_partial_merge() {
        let mut f = WithdrawnFilter { keyword: "keep".into(), reason_large: vec!["A".into()], ..Default::default() };
        apply_withdrawn_params(
            &mut f,
            &json!({"selectedDistricts": ["港区"], "ageMin": 40, "ageMax": null, "favoritesOnly": "yes", "sortKey": "", "sortOrder": "asc"}),
        );
        assert_eq!(f.sub_regions, vec!["港区"]);
        assert_eq!(f.age_min, Some(40));
        assert_eq!(f.age_max, None);
        assert!(f.favorites_only);
        assert_eq!(f.keyword, "keep");
        assert_eq!(f.reason_large, vec!["A"]);
        assert_eq!(f.sort_key, SortKey::ExitDate);
        assert_eq!(f.sort_direction, SortDirection::Asc);

        apply_withdrawn_params(&mut f, &json!({"keyword": null, "selectedCities": ["新宿区"], "selectedDistricts": ["港区"]}));
        assert_eq!(f.keyword, "");
        assert_eq!(f.sub_regions, vec!["新宿区"]);
    }

    #[test]
    fn cache_ignores_mistyped_fields() {
        let kv = MemoryStore::new();
        kv.put(persist::KEY_WITHDRAWN_FILTERS, r#"{"selectedPrefs":"東京都","ageMin":"25","showFavOnly":true,"keyword":7,"sortOrder":"asc"}"#).unwrap();
        let f = load_filter_cache(&kv);
        assert!(f.regions.is_empty());
        assert_eq!(f.age_min, Some(25));
        assert!(f.favorites_only);
        assert_eq!(f.keyword, "");
        assert_eq!(f.sort_direction, SortDirection::Asc);
        assert_eq!(f.sort_key, SortKey::ExitDate);

        kv.put(persist::KEY_WITHDRAWN_FILTERS, "not json").unwrap();
        assert_eq!(load_filter_cache(&kv), WithdrawnFilter::default());
    }

    #[test]
    fn withdrawn_display_lines() {
        let prefs: Vec<String> = (1..=4).map(|i| format!("県{}", i)).collect();
        let e = entry("withdrawn", json!({"selectedPrefs": prefs, "selectedChu": ["a", "b"], "ageMax": "60", "keyword": "都道府県:県1", "quitDetailKeyword": "腰痛"}));
        assert_eq!(
            display_lines(&e),
            vec!["県1 / 県2 / 県3", "県4", "離脱大区分: 選択なし", "離脱中区分: 2件選択", "離脱小区分: 選択なし", "年齢: __〜60", "詳細: 腰痛"]
        );
        let e = entry("withdrawn", json!({"keyword": "  軽貨物 "}));
        assert!(display_lines(&e).contains(&"キーワード: 軽貨物".to_string()));
        assert!(display_lines(&e).contains(&"年齢: 指定なし".to_string()));
    }

    #[test]
    fn other_page_display_lines() {
        let prefs: Vec<String> = (1..=5).map(|i| format!("県{}", i)).collect();
        let e = entry("availability", json!({"selectedPrefs": prefs, "weekSelections": ["月", "火"], "timeFrom": 9, "timeTo": 18, "strictMatch": true}));
        assert_eq!(display_lines(&e), vec!["県1 / 県2 / 県3 / 他2件", "曜日: 月 / 火", "時間: 9〜18", "完全一致"]);
        assert_eq!(display_lines(&entry("availability", json!({}))), vec!["(条件なし)"]);
    }

    #[test]
    fn long_lines_are_clamped() {
        let long = "あ".repeat(130);
        let e = entry("withdrawn", json!({"quitDetailKeyword": long}));
        let line = display_lines(&e).pop().unwrap();
        assert!(line.ends_with("..."));
        assert_eq!(line.chars().count(), LINE_MAX_CHARS + 3);
    }

    #[test]
    fn bad_params_json_is_empty_object() {
        let mut e = entry("withdrawn", json!({}));
        e.record.search_params_json = "{oops".into();
        let e = HistoryEntry::from_record(e.record);
        assert_eq!(e.search_params, json!({}));
    }

    #[test]
    fn elapsed_formatting() {
        assert_eq!(format_elapsed(850), "850ms");
        assert_eq!(format_elapsed(1250), "1.25s");
        assert_eq!(format_executed_at("yesterday"), "yesterday");
    }
}
