//! Row-source collaborators: anything that answers a sheet range with rows.

use std::path::PathBuf;

use async_trait::async_trait;
use rustc_hash::FxHashMap;
use tokio::sync::Mutex;

/// Sheet ranges read by the roster.
pub const RANGE_PARTNERS: &str = "パートナー情報!A1:ZZ";
pub const RANGE_ASSIGNMENTS: &str = "稼働中案件!A1:ZZ";
pub const RANGE_WITHDRAWN: &str = "離脱パートナー!A1:20000";
pub const RANGE_AREAS: &str = "都道府県マスタ!B2:C";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SourceError {
    #[error("no access token; re-authentication required")]
    MissingToken,
    #[error("fetch failed: {0}")]
    Network(String),
    #[error("unexpected response shape: {0}")]
    Shape(String),
}

/// Sheet name of an `A1`-style range (`"名簿!A1:ZZ"` -> `"名簿"`).
pub fn sheet_name(range: &str) -> &str { range.split('!').next().unwrap_or(range) }

#[async_trait]
pub trait RowSource: Send + Sync {
    /// Raw rows for `range`, header first when the range includes one.
    async fn fetch(&self, range: &str, token: Option<&str>) -> Result<Vec<Vec<String>>, SourceError>;
}

/// Decode a `{"values": [[...], ...]}` body. Non-string cells are stringified;
/// a missing `values` key is an empty sheet.
pub fn decode_values(body: &[u8]) -> Result<Vec<Vec<String>>, SourceError> {
    let v: serde_json::Value = serde_json::from_slice(body).map_err(|e| SourceError::Shape(e.to_string()))?;
    let Some(values) = v.get("values") else { return Ok(Vec::new()) };
    let rows = values.as_array().ok_or_else(|| SourceError::Shape("values is not an array".into()))?;
    let mut out = Vec::with_capacity(rows.len());
    for r in rows {
        let cells = r.as_array().ok_or_else(|| SourceError::Shape("row is not an array".into()))?;
        out.push(
            cells
                .iter()
                .map(|c| match c {
                    serde_json::Value::String(s) => s.clone(),
                    serde_json::Value::Null => String::new(),
                    other => other.to_string(),
                })
                .collect(),
        );
    }
    Ok(out)
}

/// Reads `{dir}/{sheet}.json` dumps in the values-API response format.
#[derive(Debug, Clone)]
pub struct JsonFileSource {
    dir: PathBuf,
}

impl JsonFileSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self { Self { dir: dir.into() } }
    pub fn path_for(&self, range: &str) -> PathBuf { self.dir.join(format!("{}.json", sheet_name(range))) }
}

#[async_trait]
impl RowSource for JsonFileSource {
    async fn fetch(&self, range: &str, token: Option<&str>) -> Result<Vec<Vec<String>>, SourceError> {
        if token.map_or(true, |t| t.trim().is_empty()) { return Err(SourceError::MissingToken); }
        let path = self.path_for(range);
        let body = tokio::fs::read(&path).await.map_err(|e| SourceError::Network(format!("{}: {}", path.display(), e)))?;
        decode_values(&body)
    }
}

/// In-memory sheets, used by tests and demos.
#[derive(Default)]
pub struct MemorySource {
    sheets: Mutex<FxHashMap<String, Vec<Vec<String>>>>,
    failing: Mutex<bool>,
}

impl MemorySource {
    pub fn new() -> Self { Self::default() }

    pub async fn put(&self, sheet: &str, rows: Vec<Vec<String>>) { self.sheets.lock().await.insert(sheet.to_string(), rows); }

    /// Make every subsequent fetch fail with a network error.
    pub async fn set_failing(&self, on: bool) { *self.failing.lock().await = on; }
}

#[async_trait]
impl RowSource for MemorySource {
    async fn fetch(&self, range: &str, token: Option<&str>) -> Result<Vec<Vec<String>>, SourceError> {
        if token.map_or(true, |t| t.trim().is_empty()) { return Err(SourceError::MissingToken); }
        if *self.failing.lock().await { return Err(SourceError::Network("source unavailable".into())); }
        Ok(self.sheets.lock().await.get(sheet_name(range)).cloned().unwrap_or_default())
    }
}
