//! Search-history table: append, list per user and page, soft-delete and favorite.

use anyhow::{bail, Context, Result};
use metrics::histogram;
use rusqlite::types::Value as SqlValue;
use serde::{Deserialize, Serialize};

use crate::{lock, MemoryStore, SqliteStore};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryRecord {
    pub id: String,
    pub user_id: String,
    pub page_key: String,
    pub search_params_json: String,
    pub favorite_flag: bool,
    pub is_deleted: bool,
    /// ISO-8601 timestamp supplied by the caller.
    pub executed_at: String,
    pub result_count: u64,
    pub elapsed_ms: u64,
    pub page_url: String,
    pub keyword: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewHistory {
    pub user_id: String,
    pub page_key: String,
    pub search_params_json: String,
    pub executed_at: String,
    pub result_count: u64,
    pub elapsed_ms: u64,
    pub page_url: String,
    pub keyword: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryUpdate {
    pub id: String,
    pub favorite_flag: Option<bool>,
    pub is_deleted: Option<bool>,
}

/// Flags arrive as `true`, `"TRUE"` or `1`; everything else is false.
pub fn normalize_boolean(v: &serde_json::Value) -> bool {
    match v {
        serde_json::Value::Bool(b) => *b,
        serde_json::Value::String(s) => s == "TRUE",
        serde_json::Value::Number(n) => n.as_i64() == Some(1),
        _ => false,
    }
}

fn sql_bool(v: SqlValue) -> bool {
    match v {
        SqlValue::Integer(i) => normalize_boolean(&serde_json::json!(i)),
        SqlValue::Text(s) => normalize_boolean(&serde_json::Value::String(s)),
        _ => false,
    }
}

fn flag_text(on: bool) -> &'static str { if on { "TRUE" } else { "FALSE" } }

pub trait HistoryStore: Send + Sync {
    /// Every entry for `user_id`/`page_key` (deleted ones included), newest first.
    fn get_histories(&self, user_id: &str, page_key: &str) -> Result<Vec<HistoryRecord>>;
    fn add_history(&self, new: NewHistory) -> Result<HistoryRecord>;
    /// `None` when no entry has that id.
    fn update_history(&self, upd: HistoryUpdate) -> Result<Option<HistoryRecord>>;
}

fn check_new(new: &NewHistory) -> Result<()> {
    if new.user_id.trim().is_empty() { bail!("userId は必須です"); }
    Ok(())
}

fn check_update(upd: &HistoryUpdate) -> Result<()> {
    if upd.id.trim().is_empty() { bail!("id は必須です"); }
    Ok(())
}

pub(crate) fn create_schema(db: &rusqlite::Connection) -> Result<()> {
    db.execute(
        "CREATE TABLE IF NOT EXISTS search_history (
            id                 TEXT PRIMARY KEY,
            user_id            TEXT NOT NULL,
            page_key           TEXT NOT NULL,
            search_params_json TEXT NOT NULL,
            favorite_flag      TEXT NOT NULL,
            is_deleted         TEXT NOT NULL,
            executed_at        TEXT NOT NULL,
            result_count       INTEGER NOT NULL,
            elapsed_ms         INTEGER NOT NULL,
            page_url           TEXT NOT NULL,
            keyword            TEXT NOT NULL
        )",
        [],
    )
    .context("creating search_history table")?;
    db.execute("CREATE INDEX IF NOT EXISTS idx_history_user_page ON search_history(user_id, page_key, executed_at DESC)", []).ok();
    Ok(())
}

const SELECT_COLS: &str = "id, user_id, page_key, search_params_json, favorite_flag, is_deleted, executed_at, result_count, elapsed_ms, page_url, keyword";

fn read_row(r: &rusqlite::Row<'_>) -> rusqlite::Result<HistoryRecord> {
    Ok(HistoryRecord {
        id: r.get(0)?,
        user_id: r.get(1)?,
        page_key: r.get(2)?,
        search_params_json: r.get(3)?,
        favorite_flag: sql_bool(r.get(4)?),
        is_deleted: sql_bool(r.get(5)?),
        executed_at: r.get(6)?,
        result_count: r.get::<_, i64>(7)?.max(0) as u64,
        elapsed_ms: r.get::<_, i64>(8)?.max(0) as u64,
        page_url: r.get(9)?,
        keyword: r.get(10)?,
    })
}

impl SqliteStore {
    fn history_by_id(db: &rusqlite::Connection, id: &str) -> Result<Option<HistoryRecord>> {
        let mut stmt = db.prepare(&format!("SELECT {} FROM search_history WHERE id = ?1", SELECT_COLS))?;
        let mut rows = stmt.query([id])?;
        match rows.next()? {
            Some(r) => Ok(Some(read_row(r)?)),
            None => Ok(None),
        }
    }
}

impl HistoryStore for SqliteStore {
    fn get_histories(&self, user_id: &str, page_key: &str) -> Result<Vec<HistoryRecord>> {
        let started = std::time::Instant::now();
        let db = lock(&self.db)?;
        let mut stmt = db.prepare(&format!(
            "SELECT {} FROM search_history WHERE user_id = ?1 AND (?2 = '' OR page_key = ?2) ORDER BY executed_at DESC, rowid DESC",
            SELECT_COLS
        ))?;
        let out = stmt.query_map((user_id, page_key), read_row)?.collect::<rusqlite::Result<Vec<_>>>()?;
        histogram!("persist_get_ms", started.elapsed().as_secs_f64() * 1000.0);
        Ok(out)
    }

    fn add_history(&self, new: NewHistory) -> Result<HistoryRecord> {
        check_new(&new)?;
        let started = std::time::Instant::now();
        let rec = HistoryRecord {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: new.user_id,
            page_key: new.page_key,
            search_params_json: new.search_params_json,
            favorite_flag: false,
            is_deleted: false,
            executed_at: new.executed_at,
            result_count: new.result_count,
            elapsed_ms: new.elapsed_ms,
            page_url: new.page_url,
            keyword: new.keyword,
        };
        lock(&self.db)?
            .execute(
                &format!("INSERT INTO search_history({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)", SELECT_COLS),
                rusqlite::params![
                    rec.id,
                    rec.user_id,
                    rec.page_key,
                    rec.search_params_json,
                    flag_text(rec.favorite_flag),
                    flag_text(rec.is_deleted),
                    rec.executed_at,
                    rec.result_count as i64,
                    rec.elapsed_ms as i64,
                    rec.page_url,
                    rec.keyword,
                ],
            )
            .context("inserting search history")?;
        histogram!("persist_put_ms", started.elapsed().as_secs_f64() * 1000.0);
        Ok(rec)
    }

    fn update_history(&self, upd: HistoryUpdate) -> Result<Option<HistoryRecord>> {
        check_update(&upd)?;
        let db = lock(&self.db)?;
        if let Some(f) = upd.favorite_flag {
            db.execute("UPDATE search_history SET favorite_flag = ?1 WHERE id = ?2", (flag_text(f), &upd.id))?;
        }
        if let Some(d) = upd.is_deleted {
            db.execute("UPDATE search_history SET is_deleted = ?1 WHERE id = ?2", (flag_text(d), &upd.id))?;
        }
        Self::history_by_id(&db, &upd.id)
    }
}

impl HistoryStore for MemoryStore {
    fn get_histories(&self, user_id: &str, page_key: &str) -> Result<Vec<HistoryRecord>> {
        let mut out: Vec<HistoryRecord> = lock(&self.history)?
            .iter()
            .filter(|h| h.user_id == user_id && (page_key.is_empty() || h.page_key == page_key))
            .cloned()
            .collect();
        out.reverse();
        out.sort_by(|a, b| b.executed_at.cmp(&a.executed_at));
        Ok(out)
    }

    fn add_history(&self, new: NewHistory) -> Result<HistoryRecord> {
        check_new(&new)?;
        let rec = HistoryRecord {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: new.user_id,
            page_key: new.page_key,
            search_params_json: new.search_params_json,
            favorite_flag: false,
            is_deleted: false,
            executed_at: new.executed_at,
            result_count: new.result_count,
            elapsed_ms: new.elapsed_ms,
            page_url: new.page_url,
            keyword: new.keyword,
        };
        lock(&self.history)?.push(rec.clone());
        Ok(rec)
    }

    fn update_history(&self, upd: HistoryUpdate) -> Result<Option<HistoryRecord>> {
        check_update(&upd)?;
        let mut all = lock(&self.history)?;
        let Some(h) = all.iter_mut().find(|h| h.id == upd.id) else { return Ok(None) };
        if let Some(f) = upd.favorite_flag { h.favorite_flag = f; }
        if let Some(d) = upd.is_deleted { h.is_deleted = d; }
        Ok(Some(h.clone()))
    }
}
