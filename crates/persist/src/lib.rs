//! Roster persistence: small SQLite store for favorites, the filter cache,
//! session keys and search history. Synchronous; callers are not latency sensitive.

#![forbid(unsafe_code)]

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use anyhow::{anyhow, Context, Result};
use metrics::{counter, histogram};
use roster_core::FavoriteSet;
use tracing::warn;

pub mod history;

pub use history::{normalize_boolean, HistoryRecord, HistoryStore, HistoryUpdate, NewHistory};

// ---------------- Storage keys ----------------
pub const KEY_FAVORITES: &str = "favoritePartners";
pub const KEY_WITHDRAWN_FAVORITES: &str = "withdrawn_favorites_v1";
pub const KEY_WITHDRAWN_FILTERS: &str = "withdrawnFilters_v1";
pub const KEY_HISTORY_AUTO_SEARCH: &str = "searchHistory_autoSearch";
pub const KEY_TOKEN: &str = "token";
pub const KEY_USER_EMAIL: &str = "userEmail";
pub const KEY_USER_NAME: &str = "userName";

/// String key/value storage.
pub trait KvStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn put(&self, key: &str, value: &str) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;
}

/// Favorites stored as a JSON array. A missing or corrupt entry reads as empty.
pub fn load_favorites(kv: &dyn KvStore, key: &str) -> FavoriteSet {
    match kv.get(key) {
        Ok(Some(raw)) => match serde_json::from_str::<Vec<String>>(&raw) {
            Ok(ids) => FavoriteSet::from_ids(ids),
            Err(e) => { warn!(key, error = %e, "persist: favorites unreadable; starting empty"); FavoriteSet::new() }
        },
        Ok(None) => FavoriteSet::new(),
        Err(e) => { warn!(key, error = %e, "persist: favorites read failed"); FavoriteSet::new() }
    }
}

/// Overwrite the whole list.
pub fn save_favorites(kv: &dyn KvStore, key: &str, favs: &FavoriteSet) -> Result<()> {
    kv.put(key, &serde_json::to_string(favs.ids())?)
}

/// Stored flag; `default` when absent or not a boolean.
pub fn load_flag(kv: &dyn KvStore, key: &str, default: bool) -> bool {
    match kv.get(key) {
        Ok(Some(raw)) => match raw.trim() { "true" => true, "false" => false, _ => default },
        _ => default,
    }
}

pub fn save_flag(kv: &dyn KvStore, key: &str, on: bool) -> Result<()> { kv.put(key, if on { "true" } else { "false" }) }

/// Drop session state only. Favorites and cached filters survive.
pub fn logout(kv: &dyn KvStore) -> Result<()> {
    for k in [KEY_TOKEN, KEY_USER_EMAIL, KEY_USER_NAME] { kv.remove(k)?; }
    Ok(())
}

pub(crate) fn lock<T>(m: &Mutex<T>) -> Result<MutexGuard<'_, T>> { m.lock().map_err(|_| anyhow!("persist: lock poisoned")) }

/// SQLite-backed store. Simple, synchronous.
pub struct SqliteStore {
    pub(crate) db: Mutex<rusqlite::Connection>,
}

impl SqliteStore {
    pub fn open_default() -> Result<Self> {
        let path = std::env::var("ROSTER_DB_PATH").unwrap_or_else(|_| default_db_path());
        Self::open(&path)
    }

    pub fn open(path: &str) -> Result<Self> {
        let started = std::time::Instant::now();
        let db = rusqlite::Connection::open(path).with_context(|| format!("opening sqlite db at {}", path))?;
        db.pragma_update(None, "journal_mode", "WAL").ok();
        db.pragma_update(None, "synchronous", "NORMAL").ok();
        db.execute(
            "CREATE TABLE IF NOT EXISTS kv (
                key        TEXT PRIMARY KEY,
                value      TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            )",
            [],
        )
        .context("creating kv table")?;
        history::create_schema(&db)?;
        histogram!("persist_open_ms", started.elapsed().as_secs_f64() * 1000.0);
        Ok(Self { db: Mutex::new(db) })
    }
}

impl KvStore for SqliteStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let db = lock(&self.db)?;
        let mut stmt = db.prepare("SELECT value FROM kv WHERE key = ?1")?;
        let mut rows = stmt.query([key])?;
        match rows.next()? {
            Some(r) => Ok(Some(r.get(0)?)),
            None => Ok(None),
        }
    }

    fn put(&self, key: &str, value: &str) -> Result<()> {
        let started = std::time::Instant::now();
        let db = lock(&self.db)?;
        db.execute(
            "INSERT INTO kv(key, value, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            (key, value, now_ts()),
        )
        .with_context(|| format!("writing key {}", key))?;
        histogram!("persist_put_ms", started.elapsed().as_secs_f64() * 1000.0);
        counter!("persist_put_total", 1u64);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        lock(&self.db)?.execute("DELETE FROM kv WHERE key = ?1", [key])?;
        Ok(())
    }
}

/// In-memory store for tests and dry runs.
#[derive(Default)]
pub struct MemoryStore {
    kv: Mutex<BTreeMap<String, String>>,
    pub(crate) history: Mutex<Vec<HistoryRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self { Self::default() }
}

impl KvStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> { Ok(lock(&self.kv)?.get(key).cloned()) }
    fn put(&self, key: &str, value: &str) -> Result<()> {
        lock(&self.kv)?.insert(key.to_string(), value.to_string());
        Ok(())
    }
    fn remove(&self, key: &str) -> Result<()> {
        lock(&self.kv)?.remove(key);
        Ok(())
    }
}

fn default_db_path() -> String {
    if let Some(home) = std::env::var_os("HOME") {
        let mut p = std::path::PathBuf::from(home);
        p.push(".roster");
        let _ = std::fs::create_dir_all(&p);
        p.push("roster.db");
        return p.to_string_lossy().to_string();
    }
    "roster.db".to_string()
}

pub fn now_ts() -> i64 {
    let now = std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH).unwrap_or_default();
    now.as_secs() as i64
}
