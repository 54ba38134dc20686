//! Roster public API façade (in-process).
//!
//! This crate defines the session types frontends (the CLI today) drive: one
//! per search surface, plus the search-history recorder and panel. Everything
//! below it (ingestion, filtering, storage) stays behind these types.

#![forbid(unsafe_code)]

use std::path::PathBuf;

use roster_search::Precondition;
use serde::{Deserialize, Serialize};

pub mod history;
pub mod session;

pub use history::{
    display_lines, format_elapsed, format_executed_at, keyword_summary, load_filter_cache, HistoryApi, HistoryEntry, HistoryPanel,
    LocalHistoryApi, Recorder, PAGE_KEY_WITHDRAWN,
};
pub use session::{AvailabilitySession, PageView, WithdrawnSession};

/// API errors. Serializable so a frontend can render or forward them as-is.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
pub enum RosterError {
    /// A search or call was rejected before running; the text is user-facing.
    #[error("validation: {0}")]
    Validation(String),
    /// Credentials are missing or expired.
    #[error("reauth: {0}")]
    Reauth(String),
    #[error("not_found: {0}")]
    NotFound(String),
    #[error("internal: {0}")]
    Internal(String),
}

pub type RosterResult<T> = Result<T, RosterError>;

impl RosterError {
    /// Message without the category prefix.
    pub fn message(&self) -> &str {
        match self {
            Self::Validation(m) | Self::Reauth(m) | Self::NotFound(m) | Self::Internal(m) => m,
        }
    }

    pub(crate) fn internal(e: anyhow::Error) -> Self { Self::Internal(format!("{:#}", e)) }
}

impl From<Precondition> for RosterError {
    fn from(p: Precondition) -> Self { Self::Validation(p.to_string()) }
}

/// Runtime configuration, read from the environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Settings {
    pub page_size: usize,
    /// `None` uses the store's default location.
    pub db_path: Option<String>,
    pub data_dir: PathBuf,
    pub token: Option<String>,
    pub user: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self { page_size: roster_search::DEFAULT_PAGE_SIZE, db_path: None, data_dir: PathBuf::from("."), token: None, user: None }
    }
}

impl Settings {
    pub fn from_env() -> Self { Self::from_lookup(|k| std::env::var(k).ok()) }

    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Self {
        let non_empty = |k: &str| get(k).map(|s| s.trim().to_string()).filter(|s| !s.is_empty());
        let page_size = non_empty("ROSTER_PAGE_SIZE").and_then(|s| s.parse::<usize>().ok()).filter(|n| *n > 0).unwrap_or(roster_search::DEFAULT_PAGE_SIZE);
        Self {
            page_size,
            db_path: non_empty("ROSTER_DB_PATH"),
            data_dir: non_empty("ROSTER_DATA_DIR").map(PathBuf::from).unwrap_or_else(|| PathBuf::from(".")),
            token: non_empty("ROSTER_TOKEN"),
            user: non_empty("ROSTER_USER"),
        }
    }

    /// Local part of the user's e-mail, for display.
    pub fn user_display_name(&self) -> &str {
        match self.user.as_deref() {
            Some(u) => u.split('@').next().unwrap_or(u),
            None => "未取得",
        }
    }
}
