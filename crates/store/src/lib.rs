//! Roster store: fetch sheet rows, publish immutable snapshots, and track
//! load status for readers.

#![forbid(unsafe_code)]

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use arc_swap::ArcSwap;
use roster_core::{FromRow, SheetTable, Snapshot};
use roster_search::LocationHierarchy;
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

pub mod gate;
pub mod source;

pub use gate::{GatePhase, SearchGate};
pub use source::{JsonFileSource, MemorySource, RowSource, SourceError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum LoadStatus {
    Idle,
    Loading,
    Ready { epoch: u64, rows: usize },
    Failed { reauth: bool, message: String },
}

impl LoadStatus {
    pub fn is_settled(&self) -> bool { matches!(self, Self::Ready { .. } | Self::Failed { .. }) }
}

/// User-facing message for a failed dataset fetch.
pub fn reauth_message(label: &str) -> String { format!("{}の取得に失敗しました。再認証してください。", label) }

/// One dataset: the latest snapshot plus a status channel. Every load
/// replaces the snapshot wholesale; the last completed load wins.
pub struct Dataset<R> {
    label: &'static str,
    range: String,
    snap: Arc<ArcSwap<Snapshot<R>>>,
    status_tx: watch::Sender<LoadStatus>,
    status_rx: watch::Receiver<LoadStatus>,
    epoch: AtomicU64,
}

/// Read side of a [`Dataset`].
pub struct DatasetHandle<R> {
    snap: Arc<ArcSwap<Snapshot<R>>>,
    status_rx: watch::Receiver<LoadStatus>,
}

impl<R> Clone for DatasetHandle<R> {
    fn clone(&self) -> Self { Self { snap: Arc::clone(&self.snap), status_rx: self.status_rx.clone() } }
}

impl<R> DatasetHandle<R> {
    pub fn current(&self) -> Arc<Snapshot<R>> { self.snap.load_full() }
    pub fn status(&self) -> LoadStatus { self.status_rx.borrow().clone() }

    /// Wait until the in-flight load (if any) has finished.
    pub async fn settled(&self) -> LoadStatus {
        let mut rx = self.status_rx.clone();
        let settled = match rx.wait_for(|s| s.is_settled()).await {
            Ok(s) => s.clone(),
            Err(_) => self.status(),
        };
        settled
    }
}

impl<R: FromRow + Send + Sync + 'static> Dataset<R> {
    pub fn new(label: &'static str, range: impl Into<String>) -> Arc<Self> {
        let (status_tx, status_rx) = watch::channel(LoadStatus::Idle);
        Arc::new(Self {
            label,
            range: range.into(),
            snap: Arc::new(ArcSwap::from_pointee(Snapshot::default())),
            status_tx,
            status_rx,
            epoch: AtomicU64::new(0),
        })
    }

    pub fn label(&self) -> &'static str { self.label }

    pub fn handle(&self) -> DatasetHandle<R> { DatasetHandle { snap: Arc::clone(&self.snap), status_rx: self.status_rx.clone() } }

    /// Fetch, parse and publish. On failure the dataset is reset to empty.
    pub async fn load(&self, source: &dyn RowSource, token: Option<&str>) -> LoadStatus {
        let t0 = Instant::now();
        self.status_tx.send_replace(LoadStatus::Loading);
        let epoch = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        let status = match source.fetch(&self.range, token).await {
            Ok(values) => {
                let rows: Vec<R> = SheetTable::from_values(values).records();
                let n = rows.len();
                self.snap.store(Arc::new(Snapshot { epoch, rows }));
                metrics::histogram!("dataset_load_ms", t0.elapsed().as_secs_f64() * 1_000.0, "dataset" => self.label);
                info!(dataset = self.label, rows = n, epoch, took_ms = %t0.elapsed().as_millis(), "store: dataset loaded");
                LoadStatus::Ready { epoch, rows: n }
            }
            Err(e) => {
                self.snap.store(Arc::new(Snapshot { epoch, rows: Vec::new() }));
                warn!(dataset = self.label, error = %e, "store: dataset load failed; reset to empty");
                LoadStatus::Failed { reauth: true, message: reauth_message(self.label) }
            }
        };
        self.status_tx.send_replace(status.clone());
        status
    }

    /// Run [`Dataset::load`] on the runtime.
    pub fn spawn_load(self: &Arc<Self>, source: Arc<dyn RowSource>, token: Option<String>) -> JoinHandle<LoadStatus> {
        let me = Arc::clone(self);
        tokio::spawn(async move { me.load(source.as_ref(), token.as_deref()).await })
    }
}

/// Fetch `(region, sub_region)` master rows and build the hierarchy.
pub async fn load_areas(source: &dyn RowSource, token: Option<&str>) -> Result<LocationHierarchy, SourceError> {
    let rows = source.fetch(source::RANGE_AREAS, token).await?;
    let h = LocationHierarchy::from_rows(&rows);
    info!(regions = h.regions().count(), "store: area master loaded");
    Ok(h)
}
