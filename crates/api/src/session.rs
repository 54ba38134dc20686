//! Search sessions: one per surface. A session owns its filter state,
//! favorites and pager, and keeps the last result as indices into the
//! snapshot it was computed from.

use std::sync::Arc;

use roster_core::{
    assignments_for, AssignmentRecord, AvailabilityFilter, FavoriteSet, PartnerRecord, Snapshot, SortDirection, SortKey, WithdrawnFilter,
    WithdrawnRecord,
};
use roster_persist::{self as persist, KvStore};
use roster_search::{page_links, sorted, LocationHierarchy, PageLink, PageWindow, Pager, Sortable};
use roster_store::{DatasetHandle, GatePhase, LoadStatus, SearchGate};
use serde::Serialize;
use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::history::{self, Recorder};
use crate::{RosterError, RosterResult};

/// The visible slice of a result.
#[derive(Debug, Clone, Serialize)]
pub struct PageView<R> {
    pub rows: Vec<R>,
    pub window: PageWindow,
    pub links: Vec<PageLink>,
    pub elapsed_ms: u64,
}

struct ResultSet<R> {
    snap: Arc<Snapshot<R>>,
    raw: Vec<usize>,
    sorted: Vec<usize>,
    elapsed_ms: u64,
}

impl<R: Sortable + Clone> ResultSet<R> {
    fn resort(&mut self, key: &SortKey, dir: SortDirection, favorites: &FavoriteSet) {
        self.sorted = sorted(&self.snap.rows, &self.raw, key, dir, favorites);
    }
}

fn view<R: Clone>(result: Option<&ResultSet<R>>, pager: &Pager) -> PageView<R> {
    let window = pager.window();
    let links = page_links(window.current, window.total_pages);
    match result {
        Some(r) => PageView {
            rows: pager.slice(&r.sorted).iter().map(|&i| r.snap.rows[i].clone()).collect(),
            window,
            links,
            elapsed_ms: r.elapsed_ms,
        },
        None => PageView { rows: Vec::new(), window, links, elapsed_ms: 0 },
    }
}

fn reauth_if_failed(status: LoadStatus) -> RosterResult<()> {
    match status {
        LoadStatus::Failed { reauth: true, message } => Err(RosterError::Reauth(message)),
        LoadStatus::Failed { message, .. } => Err(RosterError::Internal(message)),
        _ => Ok(()),
    }
}

fn sanitize(hierarchy: &LocationHierarchy, regions: &[String], sub_regions: &mut Vec<String>) {
    // Before the area master arrives there is nothing to check against.
    if hierarchy.is_empty() { return; }
    *sub_regions = hierarchy.sanitize(regions, sub_regions);
}

// ---------------- Availability ----------------

pub struct AvailabilitySession {
    partners: DatasetHandle<PartnerRecord>,
    assignments: DatasetHandle<AssignmentRecord>,
    kv: Arc<dyn KvStore>,
    hierarchy: LocationHierarchy,
    filter: AvailabilityFilter,
    favorites: FavoriteSet,
    pager: Pager,
    result: Option<ResultSet<PartnerRecord>>,
}

impl AvailabilitySession {
    pub fn new(partners: DatasetHandle<PartnerRecord>, assignments: DatasetHandle<AssignmentRecord>, kv: Arc<dyn KvStore>, page_size: usize) -> Self {
        let favorites = persist::load_favorites(kv.as_ref(), persist::KEY_FAVORITES);
        Self {
            partners,
            assignments,
            kv,
            hierarchy: LocationHierarchy::default(),
            filter: AvailabilityFilter::default(),
            favorites,
            pager: Pager::new(page_size),
            result: None,
        }
    }

    pub fn filter(&self) -> &AvailabilityFilter { &self.filter }
    pub fn favorites(&self) -> &FavoriteSet { &self.favorites }
    pub fn hierarchy(&self) -> &LocationHierarchy { &self.hierarchy }
    pub fn load_status(&self) -> LoadStatus { self.partners.status() }

    /// `Reauth` when the last partner fetch failed.
    pub fn check_loaded(&self) -> RosterResult<()> { reauth_if_failed(self.partners.status()) }

    pub fn set_hierarchy(&mut self, hierarchy: LocationHierarchy) {
        self.hierarchy = hierarchy;
        sanitize(&self.hierarchy, &self.filter.regions, &mut self.filter.sub_regions);
    }

    pub fn set_regions(&mut self, regions: Vec<String>) {
        self.filter.regions = regions;
        sanitize(&self.hierarchy, &self.filter.regions, &mut self.filter.sub_regions);
    }

    /// Edit any criteria; the sub-region selection is re-checked afterwards.
    pub fn update(&mut self, edit: impl FnOnce(&mut AvailabilityFilter)) {
        edit(&mut self.filter);
        sanitize(&self.hierarchy, &self.filter.regions, &mut self.filter.sub_regions);
    }

    /// Re-order the last result; does not filter again.
    pub fn set_sort(&mut self, key: SortKey, dir: SortDirection) -> PageView<PartnerRecord> {
        self.filter.sort_key = key;
        self.filter.sort_direction = dir;
        if let Some(r) = self.result.as_mut() { r.resort(&self.filter.sort_key, dir, &self.favorites); }
        self.view()
    }

    /// Run a search over the current snapshot and show page 1. Rejected
    /// searches leave the previous result in place.
    pub fn search(&mut self) -> RosterResult<PageView<PartnerRecord>> {
        let snap = self.partners.current();
        let out = roster_search::search_availability(&snap.rows, &self.filter, &self.favorites)?;
        info!(results = out.sorted.len(), rows = snap.rows.len(), epoch = snap.epoch, took_ms = out.elapsed_ms, "api: availability search ok");
        self.pager.set_count(out.sorted.len());
        self.pager.reset();
        self.result = Some(ResultSet { snap, raw: out.raw, sorted: out.sorted, elapsed_ms: out.elapsed_ms });
        Ok(self.view())
    }

    pub fn page(&mut self, page: usize) -> PageView<PartnerRecord> {
        self.pager.go_to(page);
        self.view()
    }

    pub fn view(&self) -> PageView<PartnerRecord> { view(self.result.as_ref(), &self.pager) }

    /// Flip and persist; the current result is re-sorted.
    pub fn toggle_favorite(&mut self, id: &str) -> RosterResult<bool> {
        let on = self.favorites.toggle(id);
        persist::save_favorites(self.kv.as_ref(), persist::KEY_FAVORITES, &self.favorites).map_err(RosterError::internal)?;
        if let Some(r) = self.result.as_mut() { r.resort(&self.filter.sort_key, self.filter.sort_direction, &self.favorites); }
        Ok(on)
    }

    /// Active assignments of one partner, in sheet order.
    pub fn assignments_of(&self, partner_id: &str) -> Vec<AssignmentRecord> {
        let snap = self.assignments.current();
        assignments_for(&snap.rows, partner_id).cloned().collect()
    }
}

// ---------------- Withdrawn ----------------

pub struct WithdrawnSession {
    rows: DatasetHandle<WithdrawnRecord>,
    kv: Arc<dyn KvStore>,
    hierarchy: LocationHierarchy,
    filter: WithdrawnFilter,
    favorites: FavoriteSet,
    pager: Pager,
    result: Option<ResultSet<WithdrawnRecord>>,
    gate: SearchGate<()>,
    recorder: Option<Recorder>,
    last_record: Option<JoinHandle<()>>,
}

impl WithdrawnSession {
    /// Favorites and the cached filter are read here, once.
    pub fn new(rows: DatasetHandle<WithdrawnRecord>, kv: Arc<dyn KvStore>, page_size: usize) -> Self {
        let favorites = persist::load_favorites(kv.as_ref(), persist::KEY_WITHDRAWN_FAVORITES);
        let filter = history::load_filter_cache(kv.as_ref());
        Self {
            rows,
            kv,
            hierarchy: LocationHierarchy::default(),
            filter,
            favorites,
            pager: Pager::new(page_size),
            result: None,
            gate: SearchGate::new(),
            recorder: None,
            last_record: None,
        }
    }

    pub fn with_recorder(mut self, recorder: Recorder) -> Self {
        self.recorder = Some(recorder);
        self
    }

    pub fn filter(&self) -> &WithdrawnFilter { &self.filter }
    pub fn favorites(&self) -> &FavoriteSet { &self.favorites }
    pub fn hierarchy(&self) -> &LocationHierarchy { &self.hierarchy }
    pub fn load_status(&self) -> LoadStatus { self.rows.status() }
    pub fn gate_phase(&self) -> GatePhase { self.gate.phase() }
    pub fn check_loaded(&self) -> RosterResult<()> { reauth_if_failed(self.rows.status()) }

    fn save_filter(&self) {
        let res = serde_json::to_string(&self.filter)
            .map_err(anyhow::Error::from)
            .and_then(|raw| self.kv.put(persist::KEY_WITHDRAWN_FILTERS, &raw));
        if let Err(e) = res { warn!(error = %e, "api: withdrawn filter cache not written"); }
    }

    pub fn set_hierarchy(&mut self, hierarchy: LocationHierarchy) {
        self.hierarchy = hierarchy;
        sanitize(&self.hierarchy, &self.filter.regions, &mut self.filter.sub_regions);
        self.save_filter();
    }

    pub fn set_regions(&mut self, regions: Vec<String>) {
        self.filter.regions = regions;
        sanitize(&self.hierarchy, &self.filter.regions, &mut self.filter.sub_regions);
        self.save_filter();
    }

    /// Edit any criteria; sub-regions are re-checked and the cache rewritten.
    pub fn update(&mut self, edit: impl FnOnce(&mut WithdrawnFilter)) {
        edit(&mut self.filter);
        sanitize(&self.hierarchy, &self.filter.regions, &mut self.filter.sub_regions);
        self.save_filter();
    }

    pub fn set_sort(&mut self, key: SortKey, dir: SortDirection) -> PageView<WithdrawnRecord> {
        self.filter.sort_key = key;
        self.filter.sort_direction = dir;
        self.save_filter();
        if let Some(r) = self.result.as_mut() { r.resort(&self.filter.sort_key, dir, &self.favorites); }
        self.view()
    }

    /// A dataset (re)fetch started: searches are deferred until [`Self::on_data_ready`].
    pub fn begin_load(&mut self) { self.gate.begin_load(); }

    /// Search now if the data is in, otherwise park the request (the latest
    /// one wins) and return `None`.
    pub fn request_search(&mut self) -> Option<PageView<WithdrawnRecord>> {
        match self.gate.request(()) {
            Some(()) => Some(self.run_search()),
            None => {
                info!("api: withdrawn search deferred until data is ready");
                None
            }
        }
    }

    /// The fetch settled. Runs the parked search, if there is one.
    pub fn on_data_ready(&mut self) -> Option<PageView<WithdrawnRecord>> {
        self.gate.data_ready().map(|()| self.run_search())
    }

    fn run_search(&mut self) -> PageView<WithdrawnRecord> {
        let snap = self.rows.current();
        let params = self.snapshot_params();
        let summary = self.keyword_summary();
        let out = roster_search::search_withdrawn(&snap.rows, &self.filter, &self.favorites);
        info!(results = out.sorted.len(), rows = snap.rows.len(), epoch = snap.epoch, took_ms = out.elapsed_ms, "api: withdrawn search ok");
        if let Some(rec) = &self.recorder { self.last_record = rec.record(&params, &summary, out.raw.len(), out.elapsed_ms); }
        self.pager.set_count(out.sorted.len());
        self.pager.reset();
        self.result = Some(ResultSet { snap, raw: out.raw, sorted: out.sorted, elapsed_ms: out.elapsed_ms });
        self.view()
    }

    /// Handle of the most recent history append, for callers that must not
    /// exit before it lands.
    pub fn take_last_record(&mut self) -> Option<JoinHandle<()>> { self.last_record.take() }

    pub fn page(&mut self, page: usize) -> PageView<WithdrawnRecord> {
        self.pager.go_to(page);
        self.view()
    }

    pub fn view(&self) -> PageView<WithdrawnRecord> { view(self.result.as_ref(), &self.pager) }

    pub fn toggle_favorite(&mut self, key: &str) -> RosterResult<bool> {
        let on = self.favorites.toggle(key);
        persist::save_favorites(self.kv.as_ref(), persist::KEY_WITHDRAWN_FAVORITES, &self.favorites).map_err(RosterError::internal)?;
        if let Some(r) = self.result.as_mut() { r.resort(&self.filter.sort_key, self.filter.sort_direction, &self.favorites); }
        Ok(on)
    }

    /// Every filter field, with sub-regions under both of their stored names.
    pub fn snapshot_params(&self) -> Value {
        let mut v = serde_json::to_value(&self.filter).unwrap_or_default();
        if let Value::Object(m) = &mut v {
            let cities = m.get("selectedCities").cloned().unwrap_or_default();
            m.insert("selectedDistricts".into(), cities);
        }
        v
    }

    pub fn keyword_summary(&self) -> String { history::keyword_summary(&self.filter) }

    /// Merge a stored snapshot into the live filter, then search when
    /// `auto_execute` is set (subject to the load gate).
    pub fn replay(&mut self, params: &Value, auto_execute: bool) -> Option<PageView<WithdrawnRecord>> {
        history::apply_withdrawn_params(&mut self.filter, params);
        sanitize(&self.hierarchy, &self.filter.regions, &mut self.filter.sub_regions);
        self.save_filter();
        if auto_execute { self.request_search() } else { None }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use roster_core::Weekday;
    use roster_persist::MemoryStore;
    use roster_store::{Dataset, MemorySource};
    use roster_store::source::{RANGE_ASSIGNMENTS, RANGE_PARTNERS, RANGE_WITHDRAWN};

    fn row(v: &[&str]) -> Vec<String> { v.iter().map(|s| s.to_string()).collect() }

    #[tokio::test]
    async fn availability_search_pages_and_resorts() {
        let src = MemorySource::new();
        let mut sheet = vec![row(&["SF_ID__c", "Name", "OperatingStatus__c", "都道府県", "月_09"])];
        for i in 0..25 { sheet.push(vec![format!("P{:02}", i), format!("名{:02}", i), "稼働".into(), "東京都".into(), "0".into()]); }
        src.put("パートナー情報", sheet).await;
        let partners = Dataset::<PartnerRecord>::new("パートナー情報", RANGE_PARTNERS);
        partners.load(&src, Some("t")).await;
        let assignments = Dataset::<AssignmentRecord>::new("稼働中案件", RANGE_ASSIGNMENTS);

        let kv: Arc<dyn KvStore> = Arc::new(MemoryStore::new());
        let mut s = AvailabilitySession::new(partners.handle(), assignments.handle(), Arc::clone(&kv), 10);
        assert_eq!(s.search().unwrap_err(), RosterError::Validation("都道府県を1つ以上選択してください。".into()));

        s.set_regions(vec!["東京都".into()]);
        s.update(|f| {
            f.weekdays = vec![Weekday::Mon];
            f.hour_from = 9;
            f.hour_to = 9;
        });
        let v = s.search().unwrap();
        assert_eq!(v.window.total_pages, 3);
        assert_eq!(v.rows[0].id, "P00");
        let v = s.page(3);
        assert_eq!((v.window.start_index, v.window.end_index, v.rows.len()), (21, 25, 5));

        let v = s.set_sort(SortKey::Name, SortDirection::Desc);
        assert_eq!(v.window.current, 3);
        assert_eq!(s.page(1).rows[0].id, "P24");

        assert!(s.toggle_favorite("P03").unwrap());
        s.set_sort(SortKey::Favorite, SortDirection::Asc);
        assert_eq!(s.page(1).rows[0].id, "P03");
        assert_eq!(persist::load_favorites(kv.as_ref(), persist::KEY_FAVORITES).ids(), ["P03".to_string()]);
    }

    #[tokio::test]
    async fn availability_favorites_only_skips_preconditions() {
        let src = MemorySource::new();
        src.put("パートナー情報", vec![row(&["SF_ID__c", "Name", "OperatingStatus__c"]), row(&["A", "a", "稼働"]), row(&["B", "b", "稼働"])]).await;
        let partners = Dataset::<PartnerRecord>::new("パートナー情報", RANGE_PARTNERS);
        partners.load(&src, Some("t")).await;
        let kv: Arc<dyn KvStore> = Arc::new(MemoryStore::new());
        let mut s = AvailabilitySession::new(partners.handle(), Dataset::<AssignmentRecord>::new("稼働中案件", RANGE_ASSIGNMENTS).handle(), kv, 20);
        s.toggle_favorite("B").unwrap();
        s.update(|f| f.favorites_only = true);
        let v = s.search().unwrap();
        assert_eq!(v.rows.iter().map(|r| r.id.as_str()).collect::<Vec<_>>(), vec!["B"]);
    }

    #[test]
    fn sub_regions_follow_region_changes() {
        let kv: Arc<dyn KvStore> = Arc::new(MemoryStore::new());
        let ds = Dataset::<WithdrawnRecord>::new("離脱パートナー情報", RANGE_WITHDRAWN);
        let mut s = WithdrawnSession::new(ds.handle(), Arc::clone(&kv), 20);
        s.update(|f| f.sub_regions = vec!["港区".into(), "北区".into()]);
        assert_eq!(s.filter().sub_regions.len(), 2);

        s.set_hierarchy(LocationHierarchy::build([("東京都", "港区"), ("東京都", "北区"), ("大阪府", "北区"), ("大阪府", "中央区")]));
        s.set_regions(vec!["大阪府".into()]);
        assert_eq!(s.filter().sub_regions, vec!["北区"]);

        let cached = history::load_filter_cache(kv.as_ref());
        assert_eq!(cached.regions, vec!["大阪府"]);
        assert_eq!(cached.sub_regions, vec!["北区"]);
    }

    #[test]
    fn snapshot_replay_roundtrip() {
        let kv: Arc<dyn KvStore> = Arc::new(MemoryStore::new());
        let ds = Dataset::<WithdrawnRecord>::new("離脱パートナー情報", RANGE_WITHDRAWN);
        let mut s = WithdrawnSession::new(ds.handle(), Arc::clone(&kv), 20);
        s.update(|f| {
            f.regions = vec!["東京都".into()];
            f.sub_regions = vec!["港区".into()];
            f.reason_medium = vec!["健康上の理由".into()];
            f.age_min = Some(20);
            f.keyword = "夜間".into();
            f.favorites_only = true;
            f.sort_key = SortKey::Name;
            f.sort_direction = SortDirection::Asc;
        });
        let params = s.snapshot_params();
        assert_eq!(params["selectedDistricts"], params["selectedCities"]);
        let before = s.filter().clone();

        let mut other = WithdrawnSession::new(ds.handle(), Arc::new(MemoryStore::new()), 20);
        assert!(other.replay(&params, false).is_none());
        assert_eq!(other.filter(), &before);
    }

    #[tokio::test]
    async fn withdrawn_search_waits_for_data() {
        let src = MemorySource::new();
        src.put("離脱パートナー", vec![row(&["SF_ID__c", "Name", "MailingState"]), row(&["W1", "a", "東京都"]), row(&["W2", "b", "大阪府"])]).await;
        let ds = Dataset::<WithdrawnRecord>::new("離脱パートナー情報", RANGE_WITHDRAWN);
        let kv: Arc<dyn KvStore> = Arc::new(MemoryStore::new());
        let mut s = WithdrawnSession::new(ds.handle(), kv, 20);

        s.begin_load();
        s.set_regions(vec!["東京都".into()]);
        assert!(s.request_search().is_none());
        assert!(s.request_search().is_none());
        assert_eq!(s.gate_phase(), GatePhase::AwaitingData);

        ds.load(&src, Some("t")).await;
        let v = s.on_data_ready().unwrap();
        assert_eq!(v.rows.len(), 1);
        assert_eq!(v.rows[0].id, "W1");
        assert!(s.on_data_ready().is_none());
        assert!(s.request_search().is_some());
    }

    #[tokio::test]
    async fn failed_load_surfaces_reauth() {
        let src = MemorySource::new();
        src.set_failing(true).await;
        let ds = Dataset::<WithdrawnRecord>::new("離脱パートナー情報", RANGE_WITHDRAWN);
        ds.load(&src, None).await;
        let s = WithdrawnSession::new(ds.handle(), Arc::new(MemoryStore::new()), 20);
        assert_eq!(s.check_loaded(), Err(RosterError::Reauth("離脱パートナー情報の取得に失敗しました。再認証してください。".into())));
    }
}
