use std::sync::Arc;

use roster_api::{display_lines, HistoryApi, HistoryPanel, LocalHistoryApi, Recorder, WithdrawnSession, PAGE_KEY_WITHDRAWN};
use roster_core::WithdrawnRecord;
use roster_persist::{HistoryStore, KvStore, MemoryStore};
use roster_store::source::RANGE_WITHDRAWN;
use roster_store::{Dataset, MemorySource};

const USER: &str = "ops@example.com";

fn row(v: &[&str]) -> Vec<String> { v.iter().map(|s| s.to_string()).collect() }

async fn loaded_dataset() -> Arc<Dataset<WithdrawnRecord>> {
    let src = MemorySource::new();
    src.put(
        "離脱パートナー",
        vec![
            row(&["SF_ID__c", "Name", "MailingState", "Quit_detail__c"]),
            row(&["W1", "山田", "東京都", "腰痛のため"]),
            row(&["W2", "佐藤", "大阪府", "転職"]),
            row(&["W3", "鈴木", "東京都", "家庭の事情"]),
        ],
    )
    .await;
    let ds = Dataset::<WithdrawnRecord>::new("離脱パートナー情報", RANGE_WITHDRAWN);
    ds.load(&src, Some("tok")).await;
    ds
}

fn ready_session(ds: &Dataset<WithdrawnRecord>, kv: Arc<dyn KvStore>) -> WithdrawnSession {
    let mut s = WithdrawnSession::new(ds.handle(), kv, 20);
    s.begin_load();
    assert!(s.on_data_ready().is_none());
    s
}

async fn wait_for_entries(api: &dyn HistoryApi, n: usize) {
    for _ in 0..100 {
        if api.get_histories(USER, PAGE_KEY_WITHDRAWN).await.map(|v| v.len()).unwrap_or(0) >= n { return; }
        tokio::task::yield_now().await;
    }
    panic!("history entry was not recorded");
}

#[tokio::test]
async fn search_is_recorded_and_replayed() {
    let ds = loaded_dataset().await;
    let store = Arc::new(MemoryStore::new());
    let kv: Arc<dyn KvStore> = store.clone();
    let api: Arc<dyn HistoryApi> = Arc::new(LocalHistoryApi::new(store.clone() as Arc<dyn HistoryStore>, Some("tok".into())));

    let mut s = ready_session(&ds, Arc::clone(&kv)).with_recorder(Recorder::new(Arc::clone(&api), Some(USER.into()), PAGE_KEY_WITHDRAWN));
    s.set_regions(vec!["東京都".into()]);
    s.update(|f| f.detail_keyword = "腰痛".into());
    let v = s.request_search().unwrap();
    assert_eq!(v.rows.len(), 1);
    wait_for_entries(api.as_ref(), 1).await;

    let mut panel = HistoryPanel::new(Arc::clone(&api), Arc::clone(&kv), Some(USER.into()), PAGE_KEY_WITHDRAWN);
    assert!(panel.auto_search());
    let entries = panel.load().await.to_vec();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].record.result_count, 1);
    assert_eq!(entries[0].record.keyword, "都道府県:東京都 | 離脱理由詳細:腰痛");
    let lines = display_lines(&entries[0]);
    assert_eq!(lines[0], "東京都");
    assert!(lines.contains(&"詳細: 腰痛".to_string()));

    let id = entries[0].record.id.clone();
    assert!(panel.toggle_favorite(&id).await.unwrap());
    assert!(panel.entries()[0].record.favorite_flag);

    // A fresh session picks the stored criteria back up and runs them.
    let mut fresh = ready_session(&ds, Arc::new(MemoryStore::new()));
    let replayed = panel.select(&id, &mut fresh).unwrap().unwrap();
    assert_eq!(replayed.rows[0].id, "W1");
    assert_eq!(fresh.filter(), s.filter());

    panel.set_auto_search(false);
    let mut manual = ready_session(&ds, Arc::new(MemoryStore::new()));
    assert!(panel.select(&id, &mut manual).unwrap().is_none());
    assert_eq!(manual.filter().regions, vec!["東京都"]);

    panel.delete(&id).await.unwrap();
    assert!(panel.entries().is_empty());
    let raw = store.get_histories(USER, PAGE_KEY_WITHDRAWN).unwrap();
    assert!(raw[0].is_deleted);
}

#[tokio::test]
async fn recording_failures_stay_silent() {
    let ds = loaded_dataset().await;
    let store = Arc::new(MemoryStore::new());
    let api: Arc<dyn HistoryApi> = Arc::new(LocalHistoryApi::new(store.clone() as Arc<dyn HistoryStore>, None));

    let mut s = ready_session(&ds, store.clone()).with_recorder(Recorder::new(Arc::clone(&api), Some(USER.into()), PAGE_KEY_WITHDRAWN));
    let v = s.request_search().unwrap();
    assert_eq!(v.rows.len(), 3);
    for _ in 0..10 { tokio::task::yield_now().await; }
    assert!(store.get_histories(USER, PAGE_KEY_WITHDRAWN).unwrap().is_empty());

    let mut panel = HistoryPanel::new(api, store.clone(), Some(USER.into()), PAGE_KEY_WITHDRAWN);
    assert!(panel.load().await.is_empty());
    assert_eq!(panel.error(), Some("検索履歴の取得に失敗しました"));
}

#[tokio::test]
async fn no_user_means_no_history() {
    let ds = loaded_dataset().await;
    let store = Arc::new(MemoryStore::new());
    let api: Arc<dyn HistoryApi> = Arc::new(LocalHistoryApi::new(store.clone() as Arc<dyn HistoryStore>, Some("tok".into())));
    let rec = Recorder::new(api, None, PAGE_KEY_WITHDRAWN);
    assert!(rec.record(&serde_json::json!({}), "", 0, 0).is_none());

    let mut s = ready_session(&ds, store.clone()).with_recorder(rec);
    s.request_search().unwrap();
    for _ in 0..10 { tokio::task::yield_now().await; }
    assert!(store.get_histories("", "").unwrap().is_empty());
}
