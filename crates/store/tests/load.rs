#![forbid(unsafe_code)]

use std::sync::Arc;

use roster_core::{PartnerRecord, WithdrawnRecord};
use roster_store::source::{RANGE_AREAS, RANGE_PARTNERS, RANGE_WITHDRAWN};
use roster_store::{load_areas, Dataset, JsonFileSource, LoadStatus, MemorySource, RowSource, SourceError};

fn row(v: &[&str]) -> Vec<String> { v.iter().map(|s| s.to_string()).collect() }

#[tokio::test]
async fn load_publishes_snapshot_and_status() {
    let src = MemorySource::new();
    src.put("パートナー情報", vec![row(&["SF_ID__c", "Name"]), row(&["P1", "a"]), row(&["P2"])]).await;
    let ds = Dataset::<PartnerRecord>::new("パートナー情報", RANGE_PARTNERS);
    let h = ds.handle();
    assert_eq!(h.status(), LoadStatus::Idle);

    let st = ds.load(&src, Some("tok")).await;
    assert_eq!(st, LoadStatus::Ready { epoch: 1, rows: 2 });
    let snap = h.current();
    assert_eq!(snap.epoch, 1);
    assert_eq!(snap.rows[1].id, "P2");
    assert_eq!(snap.rows[1].name, "");
}

#[tokio::test]
async fn failure_resets_to_empty_and_asks_for_reauth() {
    let src = MemorySource::new();
    src.put("離脱パートナー", vec![row(&["SF_ID__c"]), row(&["W1"])]).await;
    let ds = Dataset::<WithdrawnRecord>::new("離脱パートナー情報", RANGE_WITHDRAWN);
    ds.load(&src, Some("tok")).await;
    assert_eq!(ds.handle().current().rows.len(), 1);

    src.set_failing(true).await;
    let st = ds.load(&src, Some("tok")).await;
    assert_eq!(st, LoadStatus::Failed { reauth: true, message: "離脱パートナー情報の取得に失敗しました。再認証してください。".into() });
    assert!(ds.handle().current().rows.is_empty());

    let st = ds.load(&src, None).await;
    assert!(matches!(st, LoadStatus::Failed { reauth: true, .. }));
}

#[tokio::test]
async fn spawned_load_settles() {
    let src: Arc<dyn RowSource> = Arc::new(MemorySource::new());
    let ds = Dataset::<PartnerRecord>::new("パートナー情報", RANGE_PARTNERS);
    let h = ds.handle();
    let join = ds.spawn_load(Arc::clone(&src), Some("tok".into()));
    let settled = h.settled().await;
    assert!(settled.is_settled());
    assert_eq!(join.await.unwrap(), LoadStatus::Ready { epoch: 1, rows: 0 });
}

#[tokio::test]
async fn json_dump_source_reads_values_file() {
    let dir = std::env::temp_dir().join(format!("roster-store-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join("都道府県マスタ.json"), r#"{"values":[["東京都","港区"],["東京都","新宿区"],["大阪府"]]}"#).unwrap();
    let src = JsonFileSource::new(&dir);

    let h = load_areas(&src, Some("tok")).await.unwrap();
    assert_eq!(h.regions().collect::<Vec<_>>(), vec!["東京都", "大阪府"]);
    assert_eq!(h.sub_regions_of("東京都").len(), 2);

    assert_eq!(src.fetch(RANGE_AREAS, None).await.unwrap_err(), SourceError::MissingToken);
    assert!(matches!(src.fetch(RANGE_PARTNERS, Some("tok")).await, Err(SourceError::Network(_))));
    let _ = std::fs::remove_dir_all(&dir);
}
