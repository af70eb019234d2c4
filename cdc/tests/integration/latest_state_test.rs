use cdc::source::MemorySource;
use cdc::store::{MemoryTableStore, TargetStore};
use cdc::test_utils::pipeline::{run_pipeline, single_source, test_pipeline_config};
use cdc::test_utils::schema::{
    ITEMS_SOURCE, item, item_with, items_schema, items_target, key, seq,
};
use cdc::workers::target::RunReport;
use config::shared::{BatchConfig, HistoryMode, TargetConfig};
use telemetry::init_test_tracing;

const TARGET: &str = "items_latest";

async fn run(
    source: &MemorySource,
    store: &MemoryTableStore,
    target: TargetConfig,
    max_batch_size: usize,
) -> RunReport {
    let mut config = test_pipeline_config(2, vec![target]);
    config.batch = BatchConfig {
        max_size: max_batch_size,
    };

    let mut reports = run_pipeline(config, store.clone(), single_source(ITEMS_SOURCE, source.clone()))
        .await
        .unwrap();
    reports.pop().unwrap()
}

fn latest_target() -> TargetConfig {
    items_target(TARGET, HistoryMode::LatestState)
}

#[tokio::test(flavor = "multi_thread")]
async fn keeps_one_row_per_key() {
    init_test_tracing();
    let source = MemorySource::new(items_schema());
    let store = MemoryTableStore::new();

    source.upsert(item(1, 10, "A", "x")).await.unwrap();
    source.upsert(item(2, 10, "C", "x")).await.unwrap();
    source.upsert(item(1, 20, "B", "x")).await.unwrap();
    run(&source, &store, latest_target(), 100).await;

    let rows = store.current_rows(TARGET).await.unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].key, key(1));
    assert_eq!(rows[0].values, item(1, 20, "B", "x"));
    assert_eq!(rows[0].effective_from, seq(20));
    assert_eq!(rows[0].effective_to, None);
    assert_eq!(rows[1].values, item(2, 10, "C", "x"));

    assert_eq!(store.read_history(TARGET, &key(1)).await.unwrap().len(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn stale_changes_are_ignored() {
    init_test_tracing();
    let source = MemorySource::new(items_schema());
    let store = MemoryTableStore::new();

    source.upsert(item(1, 20, "B", "x")).await.unwrap();
    source.upsert(item(1, 10, "A", "x")).await.unwrap();
    let report = run(&source, &store, latest_target(), 1).await;

    let current = store.read_current(TARGET, &key(1)).await.unwrap().unwrap();
    assert_eq!(current.values, item(1, 20, "B", "x"));
    assert_eq!(report.merge.stale_ignored, 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn deleted_key_is_not_resurrected_by_older_changes() {
    init_test_tracing();
    let source = MemorySource::new(items_schema());
    let store = MemoryTableStore::new();

    source.upsert(item(1, 10, "A", "x")).await.unwrap();
    source.delete(item(1, 20, "A", "x")).await.unwrap();
    run(&source, &store, latest_target(), 100).await;
    assert_eq!(store.read_current(TARGET, &key(1)).await.unwrap(), None);

    source.upsert(item(1, 15, "C", "x")).await.unwrap();
    let report = run(&source, &store, latest_target(), 100).await;
    assert_eq!(store.read_current(TARGET, &key(1)).await.unwrap(), None);
    assert_eq!(report.merge.stale_ignored, 1);

    // A newer change brings the key back.
    source.upsert(item(1, 30, "D", "x")).await.unwrap();
    run(&source, &store, latest_target(), 100).await;
    let current = store.read_current(TARGET, &key(1)).await.unwrap().unwrap();
    assert_eq!(current.values, item(1, 30, "D", "x"));
}

#[tokio::test(flavor = "multi_thread")]
async fn null_updates_keep_previous_values_when_ignored() {
    init_test_tracing();
    let source = MemorySource::new(items_schema());
    let store = MemoryTableStore::new();

    let mut target = latest_target();
    target.ignore_null_updates = true;

    source.upsert(item(1, 10, "A", "x")).await.unwrap();
    source
        .upsert(item_with(Some(1), Some(20), None, Some("y")))
        .await
        .unwrap();
    run(&source, &store, target, 100).await;

    let current = store.read_current(TARGET, &key(1)).await.unwrap().unwrap();
    assert_eq!(current.values, item(1, 20, "A", "y"));
    assert_eq!(current.effective_from, seq(20));
}

#[tokio::test(flavor = "multi_thread")]
async fn null_updates_overwrite_by_default() {
    init_test_tracing();
    let source = MemorySource::new(items_schema());
    let store = MemoryTableStore::new();

    source.upsert(item(1, 10, "A", "x")).await.unwrap();
    source
        .upsert(item_with(Some(1), Some(20), None, Some("y")))
        .await
        .unwrap();
    run(&source, &store, latest_target(), 100).await;

    let current = store.read_current(TARGET, &key(1)).await.unwrap().unwrap();
    assert_eq!(current.values, item_with(Some(1), Some(20), None, Some("y")));
}

#[tokio::test(flavor = "multi_thread")]
async fn projected_columns_are_not_stored() {
    init_test_tracing();
    let source = MemorySource::new(items_schema());
    let store = MemoryTableStore::new();

    let mut target = latest_target();
    target.except_column_list = vec!["note".to_string()];

    source.upsert(item(1, 10, "A", "x")).await.unwrap();
    run(&source, &store, target, 100).await;

    let current = store.read_current(TARGET, &key(1)).await.unwrap().unwrap();
    assert_eq!(current.values, item(1, 10, "A", "x")[..3].to_vec());
}
