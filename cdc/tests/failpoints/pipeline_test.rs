use cdc::error::ErrorKind;
use cdc::failpoints::{
    ADVANCE_WATERMARK__BEFORE_STORE, COMMIT_KEY_DELTA__BEFORE_COMMIT,
    READ_SOURCE_BATCH__BEFORE_READ,
};
use cdc::source::MemorySource;
use cdc::store::{MemoryTableStore, TargetStore};
use cdc::test_utils::failpoints::FailPointsGuard;
use cdc::test_utils::pipeline::{run_pipeline, single_source, test_pipeline_config};
use cdc::test_utils::schema::{ITEMS_SOURCE, item, items_schema, items_target, key};
use config::shared::HistoryMode;
use telemetry::init_test_tracing;

const TARGET: &str = "items";

async fn source_with_changes() -> MemorySource {
    let source = MemorySource::new(items_schema());
    source.upsert(item(1, 10, "A", "x")).await.unwrap();
    source.upsert(item(1, 20, "B", "x")).await.unwrap();
    source.upsert(item(2, 10, "C", "x")).await.unwrap();
    source
}

#[tokio::test(flavor = "multi_thread")]
async fn commit_failure_surfaces_and_next_run_resumes() {
    init_test_tracing();
    let source = source_with_changes().await;
    let store = MemoryTableStore::new();
    let config = test_pipeline_config(20, vec![items_target(TARGET, HistoryMode::FullHistory)]);

    {
        let _failpoints =
            FailPointsGuard::setup(&[(COMMIT_KEY_DELTA__BEFORE_COMMIT, "return(no_retry)")]);

        let err = run_pipeline(
            config.clone(),
            store.clone(),
            single_source(ITEMS_SOURCE, source.clone()),
        )
        .await
        .unwrap_err();

        assert!(err.contains(ErrorKind::WithNoRetry));
        let metadata = store.get_target_metadata(TARGET).await.unwrap().unwrap();
        assert_eq!(metadata.watermark.next_offset, 0);
        assert!(store.current_rows(TARGET).await.unwrap().is_empty());
    }

    let reports = run_pipeline(config, store.clone(), single_source(ITEMS_SOURCE, source))
        .await
        .unwrap();

    assert_eq!(reports[0].records_read, 3);
    assert_eq!(store.read_history(TARGET, &key(1)).await.unwrap().len(), 2);
    assert_eq!(store.current_rows(TARGET).await.unwrap().len(), 2);
}

#[tokio::test(flavor = "multi_thread")]
async fn timed_commit_failures_are_retried() {
    init_test_tracing();
    let source = source_with_changes().await;
    let store = MemoryTableStore::new();

    let _failpoints =
        FailPointsGuard::setup(&[(COMMIT_KEY_DELTA__BEFORE_COMMIT, "1*return(timed_retry)")]);

    let reports = run_pipeline(
        test_pipeline_config(21, vec![items_target(TARGET, HistoryMode::FullHistory)]),
        store.clone(),
        single_source(ITEMS_SOURCE, source),
    )
    .await
    .unwrap();

    assert_eq!(reports[0].watermark.next_offset, 3);
    assert_eq!(store.current_rows(TARGET).await.unwrap().len(), 2);
}

#[tokio::test(flavor = "multi_thread")]
async fn source_read_failures_are_retried() {
    init_test_tracing();
    let source = source_with_changes().await;
    let store = MemoryTableStore::new();

    let _failpoints =
        FailPointsGuard::setup(&[(READ_SOURCE_BATCH__BEFORE_READ, "2*return(timed_retry)")]);

    let reports = run_pipeline(
        test_pipeline_config(22, vec![items_target(TARGET, HistoryMode::FullHistory)]),
        store,
        single_source(ITEMS_SOURCE, source),
    )
    .await
    .unwrap();

    assert_eq!(reports[0].records_read, 3);
}

#[tokio::test(flavor = "multi_thread")]
async fn lost_watermark_replays_the_batch_without_changes() {
    init_test_tracing();
    let source = source_with_changes().await;
    let store = MemoryTableStore::new();
    let config = test_pipeline_config(23, vec![items_target(TARGET, HistoryMode::FullHistory)]);

    {
        let _failpoints =
            FailPointsGuard::setup(&[(ADVANCE_WATERMARK__BEFORE_STORE, "return(manual_retry)")]);

        let err = run_pipeline(
            config.clone(),
            store.clone(),
            single_source(ITEMS_SOURCE, source.clone()),
        )
        .await
        .unwrap_err();
        assert!(err.contains(ErrorKind::WithManualRetry));
    }

    // The rows were committed before the watermark failed.
    let history = store.read_history(TARGET, &key(1)).await.unwrap();
    assert_eq!(history.len(), 2);

    let reports = run_pipeline(config, store.clone(), single_source(ITEMS_SOURCE, source))
        .await
        .unwrap();

    assert_eq!(reports[0].records_read, 3);
    assert_eq!(reports[0].merge.versions_opened, 0);
    assert_eq!(store.read_history(TARGET, &key(1)).await.unwrap(), history);
}
