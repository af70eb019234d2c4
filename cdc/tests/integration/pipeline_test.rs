use cdc::error::ErrorKind;
use cdc::pipeline::Pipeline;
use cdc::source::MemorySource;
use cdc::store::{MemoryTableStore, TargetStore};
use cdc::test_utils::fault_store::FaultInjectingStore;
use cdc::test_utils::pipeline::{run_pipeline, single_source, test_pipeline_config};
use cdc::test_utils::schema::{
    ITEMS_SOURCE, expectation, item, items_schema, items_target, key,
};
use config::shared::{ExpectationAction, HistoryMode};
use std::collections::HashMap;
use std::time::Duration;
use telemetry::init_test_tracing;

#[tokio::test(flavor = "multi_thread")]
async fn targets_sharing_a_source_are_independent() {
    init_test_tracing();
    let source = MemorySource::new(items_schema());
    let store = MemoryTableStore::new();

    source.upsert(item(1, 10, "A", "x")).await.unwrap();
    source.upsert(item(1, 20, "B", "x")).await.unwrap();

    let config = test_pipeline_config(
        4,
        vec![
            items_target("items_scd1", HistoryMode::LatestState),
            items_target("items_scd2", HistoryMode::FullHistory),
        ],
    );
    let reports = run_pipeline(config, store.clone(), single_source(ITEMS_SOURCE, source))
        .await
        .unwrap();

    assert_eq!(reports.len(), 2);
    assert_eq!(reports[0].target, "items_scd1");
    assert_eq!(reports[1].target, "items_scd2");
    assert_eq!(store.read_history("items_scd1", &key(1)).await.unwrap().len(), 1);
    assert_eq!(store.read_history("items_scd2", &key(1)).await.unwrap().len(), 2);
}

#[tokio::test(flavor = "multi_thread")]
async fn missing_source_is_a_configuration_error() {
    init_test_tracing();
    let mut target = items_target("items", HistoryMode::FullHistory);
    target.source = "unknown_stg".to_string();

    let err = Pipeline::new(
        test_pipeline_config(4, vec![target]),
        MemoryTableStore::new(),
        single_source(ITEMS_SOURCE, MemorySource::new(items_schema())),
    )
    .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::ConfigError);
}

#[tokio::test(flavor = "multi_thread")]
async fn unknown_rule_column_is_rejected_at_registration() {
    init_test_tracing();
    let mut target = items_target("items", HistoryMode::FullHistory);
    target.expectations = vec![expectation(
        "rule_1",
        "user_id IS NOT NULL",
        ExpectationAction::Drop,
    )];

    let err = Pipeline::new(
        test_pipeline_config(4, vec![target]),
        MemoryTableStore::new(),
        single_source(ITEMS_SOURCE, MemorySource::new(items_schema())),
    )
    .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::UnknownColumn);
}

#[tokio::test(flavor = "multi_thread")]
async fn changed_rules_require_a_full_refresh() {
    init_test_tracing();
    let source = MemorySource::new(items_schema());
    let store = MemoryTableStore::new();
    let sources = single_source(ITEMS_SOURCE, source.clone());

    source.upsert(item(1, 10, "A", "x")).await.unwrap();
    run_pipeline(
        test_pipeline_config(5, vec![items_target("items", HistoryMode::FullHistory)]),
        store.clone(),
        sources.clone(),
    )
    .await
    .unwrap();

    let mut changed = items_target("items", HistoryMode::FullHistory);
    changed.expectations = vec![expectation(
        "valid_value",
        "value IS NOT NULL",
        ExpectationAction::Drop,
    )];

    let mut pipeline = Pipeline::new(
        test_pipeline_config(5, vec![changed.clone()]),
        store.clone(),
        sources.clone(),
    )
    .unwrap();
    let err = pipeline.start().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::RuleSetChanged);

    // The table is untouched by the rejected run.
    assert_eq!(store.current_rows("items").await.unwrap().len(), 1);

    changed.full_refresh = true;
    let reports = run_pipeline(
        test_pipeline_config(5, vec![changed]),
        store.clone(),
        sources,
    )
    .await
    .unwrap();

    assert_eq!(reports[0].records_read, 1);
    let metadata = store.get_target_metadata("items").await.unwrap().unwrap();
    assert!(metadata.rule_signature.contains("valid_value"));
    assert_eq!(metadata.watermark.next_offset, 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn changed_history_mode_is_rejected() {
    init_test_tracing();
    let source = MemorySource::new(items_schema());
    let store = MemoryTableStore::new();
    let sources = single_source(ITEMS_SOURCE, source.clone());

    source.upsert(item(1, 10, "A", "x")).await.unwrap();
    run_pipeline(
        test_pipeline_config(6, vec![items_target("items", HistoryMode::FullHistory)]),
        store.clone(),
        sources.clone(),
    )
    .await
    .unwrap();

    let err = run_pipeline(
        test_pipeline_config(6, vec![items_target("items", HistoryMode::LatestState)]),
        store,
        sources,
    )
    .await
    .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::ConfigError);
}

#[tokio::test(flavor = "multi_thread")]
async fn transient_commit_failures_are_retried() {
    init_test_tracing();
    let source = MemorySource::new(items_schema());
    let store = FaultInjectingStore::wrap(MemoryTableStore::new());

    source.upsert(item(1, 10, "A", "x")).await.unwrap();
    store.fail_next_commits(2, ErrorKind::CommitFailed).await;

    let reports = run_pipeline(
        test_pipeline_config(7, vec![items_target("items", HistoryMode::FullHistory)]),
        store.clone(),
        single_source(ITEMS_SOURCE, source),
    )
    .await
    .unwrap();

    assert_eq!(store.failed_commits().await, 2);
    assert_eq!(store.commits().await, 1);
    assert_eq!(reports[0].merge.versions_opened, 1);
    assert_eq!(store.current_rows("items").await.unwrap().len(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn exhausted_retries_fail_and_the_next_run_resumes() {
    init_test_tracing();
    let source = MemorySource::new(items_schema());
    let store = FaultInjectingStore::wrap(MemoryTableStore::new());
    let config = test_pipeline_config(8, vec![items_target("items", HistoryMode::FullHistory)]);

    source.upsert(item(1, 10, "A", "x")).await.unwrap();
    store.fail_next_commits(u32::MAX, ErrorKind::CommitFailed).await;

    let err = run_pipeline(
        config.clone(),
        store.clone(),
        single_source(ITEMS_SOURCE, source.clone()),
    )
    .await
    .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::CommitFailed);
    assert_eq!(store.failed_commits().await, u64::from(config.commit_retry.max_attempts));
    let metadata = store.get_target_metadata("items").await.unwrap().unwrap();
    assert_eq!(metadata.watermark.next_offset, 0);

    store.fail_next_commits(0, ErrorKind::CommitFailed).await;
    let reports = run_pipeline(config, store.clone(), single_source(ITEMS_SOURCE, source))
        .await
        .unwrap();

    assert_eq!(reports[0].records_read, 1);
    assert_eq!(reports[0].watermark.next_offset, 1);
    assert_eq!(store.current_rows("items").await.unwrap().len(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn non_transient_commit_failures_are_not_retried() {
    init_test_tracing();
    let source = MemorySource::new(items_schema());
    let store = FaultInjectingStore::wrap(MemoryTableStore::new());

    source.upsert(item(1, 10, "A", "x")).await.unwrap();
    store.fail_next_commits(1, ErrorKind::InvariantViolation).await;

    let err = run_pipeline(
        test_pipeline_config(9, vec![items_target("items", HistoryMode::FullHistory)]),
        store.clone(),
        single_source(ITEMS_SOURCE, source),
    )
    .await
    .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::InvariantViolation);
    assert_eq!(store.failed_commits().await, 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn continuous_target_runs_until_shutdown() {
    init_test_tracing();
    let source = MemorySource::new(items_schema());
    let store = MemoryTableStore::new();

    let mut target = items_target("items", HistoryMode::FullHistory);
    target.once = false;

    let mut pipeline = Pipeline::new(
        test_pipeline_config(10, vec![target]),
        store.clone(),
        HashMap::from([(ITEMS_SOURCE.to_string(), source.clone())]),
    )
    .unwrap();
    pipeline.start().await.unwrap();

    let mut state = pipeline.worker_state("items").await.unwrap();

    // Records appended while the worker polls are picked up.
    source.upsert(item(1, 10, "A", "x")).await.unwrap();
    tokio::time::timeout(Duration::from_secs(10), async {
        while state.report().watermark.next_offset < 1 {
            assert!(state.changed().await);
        }
    })
    .await
    .unwrap();

    let reports = pipeline.shutdown_and_wait().await.unwrap();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].records_read, 1);
    assert_eq!(store.current_rows("items").await.unwrap().len(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn wait_without_start_returns_no_reports() {
    let pipeline = Pipeline::new(
        test_pipeline_config(11, vec![items_target("items", HistoryMode::FullHistory)]),
        MemoryTableStore::new(),
        single_source(ITEMS_SOURCE, MemorySource::new(items_schema())),
    )
    .unwrap();

    assert!(pipeline.wait().await.unwrap().is_empty());
}
