use cdc::error::ErrorKind;
use cdc::source::MemorySource;
use cdc::store::{MemoryTableStore, TargetStore};
use cdc::test_utils::pipeline::{run_pipeline, single_source, test_pipeline_config};
use cdc::test_utils::schema::{
    ITEMS_SOURCE, expectation, item, item_with, items_schema, items_target, key,
};
use config::shared::{ExpectationAction, HistoryMode};
use telemetry::init_test_tracing;

const TARGET: &str = "items_checked";

#[tokio::test(flavor = "multi_thread")]
async fn dropped_records_never_reach_the_target() {
    init_test_tracing();
    let source = MemorySource::new(items_schema());
    let store = MemoryTableStore::new();

    let mut target = items_target(TARGET, HistoryMode::FullHistory);
    target.expectations = vec![
        expectation("valid_value", "value IS NOT NULL", ExpectationAction::Drop),
        expectation("short_note", "note IN ('x', 'y')", ExpectationAction::Warn),
    ];

    source
        .upsert(item_with(Some(1), Some(10), None, Some("x")))
        .await
        .unwrap();
    source.upsert(item(2, 10, "A", "z")).await.unwrap();
    source.upsert(item(3, 10, "B", "x")).await.unwrap();

    let reports = run_pipeline(
        test_pipeline_config(3, vec![target]),
        store.clone(),
        single_source(ITEMS_SOURCE, source.clone()),
    )
    .await
    .unwrap();

    assert!(store.read_history(TARGET, &key(1)).await.unwrap().is_empty());
    assert_eq!(store.current_rows(TARGET).await.unwrap().len(), 2);

    let validation = &reports[0].validation;
    assert_eq!(validation.admitted, 2);
    assert_eq!(validation.dropped, 1);
    assert_eq!(validation.warned, 1);
    assert_eq!(validation.violations.get("valid_value"), Some(&1));
    assert_eq!(validation.violations.get("short_note"), Some(&1));

    // Dropped records still move the watermark.
    assert_eq!(reports[0].watermark.next_offset, 3);
}

#[tokio::test(flavor = "multi_thread")]
async fn failing_expectation_aborts_without_advancing() {
    init_test_tracing();
    let source = MemorySource::new(items_schema());
    let store = MemoryTableStore::new();

    let mut target = items_target(TARGET, HistoryMode::FullHistory);
    target.expectations = vec![expectation(
        "positive_id",
        "id > 0",
        ExpectationAction::Fail,
    )];

    source.upsert(item(1, 10, "A", "x")).await.unwrap();
    source.upsert(item(-1, 10, "B", "x")).await.unwrap();

    let err = run_pipeline(
        test_pipeline_config(3, vec![target]),
        store.clone(),
        single_source(ITEMS_SOURCE, source.clone()),
    )
    .await
    .unwrap_err();

    assert!(err.contains(ErrorKind::ExpectationFailed));
    assert!(store.current_rows(TARGET).await.unwrap().is_empty());

    let metadata = store.get_target_metadata(TARGET).await.unwrap().unwrap();
    assert_eq!(metadata.watermark.next_offset, 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn null_sequence_is_an_invariant_violation() {
    init_test_tracing();
    let source = MemorySource::new(items_schema());
    let store = MemoryTableStore::new();

    source.upsert(item(1, 10, "A", "x")).await.unwrap();
    source
        .upsert(item_with(Some(2), None, Some("B"), Some("x")))
        .await
        .unwrap();

    let err = run_pipeline(
        test_pipeline_config(3, vec![items_target(TARGET, HistoryMode::FullHistory)]),
        store.clone(),
        single_source(ITEMS_SOURCE, source.clone()),
    )
    .await
    .unwrap_err();

    assert!(err.contains(ErrorKind::InvariantViolation));
    assert!(store.current_rows(TARGET).await.unwrap().is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn null_keys_can_be_filtered_by_a_drop_rule() {
    init_test_tracing();
    let source = MemorySource::new(items_schema());
    let store = MemoryTableStore::new();

    let mut target = items_target(TARGET, HistoryMode::LatestState);
    target.expectations = vec![expectation(
        "rule_1",
        "id IS NOT NULL",
        ExpectationAction::Drop,
    )];

    source
        .upsert(item_with(None, Some(10), Some("A"), Some("x")))
        .await
        .unwrap();
    source.upsert(item(1, 10, "B", "x")).await.unwrap();

    let reports = run_pipeline(
        test_pipeline_config(3, vec![target]),
        store.clone(),
        single_source(ITEMS_SOURCE, source.clone()),
    )
    .await
    .unwrap();

    assert_eq!(reports[0].validation.dropped, 1);
    assert_eq!(store.current_rows(TARGET).await.unwrap().len(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn records_matching_apply_as_deletes_become_tombstones() {
    init_test_tracing();
    let source = MemorySource::new(items_schema());
    let store = MemoryTableStore::new();

    let mut target = items_target(TARGET, HistoryMode::FullHistory);
    target.apply_as_deletes = Some("note = 'DELETE'".to_string());

    source.upsert(item(1, 10, "A", "x")).await.unwrap();
    source.upsert(item(1, 20, "A", "DELETE")).await.unwrap();

    let reports = run_pipeline(
        test_pipeline_config(3, vec![target]),
        store.clone(),
        single_source(ITEMS_SOURCE, source.clone()),
    )
    .await
    .unwrap();

    assert_eq!(store.read_current(TARGET, &key(1)).await.unwrap(), None);
    let history = store.read_history(TARGET, &key(1)).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].effective_to, Some(cdc::test_utils::schema::seq(20)));
    assert_eq!(reports[0].merge.deletes, 1);
}
