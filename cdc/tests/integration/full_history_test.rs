use cdc::source::MemorySource;
use cdc::store::{MemoryTableStore, TargetStore};
use cdc::test_utils::pipeline::{run_pipeline, single_source, test_pipeline_config};
use cdc::test_utils::schema::{ITEMS_SOURCE, item, items_schema, items_target, key, seq};
use cdc::types::{Cell, TargetRow};
use cdc::workers::target::RunReport;
use config::shared::{BatchConfig, HistoryMode};
use telemetry::init_test_tracing;

const TARGET: &str = "items";

fn row(id: i64, from: i64, to: Option<i64>, value: &str, note: &str) -> TargetRow {
    TargetRow {
        key: key(id),
        values: item(id, from, value, note),
        effective_from: seq(from),
        effective_to: to.map(seq),
        is_current: to.is_none(),
    }
}

async fn run(source: &MemorySource, store: &MemoryTableStore, max_batch_size: usize) -> RunReport {
    let mut config = test_pipeline_config(1, vec![items_target(TARGET, HistoryMode::FullHistory)]);
    config.batch = BatchConfig {
        max_size: max_batch_size,
    };

    let mut reports = run_pipeline(config, store.clone(), single_source(ITEMS_SOURCE, source.clone()))
        .await
        .unwrap();
    reports.pop().unwrap()
}

#[tokio::test(flavor = "multi_thread")]
async fn versions_are_chained_in_sequence_order() {
    init_test_tracing();
    let source = MemorySource::new(items_schema());
    let store = MemoryTableStore::new();

    source.upsert(item(1, 10, "A", "x")).await.unwrap();
    source.upsert(item(1, 20, "B", "x")).await.unwrap();

    let report = run(&source, &store, 100).await;

    assert_eq!(
        store.read_history(TARGET, &key(1)).await.unwrap(),
        vec![row(1, 10, Some(20), "A", "x"), row(1, 20, None, "B", "x")]
    );
    assert_eq!(report.merge.versions_opened, 2);
    assert_eq!(report.merge.versions_closed, 1);
    assert_eq!(report.watermark.next_offset, 2);
    assert_eq!(report.watermark.max_sequence, Some(seq(20)));
}

#[tokio::test(flavor = "multi_thread")]
async fn arrival_order_does_not_change_the_history() {
    init_test_tracing();
    let expected = vec![row(1, 10, Some(20), "A", "x"), row(1, 20, None, "B", "x")];

    // Reversed within one batch.
    let source = MemorySource::new(items_schema());
    let store = MemoryTableStore::new();
    source.upsert(item(1, 20, "B", "x")).await.unwrap();
    source.upsert(item(1, 10, "A", "x")).await.unwrap();
    run(&source, &store, 100).await;
    assert_eq!(store.read_history(TARGET, &key(1)).await.unwrap(), expected);

    // Reversed across batches.
    let source = MemorySource::new(items_schema());
    let store = MemoryTableStore::new();
    source.upsert(item(1, 20, "B", "x")).await.unwrap();
    source.upsert(item(1, 10, "A", "x")).await.unwrap();
    let report = run(&source, &store, 1).await;
    assert_eq!(store.read_history(TARGET, &key(1)).await.unwrap(), expected);
    assert_eq!(report.batches, 2);
    assert_eq!(report.merge.late_corrections, 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn late_change_is_placed_before_existing_versions() {
    init_test_tracing();
    let source = MemorySource::new(items_schema());
    let store = MemoryTableStore::new();

    source.upsert(item(1, 10, "A", "x")).await.unwrap();
    source.upsert(item(1, 20, "B", "x")).await.unwrap();
    run(&source, &store, 100).await;

    source.upsert(item(1, 5, "Z", "x")).await.unwrap();
    let report = run(&source, &store, 100).await;

    assert_eq!(
        store.read_history(TARGET, &key(1)).await.unwrap(),
        vec![
            row(1, 5, Some(10), "Z", "x"),
            row(1, 10, Some(20), "A", "x"),
            row(1, 20, None, "B", "x"),
        ]
    );
    assert_eq!(report.records_read, 1);
    assert_eq!(report.merge.late_corrections, 1);
    assert_eq!(report.merge.versions_opened, 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn delete_closes_the_current_version() {
    init_test_tracing();
    let source = MemorySource::new(items_schema());
    let store = MemoryTableStore::new();

    source.upsert(item(1, 10, "A", "x")).await.unwrap();
    source.upsert(item(1, 20, "B", "x")).await.unwrap();
    source.upsert(item(2, 10, "C", "x")).await.unwrap();
    source.delete(item(1, 30, "B", "x")).await.unwrap();
    let report = run(&source, &store, 100).await;

    assert_eq!(
        store.read_history(TARGET, &key(1)).await.unwrap(),
        vec![row(1, 10, Some(20), "A", "x"), row(1, 20, Some(30), "B", "x")]
    );
    assert_eq!(store.read_current(TARGET, &key(1)).await.unwrap(), None);
    assert_eq!(
        store.read_as_of(TARGET, &key(1), &seq(25)).await.unwrap(),
        Some(row(1, 20, Some(30), "B", "x"))
    );
    assert_eq!(
        store.read_as_of(TARGET, &key(1), &seq(30)).await.unwrap(),
        None
    );

    let current = store.current_rows(TARGET).await.unwrap();
    assert_eq!(current, vec![row(2, 10, None, "C", "x")]);
    assert_eq!(report.merge.deletes, 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn excluded_column_changes_update_the_version_in_place() {
    init_test_tracing();
    let source = MemorySource::new(items_schema());
    let store = MemoryTableStore::new();

    let mut target = items_target(TARGET, HistoryMode::FullHistory);
    target.track_history_except_column_list = vec!["note".to_string()];
    let config = test_pipeline_config(1, vec![target]);

    source.upsert(item(1, 10, "A", "x")).await.unwrap();
    source.upsert(item(1, 20, "A", "y")).await.unwrap();

    let reports = run_pipeline(config, store.clone(), single_source(ITEMS_SOURCE, source.clone()))
        .await
        .unwrap();

    let history = store.read_history(TARGET, &key(1)).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].effective_from, seq(10));
    assert!(history[0].is_current);
    assert_eq!(history[0].values[2], Cell::String("A".to_string()));
    assert_eq!(history[0].values[3], Cell::String("y".to_string()));
    assert_eq!(reports[0].merge.in_place_corrections, 1);
    assert_eq!(reports[0].merge.versions_opened, 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn unchanged_values_do_not_open_a_version() {
    init_test_tracing();
    let source = MemorySource::new(items_schema());
    let store = MemoryTableStore::new();

    source.upsert(item(1, 10, "A", "x")).await.unwrap();
    source.upsert(item(1, 20, "A", "x")).await.unwrap();
    let report = run(&source, &store, 100).await;

    assert_eq!(
        store.read_history(TARGET, &key(1)).await.unwrap(),
        vec![row(1, 10, None, "A", "x")]
    );
    assert_eq!(report.merge.noops, 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn replaying_a_batch_keeps_the_table_unchanged() {
    init_test_tracing();
    let source = MemorySource::new(items_schema());
    let store = MemoryTableStore::new();

    source.upsert(item(1, 10, "A", "x")).await.unwrap();
    source.upsert(item(1, 20, "B", "x")).await.unwrap();
    source.upsert(item(2, 15, "C", "x")).await.unwrap();
    source.delete(item(2, 25, "C", "x")).await.unwrap();
    run(&source, &store, 100).await;

    let first_one = store.read_history(TARGET, &key(1)).await.unwrap();
    let first_two = store.read_history(TARGET, &key(2)).await.unwrap();

    // Rewind the watermark as if storing it had failed after the commits.
    let mut metadata = store.get_target_metadata(TARGET).await.unwrap().unwrap();
    metadata.watermark = Default::default();
    store.store_target_metadata(metadata).await.unwrap();

    let report = run(&source, &store, 100).await;

    assert_eq!(report.records_read, 4);
    assert_eq!(report.merge.versions_opened, 0);
    assert_eq!(report.merge.versions_closed, 0);
    assert_eq!(store.read_history(TARGET, &key(1)).await.unwrap(), first_one);
    assert_eq!(store.read_history(TARGET, &key(2)).await.unwrap(), first_two);
}

#[tokio::test(flavor = "multi_thread")]
async fn sequence_ties_are_won_by_the_last_arrival() {
    init_test_tracing();
    let source = MemorySource::new(items_schema());
    let store = MemoryTableStore::new();

    source.upsert(item(1, 10, "A", "x")).await.unwrap();
    source.upsert(item(1, 10, "B", "x")).await.unwrap();
    let report = run(&source, &store, 100).await;

    assert_eq!(
        store.read_history(TARGET, &key(1)).await.unwrap(),
        vec![row(1, 10, None, "B", "x")]
    );
    assert_eq!(report.sequencing.ties_resolved, 1);
}
