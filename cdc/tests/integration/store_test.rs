use cdc::error::ErrorKind;
use cdc::source::MemorySource;
use cdc::store::{FileTableStore, TargetStore};
use cdc::test_utils::pipeline::{run_pipeline, single_source, test_pipeline_config};
use cdc::test_utils::schema::{ITEMS_SOURCE, item, items_schema, items_target, key, seq};
use config::shared::HistoryMode;
use std::path::{Path, PathBuf};
use telemetry::init_test_tracing;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

const TARGET: &str = "items";

fn store_dir() -> PathBuf {
    std::env::temp_dir().join(format!("cdc-file-store-{}", Uuid::new_v4()))
}

async fn populate(dir: &Path) -> MemorySource {
    let source = MemorySource::new(items_schema());
    source.upsert(item(1, 10, "A", "x")).await.unwrap();
    source.upsert(item(1, 20, "B", "x")).await.unwrap();
    source.delete(item(2, 5, "C", "x")).await.unwrap();
    source.upsert(item(3, 7, "D", "x")).await.unwrap();

    let store = FileTableStore::open(dir).await.unwrap();
    run_pipeline(
        test_pipeline_config(12, vec![items_target(TARGET, HistoryMode::FullHistory)]),
        store,
        single_source(ITEMS_SOURCE, source.clone()),
    )
    .await
    .unwrap();

    source
}

#[tokio::test(flavor = "multi_thread")]
async fn reopened_store_has_the_committed_state() {
    init_test_tracing();
    let dir = store_dir();
    populate(&dir).await;

    let store = FileTableStore::open(&dir).await.unwrap();
    let history = store.read_history(TARGET, &key(1)).await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].effective_to, Some(seq(20)));
    assert!(history[1].is_current);

    let metadata = store.get_target_metadata(TARGET).await.unwrap().unwrap();
    assert_eq!(metadata.watermark.next_offset, 4);
    assert_eq!(metadata.watermark.max_sequence, Some(seq(20)));

    std::fs::remove_dir_all(&dir).unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn torn_trailing_line_is_discarded() {
    init_test_tracing();
    let dir = store_dir();
    let source = populate(&dir).await;

    let before = {
        let store = FileTableStore::open(&dir).await.unwrap();
        store.current_rows(TARGET).await.unwrap()
    };

    let mut journal = tokio::fs::OpenOptions::new()
        .append(true)
        .open(dir.join(format!("{TARGET}.jsonl")))
        .await
        .unwrap();
    journal.write_all(br#"{"type":"delta","delta":{"key""#).await.unwrap();
    journal.flush().await.unwrap();
    drop(journal);

    let store = FileTableStore::open(&dir).await.unwrap();
    assert_eq!(store.current_rows(TARGET).await.unwrap(), before);

    // Commits after the cut land on a clean line.
    source.upsert(item(4, 1, "E", "x")).await.unwrap();
    run_pipeline(
        test_pipeline_config(12, vec![items_target(TARGET, HistoryMode::FullHistory)]),
        store,
        single_source(ITEMS_SOURCE, source),
    )
    .await
    .unwrap();

    let reopened = FileTableStore::open(&dir).await.unwrap();
    let rows = reopened.current_rows(TARGET).await.unwrap();
    assert_eq!(rows.len(), before.len() + 1);
    assert!(reopened.read_current(TARGET, &key(4)).await.unwrap().is_some());

    std::fs::remove_dir_all(&dir).unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn compaction_keeps_the_state() {
    init_test_tracing();
    let dir = store_dir();
    populate(&dir).await;

    let store = FileTableStore::open(&dir).await.unwrap();
    let rows = store.current_rows(TARGET).await.unwrap();
    let history = store.read_history(TARGET, &key(1)).await.unwrap();
    let tombstoned = store.read_chain(TARGET, &key(2)).await.unwrap();
    store.compact(TARGET).await.unwrap();
    drop(store);

    let store = FileTableStore::open(&dir).await.unwrap();
    assert_eq!(store.current_rows(TARGET).await.unwrap(), rows);
    assert_eq!(store.read_history(TARGET, &key(1)).await.unwrap(), history);
    assert_eq!(store.read_chain(TARGET, &key(2)).await.unwrap(), tombstoned);
    assert_eq!(
        store
            .get_target_metadata(TARGET)
            .await
            .unwrap()
            .unwrap()
            .watermark
            .next_offset,
        4
    );

    std::fs::remove_dir_all(&dir).unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn incomplete_entry_is_cut_before_the_next_commit() {
    init_test_tracing();
    let dir = store_dir();
    let source = populate(&dir).await;
    let store = FileTableStore::open(&dir).await.unwrap();

    // Leftover of an append that failed halfway while the store was open.
    let mut journal = tokio::fs::OpenOptions::new()
        .append(true)
        .open(dir.join(format!("{TARGET}.jsonl")))
        .await
        .unwrap();
    journal.write_all(br#"{"type":"delta","delta":{"ke"#).await.unwrap();
    journal.flush().await.unwrap();
    drop(journal);

    for (id, seq) in [(4, 1), (5, 2)] {
        source.upsert(item(id, seq, "E", "x")).await.unwrap();
        run_pipeline(
            test_pipeline_config(12, vec![items_target(TARGET, HistoryMode::FullHistory)]),
            store.clone(),
            single_source(ITEMS_SOURCE, source.clone()),
        )
        .await
        .unwrap();
    }

    let reopened = FileTableStore::open(&dir).await.unwrap();
    assert!(reopened.read_current(TARGET, &key(4)).await.unwrap().is_some());
    assert!(reopened.read_current(TARGET, &key(5)).await.unwrap().is_some());
    assert_eq!(
        reopened.current_rows(TARGET).await.unwrap(),
        store.current_rows(TARGET).await.unwrap()
    );
    assert_eq!(
        reopened
            .get_target_metadata(TARGET)
            .await
            .unwrap()
            .unwrap()
            .watermark
            .next_offset,
        6
    );

    std::fs::remove_dir_all(&dir).unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn long_journals_are_compacted_on_open() {
    init_test_tracing();
    let dir = store_dir();
    populate(&dir).await;
    let journal = dir.join(format!("{TARGET}.jsonl"));
    let lines_before = std::fs::read_to_string(&journal).unwrap().lines().count();

    let (rows, history) = {
        let store = FileTableStore::open(&dir).await.unwrap();
        (
            store.current_rows(TARGET).await.unwrap(),
            store.read_history(TARGET, &key(1)).await.unwrap(),
        )
    };

    let store = FileTableStore::open_with_compaction(&dir, 1).await.unwrap();
    let lines_after = std::fs::read_to_string(&journal).unwrap().lines().count();
    assert!(lines_after < lines_before);
    assert_eq!(store.current_rows(TARGET).await.unwrap(), rows);

    // Compacting an already compacted journal keeps the history.
    store.compact(TARGET).await.unwrap();
    drop(store);
    let store = FileTableStore::open(&dir).await.unwrap();
    assert_eq!(store.read_history(TARGET, &key(1)).await.unwrap(), history);

    std::fs::remove_dir_all(&dir).unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn journal_io_failures_are_store_errors() {
    init_test_tracing();
    let dir = store_dir();
    populate(&dir).await;

    let store = FileTableStore::open(&dir).await.unwrap();
    std::fs::remove_dir_all(&dir).unwrap();

    let err = store.compact(TARGET).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::StoreIoError);
}
