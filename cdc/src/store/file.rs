use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::{CdcError, CdcResult, ErrorKind};
use crate::store::base::TargetStore;
use crate::store::tables::Tables;
use crate::types::{BusinessKey, ChainDelta, TargetMetadata, TargetRow, VersionChain};
use crate::{bail, cdc_error};

/// Extension of the journal files, one per target.
const JOURNAL_EXTENSION: &str = "jsonl";

/// One line of a target journal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum JournalEntry {
    /// A committed chain delta.
    Delta { delta: ChainDelta },
    /// The full chain of a key, written by compaction.
    Chain { key: BusinessKey, chain: VersionChain },
    /// New metadata of the target.
    Metadata { metadata: TargetMetadata },
    /// The target was cleared.
    Truncate,
}

#[derive(Debug)]
struct Inner {
    directory: PathBuf,
    tables: Tables,
    /// Length of every journal up to its last complete entry.
    journal_lengths: HashMap<String, u64>,
}

/// Durable storage of target tables in append-only JSON-lines journals.
///
/// Every target has a journal `{target}.jsonl` in the store directory. Commits append one line
/// and sync it to disk before the change becomes visible. Opening the store replays every
/// journal into an in-memory copy that serves all reads. A torn trailing line, left by a crash
/// during an append, is discarded on replay. A failed append is cut from the journal before
/// the error is returned, so a retried commit always starts on a clean line.
///
/// Journals holding more than [`FileTableStore::DEFAULT_COMPACT_AFTER_ENTRIES`] entries are
/// compacted when the store is opened.
#[derive(Debug, Clone)]
pub struct FileTableStore {
    inner: Arc<Mutex<Inner>>,
}

impl FileTableStore {
    pub const DEFAULT_COMPACT_AFTER_ENTRIES: usize = 10_000;

    /// Opens the store in `directory`, creating the directory if needed.
    pub async fn open(directory: impl AsRef<Path>) -> CdcResult<Self> {
        Self::open_with_compaction(directory, Self::DEFAULT_COMPACT_AFTER_ENTRIES).await
    }

    /// Opens the store in `directory`, compacting every journal with more than
    /// `compact_after_entries` entries.
    pub async fn open_with_compaction(
        directory: impl AsRef<Path>,
        compact_after_entries: usize,
    ) -> CdcResult<Self> {
        let directory = directory.as_ref().to_path_buf();
        fs::create_dir_all(&directory)
            .await
            .map_err(io_error("Failed to create the store directory", &directory))?;

        let mut tables = Tables::default();
        let mut journal_lengths = HashMap::new();
        let mut replayed = 0;
        let mut compacted = 0;

        let mut entries = fs::read_dir(&directory)
            .await
            .map_err(io_error("Failed to list the store directory", &directory))?;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(io_error("Failed to list the store directory", &directory))?
        {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(JOURNAL_EXTENSION) {
                continue;
            }

            let Some(target) = path.file_stem().and_then(|stem| stem.to_str()) else {
                continue;
            };

            let (applied, mut length) = replay_journal(&path, target, &mut tables).await?;
            if applied > compact_after_entries {
                length = write_compacted(&directory, target, &tables).await?;
                compacted += 1;
            }

            journal_lengths.insert(target.to_string(), length);
            replayed += applied;
        }

        info!(
            directory = %directory.display(),
            entries = replayed,
            compacted_journals = compacted,
            "opened file table store"
        );

        Ok(Self {
            inner: Arc::new(Mutex::new(Inner {
                directory,
                tables,
                journal_lengths,
            })),
        })
    }

    /// Rewrites the journal of `target` as one entry per key plus the metadata.
    ///
    /// The compacted journal is written to a temporary file and renamed over the old one.
    pub async fn compact(&self, target: &str) -> CdcResult<()> {
        let mut inner = self.inner.lock().await;

        let length = write_compacted(&inner.directory, target, &inner.tables).await?;
        inner.journal_lengths.insert(target.to_string(), length);

        Ok(())
    }

    /// Appends `entry` to the journal of `target` and syncs it to disk.
    ///
    /// Bytes past the last complete entry, left by an earlier failed append, are cut first. On
    /// failure the journal is cut back to its previous length.
    async fn append(inner: &mut Inner, target: &str, entry: &JournalEntry) -> CdcResult<()> {
        let path = journal_path(&inner.directory, target)?;
        let line = encode(entry)?;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(io_error("Failed to open the target journal", &path))?;

        let actual_length = file
            .metadata()
            .await
            .map_err(io_error("Failed to read the target journal length", &path))?
            .len();
        let length = match inner.journal_lengths.get(target) {
            Some(&length) if length < actual_length => {
                warn!(
                    journal = %path.display(),
                    dangling_bytes = actual_length - length,
                    "cutting incomplete journal entry before appending"
                );
                file.set_len(length)
                    .await
                    .map_err(io_error("Failed to cut the target journal", &path))?;
                length
            }
            _ => actual_length,
        };

        let written = async {
            file.write_all(line.as_bytes()).await?;
            file.sync_data().await
        }
        .await;

        if let Err(err) = written {
            // The error of the append is the one worth reporting, a failed cut is retried by
            // the next append.
            if let Err(cut_err) = file.set_len(length).await {
                warn!(
                    journal = %path.display(),
                    error = %cut_err,
                    "failed to cut the journal after a failed append"
                );
            }
            inner.journal_lengths.insert(target.to_string(), length);

            return Err(io_error("Failed to append to the target journal", &path)(err));
        }

        inner
            .journal_lengths
            .insert(target.to_string(), length + line.len() as u64);

        Ok(())
    }
}

impl TargetStore for FileTableStore {
    async fn read_chain(&self, target: &str, key: &BusinessKey) -> CdcResult<VersionChain> {
        let inner = self.inner.lock().await;

        Ok(inner.tables.chain(target, key))
    }

    async fn commit(&self, target: &str, delta: ChainDelta) -> CdcResult<()> {
        let mut inner = self.inner.lock().await;

        // The chain is checked before anything is written, so the journal only holds valid
        // deltas.
        let chain = inner.tables.prepare(target, &delta)?;
        let key = delta.key.clone();
        Self::append(&mut inner, target, &JournalEntry::Delta { delta }).await?;
        inner.tables.publish(target, key, chain);

        Ok(())
    }

    async fn current_rows(&self, target: &str) -> CdcResult<Vec<TargetRow>> {
        let inner = self.inner.lock().await;

        Ok(inner.tables.current_rows(target))
    }

    async fn get_target_metadata(&self, target: &str) -> CdcResult<Option<TargetMetadata>> {
        let inner = self.inner.lock().await;

        Ok(inner.tables.metadata(target))
    }

    async fn store_target_metadata(&self, metadata: TargetMetadata) -> CdcResult<()> {
        let mut inner = self.inner.lock().await;

        let target = metadata.target.clone();
        Self::append(
            &mut inner,
            &target,
            &JournalEntry::Metadata {
                metadata: metadata.clone(),
            },
        )
        .await?;
        inner.tables.set_metadata(metadata);

        Ok(())
    }

    async fn truncate_target(&self, target: &str) -> CdcResult<()> {
        let mut inner = self.inner.lock().await;

        Self::append(&mut inner, target, &JournalEntry::Truncate).await?;
        inner.tables.truncate(target);

        Ok(())
    }
}

/// Returns the journal path of `target`, rejecting names that would escape the directory.
fn journal_path(directory: &Path, target: &str) -> CdcResult<PathBuf> {
    let valid = !target.is_empty()
        && target
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.')
        && !target.starts_with('.');
    if !valid {
        bail!(
            ErrorKind::ConfigError,
            "Invalid target name for a file store",
            format!("Target '{target}' may only contain ASCII letters, digits, '_', '-' and '.'")
        );
    }

    Ok(directory.join(format!("{target}.{JOURNAL_EXTENSION}")))
}

fn encode(entry: &JournalEntry) -> CdcResult<String> {
    let mut line = serde_json::to_string(entry).map_err(|err| {
        cdc_error!(
            ErrorKind::SerializationError,
            "Failed to encode a journal entry",
            source: err
        )
    })?;
    line.push('\n');

    Ok(line)
}

/// Writes the state of `target` as a compacted journal, returning its length.
async fn write_compacted(directory: &Path, target: &str, tables: &Tables) -> CdcResult<u64> {
    let path = journal_path(directory, target)?;

    let mut lines = String::new();
    if let Some(table) = tables.table(target) {
        if let Some(metadata) = &table.metadata {
            lines.push_str(&encode(&JournalEntry::Metadata {
                metadata: metadata.clone(),
            })?);
        }

        for (key, chain) in &table.chains {
            lines.push_str(&encode(&JournalEntry::Chain {
                key: key.clone(),
                chain: chain.clone(),
            })?);
        }
    }

    let temporary = path.with_extension("jsonl.tmp");
    let result = async {
        let mut file = fs::File::create(&temporary).await?;
        file.write_all(lines.as_bytes()).await?;
        file.sync_all().await?;
        drop(file);
        fs::rename(&temporary, &path).await?;

        // The rename is only durable once the directory entry is synced.
        #[cfg(unix)]
        fs::File::open(directory).await?.sync_all().await?;

        Ok::<(), io::Error>(())
    }
    .await;
    result.map_err(io_error("Failed to compact the target journal", &path))?;

    debug!(target_name = target, "compacted target journal");

    Ok(lines.len() as u64)
}

/// Builds a mapper of I/O failures on `path` to [`ErrorKind::StoreIoError`].
fn io_error(description: &'static str, path: &Path) -> impl FnOnce(io::Error) -> CdcError {
    let location = format!("Path '{}'", path.display());

    move |err| {
        cdc_error!(
            ErrorKind::StoreIoError,
            description,
            location,
            source: err
        )
    }
}

/// Replays the journal at `path` into `tables`.
///
/// Returns the number of applied entries and the length of the journal up to its last complete
/// entry. Only the last line may be unreadable. It is then cut from the file so later appends
/// start on a clean line.
async fn replay_journal(
    path: &Path,
    target: &str,
    tables: &mut Tables,
) -> CdcResult<(usize, u64)> {
    let content = fs::read_to_string(path)
        .await
        .map_err(io_error("Failed to read the target journal", path))?;
    let mut applied = 0;
    let mut valid_length = 0;
    let mut lines = content.split_inclusive('\n').peekable();

    while let Some(line) = lines.next() {
        let is_last = lines.peek().is_none();
        let text = line.trim();
        if text.is_empty() {
            valid_length += line.len();
            continue;
        }

        let parsed = serde_json::from_str::<JournalEntry>(text);

        // A last line without its newline was cut short by a crash, even if it parses.
        if is_last && (parsed.is_err() || !line.ends_with('\n')) {
            warn!(
                journal = %path.display(),
                "discarding torn trailing journal line"
            );
            let cut = async {
                let file = OpenOptions::new().write(true).open(path).await?;
                file.set_len(valid_length as u64).await?;
                file.sync_all().await
            }
            .await;
            cut.map_err(io_error("Failed to cut the torn journal line", path))?;
            break;
        }

        let entry = match parsed {
            Ok(entry) => entry,
            Err(err) => {
                bail!(
                    ErrorKind::DeserializationError,
                    "Corrupted target journal",
                    format!("Journal '{}' has an unreadable line", path.display()),
                    source: err
                );
            }
        };

        match entry {
            JournalEntry::Delta { delta } => tables.commit(target, &delta)?,
            JournalEntry::Chain { key, chain } => tables.publish(target, key, chain),
            JournalEntry::Metadata { metadata } => tables.set_metadata(metadata),
            JournalEntry::Truncate => tables.truncate(target),
        }

        valid_length += line.len();
        applied += 1;
    }

    Ok((applied, valid_length as u64))
}
