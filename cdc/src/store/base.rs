use std::future::Future;

use crate::error::CdcResult;
use crate::types::{BusinessKey, ChainDelta, SequenceValue, TargetMetadata, TargetRow, VersionChain};

/// Storage of target tables and their metadata.
///
/// Tables are partitioned by business key. A commit replaces the chain of one key atomically
/// and readers only ever observe committed chains.
///
/// Implementations must be safe to share between the per-key merge tasks of a worker.
pub trait TargetStore {
    /// Returns the chain of `key` in `target`, empty if the key was never written.
    fn read_chain(
        &self,
        target: &str,
        key: &BusinessKey,
    ) -> impl Future<Output = CdcResult<VersionChain>> + Send;

    /// Returns the current row of `key`, if the key is visible in the current view.
    fn read_current(
        &self,
        target: &str,
        key: &BusinessKey,
    ) -> impl Future<Output = CdcResult<Option<TargetRow>>> + Send
    where
        Self: Sync,
    {
        async move {
            let chain = self.read_chain(target, key).await?;
            Ok(chain.current().cloned())
        }
    }

    /// Returns the row of `key` effective at `at`.
    fn read_as_of(
        &self,
        target: &str,
        key: &BusinessKey,
        at: &SequenceValue,
    ) -> impl Future<Output = CdcResult<Option<TargetRow>>> + Send
    where
        Self: Sync,
    {
        async move {
            let chain = self.read_chain(target, key).await?;
            Ok(chain.as_of(at).cloned())
        }
    }

    /// Returns every version of `key` ordered by `effective_from`.
    fn read_history(
        &self,
        target: &str,
        key: &BusinessKey,
    ) -> impl Future<Output = CdcResult<Vec<TargetRow>>> + Send
    where
        Self: Sync,
    {
        async move {
            let chain = self.read_chain(target, key).await?;
            Ok(chain.into_rows())
        }
    }

    /// Applies `delta` to the chain of its key.
    ///
    /// The resulting chain is checked against the chain invariants before it is published. On
    /// failure the chain is left untouched. Committing the same delta twice has the effect of
    /// committing it once.
    fn commit(&self, target: &str, delta: ChainDelta) -> impl Future<Output = CdcResult<()>> + Send;

    /// Returns the current row of every visible key.
    fn current_rows(&self, target: &str) -> impl Future<Output = CdcResult<Vec<TargetRow>>> + Send;

    /// Returns the metadata of `target`.
    fn get_target_metadata(
        &self,
        target: &str,
    ) -> impl Future<Output = CdcResult<Option<TargetMetadata>>> + Send;

    /// Stores the metadata of a target, replacing the previous one.
    fn store_target_metadata(
        &self,
        metadata: TargetMetadata,
    ) -> impl Future<Output = CdcResult<()>> + Send;

    /// Removes every row and the metadata of `target`.
    fn truncate_target(&self, target: &str) -> impl Future<Output = CdcResult<()>> + Send;
}
