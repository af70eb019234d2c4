use std::sync::Arc;
use tokio::sync::Mutex;

use crate::error::CdcResult;
use crate::store::base::TargetStore;
use crate::store::tables::Tables;
use crate::types::{BusinessKey, ChainDelta, TargetMetadata, TargetRow, VersionChain};

/// In-memory storage of target tables.
///
/// Reads return copies of the committed chains, so readers never observe a partially applied
/// commit. Everything is lost when the store is dropped.
#[derive(Debug, Clone, Default)]
pub struct MemoryTableStore {
    inner: Arc<Mutex<Tables>>,
}

impl MemoryTableStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TargetStore for MemoryTableStore {
    async fn read_chain(&self, target: &str, key: &BusinessKey) -> CdcResult<VersionChain> {
        let inner = self.inner.lock().await;

        Ok(inner.chain(target, key))
    }

    async fn commit(&self, target: &str, delta: ChainDelta) -> CdcResult<()> {
        let mut inner = self.inner.lock().await;

        inner.commit(target, &delta)
    }

    async fn current_rows(&self, target: &str) -> CdcResult<Vec<TargetRow>> {
        let inner = self.inner.lock().await;

        Ok(inner.current_rows(target))
    }

    async fn get_target_metadata(&self, target: &str) -> CdcResult<Option<TargetMetadata>> {
        let inner = self.inner.lock().await;

        Ok(inner.metadata(target))
    }

    async fn store_target_metadata(&self, metadata: TargetMetadata) -> CdcResult<()> {
        let mut inner = self.inner.lock().await;
        inner.set_metadata(metadata);

        Ok(())
    }

    async fn truncate_target(&self, target: &str) -> CdcResult<()> {
        let mut inner = self.inner.lock().await;
        inner.truncate(target);

        Ok(())
    }
}
