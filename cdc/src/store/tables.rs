use std::collections::HashMap;

use crate::error::CdcResult;
use crate::types::{BusinessKey, ChainDelta, TargetMetadata, TargetRow, VersionChain};

/// Rows and metadata of one target.
#[derive(Debug, Clone, Default)]
pub(crate) struct TargetTable {
    pub(crate) chains: HashMap<BusinessKey, VersionChain>,
    pub(crate) metadata: Option<TargetMetadata>,
}

/// In-memory state of every target, shared by the store implementations.
#[derive(Debug, Default)]
pub(crate) struct Tables {
    targets: HashMap<String, TargetTable>,
}

impl Tables {
    pub(crate) fn chain(&self, target: &str, key: &BusinessKey) -> VersionChain {
        self.targets
            .get(target)
            .and_then(|table| table.chains.get(key))
            .cloned()
            .unwrap_or_default()
    }

    /// Computes the chain resulting from `delta` without publishing it.
    pub(crate) fn prepare(&self, target: &str, delta: &ChainDelta) -> CdcResult<VersionChain> {
        let mut chain = self.chain(target, &delta.key);
        chain.apply(delta);
        chain.validate(&delta.key)?;

        Ok(chain)
    }

    /// Publishes a chain computed by [`Tables::prepare`].
    pub(crate) fn publish(&mut self, target: &str, key: BusinessKey, chain: VersionChain) {
        let table = self.targets.entry(target.to_string()).or_default();
        if chain.is_empty() {
            table.chains.remove(&key);
        } else {
            table.chains.insert(key, chain);
        }
    }

    /// Applies `delta` after checking the resulting chain.
    pub(crate) fn commit(&mut self, target: &str, delta: &ChainDelta) -> CdcResult<()> {
        let chain = self.prepare(target, delta)?;
        self.publish(target, delta.key.clone(), chain);

        Ok(())
    }

    /// Returns the current rows of `target` ordered by key.
    pub(crate) fn current_rows(&self, target: &str) -> Vec<TargetRow> {
        let Some(table) = self.targets.get(target) else {
            return vec![];
        };

        let mut rows: Vec<TargetRow> = table
            .chains
            .values()
            .filter_map(|chain| chain.current().cloned())
            .collect();
        rows.sort_by_cached_key(|row| row.key.to_string());

        rows
    }

    pub(crate) fn metadata(&self, target: &str) -> Option<TargetMetadata> {
        self.targets
            .get(target)
            .and_then(|table| table.metadata.clone())
    }

    pub(crate) fn set_metadata(&mut self, metadata: TargetMetadata) {
        let table = self.targets.entry(metadata.target.clone()).or_default();
        table.metadata = Some(metadata);
    }

    pub(crate) fn truncate(&mut self, target: &str) {
        self.targets.remove(target);
    }

    pub(crate) fn table(&self, target: &str) -> Option<&TargetTable> {
        self.targets.get(target)
    }
}
