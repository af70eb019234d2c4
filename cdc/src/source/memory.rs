use std::sync::Arc;
use tokio::sync::RwLock;

use crate::error::CdcResult;
use crate::source::base::{SourceBatch, SourceReader};
use crate::types::{Cell, ChangeOperation, ChangeRecord, TableSchema};

/// In-memory source that can be appended to while targets read from it.
///
/// Clones share the same records. The offset of a record is its position in the source.
#[derive(Debug, Clone)]
pub struct MemorySource {
    schema: Arc<TableSchema>,
    records: Arc<RwLock<Vec<ChangeRecord>>>,
}

impl MemorySource {
    pub fn new(schema: TableSchema) -> Self {
        Self {
            schema: Arc::new(schema),
            records: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Appends a record and returns its offset.
    pub async fn push(&self, operation: ChangeOperation, values: Vec<Cell>) -> CdcResult<u64> {
        self.schema.check_row(&values)?;

        let mut records = self.records.write().await;
        let offset = records.len() as u64;
        records.push(ChangeRecord {
            values,
            operation,
            offset,
        });

        Ok(offset)
    }

    /// Appends an upsert.
    pub async fn upsert(&self, values: Vec<Cell>) -> CdcResult<u64> {
        self.push(ChangeOperation::Upsert, values).await
    }

    /// Appends a delete.
    pub async fn delete(&self, values: Vec<Cell>) -> CdcResult<u64> {
        self.push(ChangeOperation::Delete, values).await
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

impl SourceReader for MemorySource {
    fn table_schema(&self) -> &TableSchema {
        &self.schema
    }

    async fn read_batch(&self, from_offset: u64, max: usize) -> CdcResult<SourceBatch> {
        let records = self.records.read().await;

        let start = usize::try_from(from_offset)
            .unwrap_or(usize::MAX)
            .min(records.len());
        let end = start.saturating_add(max).min(records.len());
        let batch = records[start..end].to_vec();

        Ok(SourceBatch {
            records: batch,
            next_offset: from_offset.max(end as u64),
        })
    }
}
