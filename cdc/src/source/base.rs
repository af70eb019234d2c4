use std::future::Future;

use crate::error::CdcResult;
use crate::types::{ChangeRecord, TableSchema};

/// A batch of records read from a source.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceBatch {
    /// Records in arrival order.
    pub records: Vec<ChangeRecord>,
    /// Offset to resume reading from.
    pub next_offset: u64,
}

impl SourceBatch {
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Ordered, offset-addressable stream of change records.
///
/// Offsets strictly increase with arrival and reading from the same offset returns the same
/// records, so a target can resume from its committed watermark.
pub trait SourceReader {
    /// Returns the schema of the records.
    fn table_schema(&self) -> &TableSchema;

    /// Reads at most `max` records starting at `from_offset`.
    ///
    /// An empty batch means the source is currently exhausted.
    fn read_batch(
        &self,
        from_offset: u64,
        max: usize,
    ) -> impl Future<Output = CdcResult<SourceBatch>> + Send;
}
