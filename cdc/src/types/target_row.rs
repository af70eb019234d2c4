use serde::{Deserialize, Serialize};

use crate::types::{BusinessKey, Cell, SequenceValue};

/// One version of a key in a target table.
///
/// `values` follow the target column order. A row is open while `effective_to` is [`None`],
/// and only an open row is current.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetRow {
    pub key: BusinessKey,
    pub values: Vec<Cell>,
    pub effective_from: SequenceValue,
    pub effective_to: Option<SequenceValue>,
    pub is_current: bool,
}

impl TargetRow {
    /// Creates an open, current row.
    pub fn open(key: BusinessKey, values: Vec<Cell>, effective_from: SequenceValue) -> Self {
        Self {
            key,
            values,
            effective_from,
            effective_to: None,
            is_current: true,
        }
    }

    /// Returns `true` if the row was effective at `at`.
    pub fn covers(&self, at: &SequenceValue) -> bool {
        if self.effective_from > *at {
            return false;
        }

        match &self.effective_to {
            Some(to) => at < to,
            None => true,
        }
    }
}
