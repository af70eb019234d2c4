use serde::{Deserialize, Serialize};

use crate::types::Cell;

static NULL_CELL: Cell = Cell::Null;

/// Kind of change carried by a [`ChangeRecord`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeOperation {
    /// Insert or update of the key.
    Upsert,
    /// Deletion of the key.
    Delete,
}

/// One row read from a source.
///
/// `values` follow the source column order. `offset` is the position of the record in the
/// source stream and strictly increases with arrival.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeRecord {
    pub values: Vec<Cell>,
    pub operation: ChangeOperation,
    pub offset: u64,
}

impl ChangeRecord {
    pub fn upsert(offset: u64, values: Vec<Cell>) -> Self {
        Self {
            values,
            operation: ChangeOperation::Upsert,
            offset,
        }
    }

    pub fn delete(offset: u64, values: Vec<Cell>) -> Self {
        Self {
            values,
            operation: ChangeOperation::Delete,
            offset,
        }
    }

    /// Returns the cell at `index`, [`Cell::Null`] when the record is shorter than the schema.
    pub fn value(&self, index: usize) -> &Cell {
        self.values.get(index).unwrap_or(&NULL_CELL)
    }
}
