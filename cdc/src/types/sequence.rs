use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::bail;
use crate::error::{CdcResult, ErrorKind};
use crate::types::Cell;

/// Totally ordered value of the sequencing column.
///
/// Within one target every value has the same variant, decided by the column type at
/// registration.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SequenceValue {
    Int(i64),
    Date(NaiveDate),
    Timestamp(DateTime<Utc>),
    Text(String),
}

impl SequenceValue {
    /// Converts a cell of the sequencing column.
    ///
    /// Returns [`None`] for null cells. Naive timestamps are interpreted as UTC.
    pub fn from_cell(cell: &Cell) -> CdcResult<Option<SequenceValue>> {
        let value = match cell {
            Cell::Null => return Ok(None),
            Cell::I32(value) => SequenceValue::Int(i64::from(*value)),
            Cell::I64(value) => SequenceValue::Int(*value),
            Cell::Date(value) => SequenceValue::Date(*value),
            Cell::Timestamp(value) => SequenceValue::Timestamp(value.and_utc()),
            Cell::TimestampTz(value) => SequenceValue::Timestamp(*value),
            Cell::String(value) => SequenceValue::Text(value.clone()),
            other => {
                bail!(
                    ErrorKind::InvalidSequenceColumn,
                    "Value cannot be used as a sequence",
                    format!("Cell {other} has no total order")
                );
            }
        };

        Ok(Some(value))
    }
}

impl fmt::Display for SequenceValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SequenceValue::Int(value) => write!(f, "{value}"),
            SequenceValue::Date(value) => write!(f, "{value}"),
            SequenceValue::Timestamp(value) => write!(f, "{}", value.to_rfc3339()),
            SequenceValue::Text(value) => write!(f, "{value}"),
        }
    }
}
