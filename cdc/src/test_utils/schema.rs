use config::shared::{ExpectationAction, ExpectationConfig, HistoryMode, TargetConfig};

use crate::types::{BusinessKey, Cell, ColumnSchema, ColumnType, SequenceValue, TableSchema};

/// Name of the source used by most tests.
pub const ITEMS_SOURCE: &str = "items_stg";

/// Schema of [`ITEMS_SOURCE`]: `id`, `seq`, `value` and `note`.
///
/// Every column is nullable so tests can feed records the validator or the sequencer rejects.
pub fn items_schema() -> TableSchema {
    TableSchema::new(
        ITEMS_SOURCE,
        vec![
            ColumnSchema::new("id", ColumnType::I64, true),
            ColumnSchema::new("seq", ColumnType::I64, true),
            ColumnSchema::new("value", ColumnType::String, true),
            ColumnSchema::new("note", ColumnType::String, true),
        ],
    )
}

/// Builds a row of [`items_schema`].
pub fn item(id: i64, seq: i64, value: &str, note: &str) -> Vec<Cell> {
    item_with(Some(id), Some(seq), Some(value), Some(note))
}

/// Builds a row of [`items_schema`] with optional cells.
pub fn item_with(
    id: Option<i64>,
    seq: Option<i64>,
    value: Option<&str>,
    note: Option<&str>,
) -> Vec<Cell> {
    vec![
        id.map_or(Cell::Null, Cell::I64),
        seq.map_or(Cell::Null, Cell::I64),
        value.map_or(Cell::Null, |value| Cell::String(value.to_string())),
        note.map_or(Cell::Null, |note| Cell::String(note.to_string())),
    ]
}

/// A target over [`ITEMS_SOURCE`] keyed by `id` and sequenced by `seq`, running once.
pub fn items_target(name: &str, history_mode: HistoryMode) -> TargetConfig {
    TargetConfig {
        name: name.to_string(),
        source: ITEMS_SOURCE.to_string(),
        keys: vec!["id".to_string()],
        sequence_by: "seq".to_string(),
        history_mode,
        track_history_except_column_list: vec![],
        except_column_list: vec![],
        expectations: vec![],
        apply_as_deletes: None,
        ignore_null_updates: false,
        once: true,
        full_refresh: false,
    }
}

pub fn expectation(name: &str, constraint: &str, action: ExpectationAction) -> ExpectationConfig {
    ExpectationConfig {
        name: name.to_string(),
        constraint: constraint.to_string(),
        action,
    }
}

pub fn key(id: i64) -> BusinessKey {
    BusinessKey::new(vec![Cell::I64(id)])
}

pub fn seq(value: i64) -> SequenceValue {
    SequenceValue::Int(value)
}
