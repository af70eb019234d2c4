use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};

use crate::types::Cell;

/// Business key of a record: the values of the key columns in key order.
///
/// Composite keys hold one cell per key column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BusinessKey {
    values: Vec<Cell>,
}

// Float and json columns cannot be keys, see `ColumnType::can_key`. Every other cell type
// compares reflexively and consistently with `cell_hash`.
impl Eq for BusinessKey {}

impl BusinessKey {
    pub fn new(values: Vec<Cell>) -> Self {
        Self { values }
    }

    /// Extracts the key from `row` using the positions of the key columns.
    pub fn from_row(row: &[Cell], key_indices: &[usize]) -> Self {
        let values = key_indices
            .iter()
            .map(|&index| row.get(index).cloned().unwrap_or(Cell::Null))
            .collect();

        Self { values }
    }

    pub fn values(&self) -> &[Cell] {
        &self.values
    }

    /// Returns `true` if any key cell is null.
    pub fn has_null(&self) -> bool {
        self.values.iter().any(Cell::is_null)
    }
}

impl Hash for BusinessKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        for value in &self.values {
            cell_hash(value, state);
        }
    }
}

/// Hashes a cell deterministically, consistent with its [`PartialEq`] implementation.
fn cell_hash<H: Hasher>(cell: &Cell, state: &mut H) {
    std::mem::discriminant(cell).hash(state);

    match cell {
        Cell::Null => {}
        Cell::Bool(v) => v.hash(state),
        Cell::I32(v) => v.hash(state),
        Cell::I64(v) => v.hash(state),
        Cell::F64(v) => v.to_bits().hash(state),
        Cell::String(v) => v.hash(state),
        Cell::Date(v) => v.hash(state),
        Cell::Timestamp(v) => v.hash(state),
        Cell::TimestampTz(v) => v.hash(state),
        Cell::Json(v) => v.to_string().hash(state),
    }
}

impl fmt::Display for BusinessKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let [single] = self.values.as_slice() {
            return write!(f, "{single}");
        }

        f.write_str("(")?;
        for (index, value) in self.values.iter().enumerate() {
            if index > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{value}")?;
        }
        f.write_str(")")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::hash_map::DefaultHasher;

    fn hash_key(key: &BusinessKey) -> u64 {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        hasher.finish()
    }

    #[test]
    fn equal_keys_hash_equally() {
        let a = BusinessKey::new(vec![Cell::I64(1), Cell::String("spotify".to_string())]);
        let b = BusinessKey::new(vec![Cell::I64(1), Cell::String("spotify".to_string())]);

        assert_eq!(a, b);
        assert_eq!(hash_key(&a), hash_key(&b));
    }

    #[test]
    fn key_types_are_not_confused() {
        let a = BusinessKey::new(vec![Cell::I32(1)]);
        let b = BusinessKey::new(vec![Cell::I64(1)]);

        assert_ne!(a, b);
    }

    #[test]
    fn composite_key_from_row() {
        let row = vec![
            Cell::I64(42),
            Cell::String("name".to_string()),
            Cell::Bool(true),
        ];

        let key = BusinessKey::from_row(&row, &[1, 0]);
        assert_eq!(
            key.values(),
            &[Cell::String("name".to_string()), Cell::I64(42)]
        );
        assert_eq!(key.to_string(), "('name', 42)");
        assert!(!key.has_null());
    }

    #[test]
    fn missing_key_cells_are_null() {
        let key = BusinessKey::from_row(&[Cell::I64(1)], &[0, 3]);
        assert!(key.has_null());
    }
}
