use serde::{Deserialize, Serialize};
use std::fmt;

use crate::bail;
use crate::error::{CdcResult, ErrorKind};
use crate::types::Cell;

/// Logical type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    Bool,
    I32,
    I64,
    F64,
    String,
    Date,
    Timestamp,
    TimestampTz,
    Json,
}

impl ColumnType {
    /// Returns `true` for integer and floating point types.
    pub fn is_numeric(&self) -> bool {
        matches!(self, ColumnType::I32 | ColumnType::I64 | ColumnType::F64)
    }

    /// Returns `true` for types that can order the changes of a key.
    ///
    /// Floats are excluded since equality on them is unreliable, booleans and json have no
    /// meaningful order.
    pub fn can_sequence(&self) -> bool {
        matches!(
            self,
            ColumnType::I32
                | ColumnType::I64
                | ColumnType::String
                | ColumnType::Date
                | ColumnType::Timestamp
                | ColumnType::TimestampTz
        )
    }

    /// Returns `true` for types whose equality agrees with their hash, as business keys need.
    pub fn can_key(&self) -> bool {
        !matches!(self, ColumnType::F64 | ColumnType::Json)
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ColumnType::Bool => "bool",
            ColumnType::I32 => "i32",
            ColumnType::I64 => "i64",
            ColumnType::F64 => "f64",
            ColumnType::String => "string",
            ColumnType::Date => "date",
            ColumnType::Timestamp => "timestamp",
            ColumnType::TimestampTz => "timestamp_tz",
            ColumnType::Json => "json",
        };

        f.write_str(name)
    }
}

/// Schema of a single column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSchema {
    /// The name of the column.
    pub name: String,
    /// The type of the column.
    pub typ: ColumnType,
    /// Whether the column can contain null values.
    #[serde(default = "default_nullable")]
    pub nullable: bool,
}

impl ColumnSchema {
    pub fn new(name: impl Into<String>, typ: ColumnType, nullable: bool) -> ColumnSchema {
        Self {
            name: name.into(),
            typ,
            nullable,
        }
    }
}

fn default_nullable() -> bool {
    true
}

/// Schema of a source or target table: a name and its ordered columns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    /// The name of the table.
    pub name: String,
    /// The schemas of all columns in table order.
    pub column_schemas: Vec<ColumnSchema>,
}

impl TableSchema {
    pub fn new(name: impl Into<String>, column_schemas: Vec<ColumnSchema>) -> Self {
        Self {
            name: name.into(),
            column_schemas,
        }
    }

    /// Returns the position of the column named `name`.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.column_schemas
            .iter()
            .position(|column| column.name == name)
    }

    /// Returns the schema of the column named `name`.
    pub fn column(&self, name: &str) -> Option<&ColumnSchema> {
        self.column_schemas.iter().find(|column| column.name == name)
    }

    /// Returns the number of columns.
    pub fn len(&self) -> usize {
        self.column_schemas.len()
    }

    /// Returns `true` if the table has no columns.
    pub fn is_empty(&self) -> bool {
        self.column_schemas.is_empty()
    }

    /// Checks that `values` has one cell per column and no null in a non-nullable column.
    pub fn check_row(&self, values: &[Cell]) -> CdcResult<()> {
        if values.len() != self.len() {
            bail!(
                ErrorKind::InvalidData,
                "Record does not match the source schema",
                format!(
                    "Source '{}' has {} columns but the record has {}",
                    self.name,
                    self.len(),
                    values.len()
                )
            );
        }

        for (column, value) in self.column_schemas.iter().zip(values) {
            if !column.nullable && value.is_null() {
                bail!(
                    ErrorKind::InvalidData,
                    "Null value in a non-nullable column",
                    format!("Column `{}` of source '{}' is not nullable", column.name, self.name)
                );
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn column_lookup_by_name() {
        let schema = TableSchema::new(
            "users_stg",
            vec![
                ColumnSchema::new("user_id", ColumnType::I64, false),
                ColumnSchema::new("email", ColumnType::String, true),
            ],
        );

        assert_eq!(schema.column_index("email"), Some(1));
        assert_eq!(schema.column("user_id").map(|c| c.typ), Some(ColumnType::I64));
        assert!(schema.column("emial").is_none());
    }

    #[test]
    fn rows_are_checked_against_nullability() {
        let schema = TableSchema::new(
            "users_stg",
            vec![
                ColumnSchema::new("user_id", ColumnType::I64, false),
                ColumnSchema::new("email", ColumnType::String, true),
            ],
        );

        assert!(schema.check_row(&[Cell::I64(1), Cell::Null]).is_ok());
        assert_eq!(
            schema.check_row(&[Cell::Null, Cell::Null]).unwrap_err().kind(),
            ErrorKind::InvalidData
        );
        assert!(schema.check_row(&[Cell::I64(1)]).is_err());
    }

    #[test]
    fn only_ordered_types_can_sequence() {
        assert!(ColumnType::Timestamp.can_sequence());
        assert!(ColumnType::I32.can_sequence());
        assert!(!ColumnType::F64.can_sequence());
        assert!(!ColumnType::Json.can_sequence());
        assert!(!ColumnType::Bool.can_sequence());
    }
}
