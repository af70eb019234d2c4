use cdc::conversions::json::cell_from_json;
use cdc::error::{CdcResult, ErrorKind};
use cdc::source::{SourceBatch, SourceReader};
use cdc::types::{Cell, ChangeOperation, ChangeRecord, TableSchema};
use cdc::{bail, cdc_error};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::config::SourceConfig;

/// Source reading change records from a newline-delimited JSON file.
///
/// The offset of a record is its line number, starting at zero. Only lines terminated by a
/// newline are read, so a line still being appended is picked up by a later poll.
#[derive(Debug, Clone)]
pub struct JsonLinesSource {
    path: PathBuf,
    schema: Arc<TableSchema>,
    operation_field: Option<String>,
}

impl JsonLinesSource {
    pub fn new(config: &SourceConfig) -> Self {
        Self {
            path: config.path.clone(),
            schema: Arc::new(TableSchema::new(config.name.clone(), config.columns.clone())),
            operation_field: config.operation_field.clone(),
        }
    }

    fn parse_line(&self, offset: u64, line: &str) -> CdcResult<ChangeRecord> {
        let value: Value = serde_json::from_str(line).map_err(|err| {
            cdc_error!(
                ErrorKind::InvalidData,
                "Unreadable source record",
                format!("Line {offset} of '{}' is not valid JSON", self.path.display()),
                source: err
            )
        })?;

        let Value::Object(fields) = value else {
            bail!(
                ErrorKind::InvalidData,
                "Unreadable source record",
                format!("Line {offset} of '{}' is not a JSON object", self.path.display())
            );
        };

        let operation = match &self.operation_field {
            Some(field) => match fields.get(field) {
                None | Some(Value::Null) => ChangeOperation::Upsert,
                Some(Value::String(op)) if op.eq_ignore_ascii_case("upsert") => {
                    ChangeOperation::Upsert
                }
                Some(Value::String(op)) if op.eq_ignore_ascii_case("delete") => {
                    ChangeOperation::Delete
                }
                Some(other) => {
                    bail!(
                        ErrorKind::InvalidData,
                        "Unknown record operation",
                        format!(
                            "Line {offset} of '{}' has operation {other}, expected 'upsert' or 'delete'",
                            self.path.display()
                        )
                    );
                }
            },
            None => ChangeOperation::Upsert,
        };

        let mut values = Vec::with_capacity(self.schema.len());
        for column in &self.schema.column_schemas {
            let cell = match fields.get(&column.name) {
                Some(value) => cell_from_json(value, column.typ)?,
                None => Cell::Null,
            };
            values.push(cell);
        }
        self.schema.check_row(&values)?;

        Ok(ChangeRecord {
            values,
            operation,
            offset,
        })
    }
}

impl SourceReader for JsonLinesSource {
    fn table_schema(&self) -> &TableSchema {
        &self.schema
    }

    async fn read_batch(&self, from_offset: u64, max: usize) -> CdcResult<SourceBatch> {
        let file = File::open(&self.path).await.map_err(|err| {
            cdc_error!(
                ErrorKind::SourceReadFailed,
                "Failed to open source file",
                format!("Source '{}' at '{}'", self.schema.name, self.path.display()),
                source: err
            )
        })?;

        let mut reader = BufReader::new(file);
        let mut records = Vec::new();
        let mut offset = 0u64;
        let mut line = String::new();

        while records.len() < max {
            line.clear();
            let read = reader.read_line(&mut line).await.map_err(|err| {
                cdc_error!(
                    ErrorKind::SourceReadFailed,
                    "Failed to read source file",
                    format!("Source '{}' at '{}'", self.schema.name, self.path.display()),
                    source: err
                )
            })?;

            if read == 0 || !line.ends_with('\n') {
                break;
            }

            if offset >= from_offset && !line.trim().is_empty() {
                records.push(self.parse_line(offset, line.trim())?);
            }
            offset += 1;
        }

        Ok(SourceBatch {
            records,
            next_offset: offset.max(from_offset),
        })
    }
}
