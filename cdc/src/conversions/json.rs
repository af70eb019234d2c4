use serde_json::Value;

use crate::bail;
use crate::conversions::text::{parse_date, parse_timestamp, parse_timestamptz};
use crate::error::{CdcResult, ErrorKind};
use crate::types::{Cell, ColumnType};

/// Converts a JSON value into a cell of type `typ`.
///
/// JSON `null` becomes [`Cell::Null`] for every type. Dates and timestamps are read from
/// strings, integers may be given as strings.
pub fn cell_from_json(value: &Value, typ: ColumnType) -> CdcResult<Cell> {
    if value.is_null() {
        return Ok(Cell::Null);
    }

    let cell = match (typ, value) {
        (ColumnType::Bool, Value::Bool(value)) => Cell::Bool(*value),
        (ColumnType::I32, Value::Number(number)) => match number.as_i64() {
            Some(value) => Cell::I32(i32::try_from(value).map_err(|_| {
                crate::cdc_error!(
                    ErrorKind::ConversionError,
                    "Integer out of range",
                    format!("Value {value} does not fit in a 32-bit integer")
                )
            })?),
            None => return mismatch(typ, value),
        },
        (ColumnType::I32, Value::String(s)) => Cell::I32(parse_integer(s)?),
        (ColumnType::I64, Value::Number(number)) => match number.as_i64() {
            Some(value) => Cell::I64(value),
            None => return mismatch(typ, value),
        },
        (ColumnType::I64, Value::String(s)) => Cell::I64(parse_integer(s)?),
        (ColumnType::F64, Value::Number(number)) => match number.as_f64() {
            Some(value) => Cell::F64(value),
            None => return mismatch(typ, value),
        },
        (ColumnType::String, Value::String(s)) => Cell::String(s.clone()),
        (ColumnType::Date, Value::String(s)) => Cell::Date(parse_date(s)?),
        (ColumnType::Timestamp, Value::String(s)) => Cell::Timestamp(parse_timestamp(s)?),
        (ColumnType::TimestampTz, Value::String(s)) => Cell::TimestampTz(parse_timestamptz(s)?),
        (ColumnType::Json, value) => Cell::Json(value.clone()),
        (typ, value) => return mismatch(typ, value),
    };

    Ok(cell)
}

/// Converts a cell into its JSON representation.
pub fn cell_to_json(cell: &Cell) -> Value {
    match cell {
        Cell::Null => Value::Null,
        Cell::Bool(value) => Value::Bool(*value),
        Cell::I32(value) => Value::from(*value),
        Cell::I64(value) => Value::from(*value),
        Cell::F64(value) => Value::from(*value),
        Cell::String(value) => Value::String(value.clone()),
        Cell::Date(value) => Value::String(value.to_string()),
        Cell::Timestamp(value) => Value::String(value.format("%Y-%m-%d %H:%M:%S%.f").to_string()),
        Cell::TimestampTz(value) => Value::String(value.to_rfc3339()),
        Cell::Json(value) => value.clone(),
    }
}

fn parse_integer<T: std::str::FromStr>(s: &str) -> CdcResult<T> {
    match s.trim().parse::<T>() {
        Ok(value) => Ok(value),
        Err(_) => bail!(
            ErrorKind::ConversionError,
            "Invalid integer value",
            format!("Value '{s}' is not an integer in range")
        ),
    }
}

fn mismatch(typ: ColumnType, value: &Value) -> CdcResult<Cell> {
    bail!(
        ErrorKind::ConversionError,
        "JSON value does not match the column type",
        format!("Cannot read {value} as {typ}")
    );
}
