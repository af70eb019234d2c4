use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

use crate::bail;
use crate::error::{CdcResult, ErrorKind};

const DATE_FORMAT: &str = "%Y-%m-%d";
const TIMESTAMP_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"];

pub fn parse_date(s: &str) -> CdcResult<NaiveDate> {
    Ok(NaiveDate::parse_from_str(s, DATE_FORMAT)?)
}

/// Parses a timestamp without time zone.
///
/// Accepts a space or `T` separator and a bare date, which is read as midnight.
pub fn parse_timestamp(s: &str) -> CdcResult<NaiveDateTime> {
    for format in TIMESTAMP_FORMATS {
        if let Ok(timestamp) = NaiveDateTime::parse_from_str(s, format) {
            return Ok(timestamp);
        }
    }

    if let Ok(date) = NaiveDate::parse_from_str(s, DATE_FORMAT) {
        if let Some(timestamp) = date.and_hms_opt(0, 0, 0) {
            return Ok(timestamp);
        }
    }

    bail!(
        ErrorKind::ConversionError,
        "Invalid timestamp value",
        format!("Timestamp '{s}' is neither RFC 3339 nor 'YYYY-MM-DD[ HH:MM:SS]'")
    );
}

/// Parses a timestamp with time zone.
///
/// RFC 3339 values keep their offset, values without offset are read as UTC.
pub fn parse_timestamptz(s: &str) -> CdcResult<DateTime<Utc>> {
    if let Ok(timestamp) = DateTime::parse_from_rfc3339(s) {
        return Ok(timestamp.with_timezone(&Utc));
    }

    Ok(parse_timestamp(s)?.and_utc())
}
