//! Timestamp expressions
//!
//! Source timestamps are integer milliseconds since the Unix epoch. This
//! module turns user-written expressions into that form and back into
//! something readable, and produces the date strings PDF metadata expects.

use std::time::SystemTime;

use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, TimeZone, Utc};
use crate::error::{Error, Result};

/// Parse a timestamp expression into milliseconds since the epoch
///
/// Supported formats:
/// - `"now"` → current time
/// - `"1700000000000"` → raw milliseconds (may be negative)
/// - `"2024-11-20T10:30:00Z"` / `"2024-11-20T10:30:00+02:00"` → RFC 3339
/// - `"2024-11-20T10:30:00"`, `"2024-11-20 10:30"` → local time
/// - `"2024-11-20"` → local midnight
pub fn parse_timestamp(expr: &str) -> Result<i64> {
    let expr = expr.trim();

    if expr.is_empty() {
        return Err(Error::InvalidTimestamp("empty expression".to_string()));
    }

    if expr.eq_ignore_ascii_case("now") {
        return Ok(Utc::now().timestamp_millis());
    }

    if let Ok(millis) = expr.parse::<i64>() {
        return Ok(millis);
    }

    if let Ok(datetime) = DateTime::parse_from_rfc3339(expr) {
        return Ok(datetime.timestamp_millis());
    }

    for format in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(expr, format) {
            return local_millis(naive, expr);
        }
    }

    if let Ok(date) = NaiveDate::parse_from_str(expr, "%Y-%m-%d") {
        let midnight = date
            .and_hms_opt(0, 0, 0)
            .ok_or_else(|| Error::InvalidTimestamp(expr.to_string()))?;
        return local_millis(midnight, expr);
    }

    Err(Error::InvalidTimestamp(format!("Unable to parse timestamp: {}", expr)))
}

/// Resolve a wall-clock time in the local zone; ambiguous times take the earlier instant
fn local_millis(naive: NaiveDateTime, expr: &str) -> Result<i64> {
    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|datetime| datetime.timestamp_millis())
        .ok_or_else(|| Error::InvalidTimestamp(format!("Nonexistent local time: {}", expr)))
}

/// Milliseconds since the epoch for a file-system time
///
/// Times before the epoch come out negative.
pub fn from_system_time(time: SystemTime) -> i64 {
    match time.duration_since(SystemTime::UNIX_EPOCH) {
        Ok(after) => after.as_millis() as i64,
        Err(before) => -(before.duration().as_millis() as i64),
    }
}

/// Format a timestamp as RFC 3339 in UTC, e.g. `2024-11-20T10:30:00.000Z`
pub fn format_timestamp(millis: i64) -> String {
    match Utc.timestamp_millis_opt(millis).single() {
        Some(datetime) => datetime.to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
        None => format!("{}ms", millis),
    }
}

/// Format a moment as a PDF date string: `D:YYYYMMDDHHmmSSZ`
pub fn pdf_date(datetime: &DateTime<Utc>) -> String {
    datetime.format("D:%Y%m%d%H%M%SZ").to_string()
}
