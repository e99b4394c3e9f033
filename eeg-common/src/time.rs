//! Timestamp utilities

use chrono::{DateTime, TimeZone, Utc};

use crate::{Error, Result};

/// Get current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Microseconds since the Unix epoch (time-series key resolution)
pub fn to_micros(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_micros()
}

/// Inverse of [`to_micros`]
pub fn from_micros(us: i64) -> DateTime<Utc> {
    Utc.timestamp_micros(us)
        .single()
        .unwrap_or_else(|| Utc.timestamp_nanos(0))
}

/// Parse an RFC 3339 column value written by the store
pub fn parse_rfc3339(column: &str, value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::Internal(format!("Failed to parse {}: {}", column, e)))
}

/// Parse an optional RFC 3339 column value
pub fn parse_rfc3339_opt(column: &str, value: Option<String>) -> Result<Option<DateTime<Utc>>> {
    value.map(|s| parse_rfc3339(column, &s)).transpose()
}
