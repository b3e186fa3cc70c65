//! Timestamp utilities
//!
//! Timestamps are stored as RFC 3339 text in UTC.

use chrono::{DateTime, SecondsFormat, Utc};

use crate::{Error, Result};

/// SQL expression producing the current time in the stored format
pub const SQL_NOW: &str = "strftime('%Y-%m-%dT%H:%M:%fZ','now')";

/// Get current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Format a timestamp for storage
pub fn to_stored(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parse a stored timestamp column
pub fn parse_stored(entity: &'static str, column: &str, s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::Internal(format!("{} {} holds malformed timestamp {:?}: {}", entity, column, s, e)))
}
