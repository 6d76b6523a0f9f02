//! Timestamp encoding.
//!
//! Timestamps are stored as fixed-width RFC3339 UTC strings with millisecond
//! precision, which keeps lexicographic and chronological order identical so
//! range predicates work directly in SQL.

use chrono::{DateTime, SecondsFormat, Utc};

use crate::error::{PersistenceError, Result};

pub fn format_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn parse_ts(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| PersistenceError::InvalidTimestamp(s.to_string()))
}

pub fn parse_opt_ts(s: Option<String>) -> Result<Option<DateTime<Utc>>> {
    s.as_deref().map(parse_ts).transpose()
}
