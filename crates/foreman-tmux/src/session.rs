//! Tmux session listing entries.

use chrono::{DateTime, TimeZone, Utc};

use crate::{Result, TmuxError};

/// A running tmux session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TmuxSession {
    /// Session name.
    pub name: String,
    /// When the session was created.
    pub created_at: DateTime<Utc>,
}

impl TmuxSession {
    /// Parse a `list-sessions` line.
    ///
    /// Expected format: `session_name:created_timestamp`. Session names may
    /// not contain `:`, so the last colon separates the fields.
    pub fn parse(line: &str) -> Result<Self> {
        let invalid = || TmuxError::InvalidListing(line.to_string());
        let (name, timestamp) = line.rsplit_once(':').ok_or_else(invalid)?;
        let timestamp: i64 = timestamp.trim().parse().map_err(|_| invalid())?;
        let created_at = Utc
            .timestamp_opt(timestamp, 0)
            .single()
            .ok_or_else(invalid)?;

        Ok(Self {
            name: name.to_string(),
            created_at,
        })
    }
}
