//! Usage snapshot history.

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};

use foreman_models::{UsageSnapshot, UsageSource};

use crate::connection::GlobalDb;
use crate::error::Result;
use crate::time::{format_ts, parse_ts};

type RawSnapshot = (i64, String, f64, f64, String);

fn raw(row: &Row<'_>) -> rusqlite::Result<RawSnapshot> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
}

fn decode((id, timestamp, five_hour, seven_day, source): RawSnapshot) -> Result<UsageSnapshot> {
    Ok(UsageSnapshot {
        id,
        timestamp: parse_ts(&timestamp)?,
        five_hour_utilization: five_hour,
        seven_day_utilization: seven_day,
        source: source.parse()?,
    })
}

/// Stores utilization samples used for burn-rate and pacing decisions.
#[derive(Debug, Clone)]
pub struct UsageSnapshotStore {
    db: GlobalDb,
}

impl UsageSnapshotStore {
    pub fn new(db: GlobalDb) -> Self {
        Self { db }
    }

    pub fn record(
        &self,
        timestamp: DateTime<Utc>,
        five_hour_utilization: f64,
        seven_day_utilization: f64,
        source: UsageSource,
    ) -> Result<i64> {
        self.db.database().with_conn(|conn| {
            conn.execute(
                "INSERT INTO usage_snapshots (timestamp, five_hour_utilization, seven_day_utilization, source) \
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    format_ts(timestamp),
                    five_hour_utilization,
                    seven_day_utilization,
                    source.as_str()
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    /// The most recent sample, if any.
    pub fn latest(&self) -> Result<Option<UsageSnapshot>> {
        self.db.database().with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT id, timestamp, five_hour_utilization, seven_day_utilization, source \
                     FROM usage_snapshots ORDER BY timestamp DESC, id DESC LIMIT 1",
                    [],
                    raw,
                )
                .optional()?;
            row.map(decode).transpose()
        })
    }

    /// Delete samples older than `before`; returns the number removed.
    pub fn prune_before(&self, before: DateTime<Utc>) -> Result<usize> {
        self.db.database().with_conn(|conn| {
            Ok(conn.execute(
                "DELETE FROM usage_snapshots WHERE timestamp < ?1",
                params![format_ts(before)],
            )?)
        })
    }

    /// Samples at or after `since`, oldest first.
    pub fn since(&self, since: DateTime<Utc>) -> Result<Vec<UsageSnapshot>> {
        self.db.database().with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, timestamp, five_hour_utilization, seven_day_utilization, source \
                 FROM usage_snapshots WHERE timestamp >= ?1 ORDER BY timestamp, id",
            )?;
            let rows = stmt.query_map(params![format_ts(since)], raw)?;
            let mut out = Vec::new();
            for row in rows {
                out.push(decode(row?)?);
            }
            Ok(out)
        })
    }
}
