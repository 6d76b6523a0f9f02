//! Persisted revision counters keyed by pull request.

use std::sync::Arc;

use rusqlite::{params, OptionalExtension};

use foreman_models::Clock;

use crate::connection::ProjectDb;
use crate::error::Result;
use crate::time::format_ts;

/// Counts how many times each pull request was sent back for changes.
#[derive(Clone)]
pub struct RevisionStore {
    db: ProjectDb,
    clock: Arc<dyn Clock>,
}

impl RevisionStore {
    pub fn new(db: ProjectDb, clock: Arc<dyn Clock>) -> Self {
        Self { db, clock }
    }

    /// Bump the counter for `pr_number` and return the new value.
    pub fn increment(&self, pr_number: u64, issue_number: Option<u64>) -> Result<u32> {
        let now = format_ts(self.clock.now());
        self.db.database().with_conn(|conn| {
            conn.execute(
                r#"
                INSERT INTO revisions (pr_number, issue_number, count, updated_at)
                VALUES (?1, ?2, 1, ?3)
                ON CONFLICT(pr_number) DO UPDATE SET
                    count = count + 1,
                    issue_number = COALESCE(excluded.issue_number, issue_number),
                    updated_at = excluded.updated_at
                "#,
                params![pr_number as i64, issue_number.map(|n| n as i64), now],
            )?;
            let count: i64 = conn.query_row(
                "SELECT count FROM revisions WHERE pr_number = ?1",
                params![pr_number as i64],
                |row| row.get(0),
            )?;
            Ok(count as u32)
        })
    }

    pub fn get(&self, pr_number: u64) -> Result<u32> {
        self.db.database().with_conn(|conn| {
            let count: Option<i64> = conn
                .query_row(
                    "SELECT count FROM revisions WHERE pr_number = ?1",
                    params![pr_number as i64],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(count.unwrap_or(0) as u32)
        })
    }

    pub fn reset(&self, pr_number: u64) -> Result<()> {
        self.db.database().with_conn(|conn| {
            conn.execute(
                "DELETE FROM revisions WHERE pr_number = ?1",
                params![pr_number as i64],
            )?;
            Ok(())
        })
    }
}
