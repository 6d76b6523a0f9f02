//! Session registry: CRUD over worker session records.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::debug;

use foreman_models::{NewSession, SessionRecord};

use crate::connection::GlobalDb;
use crate::error::Result;
use crate::time::{format_ts, parse_opt_ts, parse_ts};

const COLUMNS: &str = "id, project, role, issue_number, pr_number, session, worktree_path, \
                       worktree_branch, started_at, ended_at, estimated_cost_usd";

/// Raw row as stored.
struct SessionRow {
    id: i64,
    project: String,
    role: String,
    issue_number: Option<i64>,
    pr_number: Option<i64>,
    session: String,
    worktree_path: Option<String>,
    worktree_branch: Option<String>,
    started_at: String,
    ended_at: Option<String>,
    estimated_cost_usd: Option<f64>,
}

impl SessionRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            project: row.get(1)?,
            role: row.get(2)?,
            issue_number: row.get(3)?,
            pr_number: row.get(4)?,
            session: row.get(5)?,
            worktree_path: row.get(6)?,
            worktree_branch: row.get(7)?,
            started_at: row.get(8)?,
            ended_at: row.get(9)?,
            estimated_cost_usd: row.get(10)?,
        })
    }

    fn into_record(self) -> Result<SessionRecord> {
        Ok(SessionRecord {
            id: self.id,
            project: self.project,
            role: self.role.parse()?,
            issue_number: self.issue_number.map(|n| n as u64),
            pr_number: self.pr_number.map(|n| n as u64),
            session: self.session,
            worktree_path: self.worktree_path.map(PathBuf::from),
            worktree_branch: self.worktree_branch,
            started_at: parse_ts(&self.started_at)?,
            ended_at: parse_opt_ts(self.ended_at)?,
            estimated_cost_usd: self.estimated_cost_usd,
        })
    }
}

fn query_records(
    conn: &Connection,
    sql: &str,
    params: impl rusqlite::Params,
) -> Result<Vec<SessionRecord>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(params, SessionRow::from_row)?;
    let mut records = Vec::new();
    for row in rows {
        records.push(row?.into_record()?);
    }
    Ok(records)
}

/// Persisted record of every spawned worker.
#[derive(Debug, Clone)]
pub struct SessionRegistry {
    db: GlobalDb,
}

impl SessionRegistry {
    pub fn new(db: GlobalDb) -> Self {
        Self { db }
    }

    /// Insert an open record and return its id.
    pub fn insert(&self, session: &NewSession, started_at: DateTime<Utc>) -> Result<i64> {
        debug!(
            project = %session.project,
            role = %session.role,
            session = %session.session,
            issue = ?session.issue_number,
            "recording session start"
        );
        self.db.database().with_conn(|conn| {
            conn.execute(
                r#"
                INSERT INTO sessions (project, role, issue_number, pr_number, session,
                                      worktree_path, worktree_branch, started_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                "#,
                params![
                    session.project,
                    session.role.as_str(),
                    session.issue_number.map(|n| n as i64),
                    session.pr_number.map(|n| n as i64),
                    session.session,
                    session
                        .worktree_path
                        .as_ref()
                        .map(|p| p.to_string_lossy().to_string()),
                    session.worktree_branch,
                    format_ts(started_at),
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    pub fn get(&self, id: i64) -> Result<Option<SessionRecord>> {
        self.db.database().with_conn(|conn| {
            let row = conn
                .query_row(
                    &format!("SELECT {COLUMNS} FROM sessions WHERE id = ?1"),
                    params![id],
                    SessionRow::from_row,
                )
                .optional()?;
            row.map(SessionRow::into_record).transpose()
        })
    }

    /// Open records, optionally limited to one project, oldest first.
    pub fn active(&self, project: Option<&str>) -> Result<Vec<SessionRecord>> {
        self.db.database().with_conn(|conn| match project {
            Some(project) => query_records(
                conn,
                &format!(
                    "SELECT {COLUMNS} FROM sessions WHERE ended_at IS NULL AND project = ?1 ORDER BY id"
                ),
                params![project],
            ),
            None => query_records(
                conn,
                &format!("SELECT {COLUMNS} FROM sessions WHERE ended_at IS NULL ORDER BY id"),
                [],
            ),
        })
    }

    pub fn active_count(&self, project: Option<&str>) -> Result<usize> {
        self.db.database().with_conn(|conn| {
            let count: i64 = match project {
                Some(project) => conn.query_row(
                    "SELECT COUNT(*) FROM sessions WHERE ended_at IS NULL AND project = ?1",
                    params![project],
                    |row| row.get(0),
                )?,
                None => conn.query_row(
                    "SELECT COUNT(*) FROM sessions WHERE ended_at IS NULL",
                    [],
                    |row| row.get(0),
                )?,
            };
            Ok(count as usize)
        })
    }

    /// Close an open record. Returns `false` when it was already closed or absent.
    pub fn close(&self, id: i64, ended_at: DateTime<Utc>, cost_usd: f64) -> Result<bool> {
        self.db.database().with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE sessions SET ended_at = ?1, estimated_cost_usd = ?2 \
                 WHERE id = ?3 AND ended_at IS NULL",
                params![format_ts(ended_at), cost_usd, id],
            )?;
            Ok(changed == 1)
        })
    }

    /// Record a branch discovered after launch.
    pub fn update_branch(&self, id: i64, branch: &str) -> Result<bool> {
        debug!(id, branch = %branch, "updating session branch");
        self.db.database().with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE sessions SET worktree_branch = ?1 WHERE id = ?2",
                params![branch, id],
            )?;
            Ok(changed == 1)
        })
    }

    /// Most recent record of `project` that worked `branch`.
    pub fn find_by_branch(&self, project: &str, branch: &str) -> Result<Option<SessionRecord>> {
        self.db.database().with_conn(|conn| {
            let row = conn
                .query_row(
                    &format!(
                        "SELECT {COLUMNS} FROM sessions WHERE project = ?1 AND worktree_branch = ?2 \
                         ORDER BY id DESC LIMIT 1"
                    ),
                    params![project, branch],
                    SessionRow::from_row,
                )
                .optional()?;
            row.map(SessionRow::into_record).transpose()
        })
    }

    /// Records still open or closed at or after `since`.
    pub fn open_or_ended_since(&self, since: DateTime<Utc>) -> Result<Vec<SessionRecord>> {
        self.db.database().with_conn(|conn| {
            query_records(
                conn,
                &format!(
                    "SELECT {COLUMNS} FROM sessions WHERE ended_at IS NULL OR ended_at >= ?1 ORDER BY id"
                ),
                params![format_ts(since)],
            )
        })
    }

    /// Total cost of records closed in `[from, to)`.
    pub fn cost_ended_between(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Result<f64> {
        self.db.database().with_conn(|conn| {
            let total: f64 = conn.query_row(
                "SELECT COALESCE(SUM(estimated_cost_usd), 0.0) FROM sessions \
                 WHERE ended_at >= ?1 AND ended_at < ?2",
                params![format_ts(from), format_ts(to)],
                |row| row.get(0),
            )?;
            Ok(total)
        })
    }

    /// Newest records first.
    pub fn list_recent(&self, limit: usize) -> Result<Vec<SessionRecord>> {
        self.db.database().with_conn(|conn| {
            query_records(
                conn,
                &format!("SELECT {COLUMNS} FROM sessions ORDER BY id DESC LIMIT ?1"),
                params![limit as i64],
            )
        })
    }
}
