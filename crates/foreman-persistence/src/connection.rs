//! Database connection management.

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rusqlite::Connection;
use tracing::debug;

use crate::error::{PersistenceError, Result};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const GLOBAL_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS sessions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    project TEXT NOT NULL,
    role TEXT NOT NULL,
    issue_number INTEGER,
    pr_number INTEGER,
    session TEXT NOT NULL,
    worktree_path TEXT,
    worktree_branch TEXT,
    started_at TEXT NOT NULL,
    ended_at TEXT,
    estimated_cost_usd REAL
);

CREATE INDEX IF NOT EXISTS idx_sessions_project ON sessions(project);
CREATE INDEX IF NOT EXISTS idx_sessions_ended_at ON sessions(ended_at);

CREATE UNIQUE INDEX IF NOT EXISTS idx_sessions_open_developer
    ON sessions(project, issue_number)
    WHERE ended_at IS NULL AND role = 'developer';

CREATE UNIQUE INDEX IF NOT EXISTS idx_sessions_open_reviewer
    ON sessions(project)
    WHERE ended_at IS NULL AND role = 'reviewer';

CREATE TABLE IF NOT EXISTS usage_snapshots (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp TEXT NOT NULL,
    five_hour_utilization REAL NOT NULL,
    seven_day_utilization REAL NOT NULL,
    source TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_usage_snapshots_timestamp ON usage_snapshots(timestamp);
"#;

const PROJECT_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS messages (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    from_role TEXT NOT NULL,
    to_role TEXT NOT NULL,
    type TEXT NOT NULL,
    payload TEXT NOT NULL,
    created_at TEXT NOT NULL,
    read_at TEXT
);

CREATE INDEX IF NOT EXISTS idx_messages_unread ON messages(to_role, read_at);

CREATE TABLE IF NOT EXISTS revisions (
    pr_number INTEGER PRIMARY KEY,
    issue_number INTEGER,
    count INTEGER NOT NULL DEFAULT 0,
    updated_at TEXT NOT NULL
);
"#;

/// Shared SQLite connection.
#[derive(Debug, Clone)]
pub struct Database {
    connection: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open (creating if needed) the database at `path` and apply `schema`.
    pub fn open<P: AsRef<Path>>(path: P, schema: &str) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        debug!(path = %path.display(), "opening database");
        let conn = Connection::open(path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        let mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        debug!(path = %path.display(), journal_mode = %mode, "database opened");
        conn.execute_batch(schema)?;

        Ok(Self {
            connection: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory database for testing.
    pub fn open_in_memory(schema: &str) -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(schema)?;
        Ok(Self {
            connection: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run `f` with exclusive access to the connection.
    pub fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self
            .connection
            .lock()
            .map_err(|e| PersistenceError::Lock(e.to_string()))?;
        f(&conn)
    }
}

/// Machine-wide database: session registry and usage snapshots.
#[derive(Debug, Clone)]
pub struct GlobalDb(Database);

impl GlobalDb {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Database::open(path, GLOBAL_SCHEMA).map(Self)
    }

    pub fn open_in_memory() -> Result<Self> {
        Database::open_in_memory(GLOBAL_SCHEMA).map(Self)
    }

    pub fn database(&self) -> &Database {
        &self.0
    }
}

/// Per-repository database: message bus and revision counters.
#[derive(Debug, Clone)]
pub struct ProjectDb(Database);

impl ProjectDb {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Database::open(path, PROJECT_SCHEMA).map(Self)
    }

    pub fn open_in_memory() -> Result<Self> {
        Database::open_in_memory(PROJECT_SCHEMA).map(Self)
    }

    pub fn database(&self) -> &Database {
        &self.0
    }
}
