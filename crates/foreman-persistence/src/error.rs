//! Error types for persistence operations.

use thiserror::Error;

/// Errors that can occur while reading or writing the databases.
#[derive(Debug, Error)]
pub enum PersistenceError {
    /// SQLite error.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Payload (de)serialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error while preparing the database location.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// A stored value did not parse into its model type.
    #[error("invalid stored value: {0}")]
    Model(#[from] foreman_models::ModelError),

    /// A stored timestamp was not RFC3339.
    #[error("invalid timestamp '{0}'")]
    InvalidTimestamp(String),

    /// The connection mutex was poisoned.
    #[error("database lock poisoned: {0}")]
    Lock(String),
}

/// Result type alias for persistence operations.
pub type Result<T> = std::result::Result<T, PersistenceError>;
