//! Error types for capacity accounting.

use thiserror::Error;

/// Errors raised by the ledger, usage tracker and usage client.
#[derive(Debug, Error)]
pub enum CapacityError {
    #[error("persistence error: {0}")]
    Persistence(#[from] foreman_persistence::PersistenceError),

    #[error("usage request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("usage endpoint returned status {0}")]
    Status(u16),

    #[error("no OAuth token available")]
    MissingToken,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for capacity operations.
pub type Result<T> = std::result::Result<T, CapacityError>;
