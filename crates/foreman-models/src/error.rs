//! Error types for model parsing.

use thiserror::Error;

/// Errors raised when converting stored or external text into model types.
#[derive(Debug, Error)]
pub enum ModelError {
    /// A role string did not name a known role.
    #[error("unknown role: {0}")]
    UnknownRole(String),

    /// A message type string did not name a known type.
    #[error("unknown message type: {0}")]
    UnknownMessageType(String),

    /// A usage source tag was not recognised.
    #[error("unknown usage source: {0}")]
    UnknownUsageSource(String),

    /// A review decision string was not recognised.
    #[error("unknown review decision: {0}")]
    UnknownReviewDecision(String),
}

/// Result type alias for model operations.
pub type Result<T> = std::result::Result<T, ModelError>;
