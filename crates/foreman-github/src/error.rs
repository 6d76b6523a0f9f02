//! Error types for the CLI clients.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum GithubError {
    /// The child process could not be started.
    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },

    /// The command exited non-zero.
    #[error("{program} {args} failed: {stderr}")]
    CommandFailed {
        program: String,
        args: String,
        stderr: String,
    },

    /// Output did not have the expected shape.
    #[error("unexpected output from {program}: {message}")]
    Parse { program: String, message: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for client operations.
pub type Result<T> = std::result::Result<T, GithubError>;
