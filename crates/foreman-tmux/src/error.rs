//! Session host errors.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TmuxError {
    #[error("tmux is not installed or not in PATH")]
    NotInstalled,

    #[error("no tmux session named '{0}'")]
    SessionNotFound(String),

    /// Creating a session whose name is already live.
    #[error("tmux session '{0}' is already running")]
    SessionExists(String),

    #[error("tmux {command} failed: {stderr}")]
    CommandFailed { command: String, stderr: String },

    /// A `list-sessions` line that is not `name:created`.
    #[error("unexpected tmux listing line '{0}'")]
    InvalidListing(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, TmuxError>;
