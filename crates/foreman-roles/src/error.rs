//! Error types for role launchers.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RoleError {
    #[error("session host error: {0}")]
    Host(#[from] foreman_tmux::TmuxError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, RoleError>;
