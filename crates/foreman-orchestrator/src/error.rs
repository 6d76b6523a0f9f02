//! Error types for the orchestrator.

use thiserror::Error;

/// Errors surfaced by the controller and its scheduler.
#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("persistence error: {0}")]
    Persistence(#[from] foreman_persistence::PersistenceError),

    #[error("github error: {0}")]
    Github(#[from] foreman_github::GithubError),

    #[error("capacity error: {0}")]
    Capacity(#[from] foreman_capacity::CapacityError),

    #[error("launch error: {0}")]
    Role(#[from] foreman_roles::RoleError),

    #[error("session host error: {0}")]
    Host(#[from] foreman_tmux::TmuxError),

    #[error("scheduler already started")]
    AlreadyStarted,

    #[error("scheduler not started")]
    NotStarted,

    #[error("scheduler shutdown failed: {0}")]
    Shutdown(String),
}

/// Result type for orchestrator operations.
pub type Result<T> = std::result::Result<T, OrchestratorError>;
