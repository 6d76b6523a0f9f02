//! Observable controller state.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Entries kept in the rolling error log.
pub const MAX_ERRORS: usize = 20;

/// Phase of the current cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ControllerState {
    #[default]
    Idle,
    Polling,
    Cleaning,
    Spawning,
}

impl std::fmt::Display for ControllerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ControllerState::Idle => "idle",
            ControllerState::Polling => "polling",
            ControllerState::Cleaning => "cleaning",
            ControllerState::Spawning => "spawning",
        };
        write!(f, "{}", s)
    }
}

/// Snapshot of what the controller last observed.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ControllerStatus {
    pub state: ControllerState,
    pub last_poll_at: Option<DateTime<Utc>>,
    pub active_developers: usize,
    pub issues_in_queue: usize,
    pub prs_awaiting_review: usize,
    pub prs_awaiting_human: usize,
    pub cycles_completed: u64,
    /// Most recent failures, oldest first.
    pub errors: Vec<String>,
}

impl ControllerStatus {
    /// Append to the error log, dropping the oldest entries past [`MAX_ERRORS`].
    pub fn push_error(&mut self, entry: impl Into<String>) {
        self.errors.push(entry.into());
        if self.errors.len() > MAX_ERRORS {
            let excess = self.errors.len() - MAX_ERRORS;
            self.errors.drain(..excess);
        }
    }
}
