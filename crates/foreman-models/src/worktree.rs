//! Worktree descriptors shared by the git client and the controller.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// How a developer's branch comes into existence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorktreeStrategy {
    /// Foreman creates the worktree on the canonical branch before launch.
    #[default]
    Managed,
    /// Foreman creates a detached worktree; the worker names its own branch.
    Deferred,
}

impl fmt::Display for WorktreeStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorktreeStrategy::Managed => f.write_str("managed"),
            WorktreeStrategy::Deferred => f.write_str("deferred"),
        }
    }
}

impl FromStr for WorktreeStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "managed" => Ok(WorktreeStrategy::Managed),
            "deferred" => Ok(WorktreeStrategy::Deferred),
            other => Err(format!("unknown worktree strategy: {other}")),
        }
    }
}

/// A worktree bound (or about to be bound) to one issue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorktreeInfo {
    pub path: PathBuf,
    /// Branch checked out, when known.
    pub branch: Option<String>,
    pub issue_number: Option<u64>,
}
