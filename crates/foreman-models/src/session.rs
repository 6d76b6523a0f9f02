//! Worker session records.
//!
//! A [`SessionRecord`] is written once per spawned worker and is never
//! deleted; it doubles as the audit trail the capacity ledger sums over.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ModelError;

/// Role of a spawned worker session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionRole {
    /// Works a single issue and opens a pull request.
    Developer,
    /// Reviews every pull request waiting for review.
    Reviewer,
}

impl SessionRole {
    /// Stored representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionRole::Developer => "developer",
            SessionRole::Reviewer => "reviewer",
        }
    }
}

impl fmt::Display for SessionRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SessionRole {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "developer" => Ok(SessionRole::Developer),
            // "cto" is accepted for rows written by older tooling
            "reviewer" | "cto" => Ok(SessionRole::Reviewer),
            other => Err(ModelError::UnknownRole(other.to_string())),
        }
    }
}

/// A persisted worker session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    /// Auto-increment row id.
    pub id: i64,
    /// Project the worker belongs to.
    pub project: String,
    /// Worker role.
    pub role: SessionRole,
    /// Issue being worked, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issue_number: Option<u64>,
    /// Pull request being revised, for revision-mode developers.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pr_number: Option<u64>,
    /// Session host handle.
    pub session: String,
    /// Worktree directory, when one was created.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub worktree_path: Option<PathBuf>,
    /// Branch name; unknown until the worker creates it under some strategies.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub worktree_branch: Option<String>,
    /// When the worker was launched.
    pub started_at: DateTime<Utc>,
    /// When the worker was observed finished or dead.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    /// Cost computed when the record was closed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_cost_usd: Option<f64>,
}

impl SessionRecord {
    /// Whether the record is still open.
    pub fn is_active(&self) -> bool {
        self.ended_at.is_none()
    }

    /// Whether this is a developer working an existing pull request.
    pub fn is_revision(&self) -> bool {
        self.role == SessionRole::Developer && self.pr_number.is_some()
    }

    /// Minutes between start and end (or `now` for open records), never negative.
    pub fn elapsed_minutes(&self, now: DateTime<Utc>) -> f64 {
        let end = self.ended_at.unwrap_or(now);
        let millis = (end - self.started_at).num_milliseconds().max(0);
        millis as f64 / 60_000.0
    }
}

/// Values supplied when recording a newly launched worker.
#[derive(Debug, Clone, PartialEq)]
pub struct NewSession {
    pub project: String,
    pub role: SessionRole,
    pub issue_number: Option<u64>,
    pub pr_number: Option<u64>,
    pub session: String,
    pub worktree_path: Option<PathBuf>,
    pub worktree_branch: Option<String>,
}

impl NewSession {
    /// A developer working `issue`.
    pub fn developer(project: impl Into<String>, issue: u64, session: impl Into<String>) -> Self {
        Self {
            project: project.into(),
            role: SessionRole::Developer,
            issue_number: Some(issue),
            pr_number: None,
            session: session.into(),
            worktree_path: None,
            worktree_branch: None,
        }
    }

    /// A reviewer for the project.
    pub fn reviewer(project: impl Into<String>, session: impl Into<String>) -> Self {
        Self {
            project: project.into(),
            role: SessionRole::Reviewer,
            issue_number: None,
            pr_number: None,
            session: session.into(),
            worktree_path: None,
            worktree_branch: None,
        }
    }

    /// Attach a worktree path and optional branch.
    pub fn with_worktree(mut self, path: impl Into<PathBuf>, branch: Option<String>) -> Self {
        self.worktree_path = Some(path.into());
        self.worktree_branch = branch;
        self
    }

    /// Mark as revision work on `pr`.
    pub fn with_pr(mut self, pr: u64) -> Self {
        self.pr_number = Some(pr);
        self
    }
}
