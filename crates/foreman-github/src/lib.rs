//! Issue tracker, pull-request and worktree clients for Foreman.
//!
//! The controller talks to these through the [`IssueTracker`],
//! [`PullRequests`] and [`Worktrees`] traits. The default implementations
//! shell out to `gh` and `git` through a [`CommandRunner`], so tests can feed
//! canned process output.

pub mod error;
pub mod issues;
pub mod labels;
pub mod pulls;
pub mod runner;
pub mod traits;
pub mod worktree;

pub use error::{GithubError, Result};
pub use issues::GhIssueTracker;
pub use labels::ensure_labels;
pub use pulls::GhPullRequests;
pub use runner::{CommandRunner, GhCli, ProcessCommandRunner};
pub use traits::{IssueTracker, PullRequests, Worktrees};
pub use worktree::{issue_from_branch, GitWorktrees};
