//! Collaborator interfaces consumed by the controller.

use async_trait::async_trait;

use foreman_models::{Issue, PullRequest, ReviewDecision, WorktreeInfo, WorktreeStrategy};

use crate::error::Result;

/// Issue tracker operations.
#[async_trait]
pub trait IssueTracker: Send + Sync {
    /// Issues matching `filter`, in tracker order.
    async fn fetch_ready_issues(&self, filter: &str) -> Result<Vec<Issue>>;

    async fn add_label(&self, number: u64, label: &str) -> Result<()>;

    /// Remove a label. Removing an absent label succeeds.
    async fn remove_label(&self, number: u64, label: &str) -> Result<()>;
}

/// Pull-request operations.
#[async_trait]
pub trait PullRequests: Send + Sync {
    async fn list_by_label(&self, label: &str) -> Result<Vec<PullRequest>>;

    /// The open pull request whose head is `branch`, if any.
    async fn find_by_branch(&self, branch: &str) -> Result<Option<PullRequest>>;

    /// Aggregate review decision; `None` when no review has been submitted.
    async fn review_decision(&self, number: u64) -> Result<Option<ReviewDecision>>;

    async fn add_label(&self, number: u64, label: &str) -> Result<()>;

    /// Remove a label. Removing an absent label succeeds.
    async fn remove_label(&self, number: u64, label: &str) -> Result<()>;

    async fn merge(&self, number: u64) -> Result<()>;
}

/// Worktree and branch primitives.
#[async_trait]
pub trait Worktrees: Send + Sync {
    /// Canonical branch for an issue.
    fn branch_name(&self, issue_number: u64) -> String;

    async fn create_worktree(
        &self,
        issue_number: u64,
        base_branch: &str,
        strategy: WorktreeStrategy,
    ) -> Result<WorktreeInfo>;

    /// Branch currently checked out at `path`; `None` when detached or unreadable.
    async fn discover_branch(&self, path: &std::path::Path) -> Result<Option<String>>;

    /// Remove a worktree and its branch. Missing pieces are not an error.
    async fn remove_worktree(&self, info: &WorktreeInfo) -> Result<()>;

    async fn worktree_exists(&self, issue_number: u64) -> Result<bool>;

    async fn list_worktrees(&self) -> Result<Vec<WorktreeInfo>>;

    /// Remove every Foreman worktree; returns how many were removed.
    async fn remove_all(&self) -> Result<usize>;
}
