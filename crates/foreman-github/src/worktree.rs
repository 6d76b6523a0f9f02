//! `git worktree` management for developer sessions.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use regex::Regex;
use tracing::{debug, info, warn};

use foreman_models::{WorktreeInfo, WorktreeStrategy};

use crate::error::Result;
use crate::runner::{os_args, run_checked, CommandRunner};
use crate::traits::Worktrees;

const BRANCH_PREFIX: &str = "foreman/issue-";

fn issue_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"issue-(\d+)").expect("static pattern"))
}

/// Issue number encoded in a branch name or worktree directory, if any.
pub fn issue_from_branch(branch: &str) -> Option<u64> {
    issue_pattern()
        .captures(branch)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Worktrees under a dedicated root, one per issue.
#[derive(Clone)]
pub struct GitWorktrees {
    runner: Arc<dyn CommandRunner>,
    repo_root: PathBuf,
    worktree_root: PathBuf,
}

impl GitWorktrees {
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        repo_root: impl Into<PathBuf>,
        worktree_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            runner,
            repo_root: repo_root.into(),
            worktree_root: worktree_root.into(),
        }
    }

    pub fn worktree_root(&self) -> &Path {
        &self.worktree_root
    }

    /// Directory a worktree for `issue_number` lives in.
    pub fn worktree_path(&self, issue_number: u64) -> PathBuf {
        self.worktree_root.join(format!("issue-{issue_number}"))
    }

    async fn git<I, S>(&self, args: I) -> Result<String>
    where
        I: IntoIterator<Item = S>,
        S: Into<std::ffi::OsString>,
    {
        let args = os_args(args);
        run_checked(
            self.runner.as_ref(),
            "git",
            &args,
            Some(&self.repo_root),
            &BTreeMap::new(),
        )
        .await
    }

    fn is_ours(&self, info: &WorktreeInfo) -> bool {
        if info
            .branch
            .as_deref()
            .is_some_and(|b| b.starts_with(BRANCH_PREFIX))
        {
            return true;
        }
        info.path.starts_with(&self.worktree_root)
            && info
                .path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with("issue-"))
    }

    fn parse_porcelain(&self, stdout: &str) -> Vec<WorktreeInfo> {
        let mut entries = Vec::new();
        let mut current: Option<WorktreeInfo> = None;

        for line in stdout.lines() {
            if let Some(path) = line.strip_prefix("worktree ") {
                if let Some(done) = current.take() {
                    entries.push(done);
                }
                current = Some(WorktreeInfo {
                    path: PathBuf::from(path),
                    branch: None,
                    issue_number: None,
                });
            } else if let Some(reference) = line.strip_prefix("branch ") {
                if let Some(entry) = current.as_mut() {
                    let branch = reference.trim_start_matches("refs/heads/").to_string();
                    entry.branch = Some(branch);
                }
            }
        }
        if let Some(done) = current.take() {
            entries.push(done);
        }

        entries
            .into_iter()
            .filter(|info| self.is_ours(info))
            .map(|mut info| {
                info.issue_number = info
                    .branch
                    .as_deref()
                    .and_then(issue_from_branch)
                    .or_else(|| {
                        info.path
                            .file_name()
                            .and_then(|n| n.to_str())
                            .and_then(issue_from_branch)
                    });
                info
            })
            .collect()
    }
}

#[async_trait]
impl Worktrees for GitWorktrees {
    fn branch_name(&self, issue_number: u64) -> String {
        format!("{BRANCH_PREFIX}{issue_number}")
    }

    async fn create_worktree(
        &self,
        issue_number: u64,
        base_branch: &str,
        strategy: WorktreeStrategy,
    ) -> Result<WorktreeInfo> {
        let path = self.worktree_path(issue_number);
        let path_arg = path.to_string_lossy().to_string();
        let remote_base = format!("origin/{base_branch}");

        tokio::fs::create_dir_all(&self.worktree_root).await?;

        if let Err(e) = self.git(["fetch", "origin", base_branch]).await {
            warn!(base = %base_branch, error = %e, "fetch failed, using local refs");
        }

        let branch = match strategy {
            WorktreeStrategy::Managed => {
                let branch = self.branch_name(issue_number);
                let from_remote = self.git([
                    "worktree",
                    "add",
                    "-b",
                    branch.as_str(),
                    path_arg.as_str(),
                    remote_base.as_str(),
                ])
                .await;
                if let Err(e) = from_remote {
                    debug!(error = %e, "remote base unavailable, retrying from local branch");
                    self.git([
                        "worktree",
                        "add",
                        "-b",
                        branch.as_str(),
                        path_arg.as_str(),
                        base_branch,
                    ])
                    .await?;
                }
                Some(branch)
            }
            WorktreeStrategy::Deferred => {
                let from_remote = self.git([
                    "worktree",
                    "add",
                    "--detach",
                    path_arg.as_str(),
                    remote_base.as_str(),
                ])
                .await;
                if let Err(e) = from_remote {
                    debug!(error = %e, "remote base unavailable, retrying from local branch");
                    self.git(["worktree", "add", "--detach", path_arg.as_str(), base_branch])
                        .await?;
                }
                None
            }
        };

        info!(issue = issue_number, path = %path.display(), strategy = %strategy, "worktree created");
        Ok(WorktreeInfo {
            path,
            branch,
            issue_number: Some(issue_number),
        })
    }

    async fn discover_branch(&self, path: &Path) -> Result<Option<String>> {
        let path_arg = path.to_string_lossy().to_string();
        match self
            .git(["-C", path_arg.as_str(), "rev-parse", "--abbrev-ref", "HEAD"])
            .await
        {
            Ok(stdout) => {
                let branch = stdout.trim();
                if branch.is_empty() || branch == "HEAD" {
                    Ok(None)
                } else {
                    Ok(Some(branch.to_string()))
                }
            }
            Err(e) => {
                debug!(path = %path.display(), error = %e, "could not read worktree branch");
                Ok(None)
            }
        }
    }

    async fn remove_worktree(&self, info: &WorktreeInfo) -> Result<()> {
        let path_arg = info.path.to_string_lossy().to_string();

        if let Err(e) = self
            .git(["worktree", "remove", path_arg.as_str(), "--force"])
            .await
        {
            debug!(path = %info.path.display(), error = %e, "worktree remove failed, cleaning manually");
            if info.path.exists() {
                tokio::fs::remove_dir_all(&info.path).await?;
            }
            if let Err(e) = self.git(["worktree", "prune"]).await {
                warn!(error = %e, "worktree prune failed");
            }
        }

        if let Some(branch) = info.branch.as_deref() {
            if let Err(e) = self.git(["branch", "-D", branch]).await {
                debug!(branch = %branch, error = %e, "branch delete skipped");
            }
        }

        info!(path = %info.path.display(), "worktree removed");
        Ok(())
    }

    async fn worktree_exists(&self, issue_number: u64) -> Result<bool> {
        if self.worktree_path(issue_number).exists() {
            return Ok(true);
        }
        let listed = self.list_worktrees().await?;
        Ok(listed.iter().any(|w| w.issue_number == Some(issue_number)))
    }

    async fn list_worktrees(&self) -> Result<Vec<WorktreeInfo>> {
        let stdout = self.git(["worktree", "list", "--porcelain"]).await?;
        Ok(self.parse_porcelain(&stdout))
    }

    async fn remove_all(&self) -> Result<usize> {
        let mut removed = 0;
        for info in self.list_worktrees().await? {
            match self.remove_worktree(&info).await {
                Ok(()) => removed += 1,
                Err(e) => warn!(path = %info.path.display(), error = %e, "failed to remove worktree"),
            }
        }
        Ok(removed)
    }
}
