//! Developer sessions: one per issue.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use foreman_models::{naming, WorktreeStrategy};
use foreman_tmux::{CreateSession, SessionHost};

use crate::error::Result;
use crate::launcher::{launch, LaunchSettings, RoleLauncher};
use crate::template::{
    agent_command, load_template, render, write_instructions, DEFAULT_DEVELOPER_TEMPLATE,
    DEVELOPER_TEMPLATE_FILE,
};

/// A developer assignment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeveloperRequest {
    pub issue_number: u64,
    /// Set when revising an existing pull request.
    pub pr_number: Option<u64>,
    /// Directory the agent starts in.
    pub cwd: PathBuf,
    /// Branch already checked out in `cwd`, when Foreman created it.
    pub branch: Option<String>,
}

impl DeveloperRequest {
    pub fn new(issue_number: u64, cwd: impl Into<PathBuf>) -> Self {
        Self {
            issue_number,
            pr_number: None,
            cwd: cwd.into(),
            branch: None,
        }
    }

    pub fn with_branch(mut self, branch: Option<String>) -> Self {
        self.branch = branch;
        self
    }

    pub fn revision_of(mut self, pr_number: u64) -> Self {
        self.pr_number = Some(pr_number);
        self
    }
}

pub struct DeveloperLauncher {
    host: Arc<dyn SessionHost>,
    settings: LaunchSettings,
}

impl DeveloperLauncher {
    pub fn new(host: Arc<dyn SessionHost>, settings: LaunchSettings) -> Self {
        Self { host, settings }
    }

    fn branch_step(&self, request: &DeveloperRequest) -> String {
        match &request.branch {
            Some(branch) => format!(
                "You are already on branch `{branch}` in a dedicated worktree; commit there"
            ),
            None => format!(
                "Create a branch for your work (e.g. `git checkout -b fix/issue-{}`)",
                request.issue_number
            ),
        }
    }

    fn revision_appendix(&self, pr_number: u64) -> String {
        format!(
            "\n\n## REVISION MODE\n\n\
             This is a revision of existing PR #{pr}. The reviewer requested changes.\n\
             The PR context was loaded with `{flag} {pr}`.\n\n\
             1. You are on the PR branch: do NOT create a new branch or PR\n\
             2. Address every requested change from the most recent review\n\
             3. Run the project's test suite and fix any failures\n\
             4. Push your fixes: `git push`\n\
             5. Request review again: `gh pr edit {pr} --add-label \"{label}\"`\n",
            pr = pr_number,
            flag = self.settings.agent.revision_flag,
            label = self.settings.review_label,
        )
    }

    fn command_args(&self, request: &DeveloperRequest) -> Vec<String> {
        let agent = &self.settings.agent;
        let mut args = agent.args.clone();
        if self.settings.strategy == WorktreeStrategy::Deferred && request.pr_number.is_none() {
            args.extend(agent.deferred_worktree_args.iter().cloned());
        }
        if let Some(pr) = request.pr_number {
            args.push(agent.revision_flag.clone());
            args.push(pr.to_string());
        }
        args
    }
}

#[async_trait]
impl RoleLauncher for DeveloperLauncher {
    type Request = DeveloperRequest;

    fn session_name(&self, request: &DeveloperRequest) -> String {
        naming::dev_session_name(&self.settings.project, request.issue_number)
    }

    fn build_instructions(&self, request: &DeveloperRequest) -> String {
        let template = load_template(
            &self.settings.prompts_dir(),
            DEVELOPER_TEMPLATE_FILE,
            DEFAULT_DEVELOPER_TEMPLATE,
        );
        let mut text = render(
            &template,
            &[
                ("REPO", self.settings.repo.clone()),
                ("ISSUE_NUMBER", request.issue_number.to_string()),
                ("PR_TITLE_PREFIX", self.settings.pr_title_prefix.clone()),
                ("REVIEW_LABEL", self.settings.review_label.clone()),
                ("BRANCH_STEP", self.branch_step(request)),
            ],
        );
        if let Some(pr) = request.pr_number {
            text.push_str(&self.revision_appendix(pr));
        }
        text
    }

    async fn spawn(&self, request: &DeveloperRequest) -> Result<String> {
        let session = self.session_name(request);
        let instructions = self.build_instructions(request);
        let file = write_instructions(&self.settings.prompts_dir(), &session, &instructions)?;

        let agent = &self.settings.agent;
        let command = agent_command(
            &agent.unset_env,
            &agent.command,
            &self.command_args(request),
            &file,
        );
        launch(
            &self.host,
            &self.settings,
            CreateSession::new(&session, &request.cwd, command),
        )
        .await?;

        info!(
            session = %session,
            issue = request.issue_number,
            pr = ?request.pr_number,
            "developer launched"
        );
        Ok(session)
    }

    async fn is_running(&self, request: &DeveloperRequest) -> bool {
        self.host.is_alive(&self.session_name(request)).await
    }
}
