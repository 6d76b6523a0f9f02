//! Reviewer session: one per project, covering every PR awaiting review.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use foreman_models::{naming, PullRequest};
use foreman_tmux::{CreateSession, SessionHost};

use crate::error::Result;
use crate::launcher::{launch, LaunchSettings, RoleLauncher};
use crate::template::{
    agent_command, load_template, render, write_instructions, DEFAULT_REVIEWER_TEMPLATE,
    REVIEWER_TEMPLATE_FILE,
};

/// Pull requests a reviewer should look at.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReviewRequest {
    pub prs: Vec<PullRequest>,
}

impl ReviewRequest {
    pub fn new(prs: Vec<PullRequest>) -> Self {
        Self { prs }
    }
}

pub struct ReviewerLauncher {
    host: Arc<dyn SessionHost>,
    settings: LaunchSettings,
}

impl ReviewerLauncher {
    pub fn new(host: Arc<dyn SessionHost>, settings: LaunchSettings) -> Self {
        Self { host, settings }
    }

    fn pr_section(&self, pr: &PullRequest) -> String {
        let n = pr.number;
        format!(
            "### PR #{n}: {title}\n\
             - Branch: `{branch}`\n\
             - Author: {author}\n\
             - URL: {url}\n\
             - Review: `gh pr diff {n}`\n\
             - Approve: `gh pr review {n} --approve --body \"Review: Approved. <summary>\" && gh pr edit {n} --remove-label \"{review}\" --add-label \"{approved}\"`\n\
             - Request changes: `gh pr review {n} --request-changes --body \"Review: Changes needed. <feedback>\"`",
            title = pr.title,
            branch = pr.head_branch,
            author = pr.author,
            url = pr.url,
            review = self.settings.review_label,
            approved = self.settings.approved_label,
        )
    }
}

#[async_trait]
impl RoleLauncher for ReviewerLauncher {
    type Request = ReviewRequest;

    fn session_name(&self, _request: &ReviewRequest) -> String {
        naming::cto_session_name(&self.settings.project)
    }

    fn build_instructions(&self, request: &ReviewRequest) -> String {
        let template = load_template(
            &self.settings.prompts_dir(),
            REVIEWER_TEMPLATE_FILE,
            DEFAULT_REVIEWER_TEMPLATE,
        );
        let sections = request
            .prs
            .iter()
            .map(|pr| self.pr_section(pr))
            .collect::<Vec<_>>()
            .join("\n\n");
        render(
            &template,
            &[
                ("REPO", self.settings.repo.clone()),
                ("PR_SECTIONS", sections),
                ("REVIEW_LABEL", self.settings.review_label.clone()),
                ("APPROVED_LABEL", self.settings.approved_label.clone()),
            ],
        )
    }

    async fn spawn(&self, request: &ReviewRequest) -> Result<String> {
        let session = self.session_name(request);
        let instructions = self.build_instructions(request);
        let file = write_instructions(&self.settings.prompts_dir(), &session, &instructions)?;

        let agent = &self.settings.agent;
        let command = agent_command(&agent.unset_env, &agent.command, &agent.args, &file);
        launch(
            &self.host,
            &self.settings,
            CreateSession::new(&session, &self.settings.repo_root, command),
        )
        .await?;

        info!(session = %session, prs = request.prs.len(), "reviewer launched");
        Ok(session)
    }

    async fn is_running(&self, request: &ReviewRequest) -> bool {
        self.host.is_alive(&self.session_name(request)).await
    }
}
