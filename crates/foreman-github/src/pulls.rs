//! `gh`-backed pull-request client.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use foreman_models::{PullRequest, ReviewDecision};

use crate::error::Result;
use crate::issues::{is_missing_label, GhLabel};
use crate::runner::GhCli;
use crate::traits::PullRequests;

const PR_FIELDS: &str = "number,title,labels,headRefName,url,author";
const PR_LIMIT: &str = "100";

#[derive(Debug, Deserialize)]
struct GhAuthor {
    login: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GhPullRequest {
    number: u64,
    title: String,
    #[serde(default)]
    labels: Vec<GhLabel>,
    head_ref_name: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    author: Option<GhAuthor>,
}

impl From<GhPullRequest> for PullRequest {
    fn from(raw: GhPullRequest) -> Self {
        PullRequest {
            number: raw.number,
            title: raw.title,
            head_branch: raw.head_ref_name,
            author: raw
                .author
                .map(|a| a.login)
                .unwrap_or_else(|| "unknown".to_string()),
            url: raw.url,
            labels: raw.labels.into_iter().map(|l| l.name).collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GhReviewDecision {
    #[serde(default)]
    review_decision: Option<String>,
}

/// Pull-request client backed by `gh pr`.
#[derive(Clone)]
pub struct GhPullRequests {
    gh: GhCli,
}

impl GhPullRequests {
    pub fn new(gh: GhCli) -> Self {
        Self { gh }
    }
}

#[async_trait]
impl PullRequests for GhPullRequests {
    async fn list_by_label(&self, label: &str) -> Result<Vec<PullRequest>> {
        let stdout = self.gh.run([
            "pr", "list", "--state", "open", "--label", label, "--json", PR_FIELDS, "--limit",
            PR_LIMIT,
        ])
        .await?;
        let raw: Vec<GhPullRequest> = self.gh.parse_json(&stdout)?;
        debug!(label = %label, count = raw.len(), "listed pull requests");
        Ok(raw.into_iter().map(PullRequest::from).collect())
    }

    async fn find_by_branch(&self, branch: &str) -> Result<Option<PullRequest>> {
        let stdout = self.gh.run([
            "pr", "list", "--state", "open", "--head", branch, "--json", PR_FIELDS, "--limit", "1",
        ])
        .await?;
        let raw: Vec<GhPullRequest> = self.gh.parse_json(&stdout)?;
        Ok(raw.into_iter().next().map(PullRequest::from))
    }

    async fn review_decision(&self, number: u64) -> Result<Option<ReviewDecision>> {
        let number = number.to_string();
        let stdout = self
            .gh
            .run(["pr", "view", number.as_str(), "--json", "reviewDecision"])
            .await?;
        let raw: GhReviewDecision = self.gh.parse_json(&stdout)?;
        // An empty or unknown decision means no review yet.
        Ok(raw
            .review_decision
            .filter(|d| !d.is_empty())
            .and_then(|d| d.parse().ok()))
    }

    async fn add_label(&self, number: u64, label: &str) -> Result<()> {
        let number = number.to_string();
        self.gh
            .run(["pr", "edit", number.as_str(), "--add-label", label])
            .await?;
        Ok(())
    }

    async fn remove_label(&self, number: u64, label: &str) -> Result<()> {
        let number_arg = number.to_string();
        match self
            .gh
            .run(["pr", "edit", number_arg.as_str(), "--remove-label", label])
            .await
        {
            Ok(_) => Ok(()),
            Err(e) if is_missing_label(&e) => {
                debug!(pr = number, label = %label, "label already absent");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn merge(&self, number: u64) -> Result<()> {
        let number = number.to_string();
        self.gh
            .run(["pr", "merge", number.as_str(), "--squash", "--delete-branch"])
            .await?;
        Ok(())
    }
}
