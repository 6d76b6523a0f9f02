//! `gh`-backed issue tracker.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::debug;

use foreman_models::Issue;

use crate::error::{GithubError, Result};
use crate::runner::GhCli;
use crate::traits::IssueTracker;

const ISSUE_FIELDS: &str = "number,title,labels,createdAt,milestone,url";
const ISSUE_LIMIT: &str = "50";

#[derive(Debug, Deserialize)]
pub(crate) struct GhLabel {
    pub name: String,
}

#[derive(Debug, Deserialize)]
struct GhMilestone {
    title: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GhIssue {
    number: u64,
    title: String,
    #[serde(default)]
    labels: Vec<GhLabel>,
    created_at: DateTime<Utc>,
    #[serde(default)]
    milestone: Option<GhMilestone>,
    #[serde(default)]
    url: String,
}

impl From<GhIssue> for Issue {
    fn from(raw: GhIssue) -> Self {
        Issue {
            number: raw.number,
            title: raw.title,
            labels: raw.labels.into_iter().map(|l| l.name).collect(),
            created_at: raw.created_at,
            milestone: raw.milestone.map(|m| m.title).filter(|t| !t.is_empty()),
            url: raw.url,
        }
    }
}

/// gh reports removing a label the item does not carry as an error on some versions.
pub(crate) fn is_missing_label(err: &GithubError) -> bool {
    matches!(err, GithubError::CommandFailed { stderr, .. }
        if stderr.contains("not found") || stderr.contains("does not have"))
}

/// Issue tracker backed by `gh issue`.
#[derive(Clone)]
pub struct GhIssueTracker {
    gh: GhCli,
}

impl GhIssueTracker {
    pub fn new(gh: GhCli) -> Self {
        Self { gh }
    }
}

#[async_trait]
impl IssueTracker for GhIssueTracker {
    async fn fetch_ready_issues(&self, filter: &str) -> Result<Vec<Issue>> {
        let stdout = self.gh.run([
            "issue",
            "list",
            "--search",
            filter,
            "--json",
            ISSUE_FIELDS,
            "--limit",
            ISSUE_LIMIT,
        ])
        .await?;
        let raw: Vec<GhIssue> = self.gh.parse_json(&stdout)?;
        debug!(count = raw.len(), filter = %filter, "fetched issues");
        Ok(raw.into_iter().map(Issue::from).collect())
    }

    async fn add_label(&self, number: u64, label: &str) -> Result<()> {
        let number = number.to_string();
        self.gh
            .run(["issue", "edit", number.as_str(), "--add-label", label])
            .await?;
        Ok(())
    }

    async fn remove_label(&self, number: u64, label: &str) -> Result<()> {
        let number_arg = number.to_string();
        match self
            .gh
            .run(["issue", "edit", number_arg.as_str(), "--remove-label", label])
            .await
        {
            Ok(_) => Ok(()),
            Err(e) if is_missing_label(&e) => {
                debug!(issue = number, label = %label, "label already absent");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::testing::StubRunner;

    const ISSUES_JSON: &str = r#"[
        {"number": 42, "title": "Add login", "labels": [{"name": "ready"}],
         "createdAt": "2026-01-05T10:00:00Z", "milestone": {"title": "v1"},
         "url": "https://github.com/acme/web/issues/42"},
        {"number": 43, "title": "Fix typo", "labels": [],
         "createdAt": "2026-01-04T10:00:00Z", "milestone": null, "url": ""}
    ]"#;

    #[tokio::test]
    async fn test_fetch_ready_issues_parses_json() {
        let stub = StubRunner::new();
        stub.ok(ISSUES_JSON);
        let tracker = GhIssueTracker::new(
            GhCli::new(stub.clone(), "/repo").with_token(Some("tok".into())),
        );

        let issues = tracker
            .fetch_ready_issues("is:open is:issue label:ready")
            .await
            .unwrap();
        assert_eq!(issues.len(), 2);
        assert_eq!(issues[0].number, 42);
        assert_eq!(issues[0].milestone.as_deref(), Some("v1"));
        assert!(issues[0].has_label("ready"));
        assert!(issues[1].milestone.is_none());

        let call = &stub.calls()[0];
        assert_eq!(call.program, "gh");
        assert_eq!(
            call.args[..4],
            ["issue", "list", "--search", "is:open is:issue label:ready"]
        );
        assert_eq!(call.env.get("GH_TOKEN").map(String::as_str), Some("tok"));
    }

    #[tokio::test]
    async fn test_fetch_reports_parse_error() {
        let stub = StubRunner::new();
        stub.ok("not json");
        let tracker = GhIssueTracker::new(GhCli::new(stub, "/repo"));
        let err = tracker.fetch_ready_issues("x").await.unwrap_err();
        assert!(matches!(err, GithubError::Parse { .. }));
    }

    #[tokio::test]
    async fn test_remove_missing_label_succeeds() {
        let stub = StubRunner::new();
        stub.fail("label 'in-progress' not found");
        stub.fail("HTTP 502");
        let tracker = GhIssueTracker::new(GhCli::new(stub.clone(), "/repo"));

        tracker.remove_label(42, "in-progress").await.unwrap();
        assert!(tracker.remove_label(42, "in-progress").await.is_err());
        assert_eq!(
            stub.calls()[0].args,
            ["issue", "edit", "42", "--remove-label", "in-progress"]
        );
    }
}
