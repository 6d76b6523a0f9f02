//! Label vocabulary shared with the issue tracker.

/// Issue is ready to be picked up.
pub const READY: &str = "ready";
/// A developer session is working on the issue.
pub const IN_PROGRESS: &str = "in-progress";
/// Pull request waits for review.
pub const NEEDS_REVIEW: &str = "needs-cto-review";
/// Pull request passed review and waits for a human.
pub const APPROVED: &str = "cto-approved";
/// Automation gave up; a human should look.
pub const NEEDS_HELP: &str = "needs-help";

/// A label definition used when provisioning a repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LabelSpec {
    pub name: &'static str,
    /// Hex color without the leading `#`.
    pub color: &'static str,
    pub description: &'static str,
}

/// Every label Foreman reads or writes.
pub const STANDARD_LABELS: [LabelSpec; 5] = [
    LabelSpec {
        name: READY,
        color: "0E8A16",
        description: "Issue is ready to be picked up by Foreman",
    },
    LabelSpec {
        name: IN_PROGRESS,
        color: "FBCA04",
        description: "A Foreman developer session is working on this",
    },
    LabelSpec {
        name: NEEDS_REVIEW,
        color: "1D76DB",
        description: "PR is waiting for review",
    },
    LabelSpec {
        name: APPROVED,
        color: "0E8A16",
        description: "PR passed review, awaiting human",
    },
    LabelSpec {
        name: NEEDS_HELP,
        color: "D93F0B",
        description: "Automation could not finish this, needs human attention",
    },
];
