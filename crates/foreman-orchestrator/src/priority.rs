//! Ordering of ready issues.

use foreman_models::Issue;

/// Issues with a milestone first, then oldest first.
pub fn prioritize(mut issues: Vec<Issue>) -> Vec<Issue> {
    issues.sort_by_key(|issue| (issue.milestone.is_none(), issue.created_at));
    issues
}
