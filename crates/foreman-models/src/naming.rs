//! Session naming convention.
//!
//! Names follow `foreman-<project>-pm`, `foreman-<project>-cto` and
//! `foreman-<project>-dev-<issue>`. Project names may themselves contain
//! dashes, so parsing anchors on the suffix.

/// Prefix shared by every session Foreman creates.
pub const APP_PREFIX: &str = "foreman";

/// What a parsed session name refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionKind {
    Pm,
    Cto,
    Developer { issue_number: u64 },
}

/// Result of [`parse_session_name`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedSession {
    pub project: String,
    pub kind: SessionKind,
}

/// Replace characters tmux treats specially in target names.
pub fn sanitize_project(project: &str) -> String {
    project
        .chars()
        .map(|c| match c {
            '.' | ':' | ' ' => '-',
            c => c,
        })
        .collect()
}

pub fn pm_session_name(project: &str) -> String {
    format!("{}-{}-pm", APP_PREFIX, sanitize_project(project))
}

pub fn cto_session_name(project: &str) -> String {
    format!("{}-{}-cto", APP_PREFIX, sanitize_project(project))
}

pub fn dev_session_name(project: &str, issue_number: u64) -> String {
    format!(
        "{}-{}-dev-{}",
        APP_PREFIX,
        sanitize_project(project),
        issue_number
    )
}

/// Prefix matching every session of one project.
pub fn project_session_prefix(project: &str) -> String {
    format!("{}-{}-", APP_PREFIX, sanitize_project(project))
}

/// Whether `name` is one of `project`'s sessions.
///
/// Exact on the parsed project, so `foreman-web-app-dev-9` is not a
/// session of `web` even though it shares the `foreman-web-` prefix.
pub fn belongs_to_project(name: &str, project: &str) -> bool {
    parse_session_name(name).map_or(false, |parsed| parsed.project == sanitize_project(project))
}

pub fn is_foreman_session(name: &str) -> bool {
    name.starts_with(APP_PREFIX) && name[APP_PREFIX.len()..].starts_with('-')
}

/// Parse a session name produced by this module.
pub fn parse_session_name(name: &str) -> Option<ParsedSession> {
    if !is_foreman_session(name) {
        return None;
    }
    let rest = &name[APP_PREFIX.len() + 1..];

    if let Some(idx) = rest.rfind("-dev-") {
        let issue = &rest[idx + 5..];
        if !issue.is_empty() && issue.bytes().all(|b| b.is_ascii_digit()) {
            let project = &rest[..idx];
            if project.is_empty() {
                return None;
            }
            return Some(ParsedSession {
                project: project.to_string(),
                kind: SessionKind::Developer {
                    issue_number: issue.parse().ok()?,
                },
            });
        }
    }

    let (project, kind) = if let Some(project) = rest.strip_suffix("-pm") {
        (project, SessionKind::Pm)
    } else if let Some(project) = rest.strip_suffix("-cto") {
        (project, SessionKind::Cto)
    } else {
        return None;
    };

    if project.is_empty() {
        return None;
    }

    Some(ParsedSession {
        project: project.to_string(),
        kind,
    })
}

/// Expand an operator shorthand (`pm`, `cto`, `dev-12`, `12`) into a full session name.
pub fn expand_short_name(project: &str, short: &str) -> String {
    if is_foreman_session(short) {
        return short.to_string();
    }
    match short {
        "pm" => pm_session_name(project),
        "cto" | "reviewer" => cto_session_name(project),
        other => {
            let digits = other.strip_prefix("dev-").unwrap_or(other);
            match digits.parse::<u64>() {
                Ok(n) => dev_session_name(project, n),
                Err(_) => other.to_string(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_names() {
        assert_eq!(pm_session_name("web"), "foreman-web-pm");
        assert_eq!(cto_session_name("web"), "foreman-web-cto");
        assert_eq!(dev_session_name("web", 42), "foreman-web-dev-42");
        assert_eq!(dev_session_name("my.app", 1), "foreman-my-app-dev-1");
    }

    #[test]
    fn test_parse_dev_with_dashed_project() {
        let parsed = parse_session_name("foreman-my-cool-app-dev-42").unwrap();
        assert_eq!(parsed.project, "my-cool-app");
        assert_eq!(parsed.kind, SessionKind::Developer { issue_number: 42 });
    }

    #[test]
    fn test_belongs_to_project_ignores_prefix_siblings() {
        assert!(belongs_to_project("foreman-web-dev-9", "web"));
        assert!(belongs_to_project("foreman-web-pm", "web"));
        assert!(!belongs_to_project("foreman-web-app-dev-9", "web"));
        assert!(!belongs_to_project("foreman-web-app-cto", "web"));
        assert!(belongs_to_project("foreman-web-app-cto", "web-app"));
        assert!(belongs_to_project("foreman-my-app-dev-1", "my.app"));
        assert!(!belongs_to_project("foreman-web-scratch", "web"));
    }

    #[test]
    fn test_parse_pm_and_cto() {
        let pm = parse_session_name("foreman-api-pm").unwrap();
        assert_eq!(pm.project, "api");
        assert_eq!(pm.kind, SessionKind::Pm);

        let cto = parse_session_name("foreman-the-api-cto").unwrap();
        assert_eq!(cto.project, "the-api");
        assert_eq!(cto.kind, SessionKind::Cto);
    }

    #[test]
    fn test_parse_rejects_foreign_names() {
        assert!(parse_session_name("other-api-pm").is_none());
        assert!(parse_session_name("foremanx-api-pm").is_none());
        assert!(parse_session_name("foreman-pm").is_none());
        assert!(parse_session_name("foreman-api-dev-abc").is_none());
        assert!(parse_session_name("foreman-api-worker").is_none());
    }

    #[test]
    fn test_parse_inverts_generate() {
        for issue in [1u64, 42, 9999] {
            let name = dev_session_name("multi-part-name", issue);
            let parsed = parse_session_name(&name).unwrap();
            assert_eq!(parsed.project, "multi-part-name");
            assert_eq!(parsed.kind, SessionKind::Developer { issue_number: issue });
        }
    }

    #[test]
    fn test_expand_short_name() {
        assert_eq!(expand_short_name("web", "pm"), "foreman-web-pm");
        assert_eq!(expand_short_name("web", "cto"), "foreman-web-cto");
        assert_eq!(expand_short_name("web", "dev-7"), "foreman-web-dev-7");
        assert_eq!(expand_short_name("web", "7"), "foreman-web-dev-7");
        assert_eq!(expand_short_name("web", "foreman-x-pm"), "foreman-x-pm");
        assert_eq!(expand_short_name("web", "scratch"), "scratch");
    }
}
