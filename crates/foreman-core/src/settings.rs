//! TOML settings.
//!
//! `foreman.toml` at the repository root configures one project;
//! `config.toml` in the config directory holds machine-wide ceilings. Missing
//! files and missing fields fall back to defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use foreman_models::{labels, WorktreeStrategy};

/// Per-repository config file name.
pub const PROJECT_CONFIG_FILE: &str = "foreman.toml";

const DEFAULT_BRANCH: &str = "main";
const DEFAULT_POLL_INTERVAL_SECS: u64 = 300;
const DEFAULT_ISSUE_FILTER: &str = "is:open is:issue label:ready";
const DEFAULT_MAX_REVISIONS: u32 = 2;
const DEFAULT_TRUST_PROMPT_DELAY_MS: u64 = 2000;
const DEFAULT_MAX_PROJECT_SESSIONS: usize = 5;
const DEFAULT_COST_PER_MINUTE: f64 = 0.15;
const DEFAULT_PLAN_PRICE_USD: f64 = 200.0;
const DEFAULT_MAX_PRS_AWAITING_CTO: usize = 5;
const DEFAULT_MAX_PRS_AWAITING_HUMAN: usize = 3;
const DEFAULT_WORKTREE_DIR: &str = "../.foreman-worktrees";
const DEFAULT_AGENT_COMMAND: &str = "claude";
const DEFAULT_REVISION_FLAG: &str = "--from-pr";
const DEFAULT_NIGHT_START_HOUR: u32 = 1;
const DEFAULT_NIGHT_END_HOUR: u32 = 6;
const DEFAULT_SAFETY_MARGIN_PERCENT: f64 = 15.0;
const DEFAULT_WEEKLY_MINUTES_LIMIT: f64 = 600.0;
const DEFAULT_NIGHT_MAX_DEVELOPERS: usize = 5;
const DEFAULT_MAX_TOTAL_SESSIONS: usize = 10;
const DEFAULT_MAX_COST_PER_DAY_USD: f64 = 50.0;
const DEFAULT_THROTTLE_AT_PERCENT: f64 = 80.0;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("failed to render config: {0}")]
    Render(#[from] toml::ser::Error),

    #[error("{0}")]
    Invalid(String),
}

impl ConfigError {
    fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid(message.into())
    }
}

fn default_branch() -> String {
    DEFAULT_BRANCH.to_string()
}
fn default_poll_interval() -> u64 {
    DEFAULT_POLL_INTERVAL_SECS
}
fn default_issue_filter() -> String {
    DEFAULT_ISSUE_FILTER.to_string()
}
fn default_review_label() -> String {
    labels::NEEDS_REVIEW.to_string()
}
fn default_approved_label() -> String {
    labels::APPROVED.to_string()
}
fn default_max_revisions() -> u32 {
    DEFAULT_MAX_REVISIONS
}
fn default_trust_prompt_delay_ms() -> u64 {
    DEFAULT_TRUST_PROMPT_DELAY_MS
}
fn default_max_project_sessions() -> usize {
    DEFAULT_MAX_PROJECT_SESSIONS
}
fn default_cost_per_minute() -> f64 {
    DEFAULT_COST_PER_MINUTE
}
fn default_plan_price() -> f64 {
    DEFAULT_PLAN_PRICE_USD
}
fn default_max_prs_awaiting_cto() -> usize {
    DEFAULT_MAX_PRS_AWAITING_CTO
}
fn default_max_prs_awaiting_human() -> usize {
    DEFAULT_MAX_PRS_AWAITING_HUMAN
}
fn default_worktree_dir() -> String {
    DEFAULT_WORKTREE_DIR.to_string()
}
fn default_agent_command() -> String {
    DEFAULT_AGENT_COMMAND.to_string()
}
fn default_agent_args() -> Vec<String> {
    vec!["--permission-mode".to_string(), "acceptEdits".to_string()]
}
fn default_deferred_args() -> Vec<String> {
    Vec::new()
}
fn default_revision_flag() -> String {
    DEFAULT_REVISION_FLAG.to_string()
}
fn default_unset_env() -> Vec<String> {
    vec!["CLAUDECODE".to_string()]
}
fn default_night_start() -> u32 {
    DEFAULT_NIGHT_START_HOUR
}
fn default_night_end() -> u32 {
    DEFAULT_NIGHT_END_HOUR
}
fn default_safety_margin() -> f64 {
    DEFAULT_SAFETY_MARGIN_PERCENT
}
fn default_weekly_limit() -> f64 {
    DEFAULT_WEEKLY_MINUTES_LIMIT
}
fn default_night_max_developers() -> usize {
    DEFAULT_NIGHT_MAX_DEVELOPERS
}
fn default_max_total_sessions() -> usize {
    DEFAULT_MAX_TOTAL_SESSIONS
}
fn default_max_cost_per_day() -> f64 {
    DEFAULT_MAX_COST_PER_DAY_USD
}
fn default_throttle_at() -> f64 {
    DEFAULT_THROTTLE_AT_PERCENT
}

/// `[project]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectSettings {
    /// Project name used in session names; defaults to the repo directory name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// `owner/name` on the hosting service.
    #[serde(default)]
    pub repo: String,
    #[serde(default = "default_branch")]
    pub default_branch: String,
    /// Environment variable whose value is passed to workers as `GH_TOKEN`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gh_token_env: Option<String>,
}

impl Default for ProjectSettings {
    fn default() -> Self {
        Self {
            name: None,
            repo: String::new(),
            default_branch: default_branch(),
            gh_token_env: None,
        }
    }
}

/// `[pm]`: the controller loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PmSettings {
    #[serde(default = "default_poll_interval")]
    pub poll_interval_seconds: u64,
    #[serde(default = "default_issue_filter")]
    pub issue_filter: String,
    #[serde(default)]
    pub dry_run: bool,
}

impl Default for PmSettings {
    fn default() -> Self {
        Self {
            poll_interval_seconds: default_poll_interval(),
            issue_filter: default_issue_filter(),
            dry_run: false,
        }
    }
}

/// `[cto]`: the review stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CtoSettings {
    #[serde(default = "default_review_label")]
    pub review_label: String,
    #[serde(default = "default_approved_label")]
    pub approved_label: String,
    #[serde(default = "default_max_revisions")]
    pub max_revisions: u32,
    /// Delay before pressing Enter on the agent's trust prompt; 0 disables.
    #[serde(default = "default_trust_prompt_delay_ms")]
    pub trust_prompt_delay_ms: u64,
}

impl Default for CtoSettings {
    fn default() -> Self {
        Self {
            review_label: default_review_label(),
            approved_label: default_approved_label(),
            max_revisions: default_max_revisions(),
            trust_prompt_delay_ms: default_trust_prompt_delay_ms(),
        }
    }
}

/// `[hr]`: per-project capacity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HrSettings {
    #[serde(default = "default_max_project_sessions")]
    pub max_concurrent_sessions: usize,
    #[serde(default = "default_cost_per_minute")]
    pub estimated_cost_per_minute: f64,
    /// Monthly subscription price used to turn utilization into dollars.
    #[serde(default = "default_plan_price")]
    pub plan_price_usd: f64,
}

impl Default for HrSettings {
    fn default() -> Self {
        Self {
            max_concurrent_sessions: default_max_project_sessions(),
            estimated_cost_per_minute: default_cost_per_minute(),
            plan_price_usd: default_plan_price(),
        }
    }
}

/// `[backpressure]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackpressureSettings {
    #[serde(default = "default_max_prs_awaiting_cto")]
    pub max_prs_awaiting_cto: usize,
    #[serde(default = "default_max_prs_awaiting_human")]
    pub max_prs_awaiting_human: usize,
}

impl Default for BackpressureSettings {
    fn default() -> Self {
        Self {
            max_prs_awaiting_cto: default_max_prs_awaiting_cto(),
            max_prs_awaiting_human: default_max_prs_awaiting_human(),
        }
    }
}

/// `[worktrees]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorktreeSettings {
    /// Directory holding worktrees; relative paths resolve against the repo root.
    #[serde(default = "default_worktree_dir")]
    pub directory: String,
    #[serde(default)]
    pub strategy: WorktreeStrategy,
}

impl Default for WorktreeSettings {
    fn default() -> Self {
        Self {
            directory: default_worktree_dir(),
            strategy: WorktreeStrategy::default(),
        }
    }
}

/// `[agent]`: the coding agent launched in each session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentSettings {
    #[serde(default = "default_agent_command")]
    pub command: String,
    #[serde(default = "default_agent_args")]
    pub args: Vec<String>,
    /// Extra arguments when the worktree strategy is `deferred`.
    #[serde(default = "default_deferred_args")]
    pub deferred_worktree_args: Vec<String>,
    /// Flag followed by a PR number to resume work on that PR.
    #[serde(default = "default_revision_flag")]
    pub revision_flag: String,
    /// Variables cleared before the agent starts.
    #[serde(default = "default_unset_env")]
    pub unset_env: Vec<String>,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            command: default_agent_command(),
            args: default_agent_args(),
            deferred_worktree_args: default_deferred_args(),
            revision_flag: default_revision_flag(),
            unset_env: default_unset_env(),
        }
    }
}

/// `[night_shift]`: elevated-concurrency window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NightShiftSettings {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_night_start")]
    pub start_hour: u32,
    #[serde(default = "default_night_end")]
    pub end_hour: u32,
    #[serde(default = "default_safety_margin")]
    pub safety_margin_percent: f64,
    #[serde(default = "default_weekly_limit")]
    pub weekly_session_minutes_limit: f64,
    #[serde(default = "default_night_max_developers")]
    pub max_concurrent_developers: usize,
}

impl Default for NightShiftSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            start_hour: default_night_start(),
            end_hour: default_night_end(),
            safety_margin_percent: default_safety_margin(),
            weekly_session_minutes_limit: default_weekly_limit(),
            max_concurrent_developers: default_night_max_developers(),
        }
    }
}

/// Contents of `foreman.toml`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ProjectConfig {
    #[serde(default)]
    pub project: ProjectSettings,
    #[serde(default)]
    pub pm: PmSettings,
    #[serde(default)]
    pub cto: CtoSettings,
    #[serde(default)]
    pub hr: HrSettings,
    #[serde(default)]
    pub backpressure: BackpressureSettings,
    #[serde(default)]
    pub worktrees: WorktreeSettings,
    #[serde(default)]
    pub agent: AgentSettings,
    #[serde(default)]
    pub night_shift: NightShiftSettings,
}

impl ProjectConfig {
    /// Load `<repo_root>/foreman.toml`, or defaults when it does not exist.
    pub fn load(repo_root: &Path) -> Result<Self, ConfigError> {
        let path = repo_root.join(PROJECT_CONFIG_FILE);
        if !path.exists() {
            debug!(path = %path.display(), "no project config, using defaults");
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.clone(),
            source,
        })?;
        let config: Self =
            toml::from_str(&content).map_err(|source| ConfigError::Parse { path, source })?;
        config.validate()?;
        Ok(config)
    }

    /// Parse from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content).map_err(|source| ConfigError::Parse {
            path: PathBuf::from(PROJECT_CONFIG_FILE),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let ns = &self.night_shift;
        if ns.start_hour > 23 || ns.end_hour > 23 {
            return Err(ConfigError::invalid(format!(
                "night_shift hours must be 0-23 (got start={}, end={})",
                ns.start_hour, ns.end_hour
            )));
        }
        if !(0.0..=100.0).contains(&ns.safety_margin_percent) {
            return Err(ConfigError::invalid(format!(
                "night_shift.safety_margin_percent must be 0-100 (got {})",
                ns.safety_margin_percent
            )));
        }
        if ns.weekly_session_minutes_limit < 0.0 {
            return Err(ConfigError::invalid(
                "night_shift.weekly_session_minutes_limit must not be negative",
            ));
        }
        if self.pm.poll_interval_seconds == 0 {
            return Err(ConfigError::invalid("pm.poll_interval_seconds must be > 0"));
        }
        if self.hr.estimated_cost_per_minute < 0.0 || self.hr.plan_price_usd < 0.0 {
            return Err(ConfigError::invalid("hr cost settings must not be negative"));
        }
        if self.agent.command.trim().is_empty() {
            return Err(ConfigError::invalid("agent.command must not be empty"));
        }
        Ok(())
    }

    /// Project name: the configured name, else the repo directory name.
    pub fn project_name(&self, repo_root: &Path) -> String {
        self.project.name.clone().unwrap_or_else(|| {
            repo_root
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| "project".to_string())
        })
    }

    /// Absolute worktree directory, with `~` expanded.
    pub fn worktree_root(&self, repo_root: &Path) -> PathBuf {
        let expanded = shellexpand::tilde(&self.worktrees.directory).to_string();
        let path = PathBuf::from(expanded);
        if path.is_absolute() {
            path
        } else {
            repo_root.join(path)
        }
    }

    /// Token passed to workers as `GH_TOKEN`, read from the configured variable.
    pub fn gh_token(&self) -> Option<String> {
        self.project
            .gh_token_env
            .as_deref()
            .and_then(|var| std::env::var(var).ok())
            .filter(|v| !v.is_empty())
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }
}

/// `[hr]` in the global config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalHrSettings {
    #[serde(default = "default_max_total_sessions")]
    pub max_total_sessions: usize,
    #[serde(default = "default_max_cost_per_day")]
    pub max_cost_per_day_usd: f64,
    /// Daily spend percentage at which status reports the budget as throttled.
    #[serde(default = "default_throttle_at")]
    pub throttle_at_percent: f64,
}

impl Default for GlobalHrSettings {
    fn default() -> Self {
        Self {
            max_total_sessions: default_max_total_sessions(),
            max_cost_per_day_usd: default_max_cost_per_day(),
            throttle_at_percent: default_throttle_at(),
        }
    }
}

/// Contents of the machine-wide `config.toml`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GlobalConfig {
    #[serde(default)]
    pub hr: GlobalHrSettings,
}

impl GlobalConfig {
    /// Load `path`, or defaults when it does not exist.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Starter `foreman.toml` for `repo` (`owner/name`).
pub fn generate_default_toml(repo: &str) -> Result<String, ConfigError> {
    let mut config = ProjectConfig::default();
    config.project.repo = repo.to_string();
    config.project.gh_token_env = Some("FOREMAN_GH_TOKEN".to_string());
    config.to_toml()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = ProjectConfig::default();
        assert_eq!(config.pm.poll_interval_seconds, 300);
        assert_eq!(config.pm.issue_filter, "is:open is:issue label:ready");
        assert_eq!(config.cto.max_revisions, 2);
        assert_eq!(config.cto.review_label, "needs-cto-review");
        assert_eq!(config.hr.max_concurrent_sessions, 5);
        assert_eq!(config.backpressure.max_prs_awaiting_human, 3);
        assert_eq!(config.night_shift.start_hour, 1);
        assert_eq!(config.night_shift.end_hour, 6);
        assert!(!config.night_shift.enabled);
        assert_eq!(config.worktrees.strategy, WorktreeStrategy::Managed);

        let global = GlobalConfig::default();
        assert_eq!(global.hr.max_total_sessions, 10);
        assert_eq!(global.hr.max_cost_per_day_usd, 50.0);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = ProjectConfig::from_toml(
            r#"
            [project]
            repo = "acme/web"

            [night_shift]
            enabled = true
            start_hour = 22

            [worktrees]
            strategy = "deferred"
            "#,
        )
        .unwrap();
        assert_eq!(config.project.repo, "acme/web");
        assert_eq!(config.project.default_branch, "main");
        assert!(config.night_shift.enabled);
        assert_eq!(config.night_shift.start_hour, 22);
        assert_eq!(config.night_shift.end_hour, 6);
        assert_eq!(config.worktrees.strategy, WorktreeStrategy::Deferred);
        assert_eq!(config.hr.estimated_cost_per_minute, 0.15);
    }

    #[test]
    fn test_validation_rejects_bad_hours() {
        let err = ProjectConfig::from_toml("[night_shift]\nstart_hour = 24\n").unwrap_err();
        assert!(err.to_string().contains("0-23"));

        let err =
            ProjectConfig::from_toml("[night_shift]\nsafety_margin_percent = 120.0\n").unwrap_err();
        assert!(err.to_string().contains("safety_margin_percent"));
    }

    #[test]
    fn test_load_missing_file_is_default() {
        let tmp = TempDir::new().unwrap();
        assert_eq!(ProjectConfig::load(tmp.path()).unwrap(), ProjectConfig::default());
        assert_eq!(
            GlobalConfig::load(&tmp.path().join("config.toml")).unwrap(),
            GlobalConfig::default()
        );
    }

    #[test]
    fn test_load_reports_parse_errors_with_path() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join(PROJECT_CONFIG_FILE), "[pm\n").unwrap();
        let err = ProjectConfig::load(tmp.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains("foreman.toml"));
    }

    #[test]
    fn test_generated_toml_round_trips() {
        let text = generate_default_toml("acme/web").unwrap();
        let parsed = ProjectConfig::from_toml(&text).unwrap();
        assert_eq!(parsed.project.repo, "acme/web");
        assert_eq!(parsed.project.gh_token_env.as_deref(), Some("FOREMAN_GH_TOKEN"));
        assert_eq!(parsed.pm, PmSettings::default());
    }

    #[test]
    fn test_project_name_and_worktree_root() {
        let repo = Path::new("/src/web-app");
        let mut config = ProjectConfig::default();
        assert_eq!(config.project_name(repo), "web-app");
        assert_eq!(
            config.worktree_root(repo),
            PathBuf::from("/src/web-app/../.foreman-worktrees")
        );

        config.project.name = Some("web".into());
        config.worktrees.directory = "/var/wt".into();
        assert_eq!(config.project_name(repo), "web");
        assert_eq!(config.worktree_root(repo), PathBuf::from("/var/wt"));
    }
}
