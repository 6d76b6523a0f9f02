//! Shared launcher shape and settings.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use foreman_core::{project_prompts_dir, AgentSettings, ProjectConfig};
use foreman_models::WorktreeStrategy;
use foreman_tmux::{CreateSession, SessionHost};

use crate::error::Result;

/// Starts one kind of worker session.
#[async_trait]
pub trait RoleLauncher: Send + Sync {
    /// What the role needs to know about its assignment.
    type Request: Send + Sync;

    fn session_name(&self, request: &Self::Request) -> String;

    fn build_instructions(&self, request: &Self::Request) -> String;

    /// Start the session and return its name.
    async fn spawn(&self, request: &Self::Request) -> Result<String>;

    async fn is_running(&self, request: &Self::Request) -> bool;
}

/// Everything a launcher needs from configuration.
#[derive(Debug, Clone)]
pub struct LaunchSettings {
    pub project: String,
    /// `owner/name`.
    pub repo: String,
    pub repo_root: PathBuf,
    pub agent: AgentSettings,
    pub review_label: String,
    pub approved_label: String,
    pub pr_title_prefix: String,
    pub strategy: WorktreeStrategy,
    pub gh_token: Option<String>,
    /// Wait before accepting the agent's trust prompt; zero disables.
    pub trust_prompt_delay: Duration,
}

impl LaunchSettings {
    pub fn from_config(config: &ProjectConfig, project: impl Into<String>, repo_root: impl Into<PathBuf>) -> Self {
        Self {
            project: project.into(),
            repo: config.project.repo.clone(),
            repo_root: repo_root.into(),
            agent: config.agent.clone(),
            review_label: config.cto.review_label.clone(),
            approved_label: config.cto.approved_label.clone(),
            pr_title_prefix: String::new(),
            strategy: config.worktrees.strategy,
            gh_token: config.gh_token(),
            trust_prompt_delay: Duration::from_millis(config.cto.trust_prompt_delay_ms),
        }
    }

    pub fn prompts_dir(&self) -> PathBuf {
        project_prompts_dir(&self.repo_root)
    }
}

/// Create the session, then accept the trust prompt if configured.
pub(crate) async fn launch(
    host: &Arc<dyn SessionHost>,
    settings: &LaunchSettings,
    mut spec: CreateSession,
) -> Result<()> {
    if let Some(token) = &settings.gh_token {
        spec = spec.with_env("GH_TOKEN", token.clone());
    }
    let name = spec.name.clone();
    debug!(session = %name, cwd = %spec.cwd.display(), "creating session");
    host.create_session(spec).await?;

    if !settings.trust_prompt_delay.is_zero() {
        tokio::time::sleep(settings.trust_prompt_delay).await;
        if let Err(e) = host.send_keys(&name, "Enter").await {
            warn!(session = %name, error = %e, "could not accept trust prompt");
        }
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod testing {
    //! Session host that records requests instead of starting processes.

    use super::*;
    use std::collections::BTreeSet;
    use std::sync::Mutex;

    #[derive(Default)]
    pub struct RecordingHost {
        pub created: Mutex<Vec<CreateSession>>,
        pub keys: Mutex<Vec<(String, String)>>,
        pub alive: Mutex<BTreeSet<String>>,
    }

    #[async_trait]
    impl SessionHost for RecordingHost {
        async fn create_session(&self, spec: CreateSession) -> foreman_tmux::Result<()> {
            self.alive.lock().unwrap().insert(spec.name.clone());
            self.created.lock().unwrap().push(spec);
            Ok(())
        }

        async fn is_alive(&self, name: &str) -> bool {
            self.alive.lock().unwrap().contains(name)
        }

        async fn kill(&self, name: &str) -> foreman_tmux::Result<()> {
            self.alive.lock().unwrap().remove(name);
            Ok(())
        }

        async fn list_sessions(&self, prefix: Option<&str>) -> foreman_tmux::Result<Vec<String>> {
            Ok(self
                .alive
                .lock()
                .unwrap()
                .iter()
                .filter(|n| prefix.map_or(true, |p| n.starts_with(p)))
                .cloned()
                .collect())
        }

        async fn send_keys(&self, name: &str, keys: &str) -> foreman_tmux::Result<()> {
            self.keys
                .lock()
                .unwrap()
                .push((name.to_string(), keys.to_string()));
            Ok(())
        }
    }

    pub fn settings(repo_root: &std::path::Path) -> LaunchSettings {
        LaunchSettings {
            project: "web".to_string(),
            repo: "acme/web".to_string(),
            repo_root: repo_root.to_path_buf(),
            agent: AgentSettings::default(),
            review_label: "needs-cto-review".to_string(),
            approved_label: "cto-approved".to_string(),
            pr_title_prefix: String::new(),
            strategy: WorktreeStrategy::Managed,
            gh_token: None,
            trust_prompt_delay: Duration::ZERO,
        }
    }
}
