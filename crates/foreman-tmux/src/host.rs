//! Session host interface.

use std::collections::BTreeMap;
use std::path::PathBuf;

use async_trait::async_trait;

use crate::Result;

/// Parameters for launching a worker session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateSession {
    pub name: String,
    pub cwd: PathBuf,
    /// Shell command run inside the session.
    pub command: String,
    pub env: BTreeMap<String, String>,
}

impl CreateSession {
    pub fn new(
        name: impl Into<String>,
        cwd: impl Into<PathBuf>,
        command: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            cwd: cwd.into(),
            command: command.into(),
            env: BTreeMap::new(),
        }
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }
}

/// Hosts worker processes in named, detached sessions.
#[async_trait]
pub trait SessionHost: Send + Sync {
    /// Start a detached session running `spec.command`.
    async fn create_session(&self, spec: CreateSession) -> Result<()>;

    /// Whether a session with exactly this name is running.
    async fn is_alive(&self, name: &str) -> bool;

    /// Terminate a session. Killing a session that is already gone succeeds.
    async fn kill(&self, name: &str) -> Result<()>;

    /// Names of running sessions, optionally filtered by prefix.
    async fn list_sessions(&self, prefix: Option<&str>) -> Result<Vec<String>>;

    /// Send tmux key names (e.g. `Enter`) to a session.
    async fn send_keys(&self, name: &str, keys: &str) -> Result<()>;
}
