//! Tmux-backed session host.

use std::path::PathBuf;
use std::process::{Command, Output};

use async_trait::async_trait;
use tracing::{debug, trace, warn};

use crate::host::{CreateSession, SessionHost};
use crate::{Result, TmuxError, TmuxSession};

/// Drives the tmux CLI.
#[derive(Debug, Clone)]
pub struct TmuxOrchestrator {
    /// Path to tmux binary.
    tmux_path: PathBuf,
}

impl TmuxOrchestrator {
    /// Create a new TmuxOrchestrator.
    ///
    /// # Errors
    ///
    /// Returns `TmuxError::NotInstalled` if tmux is not available.
    pub fn new() -> Result<Self> {
        let tmux_path = Self::find_tmux()?;
        debug!(path = %tmux_path.display(), "tmux found");
        Ok(Self { tmux_path })
    }

    /// Check if tmux is available in PATH.
    pub fn is_available() -> bool {
        Self::find_tmux().is_ok()
    }

    fn find_tmux() -> Result<PathBuf> {
        which::which("tmux").map_err(|_| TmuxError::NotInstalled)
    }

    /// Exact-match target for a session. A bare name would also match by prefix.
    fn exact(name: &str) -> String {
        format!("={}", name)
    }

    /// Target the active pane of a session by exact name.
    fn exact_pane(name: &str) -> String {
        format!("={}:", name)
    }

    fn run_tmux(&self, args: &[&str]) -> Result<Output> {
        trace!(args = ?args, "running tmux command");
        let output = Command::new(&self.tmux_path).args(args).output()?;
        trace!(
            status = %output.status,
            stdout_len = output.stdout.len(),
            stderr_len = output.stderr.len(),
            "tmux command completed"
        );
        Ok(output)
    }

    fn run_tmux_checked(&self, args: &[&str]) -> Result<String> {
        let output = self.run_tmux(args)?;

        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).to_string())
        } else {
            Err(TmuxError::CommandFailed {
                command: args.first().copied().unwrap_or_default().to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }

    /// Build `new-session` arguments for a worker.
    fn new_session_args(spec: &CreateSession) -> Vec<String> {
        let mut args = vec![
            "new-session".to_string(),
            "-d".to_string(),
            "-s".to_string(),
            spec.name.clone(),
            "-c".to_string(),
            spec.cwd.to_string_lossy().to_string(),
        ];
        for (key, value) in &spec.env {
            args.push("-e".to_string());
            args.push(format!("{}={}", key, value));
        }
        args.push(spec.command.clone());
        args
    }

    /// Start a detached session running a command.
    ///
    /// # Errors
    ///
    /// Returns `TmuxError::SessionExists` if the name is taken.
    pub fn start_session(&self, spec: &CreateSession) -> Result<()> {
        debug!(name = %spec.name, cwd = %spec.cwd.display(), "creating tmux session");

        if self.session_exists(&spec.name) {
            return Err(TmuxError::SessionExists(spec.name.clone()));
        }

        let args = Self::new_session_args(spec);
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        self.run_tmux_checked(&args)?;
        Ok(())
    }

    /// Kill a session.
    ///
    /// # Errors
    ///
    /// Returns `TmuxError::SessionNotFound` if session doesn't exist.
    pub fn destroy_session(&self, name: &str) -> Result<()> {
        debug!(name = %name, "destroying tmux session");

        if !self.session_exists(name) {
            return Err(TmuxError::SessionNotFound(name.to_string()));
        }

        self.run_tmux_checked(&["kill-session", "-t", &Self::exact(name)])?;
        Ok(())
    }

    /// List all tmux sessions.
    pub fn list_all(&self) -> Result<Vec<TmuxSession>> {
        let output = self.run_tmux(&["list-sessions", "-F", "#{session_name}:#{session_created}"])?;

        // If no sessions exist, tmux returns non-zero exit code
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if stderr.contains("no server running")
                || stderr.contains("no sessions")
                || stderr.contains("error connecting")
            {
                return Ok(Vec::new());
            }
            return Err(TmuxError::CommandFailed {
                command: "list-sessions".to_string(),
                stderr: stderr.trim().to_string(),
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let mut sessions = Vec::new();

        for line in stdout.lines() {
            if line.is_empty() {
                continue;
            }
            match TmuxSession::parse(line) {
                Ok(session) => sessions.push(session),
                Err(e) => {
                    warn!(line = %line, error = %e, "failed to parse session");
                }
            }
        }

        Ok(sessions)
    }

    /// Check if a session with exactly this name exists.
    pub fn session_exists(&self, name: &str) -> bool {
        let output = self.run_tmux(&["has-session", "-t", &Self::exact(name)]);
        matches!(output, Ok(o) if o.status.success())
    }

    /// Send keys to the active pane of a session.
    ///
    /// # Errors
    ///
    /// Returns `TmuxError::SessionNotFound` if session doesn't exist.
    pub fn send_raw_keys(&self, name: &str, keys: &str) -> Result<()> {
        debug!(session = %name, keys = %keys, "sending keys");

        if !self.session_exists(name) {
            return Err(TmuxError::SessionNotFound(name.to_string()));
        }

        self.run_tmux_checked(&["send-keys", "-t", &Self::exact_pane(name), keys])?;
        Ok(())
    }

    /// Arguments that attach the caller's terminal to a session.
    pub fn attach_args(name: &str) -> Vec<String> {
        vec![
            "attach-session".to_string(),
            "-t".to_string(),
            Self::exact(name),
        ]
    }

    pub fn tmux_path(&self) -> &PathBuf {
        &self.tmux_path
    }
}

#[async_trait]
impl SessionHost for TmuxOrchestrator {
    async fn create_session(&self, spec: CreateSession) -> Result<()> {
        self.start_session(&spec)
    }

    async fn is_alive(&self, name: &str) -> bool {
        self.session_exists(name)
    }

    async fn kill(&self, name: &str) -> Result<()> {
        match self.destroy_session(name) {
            Err(TmuxError::SessionNotFound(_)) => {
                debug!(session = %name, "session already gone");
                Ok(())
            }
            other => other,
        }
    }

    async fn list_sessions(&self, prefix: Option<&str>) -> Result<Vec<String>> {
        let names = self
            .list_all()?
            .into_iter()
            .map(|s| s.name)
            .filter(|name| prefix.map_or(true, |p| name.starts_with(p)))
            .collect();
        Ok(names)
    }

    async fn send_keys(&self, name: &str, keys: &str) -> Result<()> {
        self.send_raw_keys(name, keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_when_tmux_not_found() {
        // Either succeeds (tmux installed) or returns NotInstalled
        if let Err(e) = TmuxOrchestrator::new() {
            assert!(matches!(e, TmuxError::NotInstalled));
        }
    }

    #[test]
    fn test_new_session_args() {
        let spec = CreateSession::new("foreman-web-dev-1", "/tmp/wt", "claude -w")
            .with_env("GH_TOKEN", "abc")
            .with_env("A", "1");
        let args = TmuxOrchestrator::new_session_args(&spec);
        assert_eq!(
            args,
            vec![
                "new-session",
                "-d",
                "-s",
                "foreman-web-dev-1",
                "-c",
                "/tmp/wt",
                "-e",
                "A=1",
                "-e",
                "GH_TOKEN=abc",
                "claude -w",
            ]
        );
    }

    #[test]
    fn test_exact_targets() {
        assert_eq!(TmuxOrchestrator::exact("foreman-a-pm"), "=foreman-a-pm");
        assert_eq!(TmuxOrchestrator::exact_pane("foreman-a-pm"), "=foreman-a-pm:");
        assert_eq!(
            TmuxOrchestrator::attach_args("x"),
            vec!["attach-session", "-t", "=x"]
        );
    }

    // Integration tests that require actual tmux
    #[tokio::test]
    #[ignore]
    async fn test_create_kill_session() {
        let tmux = TmuxOrchestrator::new().unwrap();
        let name = "foreman-test-create";
        let _ = tmux.kill(name).await;

        tmux.create_session(CreateSession::new(name, "/tmp", "sleep 30"))
            .await
            .unwrap();
        assert!(tmux.is_alive(name).await);
        assert!(tmux
            .list_sessions(Some("foreman-test-"))
            .await
            .unwrap()
            .contains(&name.to_string()));

        tmux.kill(name).await.unwrap();
        assert!(!tmux.is_alive(name).await);
        // Second kill is a no-op.
        tmux.kill(name).await.unwrap();
    }

    #[tokio::test]
    #[ignore]
    async fn test_is_alive_is_exact() {
        let tmux = TmuxOrchestrator::new().unwrap();
        let name = "foreman-test-dev-42";
        let _ = tmux.kill(name).await;
        tmux.create_session(CreateSession::new(name, "/tmp", "sleep 30"))
            .await
            .unwrap();

        assert!(!tmux.is_alive("foreman-test-dev-4").await);
        tmux.kill(name).await.unwrap();
    }

    #[tokio::test]
    #[ignore]
    async fn test_send_keys_missing_session() {
        let tmux = TmuxOrchestrator::new().unwrap();
        let result = tmux.send_keys("foreman-nonexistent-12345", "Enter").await;
        assert!(matches!(result, Err(TmuxError::SessionNotFound(_))));
    }
}
