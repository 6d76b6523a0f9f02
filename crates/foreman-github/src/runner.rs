//! Process execution seam.

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Output;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::trace;

use crate::error::{GithubError, Result};

/// Runs external programs. Swapped for a stub in tests.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(
        &self,
        program: &str,
        args: &[OsString],
        cwd: Option<&Path>,
        env: &BTreeMap<String, String>,
    ) -> io::Result<Output>;
}

/// Runs commands with `tokio::process::Command`.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessCommandRunner;

#[async_trait]
impl CommandRunner for ProcessCommandRunner {
    async fn run(
        &self,
        program: &str,
        args: &[OsString],
        cwd: Option<&Path>,
        env: &BTreeMap<String, String>,
    ) -> io::Result<Output> {
        let mut command = Command::new(program);
        command.args(args);
        if let Some(cwd) = cwd {
            command.current_dir(cwd);
        }
        command.envs(env).kill_on_drop(true);
        command.output().await
    }
}

pub(crate) fn os_args<I, S>(args: I) -> Vec<OsString>
where
    I: IntoIterator<Item = S>,
    S: Into<OsString>,
{
    args.into_iter().map(Into::into).collect()
}

pub(crate) fn display_args(args: &[OsString]) -> String {
    args.iter()
        .map(|a| a.to_string_lossy().to_string())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Run `program` and return stdout, mapping a non-zero exit to an error.
pub(crate) async fn run_checked(
    runner: &dyn CommandRunner,
    program: &str,
    args: &[OsString],
    cwd: Option<&Path>,
    env: &BTreeMap<String, String>,
) -> Result<String> {
    trace!(program = %program, args = %display_args(args), "running command");
    let output = runner
        .run(program, args, cwd, env)
        .await
        .map_err(|source| GithubError::Spawn {
            program: program.to_string(),
            source,
        })?;
    if output.status.success() {
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    } else {
        Err(GithubError::CommandFailed {
            program: program.to_string(),
            args: display_args(args),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }
}

/// Shared `gh` invocation context: repo directory and token.
#[derive(Clone)]
pub struct GhCli {
    runner: Arc<dyn CommandRunner>,
    cwd: PathBuf,
    env: BTreeMap<String, String>,
}

impl GhCli {
    pub fn new(runner: Arc<dyn CommandRunner>, cwd: impl Into<PathBuf>) -> Self {
        Self {
            runner,
            cwd: cwd.into(),
            env: BTreeMap::new(),
        }
    }

    /// Authenticate `gh` with an explicit token.
    pub fn with_token(mut self, token: Option<String>) -> Self {
        if let Some(token) = token {
            self.env.insert("GH_TOKEN".to_string(), token);
        }
        self
    }

    pub(crate) async fn run<I, S>(&self, args: I) -> Result<String>
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        let args = os_args(args);
        run_checked(self.runner.as_ref(), "gh", &args, Some(&self.cwd), &self.env).await
    }

    pub(crate) fn parse_json<T: serde::de::DeserializeOwned>(&self, stdout: &str) -> Result<T> {
        serde_json::from_str(stdout).map_err(|e| GithubError::Parse {
            program: "gh".to_string(),
            message: e.to_string(),
        })
    }
}
