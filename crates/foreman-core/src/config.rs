//! Shared configuration paths for Foreman.
//!
//! # Storage Structure
//!
//! Machine-wide data lives under `~/.foreman/`:
//!
//! ```text
//! ~/.foreman/
//! ├── db/
//! │   └── ledger.db   # session registry + usage snapshots
//! └── config/
//!     ├── config.toml # global ceilings
//!     └── .env.local  # secrets
//! ```
//!
//! Each repository keeps its own state under `<repo>/.foreman/`:
//!
//! ```text
//! <repo>/.foreman/
//! ├── state.db        # message bus + revision counters
//! └── prompts/        # instruction templates and rendered prompts
//! ```
//!
//! # Environment Variables
//!
//! - `FOREMAN_STATE_DIR`: Override the base state directory
//! - `FOREMAN_DB_DIR`: Override the database directory
//! - `FOREMAN_CONFIG_DIR`: Override the config directory

use std::path::{Path, PathBuf};

/// Environment variable for custom state directory.
pub const STATE_DIR_ENV: &str = "FOREMAN_STATE_DIR";

/// Environment variable for custom database directory.
pub const DB_DIR_ENV: &str = "FOREMAN_DB_DIR";

/// Environment variable for custom config directory.
pub const CONFIG_DIR_ENV: &str = "FOREMAN_CONFIG_DIR";

/// Default state directory name under home.
const DEFAULT_STATE_DIR: &str = ".foreman";

/// Per-repository state directory name.
const PROJECT_SUBDIR: &str = ".foreman";

const DB_SUBDIR: &str = "db";
const CONFIG_SUBDIR: &str = "config";
const PROMPTS_SUBDIR: &str = "prompts";

const GLOBAL_DB_FILE: &str = "ledger.db";
const PROJECT_DB_FILE: &str = "state.db";

/// Get the Foreman state directory.
///
/// The state directory is determined by:
/// 1. `FOREMAN_STATE_DIR` environment variable if set
/// 2. `~/.foreman` if home directory is available
/// 3. `.foreman` in current directory as fallback
pub fn state_dir() -> PathBuf {
    std::env::var(STATE_DIR_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            dirs::home_dir()
                .map(|h| h.join(DEFAULT_STATE_DIR))
                .unwrap_or_else(|| PathBuf::from(DEFAULT_STATE_DIR))
        })
}

/// Get the database directory under `state_dir`.
///
/// `FOREMAN_DB_DIR` wins when set.
pub fn db_dir(state_dir: &Path) -> PathBuf {
    std::env::var(DB_DIR_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|_| state_dir.join(DB_SUBDIR))
}

/// Get the user config directory under `state_dir`.
///
/// `FOREMAN_CONFIG_DIR` wins when set.
pub fn config_dir(state_dir: &Path) -> PathBuf {
    std::env::var(CONFIG_DIR_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|_| state_dir.join(CONFIG_SUBDIR))
}

/// The machine-wide ledger database.
pub fn global_db_file(state_dir: &Path) -> PathBuf {
    db_dir(state_dir).join(GLOBAL_DB_FILE)
}

/// The machine-wide `config.toml`.
pub fn global_config_file(state_dir: &Path) -> PathBuf {
    config_dir(state_dir).join("config.toml")
}

/// Environment file for secrets (tokens).
pub fn env_file(state_dir: &Path) -> PathBuf {
    config_dir(state_dir).join(".env.local")
}

/// `<repo>/.foreman`
pub fn project_dir(repo_root: &Path) -> PathBuf {
    repo_root.join(PROJECT_SUBDIR)
}

/// `<repo>/.foreman/state.db`
pub fn project_db_file(repo_root: &Path) -> PathBuf {
    project_dir(repo_root).join(PROJECT_DB_FILE)
}

/// `<repo>/.foreman/prompts`
pub fn project_prompts_dir(repo_root: &Path) -> PathBuf {
    project_dir(repo_root).join(PROMPTS_SUBDIR)
}

/// Ensure the global and per-repository directories exist.
///
/// # Errors
/// Returns an error if any directory cannot be created.
pub fn ensure_all_dirs(state_dir: &Path, repo_root: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(db_dir(state_dir))?;
    std::fs::create_dir_all(config_dir(state_dir))?;
    std::fs::create_dir_all(project_prompts_dir(repo_root))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    // These tests avoid setting environment variables, which can't be
    // isolated in parallel test execution.

    #[test]
    fn test_state_dir_name() {
        let dir = state_dir();
        assert!(dir.is_absolute() || dir.ends_with(".foreman"));
    }

    #[test]
    fn test_global_file_names() {
        let base = Path::new("/tmp/fm");
        assert!(global_db_file(base).ends_with("ledger.db"));
        assert!(global_config_file(base).ends_with("config.toml"));
        assert!(env_file(base).ends_with(".env.local"));
    }

    #[test]
    fn test_project_paths() {
        let repo = Path::new("/src/web");
        assert_eq!(project_db_file(repo), PathBuf::from("/src/web/.foreman/state.db"));
        assert_eq!(project_prompts_dir(repo), PathBuf::from("/src/web/.foreman/prompts"));
    }

    #[test]
    fn test_ensure_all_dirs() {
        let tmp = tempfile::TempDir::new().unwrap();
        let state = tmp.path().join("state");
        let repo = tmp.path().join("repo");
        ensure_all_dirs(&state, &repo).unwrap();
        assert!(project_prompts_dir(&repo).is_dir());
        assert!(config_dir(&state).is_dir());
    }
}
