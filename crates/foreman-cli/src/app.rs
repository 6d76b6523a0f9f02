//! Wiring of configuration, stores and collaborators for one repository.

use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use regex::Regex;

use foreman_capacity::{
    CapacityLedger, LedgerLimits, UsageClient, UsageScheduler, WeeklyUsageTracker,
};
use foreman_core::{
    ensure_all_dirs, global_config_file, global_db_file, project_db_file, GlobalConfig,
    ProjectConfig,
};
use foreman_github::{
    CommandRunner, GhCli, GhIssueTracker, GhPullRequests, GitWorktrees, ProcessCommandRunner,
};
use foreman_models::{Clock, SystemClock};
use foreman_orchestrator::{Controller, ControllerDeps, ControllerSettings};
use foreman_persistence::{
    GlobalDb, MessageBus, ProjectDb, RevisionStore, SessionRegistry, UsageSnapshotStore,
};
use foreman_roles::{DeveloperLauncher, LaunchSettings, ReviewerLauncher};
use foreman_tmux::TmuxOrchestrator;

use crate::commands::Result;

/// Resolved configuration for the repository at `root`.
pub struct App {
    pub root: PathBuf,
    pub state_dir: PathBuf,
    pub config: ProjectConfig,
    pub global: GlobalConfig,
    pub project: String,
    clock: Arc<dyn Clock>,
}

/// Open handles on both databases.
#[derive(Clone)]
pub struct Stores {
    pub registry: SessionRegistry,
    pub snapshots: UsageSnapshotStore,
    pub bus: MessageBus,
    pub revisions: RevisionStore,
}

impl App {
    pub fn load(root: &Path, state_dir: &Path) -> Result<Self> {
        let root = root.canonicalize().unwrap_or_else(|_| root.to_path_buf());
        let config = ProjectConfig::load(&root)?;
        let global = GlobalConfig::load(&global_config_file(state_dir))?;
        let project = config.project_name(&root);
        Ok(Self {
            root,
            state_dir: state_dir.to_path_buf(),
            config,
            global,
            project,
            clock: Arc::new(SystemClock),
        })
    }

    pub fn open_stores(&self) -> Result<Stores> {
        ensure_all_dirs(&self.state_dir, &self.root)?;
        let global = GlobalDb::open(global_db_file(&self.state_dir))?;
        let project = ProjectDb::open(project_db_file(&self.root))?;
        Ok(Stores {
            registry: SessionRegistry::new(global.clone()),
            snapshots: UsageSnapshotStore::new(global),
            bus: MessageBus::new(project.clone(), Arc::clone(&self.clock)),
            revisions: RevisionStore::new(project, Arc::clone(&self.clock)),
        })
    }

    pub fn ledger(&self, stores: &Stores) -> CapacityLedger {
        CapacityLedger::new(
            &self.project,
            LedgerLimits::from_config(&self.config, &self.global),
            stores.registry.clone(),
            stores.snapshots.clone(),
            Arc::clone(&self.clock),
        )
    }

    pub fn usage_scheduler(&self, stores: &Stores) -> UsageScheduler {
        let weekly = WeeklyUsageTracker::new(
            stores.registry.clone(),
            stores.snapshots.clone(),
            self.config.night_shift.weekly_session_minutes_limit,
            Arc::clone(&self.clock),
        )
        .with_provider(Arc::new(UsageClient::new()));
        UsageScheduler::new(
            self.config.night_shift.clone(),
            weekly,
            Arc::clone(&self.clock),
        )
    }

    pub fn gh(&self) -> GhCli {
        GhCli::new(runner(), &self.root).with_token(self.config.gh_token())
    }

    /// Assemble a controller backed by tmux, `gh` and `git`.
    pub fn controller(&self, dry_run: bool) -> Result<Controller> {
        let stores = self.open_stores()?;
        let host = Arc::new(TmuxOrchestrator::new()?);
        let gh = self.gh();

        let mut settings = ControllerSettings::from_config(&self.config, &self.project, &self.root);
        settings.dry_run |= dry_run;
        let launch = LaunchSettings::from_config(&self.config, &self.project, &self.root);

        Ok(Controller::new(ControllerDeps {
            settings,
            issues: Arc::new(GhIssueTracker::new(gh.clone())),
            prs: Arc::new(GhPullRequests::new(gh)),
            worktrees: Arc::new(GitWorktrees::new(
                runner(),
                &self.root,
                self.config.worktree_root(&self.root),
            )),
            host: host.clone(),
            ledger: self.ledger(&stores),
            usage: self.usage_scheduler(&stores),
            bus: stores.bus,
            revisions: stores.revisions,
            developer: DeveloperLauncher::new(host.clone(), launch.clone()),
            reviewer: ReviewerLauncher::new(host, launch),
            clock: Arc::clone(&self.clock),
        }))
    }
}

fn runner() -> Arc<dyn CommandRunner> {
    Arc::new(ProcessCommandRunner)
}

fn remote_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"github\.com[:/]([^/\s]+)/([^/\s]+?)(?:\.git)?/?$")
            .expect("Invalid regex pattern")
    })
}

/// `owner/name` from a GitHub remote URL (https or ssh).
pub fn parse_github_remote(url: &str) -> Option<String> {
    let caps = remote_pattern().captures(url.trim())?;
    Some(format!("{}/{}", &caps[1], &caps[2]))
}

/// `owner/name` of the repository's `origin` remote.
pub fn detect_repo(root: &Path) -> Option<String> {
    let output = std::process::Command::new("git")
        .args(["remote", "get-url", "origin"])
        .current_dir(root)
        .output()
        .ok()
        .filter(|o| o.status.success())?;
    parse_github_remote(&String::from_utf8_lossy(&output.stdout))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_github_remote() {
        assert_eq!(
            parse_github_remote("https://github.com/acme/web.git").as_deref(),
            Some("acme/web")
        );
        assert_eq!(
            parse_github_remote("git@github.com:acme/web-app.git\n").as_deref(),
            Some("acme/web-app")
        );
        assert_eq!(
            parse_github_remote("https://github.com/acme/web").as_deref(),
            Some("acme/web")
        );
        assert_eq!(parse_github_remote("https://gitlab.com/acme/web.git"), None);
    }

    #[test]
    fn test_load_defaults_and_open_stores() {
        let repo = TempDir::new().unwrap();
        let state = TempDir::new().unwrap();
        std::fs::write(
            repo.path().join("foreman.toml"),
            "[project]\nrepo = \"acme/web\"\nname = \"webapp\"\n",
        )
        .unwrap();

        let app = App::load(repo.path(), state.path()).unwrap();
        assert_eq!(app.project, "webapp");
        assert_eq!(app.config.project.repo, "acme/web");
        assert_eq!(app.global, GlobalConfig::default());

        let stores = app.open_stores().unwrap();
        assert!(project_db_file(&app.root).exists());
        assert!(global_db_file(state.path()).exists());

        let ledger = app.ledger(&stores);
        assert_eq!(ledger.project(), "webapp");
        assert!(ledger
            .can_spawn(&Default::default())
            .unwrap()
            .allowed);
    }
}
