//! In-memory collaborators and a wired controller for scenario tests.

#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use tempfile::TempDir;

use foreman_capacity::{
    CapacityLedger, LedgerLimits, UsageProvider, UsageScheduler, Utilization, WeeklyUsageTracker,
};
use foreman_core::{GlobalConfig, ProjectConfig};
use foreman_github::{GithubError, IssueTracker, PullRequests, Worktrees};
use foreman_models::naming::dev_session_name;
use foreman_models::{
    Clock, FixedClock, Issue, NewSession, PullRequest, ReviewDecision, SessionRecord,
    WorktreeInfo, WorktreeStrategy,
};
use foreman_orchestrator::{Controller, ControllerDeps, ControllerSettings};
use foreman_persistence::{
    GlobalDb, MessageBus, ProjectDb, RevisionStore, SessionRegistry, UsageSnapshotStore,
};
use foreman_roles::{DeveloperLauncher, LaunchSettings, ReviewerLauncher};
use foreman_tmux::{CreateSession, SessionHost};

pub const PROJECT: &str = "web";
pub const REVIEW: &str = "needs-cto-review";
pub const APPROVED: &str = "cto-approved";

pub fn issue(number: u64, days_old: i64, milestone: Option<&str>) -> Issue {
    let base: DateTime<Utc> = Utc.with_ymd_and_hms(2026, 3, 10, 12, 0, 0).unwrap();
    Issue {
        number,
        title: format!("Issue {}", number),
        labels: vec!["ready".to_string()],
        created_at: base - ChronoDuration::days(days_old),
        milestone: milestone.map(String::from),
        url: format!("https://github.com/acme/web/issues/{}", number),
    }
}

pub fn pr(number: u64, branch: &str, labels: &[&str]) -> PullRequest {
    PullRequest {
        number,
        title: format!("PR {}", number),
        head_branch: branch.to_string(),
        author: "dev".to_string(),
        url: format!("https://github.com/acme/web/pull/{}", number),
        labels: labels.iter().map(|l| l.to_string()).collect(),
    }
}

/// What a `gh` outage looks like to the controller.
pub fn outage(args: &str) -> GithubError {
    GithubError::CommandFailed {
        program: "gh".to_string(),
        args: args.to_string(),
        stderr: "HTTP 502: Bad Gateway".to_string(),
    }
}

/// Usage endpoint that always answers with the same utilization.
pub struct StaticUsage(pub Utilization);

#[async_trait]
impl UsageProvider for StaticUsage {
    async fn fetch_usage(&self) -> Option<Utilization> {
        Some(self.0)
    }
}

// ---- session host ----

#[derive(Default)]
pub struct FakeHost {
    pub alive: Mutex<BTreeSet<String>>,
    pub created: Mutex<Vec<CreateSession>>,
    pub killed: Mutex<Vec<String>>,
}

impl FakeHost {
    pub fn set_alive(&self, name: &str) {
        self.alive.lock().unwrap().insert(name.to_string());
    }

    pub fn exit(&self, name: &str) {
        self.alive.lock().unwrap().remove(name);
    }

    pub fn created_names(&self) -> Vec<String> {
        self.created
            .lock()
            .unwrap()
            .iter()
            .map(|c| c.name.clone())
            .collect()
    }

    pub fn kills_of(&self, name: &str) -> usize {
        self.killed
            .lock()
            .unwrap()
            .iter()
            .filter(|n| n.as_str() == name)
            .count()
    }
}

#[async_trait]
impl SessionHost for FakeHost {
    async fn create_session(&self, spec: CreateSession) -> foreman_tmux::Result<()> {
        self.set_alive(&spec.name);
        self.created.lock().unwrap().push(spec);
        Ok(())
    }

    async fn is_alive(&self, name: &str) -> bool {
        self.alive.lock().unwrap().contains(name)
    }

    async fn kill(&self, name: &str) -> foreman_tmux::Result<()> {
        self.exit(name);
        self.killed.lock().unwrap().push(name.to_string());
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

    async fn send_keys(&self, _name: &str, _keys: &str) -> foreman_tmux::Result<()> {
        Ok(())
    }
}

// ---- issue tracker ----

#[derive(Default)]
pub struct FakeTracker {
    pub ready: Mutex<Vec<Issue>>,
    pub labels: Mutex<BTreeMap<u64, BTreeSet<String>>>,
    pub fail_fetch: AtomicBool,
}

impl FakeTracker {
    pub fn add_ready(&self, issue: Issue) {
        self.ready.lock().unwrap().push(issue);
    }

    pub fn set_fetch_failing(&self, failing: bool) {
        self.fail_fetch.store(failing, Ordering::SeqCst);
    }

    pub fn has_label(&self, number: u64, label: &str) -> bool {
        self.labels
            .lock()
            .unwrap()
            .get(&number)
            .map_or(false, |l| l.contains(label))
    }
}

#[async_trait]
impl IssueTracker for FakeTracker {
    async fn fetch_ready_issues(&self, _filter: &str) -> foreman_github::Result<Vec<Issue>> {
        if self.fail_fetch.load(Ordering::SeqCst) {
            return Err(outage("issue list"));
        }
        Ok(self.ready.lock().unwrap().clone())
    }

    async fn add_label(&self, number: u64, label: &str) -> foreman_github::Result<()> {
        self.labels
            .lock()
            .unwrap()
            .entry(number)
            .or_default()
            .insert(label.to_string());
        Ok(())
    }

    async fn remove_label(&self, number: u64, label: &str) -> foreman_github::Result<()> {
        if let Some(labels) = self.labels.lock().unwrap().get_mut(&number) {
            labels.remove(label);
        }
        Ok(())
    }
}

// ---- pull requests ----

#[derive(Default)]
pub struct FakePrs {
    pub open: Mutex<Vec<PullRequest>>,
    pub decisions: Mutex<HashMap<u64, ReviewDecision>>,
    /// PRs whose review decision cannot be read.
    pub unreadable: Mutex<BTreeSet<u64>>,
}

impl FakePrs {
    pub fn open_pr(&self, pr: PullRequest) {
        self.open.lock().unwrap().push(pr);
    }

    pub fn decide(&self, number: u64, decision: ReviewDecision) {
        self.decisions.lock().unwrap().insert(number, decision);
    }

    pub fn relabel(&self, number: u64, remove: Option<&str>, add: Option<&str>) {
        let mut open = self.open.lock().unwrap();
        if let Some(pr) = open.iter_mut().find(|p| p.number == number) {
            if let Some(label) = remove {
                pr.labels.retain(|l| l != label);
            }
            if let Some(label) = add {
                if !pr.has_label(label) {
                    pr.labels.push(label.to_string());
                }
            }
        }
    }

    pub fn labels_of(&self, number: u64) -> Vec<String> {
        self.open
            .lock()
            .unwrap()
            .iter()
            .find(|p| p.number == number)
            .map(|p| p.labels.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl PullRequests for FakePrs {
    async fn list_by_label(&self, label: &str) -> foreman_github::Result<Vec<PullRequest>> {
        Ok(self
            .open
            .lock()
            .unwrap()
            .iter()
            .filter(|p| p.has_label(label))
            .cloned()
            .collect())
    }

    async fn find_by_branch(&self, branch: &str) -> foreman_github::Result<Option<PullRequest>> {
        Ok(self
            .open
            .lock()
            .unwrap()
            .iter()
            .find(|p| p.head_branch == branch)
            .cloned())
    }

    async fn review_decision(&self, number: u64) -> foreman_github::Result<Option<ReviewDecision>> {
        if self.unreadable.lock().unwrap().contains(&number) {
            return Err(outage("pr view"));
        }
        Ok(self.decisions.lock().unwrap().get(&number).copied())
    }

    async fn add_label(&self, number: u64, label: &str) -> foreman_github::Result<()> {
        self.relabel(number, None, Some(label));
        Ok(())
    }

    async fn remove_label(&self, number: u64, label: &str) -> foreman_github::Result<()> {
        self.relabel(number, Some(label), None);
        Ok(())
    }

    async fn merge(&self, number: u64) -> foreman_github::Result<()> {
        self.open.lock().unwrap().retain(|p| p.number != number);
        Ok(())
    }
}

// ---- worktrees ----

pub struct FakeWorktrees {
    pub root: PathBuf,
    pub existing: Mutex<BTreeSet<u64>>,
    pub created: Mutex<Vec<u64>>,
    pub removed: Mutex<Vec<WorktreeInfo>>,
    pub branches: Mutex<HashMap<PathBuf, String>>,
}

impl FakeWorktrees {
    pub fn new(root: PathBuf) -> Self {
        Self {
            root,
            existing: Mutex::default(),
            created: Mutex::default(),
            removed: Mutex::default(),
            branches: Mutex::default(),
        }
    }

    pub fn path_for(&self, issue: u64) -> PathBuf {
        self.root.join(format!("issue-{}", issue))
    }

    /// Simulate the agent checking out its own branch.
    pub fn checkout(&self, issue: u64, branch: &str) {
        self.branches
            .lock()
            .unwrap()
            .insert(self.path_for(issue), branch.to_string());
    }
}

#[async_trait]
impl Worktrees for FakeWorktrees {
    fn branch_name(&self, issue_number: u64) -> String {
        format!("foreman/issue-{}", issue_number)
    }

    async fn create_worktree(
        &self,
        issue_number: u64,
        _base_branch: &str,
        strategy: WorktreeStrategy,
    ) -> foreman_github::Result<WorktreeInfo> {
        self.existing.lock().unwrap().insert(issue_number);
        self.created.lock().unwrap().push(issue_number);
        let branch = match strategy {
            WorktreeStrategy::Managed => Some(self.branch_name(issue_number)),
            WorktreeStrategy::Deferred => None,
        };
        Ok(WorktreeInfo {
            path: self.path_for(issue_number),
            branch,
            issue_number: Some(issue_number),
        })
    }

    async fn discover_branch(&self, path: &Path) -> foreman_github::Result<Option<String>> {
        Ok(self.branches.lock().unwrap().get(path).cloned())
    }

    async fn remove_worktree(&self, info: &WorktreeInfo) -> foreman_github::Result<()> {
        if let Some(issue) = info.issue_number {
            self.existing.lock().unwrap().remove(&issue);
        }
        self.removed.lock().unwrap().push(info.clone());
        Ok(())
    }

    async fn worktree_exists(&self, issue_number: u64) -> foreman_github::Result<bool> {
        Ok(self.existing.lock().unwrap().contains(&issue_number))
    }

    async fn list_worktrees(&self) -> foreman_github::Result<Vec<WorktreeInfo>> {
        Ok(self
            .existing
            .lock()
            .unwrap()
            .iter()
            .map(|&issue| WorktreeInfo {
                path: self.path_for(issue),
                branch: Some(self.branch_name(issue)),
                issue_number: Some(issue),
            })
            .collect())
    }

    async fn remove_all(&self) -> foreman_github::Result<usize> {
        let mut existing = self.existing.lock().unwrap();
        let count = existing.len();
        existing.clear();
        Ok(count)
    }
}

// ---- harness ----

pub struct Harness {
    pub controller: Controller,
    pub host: Arc<FakeHost>,
    pub tracker: Arc<FakeTracker>,
    pub prs: Arc<FakePrs>,
    pub worktrees: Arc<FakeWorktrees>,
    pub registry: SessionRegistry,
    pub bus: MessageBus,
    pub revisions: RevisionStore,
    pub snapshots: UsageSnapshotStore,
    pub clock: Arc<FixedClock>,
    pub repo_root: PathBuf,
    _dir: TempDir,
}

impl Harness {
    pub fn new() -> Self {
        Self::configured(|_, _| {})
    }

    pub fn configured(edit: impl FnOnce(&mut ProjectConfig, &mut GlobalConfig)) -> Self {
        Self::build(edit, None)
    }

    /// Harness whose weekly usage comes from a reporting endpoint.
    pub fn with_usage(
        edit: impl FnOnce(&mut ProjectConfig, &mut GlobalConfig),
        usage: Utilization,
    ) -> Self {
        Self::build(edit, Some(Arc::new(StaticUsage(usage))))
    }

    fn build(
        edit: impl FnOnce(&mut ProjectConfig, &mut GlobalConfig),
        provider: Option<Arc<dyn UsageProvider>>,
    ) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let repo_root = dir.path().join("repo");
        std::fs::create_dir_all(&repo_root).unwrap();

        let mut config = ProjectConfig::default();
        config.project.repo = "acme/web".to_string();
        config.cto.trust_prompt_delay_ms = 0;
        config.cto.max_revisions = 2;
        let mut global = GlobalConfig::default();
        edit(&mut config, &mut global);

        let clock = Arc::new(FixedClock::new(
            Utc.with_ymd_and_hms(2026, 3, 10, 14, 0, 0).unwrap(),
        ));
        let shared_clock: Arc<dyn Clock> = clock.clone();

        let global_db = GlobalDb::open_in_memory().unwrap();
        let project_db = ProjectDb::open_in_memory().unwrap();
        let registry = SessionRegistry::new(global_db.clone());
        let snapshots = UsageSnapshotStore::new(global_db);
        let usage_snapshots = snapshots.clone();
        let ledger = CapacityLedger::new(
            PROJECT,
            LedgerLimits::from_config(&config, &global),
            registry.clone(),
            snapshots.clone(),
            shared_clock.clone(),
        );
        let mut weekly = WeeklyUsageTracker::new(
            registry.clone(),
            snapshots,
            config.night_shift.weekly_session_minutes_limit,
            shared_clock.clone(),
        );
        if let Some(provider) = provider {
            weekly = weekly.with_provider(provider);
        }
        let usage = UsageScheduler::new(config.night_shift.clone(), weekly, shared_clock.clone());
        let bus = MessageBus::new(project_db.clone(), shared_clock.clone());
        let revisions = RevisionStore::new(project_db, shared_clock.clone());

        let host = Arc::new(FakeHost::default());
        let tracker = Arc::new(FakeTracker::default());
        let prs = Arc::new(FakePrs::default());
        let worktrees = Arc::new(FakeWorktrees::new(dir.path().join("worktrees")));

        let launch = LaunchSettings::from_config(&config, PROJECT, &repo_root);
        let controller = Controller::new(ControllerDeps {
            settings: ControllerSettings::from_config(&config, PROJECT, &repo_root),
            issues: tracker.clone(),
            prs: prs.clone(),
            worktrees: worktrees.clone(),
            host: host.clone(),
            ledger,
            usage,
            bus: bus.clone(),
            revisions: revisions.clone(),
            developer: DeveloperLauncher::new(host.clone(), launch.clone()),
            reviewer: ReviewerLauncher::new(host.clone(), launch),
            clock: shared_clock,
        });

        Self {
            controller,
            host,
            tracker,
            prs,
            worktrees,
            registry,
            bus,
            revisions,
            snapshots: usage_snapshots,
            clock,
            repo_root,
            _dir: dir,
        }
    }

    /// Register a developer as if a previous cycle had spawned it.
    pub fn existing_developer(&self, issue: u64, branch: Option<&str>, alive: bool) -> i64 {
        let session = dev_session_name(PROJECT, issue);
        let record = NewSession::developer(PROJECT, issue, &session)
            .with_worktree(self.worktrees.path_for(issue), branch.map(String::from));
        let id = self.registry.insert(&record, self.clock.now()).unwrap();
        self.worktrees.existing.lock().unwrap().insert(issue);
        if alive {
            self.host.set_alive(&session);
        }
        id
    }

    pub fn active(&self) -> Vec<SessionRecord> {
        self.registry.active(Some(PROJECT)).unwrap()
    }
}
