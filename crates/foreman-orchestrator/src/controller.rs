//! The orchestration controller.
//!
//! One [`Controller::run_cycle`] call observes the tracker, the session host
//! and the ledger, then acts: drain the message bus, reap dead and finished
//! workers, route review outcomes, launch a reviewer and assign ready issues
//! to new developers. Nothing is cached between cycles; every decision is
//! re-derived from live state so a restarted controller picks up where the
//! previous one stopped.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use foreman_capacity::{CapacityLedger, SpawnOverrides, UsageScheduler};
use foreman_core::ProjectConfig;
use foreman_github::{issue_from_branch, IssueTracker, PullRequests, Worktrees};
use foreman_models::labels::{IN_PROGRESS, NEEDS_HELP};
use foreman_models::naming::{belongs_to_project, project_session_prefix};
use foreman_models::{
    Clock, Issue, MessageType, NewSession, PullRequest, ReviewCompletePayload, ReviewDecision,
    RevisionNeededPayload, RoleName, SessionEndedPayload, SessionRecord, SessionRole,
    WorktreeInfo, WorktreeStrategy,
};
use foreman_persistence::{MessageBus, RevisionStore};
use foreman_roles::{
    DeveloperLauncher, DeveloperRequest, ReviewRequest, ReviewerLauncher, RoleLauncher,
};
use foreman_tmux::SessionHost;

use crate::error::Result;
use crate::priority::prioritize;
use crate::status::{ControllerState, ControllerStatus};

/// Per-project knobs the controller reads every cycle.
#[derive(Debug, Clone)]
pub struct ControllerSettings {
    pub project: String,
    pub repo_root: PathBuf,
    pub base_branch: String,
    pub issue_filter: String,
    pub review_label: String,
    pub approved_label: String,
    pub max_revisions: u32,
    pub max_prs_awaiting_review: usize,
    pub max_prs_awaiting_human: usize,
    pub strategy: WorktreeStrategy,
    /// Log intended spawns without performing them.
    pub dry_run: bool,
}

impl ControllerSettings {
    pub fn from_config(
        config: &ProjectConfig,
        project: impl Into<String>,
        repo_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            project: project.into(),
            repo_root: repo_root.into(),
            base_branch: config.project.default_branch.clone(),
            issue_filter: config.pm.issue_filter.clone(),
            review_label: config.cto.review_label.clone(),
            approved_label: config.cto.approved_label.clone(),
            max_revisions: config.cto.max_revisions,
            max_prs_awaiting_review: config.backpressure.max_prs_awaiting_cto,
            max_prs_awaiting_human: config.backpressure.max_prs_awaiting_human,
            strategy: config.worktrees.strategy,
            dry_run: config.pm.dry_run,
        }
    }
}

/// Everything the controller drives.
pub struct ControllerDeps {
    pub settings: ControllerSettings,
    pub issues: Arc<dyn IssueTracker>,
    pub prs: Arc<dyn PullRequests>,
    pub worktrees: Arc<dyn Worktrees>,
    pub host: Arc<dyn SessionHost>,
    pub ledger: CapacityLedger,
    pub usage: UsageScheduler,
    pub bus: MessageBus,
    pub revisions: RevisionStore,
    pub developer: DeveloperLauncher,
    pub reviewer: ReviewerLauncher,
    pub clock: Arc<dyn Clock>,
}

/// What one cycle did.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CycleReport {
    pub messages_processed: usize,
    /// Sessions closed this cycle, dead or finished.
    pub reaped: Vec<String>,
    /// Issues that received a new developer.
    pub spawned: Vec<u64>,
    /// PRs that received a revision developer.
    pub revisions: Vec<u64>,
    /// Issues labeled for human help.
    pub escalated: Vec<u64>,
    pub reviewer: Option<String>,
    /// Issues a dry run would have acted on.
    pub planned: Vec<u64>,
    pub backpressure: Option<String>,
    pub capacity_refusal: Option<String>,
}

/// Outcome of [`Controller::stop_all`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StopReport {
    pub sessions_killed: usize,
    pub records_closed: usize,
    pub worktrees_removed: usize,
}

pub struct Controller {
    settings: ControllerSettings,
    issues: Arc<dyn IssueTracker>,
    prs: Arc<dyn PullRequests>,
    worktrees: Arc<dyn Worktrees>,
    host: Arc<dyn SessionHost>,
    ledger: CapacityLedger,
    usage: UsageScheduler,
    bus: MessageBus,
    revisions: RevisionStore,
    developer: DeveloperLauncher,
    reviewer: ReviewerLauncher,
    clock: Arc<dyn Clock>,
    status: Arc<RwLock<ControllerStatus>>,
}

impl Controller {
    pub fn new(deps: ControllerDeps) -> Self {
        Self {
            settings: deps.settings,
            issues: deps.issues,
            prs: deps.prs,
            worktrees: deps.worktrees,
            host: deps.host,
            ledger: deps.ledger,
            usage: deps.usage,
            bus: deps.bus,
            revisions: deps.revisions,
            developer: deps.developer,
            reviewer: deps.reviewer,
            clock: deps.clock,
            status: Arc::new(RwLock::new(ControllerStatus::default())),
        }
    }

    pub fn settings(&self) -> &ControllerSettings {
        &self.settings
    }

    pub fn ledger(&self) -> &CapacityLedger {
        &self.ledger
    }

    pub fn usage(&self) -> &UsageScheduler {
        &self.usage
    }

    pub fn bus(&self) -> &MessageBus {
        &self.bus
    }

    pub async fn status(&self) -> ControllerStatus {
        self.status.read().await.clone()
    }

    /// Shared handle for readers that must not wait on a running cycle.
    pub fn status_handle(&self) -> Arc<RwLock<ControllerStatus>> {
        Arc::clone(&self.status)
    }

    /// Run one full observe-and-act cycle.
    ///
    /// Failures are isolated per item and recorded in the status error log;
    /// the cycle itself always completes.
    pub async fn run_cycle(&self) -> CycleReport {
        let mut report = CycleReport::default();
        debug!(project = %self.settings.project, "cycle starting");

        {
            let mut status = self.status.write().await;
            status.state = ControllerState::Polling;
            status.last_poll_at = Some(self.clock.now());
        }
        self.drain_bus(&mut report).await;
        let overrides = self.spawn_overrides().await;

        self.set_state(ControllerState::Cleaning).await;
        self.reap_dead(&mut report).await;
        self.reap_finished(&mut report).await;

        self.set_state(ControllerState::Spawning).await;
        self.review_step(&mut report).await;

        match self.check_backpressure().await {
            Some(reason) => {
                info!(reason = %reason, "backpressure, not assigning new work");
                report.backpressure = Some(reason);
            }
            None => self.assign_work(&overrides, &mut report).await,
        }

        self.refresh_active_developers().await;
        {
            let mut status = self.status.write().await;
            status.state = ControllerState::Idle;
            status.cycles_completed += 1;
        }

        info!(
            project = %self.settings.project,
            reaped = report.reaped.len(),
            spawned = report.spawned.len(),
            revisions = report.revisions.len(),
            escalated = report.escalated.len(),
            "cycle complete"
        );
        report
    }

    /// Route pending reviews and launch a reviewer without assigning new work.
    pub async fn review_now(&self) -> CycleReport {
        let mut report = CycleReport::default();
        self.review_step(&mut report).await;
        report
    }

    /// Kill every session of the project and close its records.
    ///
    /// With `clean`, all managed worktrees are removed as well.
    pub async fn stop_all(&self, clean: bool) -> Result<StopReport> {
        let mut report = StopReport::default();

        for record in self.ledger.active_sessions(Some(&self.settings.project))? {
            if self.host.is_alive(&record.session).await {
                self.host.kill(&record.session).await?;
                report.sessions_killed += 1;
            }
            if self.close_record(&record, false).await {
                report.records_closed += 1;
            }
        }

        // Sessions the registry never saw, e.g. from a crashed controller.
        let prefix = project_session_prefix(&self.settings.project);
        for session in self.host.list_sessions(Some(&prefix)).await? {
            if !belongs_to_project(&session, &self.settings.project) {
                continue;
            }
            self.host.kill(&session).await?;
            report.sessions_killed += 1;
        }

        if clean {
            report.worktrees_removed = self.worktrees.remove_all().await?;
        }

        info!(
            project = %self.settings.project,
            killed = report.sessions_killed,
            closed = report.records_closed,
            worktrees = report.worktrees_removed,
            "stopped project sessions"
        );
        Ok(report)
    }

    async fn set_state(&self, state: ControllerState) {
        self.status.write().await.state = state;
    }

    async fn note_error(&self, context: &str, err: impl std::fmt::Display) {
        warn!(error = %err, "{}", context);
        self.status
            .write()
            .await
            .push_error(format!("{}: {}", context, err));
    }

    // ---- step 1: message bus ----

    async fn drain_bus(&self, report: &mut CycleReport) {
        let messages = match self.bus.poll(RoleName::Pm, None) {
            Ok(messages) => messages,
            Err(e) => {
                self.note_error("poll message bus", e).await;
                return;
            }
        };

        for message in messages {
            match message.message_type {
                MessageType::RevisionNeeded => {
                    match message.payload_as::<RevisionNeededPayload>() {
                        Ok(payload) => {
                            info!(
                                pr = payload.pr_number,
                                issue = payload.issue_number,
                                "revision requested via bus"
                            );
                            self.revise(payload.pr_number, payload.issue_number, report)
                                .await;
                        }
                        Err(e) => {
                            warn!(id = message.id, error = %e, "malformed revision_needed payload")
                        }
                    }
                }
                MessageType::SessionEnded => match message.payload_as::<SessionEndedPayload>() {
                    Ok(payload) => info!(
                        session = %payload.session,
                        success = payload.success,
                        reason = ?payload.reason,
                        "session ended"
                    ),
                    Err(e) => warn!(id = message.id, error = %e, "malformed session_ended payload"),
                },
                MessageType::ReviewComplete => {
                    match message.payload_as::<ReviewCompletePayload>() {
                        Ok(payload) => info!(payload = ?payload, "review complete"),
                        Err(e) => {
                            warn!(id = message.id, error = %e, "malformed review_complete payload")
                        }
                    }
                }
                other => debug!(id = message.id, message_type = %other, "ignoring message"),
            }

            if let Err(e) = self.bus.mark_read(message.id) {
                self.note_error(&format!("mark message {} read", message.id), e)
                    .await;
            }
            report.messages_processed += 1;
        }
    }

    // ---- steps 2 and 3: reaping ----

    async fn reap_dead(&self, report: &mut CycleReport) {
        let records = match self.ledger.active_sessions(Some(&self.settings.project)) {
            Ok(records) => records,
            Err(e) => {
                self.note_error("list active sessions", e).await;
                return;
            }
        };

        for record in records {
            if self.host.is_alive(&record.session).await {
                continue;
            }
            info!(
                session = %record.session,
                issue = ?record.issue_number,
                "session is gone, reaping"
            );
            if self.close_record(&record, true).await {
                self.notify_ended(&record, false, "session exited").await;
                report.reaped.push(record.session.clone());
            }
        }
    }

    async fn reap_finished(&self, report: &mut CycleReport) {
        let records = match self.ledger.active_sessions(Some(&self.settings.project)) {
            Ok(records) => records,
            Err(e) => {
                self.note_error("list active sessions", e).await;
                return;
            }
        };

        let mut review_queue = None;
        for mut record in records {
            if !self.host.is_alive(&record.session).await {
                continue;
            }
            let finished = match record.role {
                SessionRole::Developer => {
                    self.developer_finished(&mut record, &mut review_queue)
                        .await
                }
                SessionRole::Reviewer => self.reviewer_finished(&mut review_queue).await,
            };
            let Some(reason) = finished else {
                continue;
            };

            info!(session = %record.session, reason = %reason, "worker finished");
            if let Err(e) = self.host.kill(&record.session).await {
                self.note_error(&format!("kill {}", record.session), e).await;
                continue;
            }
            if self.close_record(&record, true).await {
                self.notify_ended(&record, true, &reason).await;
                report.reaped.push(record.session.clone());
            }
        }
    }

    /// `Some(reason)` when the developer's work is done.
    async fn developer_finished(
        &self,
        record: &mut SessionRecord,
        review_queue: &mut Option<Vec<PullRequest>>,
    ) -> Option<String> {
        if let Some(pr) = record.pr_number {
            let awaiting = self.review_queue(review_queue).await?;
            return awaiting
                .iter()
                .any(|p| p.number == pr)
                .then(|| format!("PR #{} is back in review", pr));
        }

        if record.worktree_branch.is_none() {
            let path = record.worktree_path.clone()?;
            match self.worktrees.discover_branch(&path).await {
                Ok(Some(branch)) => {
                    debug!(session = %record.session, branch = %branch, "discovered branch");
                    if let Err(e) = self.ledger.registry().update_branch(record.id, &branch) {
                        warn!(id = record.id, error = %e, "could not persist branch");
                    }
                    record.worktree_branch = Some(branch);
                }
                Ok(None) => return None,
                Err(e) => {
                    warn!(session = %record.session, error = %e, "branch discovery failed");
                    return None;
                }
            }
        }

        let branch = record.worktree_branch.clone()?;
        match self.prs.find_by_branch(&branch).await {
            Ok(Some(pr)) => Some(format!("opened PR #{}", pr.number)),
            Ok(None) => None,
            Err(e) => {
                self.note_error(&format!("look up PR for {}", branch), e).await;
                None
            }
        }
    }

    /// A reviewer is done once every PR in review carries a decision.
    async fn reviewer_finished(
        &self,
        review_queue: &mut Option<Vec<PullRequest>>,
    ) -> Option<String> {
        let numbers: Vec<u64> = self
            .review_queue(review_queue)
            .await?
            .iter()
            .map(|pr| pr.number)
            .collect();

        for number in numbers {
            match self.prs.review_decision(number).await {
                Ok(Some(decision)) if decision.is_decided() => {}
                Ok(_) => return None,
                Err(e) => {
                    warn!(pr = number, error = %e, "could not read review decision");
                    return None;
                }
            }
        }
        Some("all PRs reviewed".to_string())
    }

    /// PRs carrying the review label, fetched at most once per step.
    async fn review_queue<'a>(
        &self,
        cache: &'a mut Option<Vec<PullRequest>>,
    ) -> Option<&'a [PullRequest]> {
        if cache.is_none() {
            match self.prs.list_by_label(&self.settings.review_label).await {
                Ok(prs) => *cache = Some(prs),
                Err(e) => {
                    self.note_error("list PRs awaiting review", e).await;
                    return None;
                }
            }
        }
        cache.as_deref()
    }

    /// Close the record and release what it held. `false` when it was
    /// already closed or could not be closed.
    async fn close_record(&self, record: &SessionRecord, remove_worktree: bool) -> bool {
        match self.ledger.record_end(record.id) {
            Ok(true) => {}
            Ok(false) => {
                debug!(id = record.id, "record already closed");
                return false;
            }
            Err(e) => {
                self.note_error(&format!("close record {}", record.id), e)
                    .await;
                return false;
            }
        }

        if record.role != SessionRole::Developer {
            return true;
        }
        if let Some(issue) = record.issue_number {
            if let Err(e) = self.issues.remove_label(issue, IN_PROGRESS).await {
                warn!(issue, error = %e, "could not clear in-progress label");
            }
        }
        if remove_worktree {
            if let (Some(path), Some(branch)) = (&record.worktree_path, &record.worktree_branch) {
                let worktree = WorktreeInfo {
                    path: path.clone(),
                    branch: Some(branch.clone()),
                    issue_number: record.issue_number,
                };
                if let Err(e) = self.worktrees.remove_worktree(&worktree).await {
                    warn!(path = %path.display(), error = %e, "could not remove worktree");
                }
            }
        }
        true
    }

    async fn notify_ended(&self, record: &SessionRecord, success: bool, reason: &str) {
        let payload = SessionEndedPayload {
            session: record.session.clone(),
            issue_number: record.issue_number,
            role: record.role,
            success,
            reason: Some(reason.to_string()),
        };
        if let Err(e) = self
            .bus
            .send(RoleName::Hr, RoleName::Pm, MessageType::SessionEnded, &payload)
        {
            warn!(session = %record.session, error = %e, "could not publish session_ended");
        }
    }

    // ---- steps 4 and 5: reviews ----

    async fn review_step(&self, report: &mut CycleReport) {
        if self.reviewer.is_running(&ReviewRequest::default()).await {
            debug!("reviewer still running");
            return;
        }
        let pending = self.resolve_reviews(report).await;
        self.launch_reviewer(pending, report).await;
    }

    /// Route `CHANGES_REQUESTED` PRs; return the PRs no reviewer has ruled on.
    ///
    /// Uses the same rule as [`Self::reviewer_finished`], so a reviewer is
    /// never launched for PRs that would immediately count as finished.
    async fn resolve_reviews(&self, report: &mut CycleReport) -> Vec<PullRequest> {
        let prs = match self.prs.list_by_label(&self.settings.review_label).await {
            Ok(prs) => prs,
            Err(e) => {
                self.note_error("list PRs awaiting review", e).await;
                return Vec::new();
            }
        };

        let mut pending = Vec::new();
        for pr in prs {
            match self.prs.review_decision(pr.number).await {
                Ok(Some(ReviewDecision::ChangesRequested)) => match self.resolve_issue(&pr) {
                    Some(issue) => self.revise(pr.number, issue, report).await,
                    None => warn!(
                        pr = pr.number,
                        branch = %pr.head_branch,
                        "cannot map PR to an issue, skipping"
                    ),
                },
                Ok(Some(decision)) if decision.is_decided() => {
                    debug!(pr = pr.number, decision = %decision, "already reviewed")
                }
                Ok(_) => pending.push(pr),
                Err(e) => {
                    self.note_error(&format!("review decision for PR #{}", pr.number), e)
                        .await
                }
            }
        }
        pending
    }

    fn resolve_issue(&self, pr: &PullRequest) -> Option<u64> {
        match self
            .ledger
            .registry()
            .find_by_branch(&self.settings.project, &pr.head_branch)
        {
            Ok(Some(SessionRecord {
                issue_number: Some(issue),
                ..
            })) => Some(issue),
            Ok(_) => issue_from_branch(&pr.head_branch),
            Err(e) => {
                warn!(branch = %pr.head_branch, error = %e, "registry lookup failed");
                issue_from_branch(&pr.head_branch)
            }
        }
    }

    /// Send a PR back to a developer, or escalate past the revision limit.
    ///
    /// The counter only moves when a revision developer is actually running
    /// or the PR is escalated; a failed launch puts the review label back so
    /// the next cycle retries it.
    async fn revise(&self, pr_number: u64, issue: u64, report: &mut CycleReport) {
        let fresh = DeveloperRequest::new(issue, &self.settings.repo_root);
        if self.developer.is_running(&fresh).await {
            debug!(issue, pr = pr_number, "developer already working on issue");
            return;
        }

        let done = match self.revisions.get(pr_number) {
            Ok(count) => count,
            Err(e) => {
                self.note_error(&format!("count revisions for PR #{}", pr_number), e)
                    .await;
                return;
            }
        };
        if done > self.settings.max_revisions {
            debug!(issue, pr = pr_number, revisions = done, "already escalated");
            return;
        }
        if self.settings.dry_run {
            info!(issue, pr = pr_number, "[dry run] would request a revision");
            report.planned.push(issue);
            return;
        }

        let attempt = done + 1;
        if attempt > self.settings.max_revisions {
            self.escalate(pr_number, issue, report).await;
            return;
        }

        if let Err(e) = self
            .prs
            .remove_label(pr_number, &self.settings.review_label)
            .await
        {
            self.note_error(&format!("unlabel PR #{}", pr_number), e).await;
            return;
        }

        let request = fresh.revision_of(pr_number);
        let session = match self.developer.spawn(&request).await {
            Ok(session) => session,
            Err(e) => {
                self.note_error(&format!("spawn revision for PR #{}", pr_number), e)
                    .await;
                if let Err(e) = self
                    .prs
                    .add_label(pr_number, &self.settings.review_label)
                    .await
                {
                    warn!(pr = pr_number, error = %e, "could not restore review label");
                }
                return;
            }
        };

        info!(issue, pr = pr_number, revision = attempt, session = %session, "revision developer spawned");
        if let Err(e) = self.revisions.increment(pr_number, Some(issue)) {
            self.note_error(&format!("count revision of PR #{}", pr_number), e)
                .await;
        }
        if let Err(e) = self.issues.add_label(issue, IN_PROGRESS).await {
            warn!(issue, error = %e, "could not add in-progress label");
        }
        let record = NewSession::developer(&self.settings.project, issue, session)
            .with_pr(pr_number);
        if let Err(e) = self.ledger.record_start(&record) {
            self.note_error(&format!("record revision of PR #{}", pr_number), e)
                .await;
        }
        report.revisions.push(pr_number);
    }

    /// Hand the issue to a human. Counted once, after the label lands.
    async fn escalate(&self, pr_number: u64, issue: u64, report: &mut CycleReport) {
        info!(
            issue,
            pr = pr_number,
            max = self.settings.max_revisions,
            "revision limit exceeded, escalating"
        );
        if let Err(e) = self.issues.add_label(issue, NEEDS_HELP).await {
            self.note_error(&format!("label issue #{} {}", issue, NEEDS_HELP), e)
                .await;
            return;
        }
        if let Err(e) = self.revisions.increment(pr_number, Some(issue)) {
            self.note_error(&format!("count escalation of PR #{}", pr_number), e)
                .await;
        }
        report.escalated.push(issue);
    }

    async fn launch_reviewer(&self, pending: Vec<PullRequest>, report: &mut CycleReport) {
        if pending.is_empty() {
            return;
        }

        let check = match self.ledger.can_spawn(&SpawnOverrides::default()) {
            Ok(check) => check,
            Err(e) => {
                self.note_error("check capacity", e).await;
                return;
            }
        };
        if !check.allowed {
            info!(reason = ?check.reason, prs = pending.len(), "no capacity for a reviewer");
            report.capacity_refusal = check.reason;
            return;
        }
        if self.settings.dry_run {
            info!(prs = pending.len(), "[dry run] would launch a reviewer");
            return;
        }

        let count = pending.len();
        match self.reviewer.spawn(&ReviewRequest::new(pending)).await {
            Ok(session) => {
                info!(session = %session, prs = count, "reviewer launched");
                let record = NewSession::reviewer(&self.settings.project, &session);
                if let Err(e) = self.ledger.record_start(&record) {
                    self.note_error("record reviewer", e).await;
                }
                report.reviewer = Some(session);
            }
            Err(e) => self.note_error("launch reviewer", e).await,
        }
    }

    // ---- step 6: backpressure ----

    async fn check_backpressure(&self) -> Option<String> {
        let mut reason = None;

        match self.prs.list_by_label(&self.settings.review_label).await {
            Ok(prs) => {
                self.status.write().await.prs_awaiting_review = prs.len();
                if prs.len() >= self.settings.max_prs_awaiting_review {
                    reason = Some(format!(
                        "{} PRs awaiting CTO review (limit: {})",
                        prs.len(),
                        self.settings.max_prs_awaiting_review
                    ));
                }
            }
            Err(e) => warn!(error = %e, "could not count PRs awaiting review"),
        }

        match self.prs.list_by_label(&self.settings.approved_label).await {
            Ok(prs) => {
                self.status.write().await.prs_awaiting_human = prs.len();
                if reason.is_none() && prs.len() >= self.settings.max_prs_awaiting_human {
                    reason = Some(format!(
                        "{} PRs awaiting human review (limit: {})",
                        prs.len(),
                        self.settings.max_prs_awaiting_human
                    ));
                }
            }
            Err(e) => warn!(error = %e, "could not count PRs awaiting human review"),
        }

        reason
    }

    // ---- step 7: new work ----

    /// Night-shift ceiling override; consulting the scheduler also records
    /// this cycle's usage sample.
    async fn spawn_overrides(&self) -> SpawnOverrides {
        match self.usage.should_spawn().await {
            Ok(decision) => {
                debug!(allowed = decision.allowed, reason = %decision.reason, "usage scheduler");
                decision.overrides()
            }
            Err(e) => {
                warn!(error = %e, "usage scheduler unavailable, using configured ceilings");
                SpawnOverrides::default()
            }
        }
    }

    async fn assign_work(&self, overrides: &SpawnOverrides, report: &mut CycleReport) {
        let issues = match self
            .issues
            .fetch_ready_issues(&self.settings.issue_filter)
            .await
        {
            Ok(issues) => issues,
            Err(e) => {
                error!(error = %e, "could not fetch ready issues");
                self.status
                    .write()
                    .await
                    .push_error(format!("fetch ready issues: {}", e));
                return;
            }
        };

        let busy: HashSet<u64> = match self.ledger.active_sessions(Some(&self.settings.project)) {
            Ok(records) => records.iter().filter_map(|r| r.issue_number).collect(),
            Err(e) => {
                self.note_error("list active sessions", e).await;
                return;
            }
        };

        let mut candidates = Vec::new();
        for issue in issues {
            if self.is_claimed(&issue, &busy).await {
                continue;
            }
            candidates.push(issue);
        }
        let queue = prioritize(candidates);
        self.status.write().await.issues_in_queue = queue.len();
        if queue.is_empty() {
            debug!("no unclaimed ready issues");
            return;
        }

        for issue in queue {
            match self.ledger.can_spawn(overrides) {
                Ok(check) if check.allowed => {}
                Ok(check) => {
                    info!(reason = ?check.reason, "capacity exhausted, stopping assignment");
                    report.capacity_refusal = check.reason;
                    break;
                }
                Err(e) => {
                    self.note_error("check capacity", e).await;
                    break;
                }
            }
            self.spawn_developer(&issue, report).await;
        }
    }

    /// Someone is already on it: a live session, a worktree or an open PR.
    async fn is_claimed(&self, issue: &Issue, busy: &HashSet<u64>) -> bool {
        if busy.contains(&issue.number) {
            debug!(issue = issue.number, "issue has an active session");
            return true;
        }
        match self.worktrees.worktree_exists(issue.number).await {
            Ok(false) => {}
            Ok(true) => {
                debug!(issue = issue.number, "issue has a worktree");
                return true;
            }
            Err(e) => {
                warn!(issue = issue.number, error = %e, "worktree check failed, skipping issue");
                return true;
            }
        }
        let branch = self.worktrees.branch_name(issue.number);
        match self.prs.find_by_branch(&branch).await {
            Ok(None) => false,
            Ok(Some(pr)) => {
                debug!(issue = issue.number, pr = pr.number, "issue already has a PR");
                true
            }
            Err(e) => {
                warn!(issue = issue.number, error = %e, "PR check failed, skipping issue");
                true
            }
        }
    }

    async fn spawn_developer(&self, issue: &Issue, report: &mut CycleReport) {
        if self.settings.dry_run {
            info!(issue = issue.number, title = %issue.title, "[dry run] would spawn developer");
            report.planned.push(issue.number);
            return;
        }

        let worktree = match self
            .worktrees
            .create_worktree(issue.number, &self.settings.base_branch, self.settings.strategy)
            .await
        {
            Ok(worktree) => worktree,
            Err(e) => {
                self.note_error(&format!("create worktree for issue #{}", issue.number), e)
                    .await;
                return;
            }
        };

        if let Err(e) = self.issues.add_label(issue.number, IN_PROGRESS).await {
            warn!(issue = issue.number, error = %e, "could not add in-progress label");
        }

        let request =
            DeveloperRequest::new(issue.number, &worktree.path).with_branch(worktree.branch.clone());
        let session = match self.developer.spawn(&request).await {
            Ok(session) => session,
            Err(e) => {
                self.note_error(&format!("spawn developer for issue #{}", issue.number), e)
                    .await;
                if let Err(e) = self.worktrees.remove_worktree(&worktree).await {
                    warn!(issue = issue.number, error = %e, "could not roll back worktree");
                }
                if let Err(e) = self.issues.remove_label(issue.number, IN_PROGRESS).await {
                    warn!(issue = issue.number, error = %e, "could not roll back label");
                }
                return;
            }
        };

        let record = NewSession::developer(&self.settings.project, issue.number, &session)
            .with_worktree(worktree.path.clone(), worktree.branch.clone());
        match self.ledger.record_start(&record) {
            Ok(id) => {
                info!(issue = issue.number, session = %session, id, "developer spawned");
                report.spawned.push(issue.number);
            }
            Err(e) => {
                self.note_error(&format!("record developer for issue #{}", issue.number), e)
                    .await
            }
        }
    }

    async fn refresh_active_developers(&self) {
        match self.ledger.active_sessions(Some(&self.settings.project)) {
            Ok(records) => {
                self.status.write().await.active_developers = records
                    .iter()
                    .filter(|r| r.role == SessionRole::Developer)
                    .count();
            }
            Err(e) => warn!(error = %e, "could not count active developers"),
        }
    }
}
