//! Command handlers for CLI subcommands.

use std::path::Path;
use std::time::Duration;

use chrono::Utc;
use tracing::{info, warn};

use foreman_core::{
    generate_default_toml, global_config_file, project_prompts_dir, PROJECT_CONFIG_FILE,
};
use foreman_github::ensure_labels;
use foreman_models::naming::expand_short_name;
use foreman_models::{Message, SessionRole};
use foreman_orchestrator::{CycleReport, CycleScheduler};
use foreman_roles::template::{
    DEFAULT_DEVELOPER_TEMPLATE, DEFAULT_REVIEWER_TEMPLATE, DEVELOPER_TEMPLATE_FILE,
    REVIEWER_TEMPLATE_FILE,
};
use foreman_tmux::{SessionHost, TmuxOrchestrator};

use crate::app::{detect_repo, App};
use crate::cli::Commands;

/// Result type for command operations.
pub type Result<T> = std::result::Result<T, Box<dyn std::error::Error>>;

/// Execute a CLI command against the repository at `root`.
pub async fn execute(command: Commands, root: &Path, state_dir: &Path) -> Result<()> {
    match command {
        Commands::Init { repo } => return cmd_init(root, state_dir, repo).await,
        Commands::Config => return cmd_config(root, state_dir),
        _ => {}
    }

    let app = App::load(root, state_dir)?;
    match command {
        Commands::Run { dry_run } => cmd_run(&app, dry_run).await,
        Commands::Once { dry_run } => cmd_once(&app, dry_run).await,
        Commands::Status { json } => cmd_status(&app, json).await,
        Commands::Stop { clean } => cmd_stop(&app, clean).await,
        Commands::Review => cmd_review(&app).await,
        Commands::Attach { session } => cmd_attach(&app, &session).await,
        Commands::Messages { limit } => cmd_messages(&app, limit),
        Commands::Init { .. } | Commands::Config => Ok(()),
    }
}

async fn cmd_run(app: &App, dry_run: bool) -> Result<()> {
    let controller = app.controller(dry_run)?;
    let interval = Duration::from_secs(app.config.pm.poll_interval_seconds.max(1));
    let mut scheduler = CycleScheduler::new(controller, interval);

    info!(project = %app.project, interval_secs = interval.as_secs(), dry_run, "starting foreman");
    scheduler.start().await?;
    println!(
        "Foreman running for '{}' every {}s{}. Press Ctrl-C to stop.",
        app.project,
        interval.as_secs(),
        if dry_run { " (dry run)" } else { "" }
    );

    tokio::signal::ctrl_c().await?;
    println!("Stopping after the current cycle...");
    scheduler.shutdown().await?;

    let status = scheduler.status().await;
    println!(
        "Stopped after {} cycle(s); {} developer(s) still running.",
        status.cycles_completed, status.active_developers
    );
    Ok(())
}

async fn cmd_once(app: &App, dry_run: bool) -> Result<()> {
    let controller = app.controller(dry_run)?;
    let report = controller.run_cycle().await;
    print_report(&report);

    let status = controller.status().await;
    if !status.errors.is_empty() {
        println!("\nErrors:");
        for error in &status.errors {
            println!("  {}", error);
        }
    }
    Ok(())
}

async fn cmd_review(app: &App) -> Result<()> {
    let controller = app.controller(false)?;
    let report = controller.review_now().await;
    if report.reviewer.is_none() && report.revisions.is_empty() && report.escalated.is_empty() {
        println!("Nothing to review (or a reviewer is already running).");
    }
    print_report(&report);
    Ok(())
}

async fn cmd_stop(app: &App, clean: bool) -> Result<()> {
    let controller = app.controller(false)?;
    let report = controller.stop_all(clean).await?;
    println!(
        "Killed {} session(s), closed {} record(s).",
        report.sessions_killed, report.records_closed
    );
    if clean {
        println!("Removed {} worktree(s).", report.worktrees_removed);
    }
    Ok(())
}

async fn cmd_status(app: &App, json: bool) -> Result<()> {
    let stores = app.open_stores()?;
    let ledger = app.ledger(&stores);
    let sessions = ledger.active_sessions(Some(&app.project))?;
    // Samples usage first so the budget's burn rate sees the fresh snapshot.
    let night_shift = app.usage_scheduler(&stores).state().await?;
    let budget = ledger.budget_snapshot()?;
    let unread = stores.bus.unread_count(foreman_models::RoleName::Pm)?;

    if json {
        let value = serde_json::json!({
            "project": app.project,
            "sessions": sessions,
            "budget": budget,
            "night_shift": night_shift,
            "unread_messages": unread,
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    let now = Utc::now();
    println!("Project: {} ({})", app.project, app.root.display());
    println!();
    if sessions.is_empty() {
        println!("No active sessions.");
    } else {
        println!(
            "{:<32} {:<10} {:<7} {:<7} {:>8}",
            "SESSION", "ROLE", "ISSUE", "PR", "MINUTES"
        );
        println!("{}", "-".repeat(68));
        for record in &sessions {
            println!(
                "{:<32} {:<10} {:<7} {:<7} {:>8.0}",
                record.session,
                record.role.to_string(),
                record.issue_number.map(|n| format!("#{}", n)).unwrap_or_default(),
                record.pr_number.map(|n| format!("#{}", n)).unwrap_or_default(),
                record.elapsed_minutes(now),
            );
        }
    }

    let developers = sessions
        .iter()
        .filter(|r| r.role == SessionRole::Developer)
        .count();
    println!();
    println!(
        "Sessions: {} developer(s), {}/{} project, {}/{} global",
        developers,
        budget.active_project_sessions,
        budget.max_project_sessions,
        budget.active_total_sessions,
        budget.max_total_sessions
    );
    println!(
        "Cost today: ${:.2} of ${:.2} (burn ${:.4}/min, {})",
        budget.estimated_daily_cost_usd,
        budget.max_daily_cost_usd,
        budget.burn_rate_per_minute,
        budget.burn_rate_source
    );
    if let Some(monthly) = budget.estimated_monthly_cost_usd {
        println!("Projected month: ${:.2} (plan ${:.2})", monthly, budget.plan_price_usd);
    }

    println!();
    println!(
        "Night shift: {} ({})",
        if night_shift.active { "active" } else { "inactive" },
        night_shift.reason
    );
    println!(
        "  Weekly usage {:.1}% ({}) vs week elapsed {:.1}%, next window {} - {}",
        night_shift.weekly_usage_percent,
        night_shift.usage_source,
        night_shift.week_elapsed_percent,
        night_shift.next_window_start,
        night_shift.next_window_end
    );
    if let Some(five_hour) = night_shift.five_hour_utilization {
        println!("  5-hour utilization {:.1}%", five_hour);
    }
    println!();
    println!("Unread messages: {}", unread);
    Ok(())
}

async fn cmd_attach(app: &App, session: &str) -> Result<()> {
    let name = expand_short_name(&app.project, session);
    let host = TmuxOrchestrator::new()?;
    if !host.is_alive(&name).await {
        return Err(format!("Session not found: {}", name).into());
    }

    let status = std::process::Command::new("tmux")
        .args(TmuxOrchestrator::attach_args(&name))
        .status()?;
    if !status.success() {
        return Err(format!("tmux attach exited with {}", status).into());
    }
    Ok(())
}

fn cmd_messages(app: &App, limit: usize) -> Result<()> {
    let stores = app.open_stores()?;
    let messages = stores.bus.recent(limit)?;
    if messages.is_empty() {
        println!("No messages.");
        return Ok(());
    }
    for message in &messages {
        println!("{}", format_message(message));
    }
    Ok(())
}

fn cmd_config(root: &Path, state_dir: &Path) -> Result<()> {
    let app = App::load(root, state_dir)?;
    println!("Project:       {}", app.project);
    println!("Repository:    {}", app.root.display());
    println!("State dir:     {}", app.state_dir.display());
    println!("Global config: {}", global_config_file(state_dir).display());
    println!("Worktrees:     {}", app.config.worktree_root(&app.root).display());
    println!();
    print!("{}", app.config.to_toml()?);
    println!();
    println!("[global.hr]");
    println!("max_total_sessions = {}", app.global.hr.max_total_sessions);
    println!("max_cost_per_day_usd = {}", app.global.hr.max_cost_per_day_usd);
    println!("throttle_at_percent = {}", app.global.hr.throttle_at_percent);
    Ok(())
}

async fn cmd_init(root: &Path, state_dir: &Path, repo: Option<String>) -> Result<()> {
    let config_path = root.join(PROJECT_CONFIG_FILE);
    if config_path.exists() {
        println!("{} already exists, leaving it unchanged.", config_path.display());
    } else {
        let repo = repo
            .or_else(|| detect_repo(root))
            .ok_or("Cannot determine the GitHub repository; pass --repo owner/name")?;
        std::fs::write(&config_path, generate_default_toml(&repo)?)?;
        println!("Wrote {} for {}", config_path.display(), repo);
    }

    let app = App::load(root, state_dir)?;
    app.open_stores()?;

    let prompts = project_prompts_dir(&app.root);
    for (file, body) in [
        (DEVELOPER_TEMPLATE_FILE, DEFAULT_DEVELOPER_TEMPLATE),
        (REVIEWER_TEMPLATE_FILE, DEFAULT_REVIEWER_TEMPLATE),
    ] {
        let path = prompts.join(file);
        if !path.exists() {
            std::fs::write(&path, body)?;
            println!("Wrote template {}", path.display());
        }
    }

    let missing: Vec<&str> = ["git", "gh", "tmux", app.config.agent.command.as_str()]
        .into_iter()
        .filter(|tool| which::which(tool).is_err())
        .collect();
    if missing.is_empty() {
        let applied = ensure_labels(&app.gh()).await;
        println!("Ensured {} label(s) on {}", applied, app.config.project.repo);
    } else {
        warn!(missing = ?missing, "required tools not found");
        println!("Missing tools: {}", missing.join(", "));
    }

    println!("Foreman initialized for '{}'.", app.project);
    Ok(())
}

fn print_report(report: &CycleReport) {
    let issues = |numbers: &[u64]| {
        numbers
            .iter()
            .map(|n| format!("#{}", n))
            .collect::<Vec<_>>()
            .join(", ")
    };

    if report.messages_processed > 0 {
        println!("Processed {} message(s)", report.messages_processed);
    }
    if !report.reaped.is_empty() {
        println!("Reaped: {}", report.reaped.join(", "));
    }
    if !report.revisions.is_empty() {
        println!("Revisions requested for PRs: {}", issues(&report.revisions));
    }
    if !report.escalated.is_empty() {
        println!("Escalated issues: {}", issues(&report.escalated));
    }
    if let Some(reviewer) = &report.reviewer {
        println!("Reviewer launched: {}", reviewer);
    }
    if !report.spawned.is_empty() {
        println!("Developers spawned for: {}", issues(&report.spawned));
    }
    if !report.planned.is_empty() {
        println!("[dry run] Would act on: {}", issues(&report.planned));
    }
    if let Some(reason) = &report.backpressure {
        println!("Backpressure: {}", reason);
    }
    if let Some(reason) = &report.capacity_refusal {
        println!("Capacity: {}", reason);
    }
}

fn format_message(message: &Message) -> String {
    format!(
        "#{:<5} {} {:>4} -> {:<4} {:<16} {}{}",
        message.id,
        message.created_at.format("%Y-%m-%d %H:%M:%S"),
        message.from.to_string(),
        message.to.to_string(),
        message.message_type.to_string(),
        message.payload,
        if message.read_at.is_some() { "" } else { "  (unread)" }
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use foreman_models::{MessageType, RoleName};

    #[test]
    fn test_format_message() {
        let message = Message {
            id: 7,
            from: RoleName::Hr,
            to: RoleName::Pm,
            message_type: MessageType::SessionEnded,
            payload: serde_json::json!({"session": "foreman-web-dev-42"}),
            created_at: Utc.with_ymd_and_hms(2026, 3, 10, 14, 0, 0).unwrap(),
            read_at: None,
        };
        let line = format_message(&message);
        assert!(line.starts_with("#7"));
        assert!(line.contains("2026-03-10 14:00:00"));
        assert!(line.contains("session_ended"));
        assert!(line.contains("foreman-web-dev-42"));
        assert!(line.ends_with("(unread)"));
    }

    #[tokio::test]
    async fn test_messages_and_config_on_fresh_repo() {
        let repo = tempfile::TempDir::new().unwrap();
        let state = tempfile::TempDir::new().unwrap();
        execute(Commands::Messages { limit: 5 }, repo.path(), state.path())
            .await
            .unwrap();
        execute(Commands::Config, repo.path(), state.path())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_init_with_existing_config_writes_templates() {
        let repo = tempfile::TempDir::new().unwrap();
        let state = tempfile::TempDir::new().unwrap();
        std::fs::write(
            repo.path().join(PROJECT_CONFIG_FILE),
            "[project]\nrepo = \"acme/web\"\n",
        )
        .unwrap();

        cmd_init(repo.path(), state.path(), None).await.unwrap();

        let prompts = project_prompts_dir(&repo.path().canonicalize().unwrap());
        assert!(prompts.join(DEVELOPER_TEMPLATE_FILE).exists());
        assert!(prompts.join(REVIEWER_TEMPLATE_FILE).exists());
    }
}
