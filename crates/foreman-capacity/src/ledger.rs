//! Capacity ledger: session ceilings, daily cost and burn rate.

use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveTime, TimeZone, Utc};
use serde::Serialize;
use tracing::{debug, info};

use foreman_core::{GlobalConfig, ProjectConfig};
use foreman_models::{Clock, NewSession, SessionRecord, UsageSource};
use foreman_persistence::{SessionRegistry, UsageSnapshotStore};

use crate::error::Result;

/// Minutes in a 30-day billing month.
pub const MINUTES_PER_MONTH: f64 = 43_200.0;

/// API samples older than this fall back to the session-count estimate.
pub const SNAPSHOT_MAX_AGE_MINUTES: i64 = 30;

/// Ceilings and rates the ledger enforces.
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerLimits {
    pub max_project_sessions: usize,
    pub max_total_sessions: usize,
    pub max_daily_cost_usd: f64,
    pub cost_per_minute: f64,
    pub plan_price_usd: f64,
}

impl LedgerLimits {
    pub fn from_config(project: &ProjectConfig, global: &GlobalConfig) -> Self {
        Self {
            max_project_sessions: project.hr.max_concurrent_sessions,
            max_total_sessions: global.hr.max_total_sessions,
            max_daily_cost_usd: global.hr.max_cost_per_day_usd,
            cost_per_minute: project.hr.estimated_cost_per_minute,
            plan_price_usd: project.hr.plan_price_usd,
        }
    }
}

/// Temporary ceiling changes, used during the night shift.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SpawnOverrides {
    pub max_project_sessions: Option<usize>,
}

/// Outcome of a capacity check. A refusal is a value, not an error.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CapacityCheck {
    pub allowed: bool,
    pub reason: Option<String>,
    pub active_project_sessions: usize,
    pub active_total_sessions: usize,
    pub estimated_daily_cost_usd: f64,
}

/// Point-in-time budget view for status output.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BudgetSnapshot {
    pub active_project_sessions: usize,
    pub active_total_sessions: usize,
    pub max_project_sessions: usize,
    pub max_total_sessions: usize,
    pub estimated_daily_cost_usd: f64,
    pub max_daily_cost_usd: f64,
    pub burn_rate_per_minute: f64,
    pub burn_rate_source: UsageSource,
    pub estimated_monthly_cost_usd: Option<f64>,
    pub plan_price_usd: f64,
}

/// Decides whether another worker may start and accounts for its cost.
#[derive(Clone)]
pub struct CapacityLedger {
    project: String,
    limits: LedgerLimits,
    registry: SessionRegistry,
    snapshots: UsageSnapshotStore,
    clock: Arc<dyn Clock>,
}

impl CapacityLedger {
    pub fn new(
        project: impl Into<String>,
        limits: LedgerLimits,
        registry: SessionRegistry,
        snapshots: UsageSnapshotStore,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            project: project.into(),
            limits,
            registry,
            snapshots,
            clock,
        }
    }

    pub fn project(&self) -> &str {
        &self.project
    }

    pub fn limits(&self) -> &LedgerLimits {
        &self.limits
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    /// Check project ceiling, then global ceiling, then daily cost.
    pub fn can_spawn(&self, overrides: &SpawnOverrides) -> Result<CapacityCheck> {
        let project_active = self.registry.active_count(Some(&self.project))?;
        let total_active = self.registry.active_count(None)?;
        let daily_cost = self.estimated_daily_cost()?;
        let project_max = overrides
            .max_project_sessions
            .unwrap_or(self.limits.max_project_sessions);

        let reason = if project_active >= project_max {
            Some(format!(
                "Project session limit reached ({}/{})",
                project_active, project_max
            ))
        } else if total_active >= self.limits.max_total_sessions {
            Some(format!(
                "Global session limit reached ({}/{})",
                total_active, self.limits.max_total_sessions
            ))
        } else if daily_cost >= self.limits.max_daily_cost_usd {
            Some(format!(
                "Daily cost limit reached (${:.2}/${:.2})",
                daily_cost, self.limits.max_daily_cost_usd
            ))
        } else {
            None
        };

        if let Some(reason) = &reason {
            debug!(project = %self.project, reason = %reason, "capacity refused");
        }

        Ok(CapacityCheck {
            allowed: reason.is_none(),
            reason,
            active_project_sessions: project_active,
            active_total_sessions: total_active,
            estimated_daily_cost_usd: daily_cost,
        })
    }

    /// Open a record for a freshly launched worker.
    pub fn record_start(&self, session: &NewSession) -> Result<i64> {
        let id = self.registry.insert(session, self.clock.now())?;
        info!(id, session = %session.session, role = %session.role, "session recorded");
        Ok(id)
    }

    /// Close a record and charge its duration. `false` when already closed or absent.
    pub fn record_end(&self, id: i64) -> Result<bool> {
        let Some(record) = self.registry.get(id)? else {
            return Ok(false);
        };
        if !record.is_active() {
            return Ok(false);
        }
        let now = self.clock.now();
        let cost = record.elapsed_minutes(now) * self.limits.cost_per_minute;
        let closed = self.registry.close(id, now, cost)?;
        if closed {
            info!(id, session = %record.session, cost_usd = cost, "session closed");
        }
        Ok(closed)
    }

    /// Open records, optionally for one project.
    pub fn active_sessions(&self, project: Option<&str>) -> Result<Vec<SessionRecord>> {
        Ok(self.registry.active(project)?)
    }

    /// Cost of sessions ended today plus the running cost of sessions started today.
    pub fn estimated_daily_cost(&self) -> Result<f64> {
        let now = self.clock.now();
        let day_start = start_of_day(now);
        let ended = self
            .registry
            .cost_ended_between(day_start, day_start + Duration::days(1))?;
        let running: f64 = self
            .registry
            .active(None)?
            .iter()
            .filter(|r| r.started_at >= day_start)
            .map(|r| r.elapsed_minutes(now) * self.limits.cost_per_minute)
            .sum();
        Ok(ended + running)
    }

    pub fn budget_snapshot(&self) -> Result<BudgetSnapshot> {
        let now = self.clock.now();
        let project_active = self.registry.active_count(Some(&self.project))?;
        let total_active = self.registry.active_count(None)?;
        let daily_cost = self.estimated_daily_cost()?;

        let fresh_api = self.snapshots.latest()?.filter(|s| {
            s.source == UsageSource::Api
                && now - s.timestamp <= Duration::minutes(SNAPSHOT_MAX_AGE_MINUTES)
        });

        let (burn, source, monthly) = match fresh_api {
            Some(sample) => (
                sample.five_hour_utilization / 100.0 * self.limits.plan_price_usd
                    / MINUTES_PER_MONTH,
                UsageSource::Api,
                Some(sample.seven_day_utilization / 100.0 * self.limits.plan_price_usd),
            ),
            None => (
                total_active as f64 * self.limits.cost_per_minute,
                UsageSource::Estimated,
                None,
            ),
        };

        Ok(BudgetSnapshot {
            active_project_sessions: project_active,
            active_total_sessions: total_active,
            max_project_sessions: self.limits.max_project_sessions,
            max_total_sessions: self.limits.max_total_sessions,
            estimated_daily_cost_usd: daily_cost,
            max_daily_cost_usd: self.limits.max_daily_cost_usd,
            burn_rate_per_minute: burn,
            burn_rate_source: source,
            estimated_monthly_cost_usd: monthly,
            plan_price_usd: self.limits.plan_price_usd,
        })
    }
}

fn start_of_day(now: DateTime<Utc>) -> DateTime<Utc> {
    Utc.from_utc_datetime(&now.date_naive().and_time(NaiveTime::MIN))
}
