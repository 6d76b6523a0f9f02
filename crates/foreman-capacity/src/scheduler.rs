//! Night-shift scheduler: widens concurrency inside a local-time window when
//! weekly usage is behind the calendar.

use std::sync::Arc;

use chrono::{Datelike, NaiveDateTime, Timelike};
use serde::Serialize;
use tracing::debug;

use foreman_core::NightShiftSettings;
use foreman_models::{Clock, UsageSource};

use crate::error::Result;
use crate::ledger::SpawnOverrides;
use crate::usage::{WeeklyUsage, WeeklyUsageTracker};

/// Five-hour utilization above this blocks night-shift spawning.
pub const FIVE_HOUR_THRESHOLD: f64 = 80.0;

const HOURS_PER_WEEK: f64 = 168.0;

/// Whether the window currently permits elevated concurrency.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpawnDecision {
    pub allowed: bool,
    pub max_concurrent: usize,
    pub reason: String,
}

impl SpawnDecision {
    fn refuse(reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            max_concurrent: 0,
            reason: reason.into(),
        }
    }

    /// Ceiling override for the capacity ledger when allowed.
    pub fn overrides(&self) -> SpawnOverrides {
        SpawnOverrides {
            max_project_sessions: self.allowed.then_some(self.max_concurrent),
        }
    }
}

/// Night-shift view for status output.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NightShiftState {
    pub active: bool,
    pub window_open: bool,
    pub weekly_usage_percent: f64,
    pub week_elapsed_percent: f64,
    pub headroom_percent: f64,
    pub throttled: bool,
    pub reason: String,
    pub next_window_start: String,
    pub next_window_end: String,
    pub usage_source: UsageSource,
    pub five_hour_utilization: Option<f64>,
}

pub struct UsageScheduler {
    settings: NightShiftSettings,
    usage: WeeklyUsageTracker,
    clock: Arc<dyn Clock>,
}

impl UsageScheduler {
    pub fn new(
        settings: NightShiftSettings,
        usage: WeeklyUsageTracker,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            settings,
            usage,
            clock,
        }
    }

    pub fn settings(&self) -> &NightShiftSettings {
        &self.settings
    }

    /// Whether `now` (local time, default the clock) falls in the window.
    pub fn is_in_window(&self, now: Option<NaiveDateTime>) -> bool {
        if !self.settings.enabled {
            return false;
        }
        let hour = now.unwrap_or_else(|| self.clock.local_now()).hour();
        let (start, end) = (self.settings.start_hour, self.settings.end_hour);
        if start <= end {
            hour >= start && hour < end
        } else {
            hour >= start || hour < end
        }
    }

    /// Share of the week (from Sunday 00:00 local) already elapsed.
    pub fn week_elapsed_percent(&self) -> f64 {
        let now = self.clock.local_now();
        let hours = now.weekday().num_days_from_sunday() as f64 * 24.0
            + now.hour() as f64
            + now.minute() as f64 / 60.0;
        hours / HOURS_PER_WEEK * 100.0
    }

    fn safety_threshold(&self) -> f64 {
        100.0 - self.settings.safety_margin_percent
    }

    fn decide(&self, usage: &WeeklyUsage, week_elapsed: f64) -> SpawnDecision {
        if let Some(five_hour) = usage.five_hour_utilization {
            if five_hour > FIVE_HOUR_THRESHOLD {
                return SpawnDecision::refuse(format!(
                    "5-hour utilization ({:.1}%) > {}%",
                    five_hour, FIVE_HOUR_THRESHOLD
                ));
            }
        }
        if usage.usage_percent >= week_elapsed {
            return SpawnDecision::refuse(format!(
                "Usage ({:.1}%) >= week elapsed ({:.1}%)",
                usage.usage_percent, week_elapsed
            ));
        }
        let threshold = self.safety_threshold();
        if usage.usage_percent >= threshold {
            return SpawnDecision::refuse(format!(
                "Usage ({:.1}%) >= safety threshold ({}%)",
                usage.usage_percent, threshold
            ));
        }
        SpawnDecision {
            allowed: true,
            max_concurrent: self.settings.max_concurrent_developers,
            reason: format!(
                "Night shift active, headroom: {:.1}%",
                week_elapsed - usage.usage_percent
            ),
        }
    }

    /// Decide whether the night shift may spawn right now.
    ///
    /// Usage is sampled on every call, inside the window or not, so the
    /// ledger's burn rate always has a recent snapshot to read.
    pub async fn should_spawn(&self) -> Result<SpawnDecision> {
        let usage = self.usage.snapshot().await?;
        if !self.settings.enabled {
            return Ok(SpawnDecision::refuse("Night shift disabled"));
        }
        if !self.is_in_window(None) {
            return Ok(SpawnDecision::refuse("Outside night shift window"));
        }
        let decision = self.decide(&usage, self.week_elapsed_percent());
        debug!(allowed = decision.allowed, reason = %decision.reason, "night shift decision");
        Ok(decision)
    }

    pub async fn state(&self) -> Result<NightShiftState> {
        let window_open = self.is_in_window(None);
        let usage = self.usage.snapshot().await?;
        let week_elapsed = self.week_elapsed_percent();

        let decision = if !self.settings.enabled {
            SpawnDecision::refuse("Night shift disabled")
        } else if !window_open {
            SpawnDecision::refuse("Outside night shift window")
        } else {
            self.decide(&usage, week_elapsed)
        };

        Ok(NightShiftState {
            active: decision.allowed,
            window_open,
            weekly_usage_percent: usage.usage_percent,
            week_elapsed_percent: week_elapsed,
            headroom_percent: (week_elapsed - usage.usage_percent).max(0.0),
            throttled: usage.usage_percent >= self.safety_threshold(),
            reason: decision.reason,
            next_window_start: format!("{}:00", self.settings.start_hour),
            next_window_end: format!("{}:00", self.settings.end_hour),
            usage_source: usage.source,
            five_hour_utilization: usage.five_hour_utilization,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{UsageProvider, Utilization};
    use async_trait::async_trait;
    use chrono::{DateTime, NaiveDate, TimeZone, Utc};
    use foreman_models::FixedClock;
    use foreman_persistence::{GlobalDb, SessionRegistry, UsageSnapshotStore};

    struct StaticProvider(Utilization);

    #[async_trait]
    impl UsageProvider for StaticProvider {
        async fn fetch_usage(&self) -> Option<Utilization> {
            Some(self.0)
        }
    }

    fn settings(start: u32, end: u32) -> NightShiftSettings {
        NightShiftSettings {
            enabled: true,
            start_hour: start,
            end_hour: end,
            safety_margin_percent: 15.0,
            weekly_session_minutes_limit: 600.0,
            max_concurrent_developers: 7,
        }
    }

    fn scheduler_at(
        settings: NightShiftSettings,
        at: DateTime<Utc>,
        usage: Option<Utilization>,
    ) -> UsageScheduler {
        let db = GlobalDb::open_in_memory().unwrap();
        let clock: Arc<dyn Clock> = Arc::new(FixedClock::new(at));
        let mut tracker = WeeklyUsageTracker::new(
            SessionRegistry::new(db.clone()),
            UsageSnapshotStore::new(db),
            settings.weekly_session_minutes_limit,
            clock.clone(),
        );
        if let Some(data) = usage {
            tracker = tracker.with_provider(Arc::new(StaticProvider(data)));
        }
        UsageScheduler::new(settings, tracker, clock)
    }

    fn local(h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 3, 4)
            .unwrap()
            .and_hms_opt(h, 30, 0)
            .unwrap()
    }

    // 2026-03-04 is a Wednesday.
    fn wednesday(h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 4, h, 0, 0).unwrap()
    }

    fn usage(five_hour: f64, seven_day: f64) -> Option<Utilization> {
        Some(Utilization {
            five_hour,
            seven_day,
        })
    }

    #[test]
    fn test_window_same_day() {
        let s = scheduler_at(settings(1, 6), wednesday(12), None);
        assert!(!s.is_in_window(Some(local(0))));
        assert!(s.is_in_window(Some(local(1))));
        assert!(s.is_in_window(Some(local(5))));
        assert!(!s.is_in_window(Some(local(6))));
    }

    #[test]
    fn test_window_crosses_midnight() {
        let s = scheduler_at(settings(22, 6), wednesday(12), None);
        assert!(s.is_in_window(Some(local(23))));
        assert!(s.is_in_window(Some(local(3))));
        assert!(!s.is_in_window(Some(local(12))));
        assert!(!s.is_in_window(Some(local(6))));
    }

    #[test]
    fn test_window_uses_local_offset() {
        let db = GlobalDb::open_in_memory().unwrap();
        let offset = chrono::FixedOffset::east_opt(-5 * 3600).unwrap();
        // 07:00 UTC is 02:00 at UTC-5.
        let clock: Arc<dyn Clock> = Arc::new(FixedClock::new(wednesday(7)).with_offset(offset));
        let tracker = WeeklyUsageTracker::new(
            SessionRegistry::new(db.clone()),
            UsageSnapshotStore::new(db),
            600.0,
            clock.clone(),
        );
        let s = UsageScheduler::new(settings(1, 6), tracker, clock);
        assert!(s.is_in_window(None));
    }

    #[tokio::test]
    async fn test_disabled_and_outside_window() {
        let mut disabled = settings(1, 6);
        disabled.enabled = false;
        let s = scheduler_at(disabled, wednesday(2), None);
        assert!(!s.is_in_window(None));
        let decision = s.should_spawn().await.unwrap();
        assert!(!decision.allowed);
        assert_eq!(decision.reason, "Night shift disabled");

        let s = scheduler_at(settings(1, 6), wednesday(12), None);
        let decision = s.should_spawn().await.unwrap();
        assert!(decision.reason.contains("Outside"));
        assert_eq!(decision.overrides(), SpawnOverrides::default());
    }

    #[tokio::test]
    async fn test_disabled_still_records_api_sample() {
        let db = GlobalDb::open_in_memory().unwrap();
        let snapshots = UsageSnapshotStore::new(db.clone());
        let clock: Arc<dyn Clock> = Arc::new(FixedClock::new(wednesday(12)));
        let tracker = WeeklyUsageTracker::new(
            SessionRegistry::new(db),
            snapshots.clone(),
            600.0,
            clock.clone(),
        )
        .with_provider(Arc::new(StaticProvider(Utilization {
            five_hour: 40.0,
            seven_day: 25.0,
        })));
        let mut disabled = settings(1, 6);
        disabled.enabled = false;
        let s = UsageScheduler::new(disabled, tracker, clock);

        let decision = s.should_spawn().await.unwrap();
        assert_eq!(decision.reason, "Night shift disabled");

        let latest = snapshots.latest().unwrap().unwrap();
        assert_eq!(latest.source, UsageSource::Api);
        assert_eq!(latest.seven_day_utilization, 25.0);
        assert_eq!(latest.timestamp, wednesday(12));
    }

    #[tokio::test]
    async fn test_five_hour_backpressure() {
        let s = scheduler_at(settings(1, 6), wednesday(2), usage(90.0, 10.0));
        let decision = s.should_spawn().await.unwrap();
        assert!(!decision.allowed);
        assert_eq!(decision.reason, "5-hour utilization (90.0%) > 80%");
    }

    #[tokio::test]
    async fn test_usage_ahead_of_calendar() {
        // Sunday 02:00: barely 1% of the week elapsed.
        let sunday = Utc.with_ymd_and_hms(2026, 3, 1, 2, 0, 0).unwrap();
        let s = scheduler_at(settings(1, 6), sunday, usage(10.0, 10.0));
        let decision = s.should_spawn().await.unwrap();
        assert!(!decision.allowed);
        assert!(decision.reason.starts_with("Usage (10.0%) >= week elapsed"));
    }

    #[tokio::test]
    async fn test_safety_threshold() {
        // Saturday 02:00: about 87% of the week elapsed.
        let saturday = Utc.with_ymd_and_hms(2026, 3, 7, 2, 0, 0).unwrap();
        let s = scheduler_at(settings(1, 6), saturday, usage(10.0, 86.0));
        let decision = s.should_spawn().await.unwrap();
        assert!(!decision.allowed);
        assert_eq!(decision.reason, "Usage (86.0%) >= safety threshold (85%)");

        let state = s.state().await.unwrap();
        assert!(state.throttled);
        assert!(state.window_open);
        assert!(!state.active);
    }

    #[tokio::test]
    async fn test_allowed_with_headroom() {
        let s = scheduler_at(settings(1, 6), wednesday(2), usage(10.0, 10.0));
        let decision = s.should_spawn().await.unwrap();
        assert!(decision.allowed);
        assert_eq!(decision.max_concurrent, 7);
        assert!(decision.reason.starts_with("Night shift active, headroom: "));
        assert_eq!(decision.overrides().max_project_sessions, Some(7));

        let state = s.state().await.unwrap();
        assert!(state.active);
        assert_eq!(state.usage_source, UsageSource::Api);
        assert!((state.week_elapsed_percent - 74.0 / 168.0 * 100.0).abs() < 1e-9);
        assert!((state.headroom_percent - (state.week_elapsed_percent - 10.0)).abs() < 1e-9);
        assert_eq!(state.next_window_start, "1:00");
        assert_eq!(state.next_window_end, "6:00");
    }
}
