//! Rolling seven-day usage.

use std::sync::Arc;

use chrono::Duration;
use serde::Serialize;
use tracing::debug;

use foreman_models::{Clock, UsageSource};
use foreman_persistence::{SessionRegistry, UsageSnapshotStore};

use crate::client::UsageProvider;
use crate::error::Result;

const WINDOW_DAYS: i64 = 7;

/// Usage over the trailing week.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeeklyUsage {
    pub total_session_minutes: f64,
    pub weekly_limit: f64,
    pub usage_percent: f64,
    pub source: UsageSource,
    pub five_hour_utilization: Option<f64>,
}

/// Combines provider-reported utilization with recorded session minutes.
#[derive(Clone)]
pub struct WeeklyUsageTracker {
    registry: SessionRegistry,
    snapshots: UsageSnapshotStore,
    provider: Option<Arc<dyn UsageProvider>>,
    weekly_limit: f64,
    clock: Arc<dyn Clock>,
}

impl WeeklyUsageTracker {
    pub fn new(
        registry: SessionRegistry,
        snapshots: UsageSnapshotStore,
        weekly_limit_minutes: f64,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            registry,
            snapshots,
            provider: None,
            weekly_limit: weekly_limit_minutes,
            clock,
        }
    }

    /// Prefer `provider` over minute estimates when it answers.
    pub fn with_provider(mut self, provider: Arc<dyn UsageProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    /// Session minutes started within the window: closed sessions by duration,
    /// open sessions up to now.
    pub fn total_session_minutes(&self) -> Result<f64> {
        let now = self.clock.now();
        let since = now - Duration::days(WINDOW_DAYS);
        let minutes = self
            .registry
            .open_or_ended_since(since)?
            .iter()
            .filter(|r| r.started_at >= since)
            .map(|r| {
                let end = r.ended_at.unwrap_or(now);
                ((end - r.started_at).num_milliseconds() as f64 / 60_000.0).max(0.0)
            })
            .sum();
        Ok(minutes)
    }

    /// Current usage; records a snapshot and prunes week-old ones.
    pub async fn snapshot(&self) -> Result<WeeklyUsage> {
        let now = self.clock.now();
        let total_minutes = self.total_session_minutes()?;

        let reported = match &self.provider {
            Some(provider) => provider.fetch_usage().await,
            None => None,
        };

        let usage = match reported {
            Some(data) => {
                self.snapshots
                    .record(now, data.five_hour, data.seven_day, UsageSource::Api)?;
                WeeklyUsage {
                    total_session_minutes: total_minutes,
                    weekly_limit: self.weekly_limit,
                    usage_percent: data.seven_day,
                    source: UsageSource::Api,
                    five_hour_utilization: Some(data.five_hour),
                }
            }
            None => {
                let percent = if self.weekly_limit > 0.0 {
                    total_minutes / self.weekly_limit * 100.0
                } else {
                    0.0
                };
                self.snapshots
                    .record(now, 0.0, percent, UsageSource::Estimated)?;
                WeeklyUsage {
                    total_session_minutes: total_minutes,
                    weekly_limit: self.weekly_limit,
                    usage_percent: percent,
                    source: UsageSource::Estimated,
                    five_hour_utilization: None,
                }
            }
        };

        let pruned = self
            .snapshots
            .prune_before(now - Duration::days(WINDOW_DAYS))?;
        if pruned > 0 {
            debug!(pruned, "pruned old usage snapshots");
        }
        Ok(usage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::Utilization;
    use async_trait::async_trait;
    use chrono::{DateTime, TimeZone, Utc};
    use foreman_models::{FixedClock, NewSession};
    use foreman_persistence::GlobalDb;

    struct StaticProvider(Option<Utilization>);

    #[async_trait]
    impl UsageProvider for StaticProvider {
        async fn fetch_usage(&self) -> Option<Utilization> {
            self.0
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 4, 12, 0, 0).unwrap()
    }

    fn setup() -> (WeeklyUsageTracker, SessionRegistry, UsageSnapshotStore) {
        let db = GlobalDb::open_in_memory().unwrap();
        let registry = SessionRegistry::new(db.clone());
        let snapshots = UsageSnapshotStore::new(db);
        let clock = Arc::new(FixedClock::new(now()));
        let tracker = WeeklyUsageTracker::new(registry.clone(), snapshots.clone(), 600.0, clock);
        (tracker, registry, snapshots)
    }

    #[tokio::test]
    async fn test_estimate_counts_only_last_week() {
        let (tracker, registry, snapshots) = setup();

        let recent = registry
            .insert(
                &NewSession::developer("web", 1, "foreman-web-dev-1"),
                now() - Duration::minutes(70),
            )
            .unwrap();
        registry
            .close(recent, now() - Duration::minutes(10), 9.0)
            .unwrap();

        let old_start = now() - Duration::days(8);
        let old = registry
            .insert(&NewSession::developer("web", 2, "foreman-web-dev-2"), old_start)
            .unwrap();
        registry
            .close(old, old_start + Duration::minutes(30), 4.5)
            .unwrap();

        let usage = tracker.snapshot().await.unwrap();
        assert!((usage.total_session_minutes - 60.0).abs() < 1e-6);
        assert!((usage.usage_percent - 10.0).abs() < 1e-6);
        assert_eq!(usage.source, UsageSource::Estimated);

        let latest = snapshots.latest().unwrap().unwrap();
        assert_eq!(latest.source, UsageSource::Estimated);
    }

    #[tokio::test]
    async fn test_open_session_counts_to_now() {
        let (tracker, registry, _) = setup();
        registry
            .insert(
                &NewSession::developer("web", 1, "foreman-web-dev-1"),
                now() - Duration::minutes(30),
            )
            .unwrap();
        assert!((tracker.total_session_minutes().unwrap() - 30.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_zero_limit_is_zero_percent() {
        let db = GlobalDb::open_in_memory().unwrap();
        let registry = SessionRegistry::new(db.clone());
        registry
            .insert(
                &NewSession::developer("web", 1, "foreman-web-dev-1"),
                now() - Duration::minutes(30),
            )
            .unwrap();
        let tracker = WeeklyUsageTracker::new(
            registry,
            UsageSnapshotStore::new(db),
            0.0,
            Arc::new(FixedClock::new(now())),
        );
        assert_eq!(tracker.snapshot().await.unwrap().usage_percent, 0.0);
    }

    #[tokio::test]
    async fn test_provider_data_wins_and_old_snapshots_pruned() {
        let (tracker, _, snapshots) = setup();
        snapshots
            .record(now() - Duration::days(8), 1.0, 1.0, UsageSource::Api)
            .unwrap();
        let tracker = tracker.with_provider(Arc::new(StaticProvider(Some(Utilization {
            five_hour: 35.0,
            seven_day: 22.0,
        }))));

        let usage = tracker.snapshot().await.unwrap();
        assert_eq!(usage.source, UsageSource::Api);
        assert_eq!(usage.usage_percent, 22.0);
        assert_eq!(usage.five_hour_utilization, Some(35.0));

        let kept = snapshots.since(now() - Duration::days(30)).unwrap();
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].five_hour_utilization, 35.0);
    }

    #[tokio::test]
    async fn test_silent_provider_falls_back_to_estimate() {
        let (tracker, _, _) = setup();
        let tracker = tracker.with_provider(Arc::new(StaticProvider(None)));
        let usage = tracker.snapshot().await.unwrap();
        assert_eq!(usage.source, UsageSource::Estimated);
        assert!(usage.five_hour_utilization.is_none());
    }
}
