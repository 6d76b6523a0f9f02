//! Foreman capacity accounting.
//!
//! - [`CapacityLedger`]: session ceilings, daily cost and burn rate
//! - [`WeeklyUsageTracker`]: trailing seven-day usage, provider-reported when
//!   available and estimated from session minutes otherwise
//! - [`UsageClient`]: the provider usage endpoint
//! - [`UsageScheduler`]: the night-shift window and its spawn decision

pub mod client;
pub mod error;
pub mod ledger;
pub mod scheduler;
pub mod usage;

pub use client::{UsageClient, UsageProvider, Utilization};
pub use error::{CapacityError, Result};
pub use ledger::{BudgetSnapshot, CapacityCheck, CapacityLedger, LedgerLimits, SpawnOverrides};
pub use scheduler::{NightShiftState, SpawnDecision, UsageScheduler};
pub use usage::{WeeklyUsage, WeeklyUsageTracker};
