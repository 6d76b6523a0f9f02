//! Utilization samples.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ModelError;

/// Where a utilization sample came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UsageSource {
    /// Reported by the provider's usage endpoint.
    Api,
    /// Derived from recorded session durations.
    Estimated,
}

impl UsageSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            UsageSource::Api => "api",
            UsageSource::Estimated => "estimated",
        }
    }
}

impl fmt::Display for UsageSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UsageSource {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "api" => Ok(UsageSource::Api),
            "estimated" => Ok(UsageSource::Estimated),
            other => Err(ModelError::UnknownUsageSource(other.to_string())),
        }
    }
}

/// One observed utilization sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageSnapshot {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    /// Short-window (five hour) utilization percent.
    pub five_hour_utilization: f64,
    /// Weekly utilization percent.
    pub seven_day_utilization: f64,
    pub source: UsageSource,
}
