//! Message bus types.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::ModelError;
use crate::session::SessionRole;

/// Addressable participant on the message bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoleName {
    /// The orchestration controller.
    Pm,
    /// The reviewer.
    Cto,
    /// A developer worker.
    Developer,
    /// The capacity ledger.
    Hr,
}

impl RoleName {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoleName::Pm => "pm",
            RoleName::Cto => "cto",
            RoleName::Developer => "developer",
            RoleName::Hr => "hr",
        }
    }
}

impl fmt::Display for RoleName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RoleName {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pm" => Ok(RoleName::Pm),
            "cto" => Ok(RoleName::Cto),
            "developer" => Ok(RoleName::Developer),
            "hr" => Ok(RoleName::Hr),
            other => Err(ModelError::UnknownRole(other.to_string())),
        }
    }
}

/// Closed set of bus message types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    SpawnRequest,
    CapacityCheck,
    PrReady,
    ReviewComplete,
    RevisionNeeded,
    Alert,
    SessionEnded,
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::SpawnRequest => "spawn_request",
            MessageType::CapacityCheck => "capacity_check",
            MessageType::PrReady => "pr_ready",
            MessageType::ReviewComplete => "review_complete",
            MessageType::RevisionNeeded => "revision_needed",
            MessageType::Alert => "alert",
            MessageType::SessionEnded => "session_ended",
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageType {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "spawn_request" => Ok(MessageType::SpawnRequest),
            "capacity_check" => Ok(MessageType::CapacityCheck),
            "pr_ready" => Ok(MessageType::PrReady),
            "review_complete" => Ok(MessageType::ReviewComplete),
            "revision_needed" => Ok(MessageType::RevisionNeeded),
            "alert" => Ok(MessageType::Alert),
            "session_ended" => Ok(MessageType::SessionEnded),
            other => Err(ModelError::UnknownMessageType(other.to_string())),
        }
    }
}

/// A persisted bus message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: i64,
    pub from: RoleName,
    pub to: RoleName,
    #[serde(rename = "type")]
    pub message_type: MessageType,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub read_at: Option<DateTime<Utc>>,
}

impl Message {
    /// Decode the payload into a typed struct.
    pub fn payload_as<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
        serde_json::from_value(self.payload.clone())
    }

    pub fn is_read(&self) -> bool {
        self.read_at.is_some()
    }
}

/// Request for a new developer on an issue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpawnRequestPayload {
    pub issue_number: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Outcome of a capacity query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapacityCheckPayload {
    pub allowed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// A developer opened a pull request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrReadyPayload {
    pub issue_number: u64,
    pub pr_number: u64,
    pub branch: String,
}

/// The reviewer finished with a pull request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewCompletePayload {
    pub pr_number: u64,
    pub approved: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

/// A pull request was sent back for another developer pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RevisionNeededPayload {
    pub issue_number: u64,
    pub pr_number: u64,
    pub branch: String,
    #[serde(default)]
    pub revision_count: u32,
}

/// A worker session stopped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionEndedPayload {
    pub session: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issue_number: Option<u64>,
    pub role: SessionRole,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Severity of an alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertLevel {
    Info,
    Warning,
    Error,
}

/// Free-form operator alert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertPayload {
    pub level: AlertLevel,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<serde_json::Value>,
}
