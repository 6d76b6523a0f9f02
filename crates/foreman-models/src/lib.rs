//! Core data models for Foreman.
//!
//! This crate provides the fundamental data types shared by every Foreman
//! component: session records, bus messages, usage samples, the issue and
//! pull-request shapes returned by the tracker clients, the label
//! vocabulary, and the session naming convention.

pub mod clock;
pub mod error;
pub mod labels;
pub mod message;
pub mod naming;
pub mod session;
pub mod tracker;
pub mod usage;
pub mod worktree;

// Re-export main types
pub use clock::{Clock, FixedClock, SystemClock};
pub use error::{ModelError, Result};
pub use labels::{LabelSpec, STANDARD_LABELS};
pub use message::{
    AlertLevel, AlertPayload, CapacityCheckPayload, Message, MessageType, PrReadyPayload,
    ReviewCompletePayload, RevisionNeededPayload, RoleName, SessionEndedPayload,
    SpawnRequestPayload,
};
pub use naming::{ParsedSession, SessionKind};
pub use session::{NewSession, SessionRecord, SessionRole};
pub use tracker::{Issue, PullRequest, ReviewDecision};
pub use usage::{UsageSnapshot, UsageSource};
pub use worktree::{WorktreeInfo, WorktreeStrategy};
