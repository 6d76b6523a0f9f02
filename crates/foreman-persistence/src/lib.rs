//! SQLite persistence for Foreman.
//!
//! Two database files back the system:
//!
//! - [`GlobalDb`]: the session registry and usage snapshots. Shared by every
//!   project on the machine so ceilings and cost apply globally.
//! - [`ProjectDb`]: the message bus and revision counters for one repository.
//!
//! Both are opened in WAL mode so a read-only status process can observe them
//! while the controller writes.

pub mod bus;
pub mod connection;
pub mod error;
pub mod registry;
pub mod revisions;
pub mod time;
pub mod usage;

pub use bus::MessageBus;
pub use connection::{Database, GlobalDb, ProjectDb};
pub use error::{PersistenceError, Result};
pub use registry::SessionRegistry;
pub use revisions::RevisionStore;
pub use usage::UsageSnapshotStore;
