//! Foreman role launchers.
//!
//! A launcher turns an assignment into written instructions and a running
//! agent session. It never records anything: the controller owns the session
//! registry and capacity ledger.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use foreman_roles::{DeveloperLauncher, DeveloperRequest, LaunchSettings, RoleLauncher};
//! use foreman_tmux::TmuxOrchestrator;
//!
//! # async fn example(settings: LaunchSettings) -> Result<(), Box<dyn std::error::Error>> {
//! let host = Arc::new(TmuxOrchestrator::new()?);
//! let developer = DeveloperLauncher::new(host, settings);
//! let session = developer.spawn(&DeveloperRequest::new(42, "/work/issue-42")).await?;
//! println!("started {session}");
//! # Ok(())
//! # }
//! ```

pub mod developer;
pub mod error;
pub mod launcher;
pub mod reviewer;
pub mod template;

pub use developer::{DeveloperLauncher, DeveloperRequest};
pub use error::{RoleError, Result};
pub use launcher::{LaunchSettings, RoleLauncher};
pub use reviewer::{ReviewRequest, ReviewerLauncher};
