//! Foreman orchestration.
//!
//! The [`Controller`] runs one observe-and-act cycle over a project: it
//! drains the message bus, reaps dead and finished workers, routes review
//! outcomes, launches a reviewer and assigns ready issues to developers
//! within the capacity ledger's budgets. [`CycleScheduler`] repeats that
//! cycle on a fixed interval until shut down.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use foreman_orchestrator::{Controller, CycleScheduler};
//!
//! # async fn demo(controller: Controller) -> foreman_orchestrator::Result<()> {
//! let mut scheduler = CycleScheduler::new(controller, Duration::from_secs(300));
//! scheduler.start().await?;
//! tokio::signal::ctrl_c().await.ok();
//! scheduler.shutdown().await?;
//! # Ok(())
//! # }
//! ```

pub mod controller;
pub mod error;
pub mod priority;
pub mod scheduler;
pub mod status;

pub use controller::{Controller, ControllerDeps, ControllerSettings, CycleReport, StopReport};
pub use error::{OrchestratorError, Result};
pub use priority::prioritize;
pub use scheduler::CycleScheduler;
pub use status::{ControllerState, ControllerStatus, MAX_ERRORS};
