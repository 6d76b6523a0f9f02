//! Tmux session host for Foreman.
//!
//! Every worker runs in its own detached tmux session. This crate provides:
//! - [`SessionHost`], the async interface the controller and launchers use
//! - [`TmuxOrchestrator`], its tmux-backed implementation
//!
//! # Example
//!
//! ```no_run
//! use foreman_tmux::{CreateSession, SessionHost, TmuxOrchestrator};
//!
//! # async fn demo() -> foreman_tmux::Result<()> {
//! let tmux = TmuxOrchestrator::new()?;
//! tmux.create_session(
//!     CreateSession::new("foreman-web-dev-42", "/tmp/wt/issue-42", "claude")
//!         .with_env("GH_TOKEN", "secret"),
//! )
//! .await?;
//! assert!(tmux.is_alive("foreman-web-dev-42").await);
//! tmux.kill("foreman-web-dev-42").await?;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod host;
pub mod orchestrator;
pub mod session;

pub use error::{Result, TmuxError};
pub use host::{CreateSession, SessionHost};
pub use orchestrator::TmuxOrchestrator;
pub use session::TmuxSession;
