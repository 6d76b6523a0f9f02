//! Command-line interface definition using clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Build version string with git hash and build date.
fn version_string() -> &'static str {
    const VERSION: &str = env!("CARGO_PKG_VERSION");
    const GIT_HASH: &str = env!("GIT_HASH");
    const BUILD_DATE: &str = env!("BUILD_DATE");

    static VERSION_STRING: std::sync::OnceLock<String> = std::sync::OnceLock::new();
    VERSION_STRING.get_or_init(|| format!("{} ({}, {})", VERSION, GIT_HASH, BUILD_DATE))
}

/// Foreman - assigns GitHub issues to coding-agent sessions and shepherds
/// their pull requests through review
#[derive(Parser, Debug)]
#[command(name = "foreman")]
#[command(author, version = version_string(), about, long_about = None)]
pub struct Cli {
    /// Enable verbose output (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Path to state directory
    #[arg(short, long, env = "FOREMAN_STATE_DIR", global = true)]
    pub state_dir: Option<PathBuf>,

    /// Repository root (default: current directory)
    #[arg(short = 'C', long, global = true)]
    pub root: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Run the controller loop until Ctrl-C
    Run {
        /// Log what would be spawned without spawning
        #[arg(long)]
        dry_run: bool,
    },

    /// Run a single cycle and exit
    Once {
        /// Log what would be spawned without spawning
        #[arg(long)]
        dry_run: bool,
    },

    /// Show sessions, budget and night-shift state
    Status {
        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Kill every session of this project
    Stop {
        /// Also remove all managed worktrees
        #[arg(long)]
        clean: bool,
    },

    /// Route pending reviews and launch a reviewer now
    Review,

    /// Attach to a session (pm, cto, 42, dev-42 or a full name)
    Attach {
        #[arg(required = true)]
        session: String,
    },

    /// Show resolved paths and effective configuration
    Config,

    /// Write foreman.toml, create labels and check tools
    Init {
        /// GitHub repository as owner/name (default: from the origin remote)
        #[arg(long)]
        repo: Option<String>,
    },

    /// Show recent bus messages
    Messages {
        /// Number of messages to show
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
    },
}

impl Default for Commands {
    fn default() -> Self {
        Commands::Run { dry_run: false }
    }
}

impl Cli {
    /// Returns the state directory path, using default if not specified.
    pub fn state_dir(&self) -> PathBuf {
        self.state_dir
            .clone()
            .unwrap_or_else(foreman_core::state_dir)
    }

    /// Returns the repository root, defaulting to the working directory.
    pub fn root(&self) -> PathBuf {
        self.root.clone().unwrap_or_else(|| {
            std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
        })
    }

    /// Returns the log level based on verbosity.
    pub fn log_level(&self) -> tracing::Level {
        match self.verbose {
            0 => tracing::Level::WARN,
            1 => tracing::Level::INFO,
            2 => tracing::Level::DEBUG,
            _ => tracing::Level::TRACE,
        }
    }
}
