//! Foreman CLI entry point.

use clap::Parser;
use tracing_subscriber::{fmt, EnvFilter};

use foreman_cli::cli::Cli;
use foreman_cli::commands;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let state_dir = cli.state_dir();

    // Tokens for gh and the usage endpoint.
    let _ = dotenvy::from_path(foreman_core::env_file(&state_dir));
    let _ = dotenvy::from_filename(".env.local");

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(cli.log_level().to_string()));
    fmt().with_env_filter(filter).with_target(false).init();

    let root = cli.root();
    let command = cli.command.unwrap_or_default();

    if let Err(e) = commands::execute(command, &root, &state_dir).await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
