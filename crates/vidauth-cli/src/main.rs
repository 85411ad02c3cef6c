//! vidauth - vehicle provider login server
//!
//! Main entry point for the vidauth CLI.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;

use commands::{logout, serve, status};

// ─────────────────────────────────────────────────────────────────────────────
// CLI Structure
// ─────────────────────────────────────────────────────────────────────────────

/// vidauth - vehicle provider login server
#[derive(Parser)]
#[command(name = "vidauth")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output as JSON (for scripting)
    #[arg(long, global = true)]
    pub json: bool,

    /// Config file to use instead of discovery
    #[arg(short, long, global = true, env = "VIDAUTH_CONFIG")]
    pub config: Option<PathBuf>,

    /// Directory for persisted credentials (overrides config)
    #[arg(long, global = true, env = "VIDAUTH_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the login callback server
    Serve(serve::ServeArgs),

    /// Show the stored login state
    Status(status::StatusArgs),

    /// Forget the stored token
    Logout(logout::LogoutArgs),
}

// ─────────────────────────────────────────────────────────────────────────────
// Main
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Console (human-readable) + rotating JSON file
    let filter = if cli.verbose {
        "vidauth=debug,vidauth_config=debug,tower_http=debug,info"
    } else {
        "vidauth=info,vidauth_config=info,warn"
    };

    let log_dir = vidauth_config::xdg_config_dir()
        .map(|d| d.join("logs"))
        .unwrap_or_else(|| PathBuf::from("logs"));
    let file_appender = tracing_appender::rolling::daily(&log_dir, "vidauth.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    use tracing_subscriber::prelude::*;
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_writer(std::io::stderr)
                .with_filter(tracing_subscriber::EnvFilter::new(filter)),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(non_blocking)
                .with_filter(tracing_subscriber::EnvFilter::new(
                    "vidauth=trace,vidauth_config=trace,tower_http=debug,info",
                )),
        )
        .init();

    let ctx = commands::Context {
        config_path: cli.config,
        data_dir: cli.data_dir,
        json_output: cli.json,
    };

    match cli.command {
        Commands::Serve(args) => serve::run(args, &ctx).await,
        Commands::Status(args) => status::run(args, &ctx).await,
        Commands::Logout(args) => logout::run(args, &ctx).await,
    }
}
