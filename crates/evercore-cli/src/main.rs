//! Evercore CLI - command-line interface for the account synchronizer
//!
//! Provides commands for:
//! - Authenticating the demo account and inspecting its token state
//! - Running a sync round and reporting the resulting `SyncResult`
//! - Viewing persisted sync state and the last completed round
//! - Viewing and editing the on-disk configuration

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;
mod demo_auth;
mod output;

use commands::auth::AuthCommand;
use commands::config::ConfigCommand;
use commands::status::StatusCommand;
use commands::sync::SyncCommand;
use output::OutputFormat;

#[derive(Debug, Parser)]
#[command(name = "evercore", version, about = "Evernote-compatible account synchronizer")]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    json: bool,

    /// Verbose output (can be repeated: -v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Use alternate config file
    #[arg(long, global = true)]
    config: Option<String>,

    /// Minimal output
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Authentication commands
    #[command(subcommand)]
    Auth(AuthCommand),
    /// Run a sync round for the configured account
    Sync(SyncCommand),
    /// Show synchronization status
    Status(StatusCommand),
    /// View and manage configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .init();

    let format = if cli.json { OutputFormat::Json } else { OutputFormat::Human };

    match cli.command {
        Commands::Auth(cmd) => cmd.execute(format).await,
        Commands::Sync(cmd) => cmd.execute(format).await,
        Commands::Status(cmd) => cmd.execute(format).await,
        Commands::Config(cmd) => cmd.execute(format).await,
    }
}
