//! # glucose-cli
//!
//! CLI tool for inspecting and exercising glucose-sync state.
//!
//! ## Commands
//!
//! - `ledger`: Print the downloaded-sample ledger
//! - `prune`: Drop ledger entries older than the retention
//! - `replay`: Run one sync cycle over exported store records
//!
//! ## Example
//!
//! ```bash
//! # Run a cycle over a store export
//! glucose-cli replay --added added.json
//!
//! # Replay again: everything is a duplicate now
//! glucose-cli replay --added added.json
//!
//! # Inspect what the engine remembers
//! glucose-cli ledger
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use glucose_sync_client::ManualClock;
use glucose_sync_types::Timestamp;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;
mod config;

use commands::{ledger, prune, replay};

/// CLI tool for inspecting and exercising glucose-sync state.
#[derive(Parser, Debug)]
#[command(name = "glucose-cli")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Data directory holding the ledger and config file
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Configuration file (default: glucose-sync.toml in the data directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log at debug level unless RUST_LOG is set
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the downloaded-sample ledger
    Ledger,

    /// Drop ledger entries older than the retention
    Prune {
        /// Treat this Unix time in milliseconds as "now"
        #[arg(long)]
        now: Option<i64>,
    },

    /// Run one sync cycle over exported store records
    Replay {
        /// JSON file of records returned by the addition query
        #[arg(long)]
        added: PathBuf,

        /// JSON file of records returned by the deletion query
        #[arg(long)]
        removed: Option<PathBuf>,

        /// Treat this Unix time in milliseconds as "now"
        #[arg(long)]
        now: Option<i64>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    // Determine data directory
    let data_dir = match cli.data_dir {
        Some(dir) => dir,
        None => default_data_dir()?,
    };

    // Ensure data directory exists
    tokio::fs::create_dir_all(&data_dir)
        .await
        .context("Failed to create data directory")?;

    let config = config::load(cli.config.as_deref(), &data_dir)?;
    let ledger_path = config::ledger_path(&config, &data_dir);
    tracing::debug!("Using ledger at {}", ledger_path.display());

    match cli.command {
        Commands::Ledger => {
            ledger::run(&ledger_path).await?;
        }
        Commands::Prune { now } => {
            prune::run(config.sync, &ledger_path, clock_at(now)).await?;
        }
        Commands::Replay {
            added,
            removed,
            now,
        } => {
            let report = replay::run(
                config.sync,
                &ledger_path,
                &added,
                removed.as_deref(),
                clock_at(now),
            )
            .await?;
            if !report.is_ok() {
                anyhow::bail!("Sync cycle did not complete cleanly");
            }
        }
    }

    Ok(())
}

/// A clock pinned to `now`, or to the current time.
fn clock_at(now: Option<i64>) -> ManualClock {
    ManualClock::new(now.map(Timestamp::from_millis).unwrap_or_else(Timestamp::now))
}

/// Get the default data directory for glucose-cli.
fn default_data_dir() -> Result<PathBuf> {
    let dirs = directories::ProjectDirs::from("io", "glucose", "glucose-sync")
        .context("Could not determine home directory")?;
    Ok(dirs.data_dir().to_path_buf())
}
