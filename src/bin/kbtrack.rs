//! kbtrack - Keyboard battery session reports
//!
//! # Usage
//!
//! ```text
//! kbtrack              # Same as `kbtrack status`
//! kbtrack status       # Live session, discharge rates, estimates
//! kbtrack history      # Completed sessions, newest first
//! kbtrack stats        # Window rates, segment statistics, trend
//! kbtrack stats --json # The same data as JSON
//! kbtrack reset        # End the live session and archive it
//! ```

use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use kbtrack_core::StopReason;
use kbtrackd::{tracker_from_config, DaemonConfig};

/// kbtrack - keyboard battery session reports
#[derive(Parser, Debug)]
#[command(name = "kbtrack", version, about)]
struct Args {
    /// Data directory (overrides KBTRACK_DATA_DIR and the config file)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Path to config.toml
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show the current tracking session
    Status,
    /// Show completed sessions
    History,
    /// Show discharge statistics
    Stats {
        /// Print machine-readable JSON
        #[arg(long)]
        json: bool,
    },
    /// Force stop the current session and save it to history
    Reset,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("kbtrackd=warn".parse()?)
                .add_directive("kbtrack_store=warn".parse()?),
        )
        .init();

    let args = Args::parse();

    let config =
        DaemonConfig::load(args.config.as_deref()).context("Failed to load configuration")?;
    let data_dir = config.data_dir(args.data_dir.as_deref());
    let tracker = tracker_from_config(&config, &data_dir);
    let now = Utc::now();

    match args.command.unwrap_or(Command::Status) {
        Command::Status => {
            let snapshot = tracker.snapshot(now).context("Failed to read tracking data")?;
            print!("{}", kbtrack_cli::status(&snapshot, tracker.config(), now));
        }
        Command::History => {
            let snapshot = tracker.snapshot(now).context("Failed to read tracking data")?;
            print!("{}", kbtrack_cli::history(&snapshot));
        }
        Command::Stats { json } => {
            let snapshot = tracker.snapshot(now).context("Failed to read tracking data")?;
            if json {
                println!("{}", kbtrack_cli::stats_json(&snapshot)?);
            } else {
                print!("{}", kbtrack_cli::stats(&snapshot));
            }
        }
        Command::Reset => {
            match tracker
                .reset_session(StopReason::ManualReset, now)
                .context("Failed to reset session")?
            {
                Some(completed) => println!(
                    "Session {} reset and saved to history ({})",
                    completed.session_num, completed.formatted
                ),
                None => println!("No active session to reset"),
            }
        }
    }

    Ok(())
}
