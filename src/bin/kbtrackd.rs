//! kbtrack Daemon - Keyboard battery session tracker
//!
//! Runs probe-decide-persist cycles against the data directory, either once
//! per invocation (for a scheduler such as launchd, systemd timers or cron)
//! or as a long-running watch loop.
//!
//! # Usage
//!
//! ```bash
//! # One cycle using the configured probe helper
//! kbtrackd run
//!
//! # One cycle with a reading supplied by hand
//! kbtrackd run --battery 83
//!
//! # Cycle every 60 seconds in the background
//! kbtrackd watch -d
//!
//! # Stop the watch loop
//! kbtrackd stop
//! ```

use std::fs::{self, OpenOptions};
use std::path::PathBuf;
use std::process;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use kbtrack_store::DataDir;
use kbtrackd::{
    probe_from_config, run_watch, tracker_from_config, DaemonConfig, DeviceProbe, FixedProbe,
};

/// kbtrack daemon - keyboard battery session tracker
#[derive(Parser, Debug)]
#[command(name = "kbtrackd", version, about)]
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
    /// Run a single cycle and exit
    Run {
        /// Use this battery percentage instead of running the probe
        #[arg(long, value_parser = clap::value_parser!(u8).range(0..=100))]
        battery: Option<u8>,
    },
    /// Run cycles on an interval until stopped
    Watch {
        /// Seconds between cycles (defaults to watch_interval_secs)
        #[arg(long)]
        interval: Option<u64>,

        /// Run as a background daemon (fork to background)
        #[arg(short = 'd', long)]
        daemon: bool,
    },
    /// Stop the running watch loop
    Stop,
    /// Show whether a watch loop is running
    Status,
}

// ============================================================================
// PID File
// ============================================================================

fn read_pid(dir: &DataDir) -> Option<i32> {
    fs::read_to_string(dir.pid_file()).ok()?.trim().parse().ok()
}

fn write_pid(dir: &DataDir) -> Result<()> {
    fs::write(dir.pid_file(), process::id().to_string()).context("Failed to write PID file")
}

fn remove_pid_file(dir: &DataDir) {
    let _ = fs::remove_file(dir.pid_file());
}

fn is_process_running(pid: i32) -> bool {
    // Signal 0 only checks that the process exists.
    unsafe { libc::kill(pid, 0) == 0 }
}

fn running_pid(dir: &DataDir) -> Option<i32> {
    if let Some(pid) = read_pid(dir) {
        if is_process_running(pid) {
            return Some(pid);
        }
        remove_pid_file(dir);
    }
    None
}

fn stop_daemon(pid: i32) -> Result<()> {
    let result = unsafe { libc::kill(pid, libc::SIGTERM) };
    if result != 0 {
        bail!("Failed to send SIGTERM to process {pid}");
    }
    Ok(())
}

// ============================================================================
// Main
// ============================================================================

fn main() -> Result<()> {
    let args = Args::parse();

    let config =
        DaemonConfig::load(args.config.as_deref()).context("Failed to load configuration")?;
    let data_dir = DataDir::new(config.data_dir(args.data_dir.as_deref()));

    let command = args.command.unwrap_or(Command::Run { battery: None });

    match command {
        Command::Run { battery } => run_once(&config, &data_dir, battery),
        Command::Watch { interval, daemon } => {
            if let Some(pid) = running_pid(&data_dir) {
                eprintln!("Watch loop is already running (PID {pid})");
                eprintln!("Use 'kbtrackd stop' to stop it first.");
                process::exit(1);
            }

            data_dir
                .ensure()
                .context("Failed to create data directory")?;

            if daemon {
                daemonize(&data_dir)?;
            }

            write_pid(&data_dir)?;

            let result = watch(&config, &data_dir, interval);

            remove_pid_file(&data_dir);

            result
        }
        Command::Stop => {
            if let Some(pid) = running_pid(&data_dir) {
                println!("Stopping watch loop (PID {pid})...");
                stop_daemon(pid)?;

                for _ in 0..50 {
                    if !is_process_running(pid) {
                        println!("Watch loop stopped.");
                        return Ok(());
                    }
                    std::thread::sleep(Duration::from_millis(100));
                }

                eprintln!("Watch loop did not stop within 5 seconds.");
                process::exit(1);
            } else {
                println!("Watch loop is not running.");
                Ok(())
            }
        }
        Command::Status => {
            println!("Data directory: {}", data_dir.root().display());
            if let Some(pid) = running_pid(&data_dir) {
                println!("Watch loop is running (PID {pid})");
                println!("Log: {}", data_dir.log_file().display());
                Ok(())
            } else {
                println!("Watch loop is not running.");
                process::exit(1);
            }
        }
    }
}

fn daemonize(dir: &DataDir) -> Result<()> {
    use daemonize::Daemonize;

    let log_path = dir.log_file();
    let open_log = || {
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)
            .context("Failed to open daemon log")
    };

    let daemonize = Daemonize::new()
        .working_directory("/")
        .stdout(open_log()?)
        .stderr(open_log()?);

    daemonize.start().context("Failed to daemonize")?;

    Ok(())
}

fn init_tracing() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("kbtrackd=info".parse()?)
                .add_directive("kbtrack_core=info".parse()?)
                .add_directive("kbtrack_store=info".parse()?),
        )
        .init();
    Ok(())
}

fn probe_for(config: &DaemonConfig, battery: Option<u8>) -> Box<dyn DeviceProbe> {
    match battery {
        Some(battery) => Box::new(FixedProbe::battery(battery)),
        None => probe_from_config(config),
    }
}

#[tokio::main]
async fn run_once(config: &DaemonConfig, data_dir: &DataDir, battery: Option<u8>) -> Result<()> {
    init_tracing()?;

    let tracker = tracker_from_config(config, data_dir.root());
    let probe = probe_for(config, battery);

    let outcome = tracker
        .tick(probe.as_ref())
        .await
        .context("Tracking cycle failed")?;

    info!(
        event = ?outcome.event,
        battery = ?outcome.sample.as_ref().and_then(|s| s.battery),
        "Cycle completed"
    );
    Ok(())
}

#[tokio::main]
async fn watch(config: &DaemonConfig, data_dir: &DataDir, interval: Option<u64>) -> Result<()> {
    init_tracing()?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        pid = process::id(),
        data_dir = %data_dir.root().display(),
        "kbtrackd starting"
    );

    let cancel_token = CancellationToken::new();

    let shutdown_token = cancel_token.clone();
    tokio::spawn(async move {
        if let Err(e) = wait_for_shutdown_signal().await {
            error!(error = %e, "Error waiting for shutdown signal");
        }
        info!("Shutdown signal received");
        shutdown_token.cancel();
    });

    let tracker = tracker_from_config(config, data_dir.root());
    let probe = probe_from_config(config);
    let period = interval
        .map(|secs| Duration::from_secs(secs.max(1)))
        .unwrap_or_else(|| config.watch_interval());

    let stats = run_watch(&tracker, probe.as_ref(), period, cancel_token).await;

    info!(
        cycles = stats.cycles,
        failures = stats.failures,
        "kbtrackd stopped"
    );
    Ok(())
}

async fn wait_for_shutdown_signal() -> Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    tokio::select! {
        _ = sigterm.recv() => {
            info!("Received SIGTERM");
        }
        _ = sigint.recv() => {
            info!("Received SIGINT");
        }
    }

    Ok(())
}
