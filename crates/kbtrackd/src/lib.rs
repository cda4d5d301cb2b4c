//! kbtrack Daemon - Probe, decide, persist
//!
//! This crate wires the pure state machine in `kbtrack-core` to a device
//! probe and the on-disk store:
//! - `config` - `config.toml` loading and data directory resolution
//! - `probe` - the `DeviceProbe` seam and the external-helper probe
//! - `tracker` - one locked probe-decide-persist cycle
//! - `watch` - repeating cycles with cooperative shutdown
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐  ProbeResult  ┌──────────────────┐
//! │ DeviceProbe  │──────────────▶│     Tracker      │
//! │ (helper exe) │               │                  │
//! └──────────────┘               │  lock            │
//!                                │  load_live       │
//!                                │  advance() ──────┼──▶ Transition
//!                                │  finalize        │
//!                                │  save / append   │
//!                                └────────┬─────────┘
//!                                         │
//!                         ┌───────────────┼────────────────┐
//!                         ▼               ▼                ▼
//!                   current.json    samples.jsonl    sessions.json
//! ```
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Probe failures become data, never errors
//! - Only storage failures propagate to the caller

pub mod config;
pub mod probe;
pub mod tracker;
pub mod watch;

pub use config::{ConfigError, DaemonConfig, ProbeCommand};
pub use probe::{CommandProbe, DeviceProbe, FixedProbe, ProbeError};
pub use tracker::{CycleOutcome, Tracker};
pub use watch::{run_watch, WatchStats};

use kbtrack_core::ProbeIssue;
use kbtrack_store::{DataDir, Store};
use std::path::Path;
use tracing::warn;

/// Builds the tracker for a data directory from config.
pub fn tracker_from_config(config: &DaemonConfig, data_dir: &Path) -> Tracker {
    let store = Store::open(DataDir::new(data_dir), config.sample_retention);
    Tracker::new(store, config.tracker.clone(), config.device_address.clone())
}

/// The configured probe, or one that always reports the stack unavailable.
pub fn probe_from_config(config: &DaemonConfig) -> Box<dyn DeviceProbe> {
    match &config.probe_command {
        Some(command) => Box::new(CommandProbe::new(
            command.clone(),
            config.connection_timeout(),
            config.device_address.clone(),
        )),
        None => {
            warn!("No probe_command configured, every cycle will report unavailable");
            Box::new(FixedProbe::unavailable(ProbeIssue::Unavailable))
        }
    }
}
