//! Repeating cycle loop for `kbtrackd watch`.
//!
//! Runs [`Tracker::tick`] on a fixed interval until the cancellation token
//! fires. Storage errors are logged and the loop carries on; the next tick
//! retries from whatever state was last committed.

use std::time::Duration;

use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::probe::DeviceProbe;
use crate::tracker::Tracker;

/// Summary of a finished watch loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WatchStats {
    pub cycles: u64,
    pub failures: u64,
}

/// Runs cycles every `period` until `cancel_token` is cancelled.
pub async fn run_watch(
    tracker: &Tracker,
    probe: &dyn DeviceProbe,
    period: Duration,
    cancel_token: CancellationToken,
) -> WatchStats {
    let mut tick = interval(period);
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut stats = WatchStats::default();

    info!(interval_secs = period.as_secs(), "Watch loop started");

    loop {
        tokio::select! {
            biased;
            _ = cancel_token.cancelled() => {
                info!("Watch loop shutting down");
                break;
            }
            _ = tick.tick() => {
                tokio::select! {
                    biased;
                    _ = cancel_token.cancelled() => {
                        info!("Cancelled during cycle");
                        break;
                    }
                    outcome = tracker.tick(probe) => {
                        stats.cycles += 1;
                        match outcome {
                            Ok(outcome) => debug!(event = ?outcome.event, "Cycle complete"),
                            Err(e) => {
                                stats.failures += 1;
                                error!(error = %e, "Cycle failed");
                            }
                        }
                    }
                }
            }
        }
    }

    debug!(cycles = stats.cycles, failures = stats.failures, "Watch loop completed");
    stats
}
