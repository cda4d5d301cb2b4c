//! One probe-decide-persist cycle.
//!
//! The probe runs first, outside the data lock, so a slow Bluetooth read
//! never blocks `kbtrack reset`. The lock is then held from loading the live
//! session until the sample is appended.

use chrono::{DateTime, Utc};
use kbtrack_core::{
    advance, reset, CompletedSession, CycleEvent, LiveSession, ProbeResult, SampleRecord,
    StopReason, TrackerConfig,
};
use kbtrack_store::{Snapshot, Store, StoreResult};
use tracing::{debug, info, warn};

use crate::probe::DeviceProbe;

/// What one cycle did.
#[derive(Debug, Clone, PartialEq)]
pub struct CycleOutcome {
    pub event: CycleEvent,
    pub session: Option<LiveSession>,
    pub completed: Option<CompletedSession>,
    pub sample: Option<SampleRecord>,
}

/// Drives the state machine against the store.
#[derive(Debug, Clone)]
pub struct Tracker {
    store: Store,
    config: TrackerConfig,
    device_address: Option<String>,
}

impl Tracker {
    pub fn new(store: Store, config: TrackerConfig, device_address: Option<String>) -> Self {
        Self {
            store,
            config,
            device_address,
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// Probes the device and applies the result.
    pub async fn tick(&self, probe: &dyn DeviceProbe) -> StoreResult<CycleOutcome> {
        let result = probe.probe().await;
        self.apply(&result, Utc::now())
    }

    /// Applies one probe result under the data lock.
    pub fn apply(&self, result: &ProbeResult, now: DateTime<Utc>) -> StoreResult<CycleOutcome> {
        let _lock = self.store.lock()?;

        let current = self.store.load_live()?;
        let transition = advance(current, result, now, &self.config);

        let session = transition.session.map(|mut session| {
            if session.device_address.is_none() {
                session.device_address = self.device_address.clone();
            }
            session
        });

        let completed = match transition.finalized {
            Some(finalization) => Some(self.store.finalize(finalization, session.as_ref())?),
            None => {
                self.store.live.store(session.as_ref())?;
                None
            }
        };

        if let Some(sample) = &transition.sample {
            self.store.samples.append(sample)?;
        }

        log_cycle(transition.event, session.as_ref(), completed.as_ref());

        Ok(CycleOutcome {
            event: transition.event,
            session,
            completed,
            sample: transition.sample,
        })
    }

    /// Finalizes the live session on demand; `None` when there was none.
    pub fn reset_session(
        &self,
        reason: StopReason,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<CompletedSession>> {
        let _lock = self.store.lock()?;
        let current = self.store.load_live()?;
        match reset(current, reason, now) {
            Some(finalization) => {
                let completed = self.store.finalize(finalization, None)?;
                info!(session = completed.session_num, reason = %reason, "Session reset");
                Ok(Some(completed))
            }
            None => {
                debug!("No live session to reset");
                Ok(None)
            }
        }
    }

    /// Read-only view for reporting.
    pub fn snapshot(&self, now: DateTime<Utc>) -> StoreResult<Snapshot> {
        self.store.snapshot(now, &self.config)
    }
}

fn log_cycle(event: CycleEvent, session: Option<&LiveSession>, completed: Option<&CompletedSession>) {
    match event {
        CycleEvent::NoSession => debug!("No session active, start conditions not met"),
        CycleEvent::Started => {
            if let Some(s) = session {
                info!(battery = s.battery_start, "Session started");
            }
        }
        CycleEvent::Tracked | CycleEvent::Coasted => {
            if let Some(s) = session {
                debug!(
                    battery = s.last_battery,
                    accumulated = s.accumulated_seconds,
                    "Accrued time"
                );
            }
        }
        CycleEvent::Glitch => warn!("Discarded 0% reading as sensor noise"),
        CycleEvent::Stalled => debug!("No reading, within grace window"),
        CycleEvent::Degraded(status) => {
            let issue = session.and_then(|s| s.last_issue);
            info!(status = %status, issue = ?issue, "Session degraded");
        }
        CycleEvent::Ended(_) | CycleEvent::Restarted => {
            if let Some(c) = completed {
                info!(
                    session = c.session_num,
                    reason = %c.stop_reason,
                    duration = %c.formatted,
                    restarted = matches!(event, CycleEvent::Restarted),
                    "Session ended"
                );
            }
        }
    }
}
