//! Session lifecycle state machine.
//!
//! [`advance`] is a pure transform: it takes the current live session (if
//! any), one probe result, the cycle timestamp and the thresholds, and
//! returns the next session, an optional finalization and the sample to
//! log. It performs no I/O so every transition is testable in isolation.
//!
//! ```text
//!            reading >= start
//!   (none) ───────────────────▶ Tracking ◀──────────────┐
//!                                 │   ▲                 │ reading, drop <= tolerance
//!          no reading, grace out  │   │ reading         │
//!                                 ▼   │                 │
//!                         Paused / Blocked ─────────────┘
//!                                 │
//!                                 │ reading, drop > tolerance
//!                                 ▼
//!                  finalize(offline_drop) + fresh session
//! ```

use chrono::{DateTime, Utc};
use std::cmp::Ordering;
use tracing::debug;

use crate::{
    Finalization, LiveSession, ProbeIssue, ProbeResult, SampleRecord, SessionStatus, StopReason,
    TrackerConfig,
};

/// What happened during one cycle, for logging and callers that branch on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleEvent {
    /// No session exists and none was started
    NoSession,
    /// A new session was opened
    Started,
    /// A reading was accepted and time accrued
    Tracked,
    /// A 0% reading was discarded as sensor noise
    Glitch,
    /// No reading, but connectivity was trusted and time accrued
    Coasted,
    /// No reading and no accrual, still within the grace window
    Stalled,
    /// Grace exhausted; the session moved to the given status
    Degraded(SessionStatus),
    /// The session ended
    Ended(StopReason),
    /// The session ended after an offline drop and a new one was opened
    Restarted,
}

/// Result of applying one probe result.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    /// Live session to persist; `None` means no session remains
    pub session: Option<LiveSession>,
    /// Session to archive, if one terminated
    pub finalized: Option<Finalization>,
    /// Sample to append to the log
    pub sample: Option<SampleRecord>,
    /// Seconds added to the accumulated total this cycle
    pub accrued_seconds: u64,
    pub event: CycleEvent,
}

impl Transition {
    /// Returns true if this cycle counted time toward the session.
    #[must_use]
    pub fn accrued(&self) -> bool {
        matches!(self.event, CycleEvent::Tracked | CycleEvent::Coasted)
            || (matches!(self.event, CycleEvent::Ended(_)) && self.accrued_seconds > 0)
    }
}

/// Applies one probe result to the current live session.
pub fn advance(
    current: Option<LiveSession>,
    probe: &ProbeResult,
    now: DateTime<Utc>,
    config: &TrackerConfig,
) -> Transition {
    let Some(session) = current else {
        return start_if_qualified(probe, now, config);
    };

    match probe.battery {
        Some(0) => discard_glitch(session, probe, now),
        Some(reading) => apply_reading(session, reading, probe, now, config),
        None => apply_missing(session, probe, now, config),
    }
}

/// Finalizes whatever session exists using its last known battery value.
///
/// Returns `None` when there is no session to reset.
pub fn reset(
    current: Option<LiveSession>,
    reason: StopReason,
    now: DateTime<Utc>,
) -> Option<Finalization> {
    current.map(|session| {
        let battery_end = session.last_battery;
        session.finish(reason, battery_end, now)
    })
}

fn start_if_qualified(
    probe: &ProbeResult,
    now: DateTime<Utc>,
    config: &TrackerConfig,
) -> Transition {
    match probe.battery {
        Some(reading) if reading > 0 && reading >= config.start_threshold => {
            debug!(battery = reading, "Opening session");
            let session = LiveSession::start(reading, now);
            let sample = SampleRecord::capture(now, probe, Some(reading), 0, session.status);
            Transition {
                session: Some(session),
                finalized: None,
                sample: Some(sample),
                accrued_seconds: 0,
                event: CycleEvent::Started,
            }
        }
        Some(reading) => {
            let battery = (reading > 0).then_some(reading);
            Transition {
                session: None,
                finalized: None,
                sample: Some(SampleRecord::capture(
                    now,
                    probe,
                    battery,
                    0,
                    SessionStatus::Idle,
                )),
                accrued_seconds: 0,
                event: CycleEvent::NoSession,
            }
        }
        None => Transition {
            session: None,
            finalized: None,
            sample: None,
            accrued_seconds: 0,
            event: CycleEvent::NoSession,
        },
    }
}

fn discard_glitch(mut session: LiveSession, probe: &ProbeResult, now: DateTime<Utc>) -> Transition {
    // A 0% read neither counts as a failure nor as depletion, and its
    // interval is dropped like any other unobserved stretch.
    session.consecutive_unavailable_samples = 0;
    session.last_sample_at = Some(now);
    let sample = SampleRecord::capture(now, probe, None, 0, session.status);
    Transition {
        session: Some(session),
        finalized: None,
        sample: Some(sample),
        accrued_seconds: 0,
        event: CycleEvent::Glitch,
    }
}

fn apply_reading(
    mut session: LiveSession,
    reading: u8,
    probe: &ProbeResult,
    now: DateTime<Utc>,
    config: &TrackerConfig,
) -> Transition {
    session.consecutive_unavailable_samples = 0;

    if session.status.is_degraded() {
        let drop = i32::from(session.last_battery) - i32::from(reading);
        if drop > i32::from(config.offline_drop_tolerance) {
            return close_after_offline_drop(session, reading, probe, now, config);
        }
        debug!(battery = reading, drop, "Keyboard reconnected");
        session.reset_charge_streak();
    }

    let delta = session.seconds_since_last_sample(now);
    session.accumulated_seconds = session.accumulated_seconds.saturating_add(delta);
    session.samples = session.samples.saturating_add(1);
    session.last_sample_at = Some(now);
    session.last_connected_at = Some(now);
    session.status = SessionStatus::Tracking;
    session.is_connected = true;
    session.last_issue = None;

    if reading <= config.stop_threshold {
        session.lowest_battery = session.lowest_battery.min(reading);
        session.last_battery = reading;
        return ended(session, StopReason::BatteryDepleted, reading, probe, now, delta);
    }

    match reading.cmp(&session.last_battery) {
        Ordering::Greater => {
            let gain = u32::from(reading - session.last_battery);
            session.pending_charge_gain = session.pending_charge_gain.saturating_add(gain);
            session.consecutive_increase_samples =
                session.consecutive_increase_samples.saturating_add(1);

            let tolerance = u32::from(config.charge_tolerance);
            let above_lowest = u32::from(reading.saturating_sub(session.lowest_battery));
            if session.pending_charge_gain >= tolerance
                && session.consecutive_increase_samples >= 2
                && above_lowest >= tolerance
            {
                session.last_battery = reading;
                return ended(session, StopReason::ChargingDetected, reading, probe, now, delta);
            }
        }
        Ordering::Less => {
            session.reset_charge_streak();
            session.lowest_battery = session.lowest_battery.min(reading);
        }
        Ordering::Equal => {
            session.consecutive_increase_samples = 0;
        }
    }

    session.last_battery = reading;
    let sample = SampleRecord::capture(now, probe, Some(reading), delta, session.status);
    Transition {
        session: Some(session),
        finalized: None,
        sample: Some(sample),
        accrued_seconds: delta,
        event: CycleEvent::Tracked,
    }
}

fn close_after_offline_drop(
    session: LiveSession,
    reading: u8,
    probe: &ProbeResult,
    now: DateTime<Utc>,
    config: &TrackerConfig,
) -> Transition {
    // Depletion outranks the offline drop when both apply.
    if reading <= config.stop_threshold {
        return ended(session, StopReason::BatteryDepleted, reading, probe, now, 0);
    }

    debug!(
        from = session.last_battery,
        to = reading,
        "Battery dropped while unobserved, closing session"
    );
    let device_address = session.device_address.clone();
    let finalized = session.finish(StopReason::OfflineDrop, reading, now);
    let mut fresh = LiveSession::start(reading, now);
    fresh.device_address = device_address;
    let sample = SampleRecord::capture(now, probe, Some(reading), 0, fresh.status);

    Transition {
        session: Some(fresh),
        finalized: Some(finalized),
        sample: Some(sample),
        accrued_seconds: 0,
        event: CycleEvent::Restarted,
    }
}

fn apply_missing(
    mut session: LiveSession,
    probe: &ProbeResult,
    now: DateTime<Utc>,
    config: &TrackerConfig,
) -> Transition {
    let connectivity = &probe.connectivity;
    session.consecutive_unavailable_samples =
        session.consecutive_unavailable_samples.saturating_add(1);
    session.is_connected = connectivity.is_connected;
    session.last_issue = connectivity.issue;

    let within_grace = session.consecutive_unavailable_samples <= config.failure_grace_cycles;
    let trusted = connectivity.confidence >= config.accrual_confidence_threshold;
    let delta = session.seconds_since_last_sample(now);
    // Unobserved time is never accrued by a later reading.
    session.last_sample_at = Some(now);

    if trusted && within_grace {
        session.accumulated_seconds = session.accumulated_seconds.saturating_add(delta);
        session.samples = session.samples.saturating_add(1);
        let sample = SampleRecord::capture(now, probe, None, delta, session.status);
        return Transition {
            session: Some(session),
            finalized: None,
            sample: Some(sample),
            accrued_seconds: delta,
            event: CycleEvent::Coasted,
        };
    }

    let event = if within_grace {
        CycleEvent::Stalled
    } else {
        session.status = match connectivity.issue {
            Some(ProbeIssue::PeripheralNotFound) => {
                session.last_connected_at = None;
                session.reset_charge_streak();
                SessionStatus::Paused
            }
            Some(issue) if issue.is_hard_failure() => SessionStatus::Blocked,
            _ => SessionStatus::Paused,
        };
        CycleEvent::Degraded(session.status)
    };

    let sample = SampleRecord::capture(now, probe, None, 0, session.status);
    Transition {
        session: Some(session),
        finalized: None,
        sample: Some(sample),
        accrued_seconds: 0,
        event,
    }
}

fn ended(
    session: LiveSession,
    reason: StopReason,
    battery_end: u8,
    probe: &ProbeResult,
    now: DateTime<Utc>,
    accrued_seconds: u64,
) -> Transition {
    debug!(reason = %reason, battery = battery_end, "Session ended");
    let sample = SampleRecord::capture(
        now,
        probe,
        Some(battery_end),
        accrued_seconds,
        SessionStatus::Idle,
    );
    Transition {
        session: None,
        finalized: Some(session.finish(reason, battery_end, now)),
        sample: Some(sample),
        accrued_seconds,
        event: CycleEvent::Ended(reason),
    }
}
