//! Decoding of files written before the schema was versioned.
//!
//! The first release stored the live session with free-form status strings
//! and a fixed keyboard address, and wrapped history in a `sessions` object.
//! These raw structures are normalized into the canonical core types.

use chrono::{DateTime, Utc};
use kbtrack_core::{format_hours_minutes, CompletedSession, LiveSession, SessionStatus, StopReason};
use serde::Deserialize;
use tracing::warn;

/// Raw legacy live session.
///
/// Every field except `startedAt` and `batteryStart` defaults so partially
/// written files still decode.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawLegacySession {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub keyboard_address: Option<String>,
    pub battery_start: i64,
    #[serde(default)]
    pub battery_previous: Option<i64>,
    #[serde(default)]
    pub battery_current: Option<i64>,
    #[serde(default)]
    pub connected: bool,
    #[serde(default)]
    pub accumulated_seconds: i64,
    pub started_at: DateTime<Utc>,
}

/// Raw legacy history wrapper.
#[derive(Debug, Clone, Deserialize)]
pub struct RawLegacyHistory {
    #[serde(default)]
    pub sessions: Vec<RawLegacyCompleted>,
}

/// Raw legacy completed session.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawLegacyCompleted {
    pub session_num: i64,
    pub started: DateTime<Utc>,
    pub ended: DateTime<Utc>,
    #[serde(default)]
    pub stop_reason: String,
    pub battery_start: i64,
    pub battery_end: i64,
    pub total_seconds: i64,
    #[serde(default)]
    pub lowest_battery: Option<i64>,
    #[serde(default)]
    pub sample_count: Option<i64>,
}

fn percent(value: i64) -> u8 {
    value.clamp(0, 100) as u8
}

impl RawLegacySession {
    /// Normalizes into a [`LiveSession`].
    ///
    /// The legacy file has no sample timestamp, so the first cycle after
    /// migration accrues nothing. A zero `batteryCurrent` was a failed read
    /// in that format and falls back to `batteryPrevious`.
    pub fn into_live_session(self) -> LiveSession {
        let start = percent(self.battery_start);
        let previous = self.battery_previous.map(percent).unwrap_or(start);
        let last = match self.battery_current.map(percent) {
            Some(current) if current > 0 => current,
            _ => previous,
        };

        let status = match SessionStatus::from_label(&self.status) {
            SessionStatus::Idle => SessionStatus::Tracking,
            other => other,
        };

        let mut session = LiveSession::start(start, self.started_at);
        session.status = status;
        session.device_address = self.keyboard_address.filter(|a| !a.is_empty());
        session.last_sample_at = None;
        session.last_connected_at = None;
        session.last_battery = last;
        session.lowest_battery = start.min(previous).min(last);
        session.accumulated_seconds = self.accumulated_seconds.max(0) as u64;
        session.is_connected = self.connected;
        session
    }
}

impl RawLegacyCompleted {
    /// Normalizes into a [`CompletedSession`].
    pub fn into_completed(self) -> CompletedSession {
        let stop_reason = StopReason::from_id(&self.stop_reason).unwrap_or_else(|| {
            warn!(
                session = self.session_num,
                reason = %self.stop_reason,
                "Unknown legacy stop reason, recording as manual reset"
            );
            StopReason::ManualReset
        });
        let battery_start = percent(self.battery_start);
        let battery_end = percent(self.battery_end);
        let total_seconds = self.total_seconds.max(0) as u64;

        CompletedSession {
            session_num: self.session_num.clamp(0, i64::from(u32::MAX)) as u32,
            started: self.started,
            ended: self.ended,
            stop_reason,
            battery_start,
            battery_end,
            total_seconds,
            formatted: format_hours_minutes(total_seconds),
            sample_count: self.sample_count.map(|c| c.max(0) as u64).unwrap_or(0),
            lowest_battery: self
                .lowest_battery
                .map(percent)
                .unwrap_or_else(|| battery_start.min(battery_end)),
        }
    }
}

impl RawLegacyHistory {
    pub fn into_sessions(self) -> Vec<CompletedSession> {
        self.sessions
            .into_iter()
            .map(RawLegacyCompleted::into_completed)
            .collect()
    }
}
