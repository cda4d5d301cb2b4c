//! Session domain entities: the live session and its archived form.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::ProbeIssue;

// ============================================================================
// Session Status (4-State Model)
// ============================================================================

/// Operational status of the live session.
///
/// - **Idle**: no session; never persisted on its own
/// - **Tracking**: readings are arriving and time accrues
/// - **Paused**: the keyboard went away (off, out of range, low confidence)
/// - **Blocked**: the Bluetooth layer itself is failing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    #[default]
    Idle,
    Tracking,
    Paused,
    Blocked,
}

impl SessionStatus {
    /// Returns the display label for this status.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Tracking => "tracking",
            Self::Paused => "paused",
            Self::Blocked => "blocked",
        }
    }

    /// Returns the ASCII icon for this status.
    #[must_use]
    pub fn icon(&self) -> &'static str {
        match self {
            Self::Idle => "-",
            Self::Tracking => ">",
            Self::Paused => "=",
            Self::Blocked => "!",
        }
    }

    /// Returns true if the session is waiting to be resumed by a reading.
    #[must_use]
    pub fn is_degraded(&self) -> bool {
        matches!(self, Self::Paused | Self::Blocked)
    }

    /// Parses a legacy free-form status string.
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_lowercase().as_str() {
            "tracking" | "active" => Self::Tracking,
            "paused" | "disconnected" => Self::Paused,
            "blocked" => Self::Blocked,
            _ => Self::Idle,
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::Tracking => write!(f, "Tracking"),
            Self::Paused => write!(f, "Paused"),
            Self::Blocked => write!(f, "Blocked"),
        }
    }
}

// ============================================================================
// Stop Reason
// ============================================================================

/// Why a session ended. Immutable once chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    BatteryDepleted,
    ChargingDetected,
    OfflineDrop,
    ManualReset,
}

impl StopReason {
    /// Returns the persisted identifier.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BatteryDepleted => "battery_depleted",
            Self::ChargingDetected => "charging_detected",
            Self::OfflineDrop => "offline_drop",
            Self::ManualReset => "manual_reset",
        }
    }

    /// Parses a persisted identifier.
    pub fn from_id(id: &str) -> Option<Self> {
        match id {
            "battery_depleted" => Some(Self::BatteryDepleted),
            "charging_detected" => Some(Self::ChargingDetected),
            "offline_drop" => Some(Self::OfflineDrop),
            "manual_reset" => Some(Self::ManualReset),
            _ => None,
        }
    }
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// Live Session
// ============================================================================

/// The single in-progress charge cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveSession {
    pub status: SessionStatus,

    /// Bluetooth address of the tracked keyboard, when known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_address: Option<String>,

    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub last_sample_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_connected_at: Option<DateTime<Utc>>,

    pub battery_start: u8,
    pub last_battery: u8,
    pub lowest_battery: u8,

    /// Tracked (connected) time in seconds
    pub accumulated_seconds: u64,

    /// Accrual cycles counted toward this session
    #[serde(default)]
    pub samples: u64,

    #[serde(default)]
    pub pending_charge_gain: u32,
    #[serde(default)]
    pub consecutive_increase_samples: u32,
    #[serde(default)]
    pub consecutive_unavailable_samples: u32,

    #[serde(default)]
    pub is_connected: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_issue: Option<ProbeIssue>,
}

impl LiveSession {
    /// Opens a session at `battery`.
    pub fn start(battery: u8, now: DateTime<Utc>) -> Self {
        Self {
            status: SessionStatus::Tracking,
            device_address: None,
            started_at: now,
            last_sample_at: Some(now),
            last_connected_at: Some(now),
            battery_start: battery,
            last_battery: battery,
            lowest_battery: battery,
            accumulated_seconds: 0,
            samples: 0,
            pending_charge_gain: 0,
            consecutive_increase_samples: 0,
            consecutive_unavailable_samples: 0,
            is_connected: true,
            last_issue: None,
        }
    }

    /// Percentage points consumed since the session started.
    pub fn used_percent(&self) -> i32 {
        i32::from(self.battery_start) - i32::from(self.last_battery)
    }

    /// Tracked time in hours.
    pub fn tracked_hours(&self) -> f64 {
        self.accumulated_seconds as f64 / 3600.0
    }

    /// Whole seconds since the last recorded sample, clamped to zero.
    pub fn seconds_since_last_sample(&self, now: DateTime<Utc>) -> u64 {
        self.last_sample_at
            .map(|at| now.signed_duration_since(at).num_seconds().max(0) as u64)
            .unwrap_or(0)
    }

    /// Clears the charge-detection hysteresis.
    pub fn reset_charge_streak(&mut self) {
        self.pending_charge_gain = 0;
        self.consecutive_increase_samples = 0;
    }

    /// Closes the session, producing a record ready for the archive.
    pub fn finish(
        self,
        reason: StopReason,
        battery_end: u8,
        ended_at: DateTime<Utc>,
    ) -> Finalization {
        Finalization {
            session: self,
            reason,
            battery_end,
            ended_at,
        }
    }
}

// ============================================================================
// Finalization / Completed Session
// ============================================================================

/// A terminated live session that has not been numbered yet.
///
/// The history archive assigns the sequential number when it appends.
#[derive(Debug, Clone, PartialEq)]
pub struct Finalization {
    pub session: LiveSession,
    pub reason: StopReason,
    pub battery_end: u8,
    pub ended_at: DateTime<Utc>,
}

impl Finalization {
    /// Builds the immutable archive record.
    pub fn into_completed(self, session_num: u32) -> CompletedSession {
        let total_seconds = self.session.accumulated_seconds;
        CompletedSession {
            session_num,
            started: self.session.started_at,
            ended: self.ended_at,
            stop_reason: self.reason,
            battery_start: self.session.battery_start,
            battery_end: self.battery_end,
            total_seconds,
            formatted: format_hours_minutes(total_seconds),
            sample_count: self.session.samples,
            lowest_battery: self.session.lowest_battery.min(self.battery_end),
        }
    }
}

/// One archived charge cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletedSession {
    pub session_num: u32,
    pub started: DateTime<Utc>,
    pub ended: DateTime<Utc>,
    pub stop_reason: StopReason,
    pub battery_start: u8,
    pub battery_end: u8,
    pub total_seconds: u64,
    pub formatted: String,
    #[serde(default)]
    pub sample_count: u64,
    pub lowest_battery: u8,
}

impl CompletedSession {
    /// Percentage points consumed over the session.
    pub fn used_percent(&self) -> i32 {
        i32::from(self.battery_start) - i32::from(self.battery_end)
    }

    /// Average discharge in %/hr, when the session both drained and ran.
    pub fn average_rate(&self) -> Option<f64> {
        let hours = self.total_seconds as f64 / 3600.0;
        let used = self.used_percent();
        if used > 0 && hours > 0.0 {
            Some(f64::from(used) / hours)
        } else {
            None
        }
    }
}

/// Formats seconds as "Xh Ym".
pub fn format_hours_minutes(seconds: u64) -> String {
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    format!("{hours}h {minutes}m")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap()
    }

    #[test]
    fn test_status_display() {
        assert_eq!(format!("{}", SessionStatus::Tracking), "Tracking");
        assert_eq!(SessionStatus::Blocked.label(), "blocked");
    }

    #[test]
    fn test_status_from_legacy_label() {
        assert_eq!(SessionStatus::from_label("tracking"), SessionStatus::Tracking);
        assert_eq!(SessionStatus::from_label(" Paused "), SessionStatus::Paused);
        assert_eq!(SessionStatus::from_label("???"), SessionStatus::Idle);
    }

    #[test]
    fn test_status_degraded() {
        assert!(SessionStatus::Paused.is_degraded());
        assert!(SessionStatus::Blocked.is_degraded());
        assert!(!SessionStatus::Tracking.is_degraded());
    }

    #[test]
    fn test_stop_reason_serde() {
        let json = serde_json::to_string(&StopReason::OfflineDrop).unwrap();
        assert_eq!(json, "\"offline_drop\"");
        assert_eq!(
            StopReason::from_id("charging_detected"),
            Some(StopReason::ChargingDetected)
        );
        assert_eq!(StopReason::from_id("bogus"), None);
    }

    #[test]
    fn test_start_session() {
        let session = LiveSession::start(90, t0());
        assert_eq!(session.status, SessionStatus::Tracking);
        assert_eq!(session.battery_start, 90);
        assert_eq!(session.lowest_battery, 90);
        assert_eq!(session.accumulated_seconds, 0);
        assert_eq!(session.last_sample_at, Some(t0()));
    }

    #[test]
    fn test_seconds_since_last_sample_clamped() {
        let session = LiveSession::start(90, t0());
        assert_eq!(session.seconds_since_last_sample(t0() + Duration::seconds(61)), 61);
        assert_eq!(session.seconds_since_last_sample(t0() - Duration::seconds(30)), 0);
    }

    #[test]
    fn test_live_session_round_trip() {
        let mut session = LiveSession::start(88, t0());
        session.status = SessionStatus::Paused;
        session.last_issue = Some(ProbeIssue::PeripheralNotFound);
        session.accumulated_seconds = 4321;
        session.device_address = Some("FC:00:72:C2:AC:AF".to_string());
        let json = serde_json::to_string(&session).unwrap();
        let back: LiveSession = serde_json::from_str(&json).unwrap();
        assert_eq!(back, session);
    }

    #[test]
    fn test_completed_session_round_trip() {
        let mut session = LiveSession::start(95, t0());
        session.accumulated_seconds = 7260;
        session.samples = 121;
        session.lowest_battery = 40;
        let completed = session
            .finish(StopReason::ChargingDetected, 49, t0() + Duration::hours(3))
            .into_completed(4);
        assert_eq!(completed.formatted, "2h 1m");
        assert_eq!(completed.lowest_battery, 40);

        let json = serde_json::to_string(&completed).unwrap();
        assert!(json.contains("\"sessionNum\":4"));
        assert!(json.contains("\"stopReason\":\"charging_detected\""));
        let back: CompletedSession = serde_json::from_str(&json).unwrap();
        assert_eq!(back, completed);
    }

    #[test]
    fn test_completed_lowest_includes_end_value() {
        let session = LiveSession::start(90, t0());
        let completed = session
            .finish(StopReason::OfflineDrop, 70, t0())
            .into_completed(1);
        assert_eq!(completed.lowest_battery, 70);
    }

    #[test]
    fn test_average_rate() {
        let mut session = LiveSession::start(90, t0());
        session.accumulated_seconds = 36_000;
        let completed = session
            .finish(StopReason::BatteryDepleted, 40, t0())
            .into_completed(1);
        let rate = completed.average_rate().unwrap();
        assert!((rate - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_format_hours_minutes() {
        assert_eq!(format_hours_minutes(0), "0h 0m");
        assert_eq!(format_hours_minutes(240), "0h 4m");
        assert_eq!(format_hours_minutes(90_061), "25h 1m");
    }
}
