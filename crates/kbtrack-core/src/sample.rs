//! Sample records: one entry per daemon cycle in the rolling log.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::{ProbeIssue, ProbeResult, SessionStatus, SignalSource};

/// A single captured reading.
///
/// `battery` is absent when the probe had no reading or the reading was
/// rejected as noise. `elapsed_seconds` is the time accrued this cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SampleRecord {
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub battery: Option<u8>,
    pub connected: bool,
    pub confidence: f64,
    #[serde(default)]
    pub elapsed_seconds: u64,
    #[serde(default)]
    pub sources: BTreeSet<SignalSource>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issue: Option<ProbeIssue>,
    pub status: SessionStatus,
}

impl SampleRecord {
    /// Captures a probe result.
    pub fn capture(
        timestamp: DateTime<Utc>,
        probe: &ProbeResult,
        battery: Option<u8>,
        elapsed_seconds: u64,
        status: SessionStatus,
    ) -> Self {
        Self {
            timestamp,
            battery,
            connected: probe.connectivity.is_connected,
            confidence: probe.connectivity.confidence,
            elapsed_seconds,
            sources: probe.connectivity.sources.clone(),
            issue: probe.connectivity.issue,
            status,
        }
    }

    /// Returns `(timestamp, battery)` when the sample carries a reading.
    pub fn reading(&self) -> Option<(DateTime<Utc>, u8)> {
        self.battery.map(|b| (self.timestamp, b))
    }
}
