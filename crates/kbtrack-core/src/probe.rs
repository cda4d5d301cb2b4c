//! Probe results: what one physical read of the keyboard reports.
//!
//! The probe itself (Bluetooth stack, corroborating sources) lives outside
//! this crate. The state machine only ever sees a resolved [`ProbeResult`].

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use crate::error::{DomainError, DomainResult};

/// Evidence source that corroborated a connectivity judgment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalSource {
    /// Direct GATT battery characteristic read
    Primary,
    /// System Bluetooth registry reports the peripheral connected
    Secondary,
    /// Recent HID input activity from the keyboard
    Tertiary,
}

impl SignalSource {
    /// Returns the display label for this source.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Primary => "primary",
            Self::Secondary => "secondary",
            Self::Tertiary => "tertiary",
        }
    }
}

impl fmt::Display for SignalSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Classified reason a probe could not produce a battery reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ProbeIssue {
    /// Bluetooth permission denied to the process
    Unauthorized,
    /// Bluetooth radio switched off
    PoweredOff,
    /// Bluetooth stack unavailable or the probe could not run
    Unavailable,
    /// Connection did not complete within the timeout
    Timeout,
    /// Stack is healthy but the keyboard is not among connected peripherals
    PeripheralNotFound,
    /// Anything the probe could not classify
    #[serde(other)]
    Unknown,
}

impl ProbeIssue {
    /// Returns true for failures of the Bluetooth layer itself.
    ///
    /// A missing peripheral is not a hard failure: the keyboard is simply
    /// switched off or out of range.
    #[must_use]
    pub fn is_hard_failure(&self) -> bool {
        !matches!(self, Self::PeripheralNotFound)
    }

    /// Returns a human-readable description.
    pub fn description(&self) -> &'static str {
        match self {
            Self::Unauthorized => "Bluetooth access not authorized",
            Self::PoweredOff => "Bluetooth is powered off",
            Self::Unavailable => "Bluetooth unavailable",
            Self::Timeout => "connection timed out",
            Self::PeripheralNotFound => "keyboard not found",
            Self::Unknown => "unknown error",
        }
    }
}

impl fmt::Display for ProbeIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

/// Connectivity judgment accompanying every probe result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectivityAssessment {
    pub is_connected: bool,
    /// Confidence in [0, 1]
    pub confidence: f64,
    #[serde(default)]
    pub sources: BTreeSet<SignalSource>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issue: Option<ProbeIssue>,
}

impl ConnectivityAssessment {
    /// A confirmed connection backed by a direct read.
    pub fn connected() -> Self {
        Self {
            is_connected: true,
            confidence: 1.0,
            sources: BTreeSet::from([SignalSource::Primary]),
            issue: None,
        }
    }

    /// A failed probe with no corroborating evidence.
    pub fn failed(issue: ProbeIssue) -> Self {
        Self {
            is_connected: false,
            confidence: 0.0,
            sources: BTreeSet::new(),
            issue: Some(issue),
        }
    }

    /// Builds an assessment, clamping confidence into [0, 1].
    pub fn new(
        is_connected: bool,
        confidence: f64,
        sources: impl IntoIterator<Item = SignalSource>,
        issue: Option<ProbeIssue>,
    ) -> Self {
        let confidence = if confidence.is_finite() {
            confidence.clamp(0.0, 1.0)
        } else {
            0.0
        };
        Self {
            is_connected,
            confidence,
            sources: sources.into_iter().collect(),
            issue,
        }
    }
}

impl Default for ConnectivityAssessment {
    fn default() -> Self {
        Self::failed(ProbeIssue::Unknown)
    }
}

/// Output of one probe invocation.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProbeResult {
    /// Battery percentage (0-100), absent when no read succeeded
    pub battery: Option<u8>,
    pub connectivity: ConnectivityAssessment,
}

impl ProbeResult {
    /// A successful direct read.
    pub fn reading(battery: u8) -> Self {
        Self {
            battery: Some(battery.min(100)),
            connectivity: ConnectivityAssessment::connected(),
        }
    }

    /// No reading, only a connectivity judgment.
    pub fn unavailable(connectivity: ConnectivityAssessment) -> Self {
        Self {
            battery: None,
            connectivity,
        }
    }

    /// Builds a result from an untrusted integer percentage.
    pub fn with_battery(battery: i64, connectivity: ConnectivityAssessment) -> DomainResult<Self> {
        let battery =
            u8::try_from(battery).map_err(|_| DomainError::InvalidBattery { value: battery })?;
        if battery > 100 {
            return Err(DomainError::InvalidBattery {
                value: i64::from(battery),
            });
        }
        Ok(Self {
            battery: Some(battery),
            connectivity,
        })
    }
}
