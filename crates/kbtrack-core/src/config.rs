//! Tracker thresholds and statistics tuning.

use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};

/// Battery level (%) at or above which a new session may start.
pub const DEFAULT_START_THRESHOLD: u8 = 85;

/// Battery level (%) at or below which a session ends as depleted.
pub const DEFAULT_STOP_THRESHOLD: u8 = 5;

/// Largest drop (points) tolerated across a pause before the session is closed.
pub const DEFAULT_OFFLINE_DROP_TOLERANCE: u8 = 5;

/// Cumulative gain (points) that counts as charging.
pub const DEFAULT_CHARGE_TOLERANCE: u8 = 7;

/// Minimum confidence for accruing time without a battery reading.
pub const DEFAULT_ACCRUAL_CONFIDENCE: f64 = 0.5;

/// Consecutive unavailable cycles tolerated before degrading status.
pub const DEFAULT_FAILURE_GRACE_CYCLES: u32 = 5;

/// Target length of a historical statistics segment.
pub const DEFAULT_SEGMENT_MINUTES: u32 = 60;

/// Slope (%/hr per hour) beyond which the trend is not stable.
pub const DEFAULT_TREND_SLOPE_THRESHOLD: f64 = 0.03;

/// Relative change below which two rates are considered flat.
pub const DEFAULT_PAIR_TOLERANCE: f64 = 0.15;

/// Thresholds driving the session state machine and statistics engine.
///
/// Every field has a default so partial TOML tables deserialize cleanly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    pub start_threshold: u8,
    pub stop_threshold: u8,
    pub offline_drop_tolerance: u8,
    pub charge_tolerance: u8,
    pub accrual_confidence_threshold: f64,
    pub failure_grace_cycles: u32,
    pub segment_minutes: u32,
    pub trend_slope_threshold: f64,
    pub pair_tolerance: f64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            start_threshold: DEFAULT_START_THRESHOLD,
            stop_threshold: DEFAULT_STOP_THRESHOLD,
            offline_drop_tolerance: DEFAULT_OFFLINE_DROP_TOLERANCE,
            charge_tolerance: DEFAULT_CHARGE_TOLERANCE,
            accrual_confidence_threshold: DEFAULT_ACCRUAL_CONFIDENCE,
            failure_grace_cycles: DEFAULT_FAILURE_GRACE_CYCLES,
            segment_minutes: DEFAULT_SEGMENT_MINUTES,
            trend_slope_threshold: DEFAULT_TREND_SLOPE_THRESHOLD,
            pair_tolerance: DEFAULT_PAIR_TOLERANCE,
        }
    }
}

impl TrackerConfig {
    /// Checks that thresholds are mutually consistent.
    pub fn validate(&self) -> DomainResult<()> {
        if self.start_threshold > 100 || self.start_threshold == 0 {
            return Err(invalid("start_threshold", self.start_threshold, "1-100"));
        }
        if self.stop_threshold >= self.start_threshold {
            return Err(invalid(
                "stop_threshold",
                self.stop_threshold,
                "below start_threshold",
            ));
        }
        if self.charge_tolerance == 0 {
            return Err(invalid("charge_tolerance", self.charge_tolerance, ">= 1"));
        }
        if !(0.0..=1.0).contains(&self.accrual_confidence_threshold) {
            return Err(invalid(
                "accrual_confidence_threshold",
                self.accrual_confidence_threshold,
                "0.0-1.0",
            ));
        }
        if self.segment_minutes == 0 {
            return Err(invalid("segment_minutes", self.segment_minutes, ">= 1"));
        }
        if self.trend_slope_threshold < 0.0 || !self.trend_slope_threshold.is_finite() {
            return Err(invalid(
                "trend_slope_threshold",
                self.trend_slope_threshold,
                "a non-negative number",
            ));
        }
        if self.pair_tolerance < 0.0 || !self.pair_tolerance.is_finite() {
            return Err(invalid(
                "pair_tolerance",
                self.pair_tolerance,
                "a non-negative number",
            ));
        }
        Ok(())
    }

    /// Segment target length in seconds.
    pub fn segment_seconds(&self) -> i64 {
        i64::from(self.segment_minutes) * 60
    }
}

fn invalid(field: &str, value: impl ToString, expected: &str) -> DomainError {
    DomainError::InvalidFieldValue {
        field: field.to_string(),
        value: value.to_string(),
        expected: expected.to_string(),
    }
}
