//! Trend detection over discharge rates.

use serde::Serialize;
use std::fmt;

/// Below this the rate or variance is treated as zero.
const EPSILON: f64 = 1e-9;

/// Average discharge (%/hr) under which any slope is reported as stable.
pub const NEGLIGIBLE_RATE: f64 = 0.05;

/// Ordinary least-squares slope of `ys` against `xs`.
///
/// Returns 0.0 for fewer than two points, mismatched lengths or a
/// degenerate x-axis.
pub fn linear_slope(xs: &[f64], ys: &[f64]) -> f64 {
    if xs.len() < 2 || xs.len() != ys.len() {
        return 0.0;
    }

    let n = xs.len() as f64;
    let mean_x = xs.iter().sum::<f64>() / n;
    let mean_y = ys.iter().sum::<f64>() / n;

    let mut covariance = 0.0;
    let mut variance = 0.0;
    for (x, y) in xs.iter().zip(ys) {
        let dx = x - mean_x;
        covariance += dx * (y - mean_y);
        variance += dx * dx;
    }

    if variance.abs() < EPSILON {
        0.0
    } else {
        covariance / variance
    }
}

/// Direction the discharge rate is moving over the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    /// Draining faster over time
    Increasing,
    /// Draining slower over time
    Decreasing,
    #[default]
    Stable,
}

impl Trend {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Increasing => "increasing",
            Self::Decreasing => "decreasing",
            Self::Stable => "stable",
        }
    }

    pub fn icon(&self) -> &'static str {
        match self {
            Self::Increasing => "↑",
            Self::Decreasing => "↓",
            Self::Stable => "→",
        }
    }
}

impl fmt::Display for Trend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Classifies a regression slope, ignoring it when the recent rate is negligible.
pub fn classify_trend(slope: f64, recent_rate: f64, threshold: f64) -> Trend {
    if recent_rate < NEGLIGIBLE_RATE || slope.abs() <= threshold {
        Trend::Stable
    } else if slope > threshold {
        Trend::Increasing
    } else {
        Trend::Decreasing
    }
}

/// Coarse comparison of two rates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PairTrend {
    Up,
    Down,
    Flat,
}

impl PairTrend {
    pub fn icon(&self) -> &'static str {
        match self {
            Self::Up => "↑",
            Self::Down => "↓",
            Self::Flat => "→",
        }
    }
}

/// Compares `current` against `previous` by relative change.
///
/// `tolerance` is a fraction: 0.15 means changes within 15% are flat.
pub fn compare_rates(current: f64, previous: f64, tolerance: f64) -> PairTrend {
    if previous.abs() < EPSILON {
        return if current.abs() < EPSILON {
            PairTrend::Flat
        } else if current > 0.0 {
            PairTrend::Up
        } else {
            PairTrend::Down
        };
    }

    let change = (current - previous) / previous.abs();
    if change.abs() <= tolerance {
        PairTrend::Flat
    } else if change > 0.0 {
        PairTrend::Up
    } else {
        PairTrend::Down
    }
}
