//! Discharge statistics over the rolling sample log.
//!
//! Everything here is a pure function of a sample slice. Samples without a
//! battery value count toward totals but never enter rate math. Too little
//! data yields an explicit "no result" value, never an error.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::trend::{classify_trend, compare_rates, linear_slope, PairTrend, Trend};
use crate::{LiveSession, SampleRecord, TrackerConfig};

/// Windows shorter than this are too noisy to report a rate.
const MIN_WINDOW_SECONDS: i64 = 60;

/// Minimum battery-bearing samples for segment statistics.
pub const MIN_SEGMENT_SAMPLES: usize = 10;

/// Minimum accepted segments for segment statistics.
pub const MIN_SEGMENTS: usize = 3;

/// Segment rates at or below this (%/hr) are idle or charging.
const ACTIVE_RATE: f64 = 0.01;

/// Tracked hours required before a session estimate is shown.
const MIN_ESTIMATE_HOURS: f64 = 0.1;

// ============================================================================
// Windowed Rates
// ============================================================================

/// Lookback windows reported by default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StandardWindow {
    #[serde(rename = "15m")]
    FifteenMinutes,
    #[serde(rename = "1h")]
    OneHour,
    #[serde(rename = "3h")]
    ThreeHours,
    #[serde(rename = "12h")]
    TwelveHours,
    #[serde(rename = "48h")]
    FortyEightHours,
}

impl StandardWindow {
    pub const ALL: [StandardWindow; 5] = [
        Self::FifteenMinutes,
        Self::OneHour,
        Self::ThreeHours,
        Self::TwelveHours,
        Self::FortyEightHours,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Self::FifteenMinutes => "15m",
            Self::OneHour => "1h",
            Self::ThreeHours => "3h",
            Self::TwelveHours => "12h",
            Self::FortyEightHours => "48h",
        }
    }

    pub fn duration(&self) -> Duration {
        match self {
            Self::FifteenMinutes => Duration::minutes(15),
            Self::OneHour => Duration::hours(1),
            Self::ThreeHours => Duration::hours(3),
            Self::TwelveHours => Duration::hours(12),
            Self::FortyEightHours => Duration::hours(48),
        }
    }
}

/// Discharge over one lookback window.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WindowRate {
    /// Fewer than two readings, or they span a minute or less
    Insufficient { readings: usize },
    /// Battery did not fall across the window
    Stable { elapsed_hours: f64 },
    Discharging {
        /// %/hr
        rate: f64,
        hours_per_percent: f64,
        elapsed_hours: f64,
        drop: u8,
    },
}

impl WindowRate {
    /// Discharge rate in %/hr, if discharging.
    pub fn rate(&self) -> Option<f64> {
        match self {
            Self::Discharging { rate, .. } => Some(*rate),
            _ => None,
        }
    }
}

/// Battery-bearing samples as `(timestamp, battery)`, ascending by time.
fn readings(samples: &[SampleRecord]) -> Vec<(DateTime<Utc>, u8)> {
    let mut points: Vec<_> = samples.iter().filter_map(SampleRecord::reading).collect();
    points.sort_by_key(|(at, _)| *at);
    points
}

fn hours_between(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
    to.signed_duration_since(from).num_seconds() as f64 / 3600.0
}

/// Computes the discharge rate over `[now - window, now]`.
pub fn window_rate(samples: &[SampleRecord], window: Duration, now: DateTime<Utc>) -> WindowRate {
    let since = now - window;
    let points: Vec<_> = readings(samples)
        .into_iter()
        .filter(|(at, _)| *at >= since && *at <= now)
        .collect();

    let (Some(&(first_at, first)), Some(&(last_at, last))) = (points.first(), points.last()) else {
        return WindowRate::Insufficient { readings: 0 };
    };

    let elapsed = last_at.signed_duration_since(first_at).num_seconds();
    if points.len() < 2 || elapsed <= MIN_WINDOW_SECONDS {
        return WindowRate::Insufficient {
            readings: points.len(),
        };
    }

    let elapsed_hours = elapsed as f64 / 3600.0;
    if first > last {
        let drop = first - last;
        let rate = f64::from(drop) / elapsed_hours;
        WindowRate::Discharging {
            rate,
            hours_per_percent: 1.0 / rate,
            elapsed_hours,
            drop,
        }
    } else {
        WindowRate::Stable { elapsed_hours }
    }
}

// ============================================================================
// Segment Statistics
// ============================================================================

/// One accepted historical slice.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Segment {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    /// Points lost; negative while charging
    pub drop: i32,
    pub hours: f64,
    pub rate: f64,
}

/// Distribution of historical segment rates.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SegmentStats {
    pub segments: Vec<Segment>,
    /// Number of segments draining faster than the idle cutoff
    pub active_segments: usize,
    pub mean: f64,
    pub min: f64,
    pub max: f64,
    pub std_dev: f64,
    pub range: f64,
    /// (%/hr) per hour
    pub slope: f64,
    /// Mean of the newest segment rates
    pub recent_rate: f64,
}

/// Builds segment statistics from the full log.
///
/// `origin` anchors the regression x-axis, normally the session start; the
/// first reading is used when absent.
pub fn segment_stats(
    samples: &[SampleRecord],
    origin: Option<DateTime<Utc>>,
    config: &TrackerConfig,
) -> Option<SegmentStats> {
    let points = readings(samples);
    if points.len() < MIN_SEGMENT_SAMPLES {
        return None;
    }

    let segments = scan_segments(&points, config.segment_seconds() as f64);
    if segments.len() < MIN_SEGMENTS {
        return None;
    }

    let rates: Vec<f64> = segments.iter().map(|s| s.rate).collect();
    let active: Vec<&Segment> = segments.iter().filter(|s| s.rate > ACTIVE_RATE).collect();
    let basis: Vec<f64> = if active.len() >= MIN_SEGMENTS {
        active.iter().map(|s| s.rate).collect()
    } else {
        rates.clone()
    };

    let n = basis.len() as f64;
    let mean = basis.iter().sum::<f64>() / n;
    let min = basis.iter().copied().fold(f64::INFINITY, f64::min);
    let max = basis.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let variance = basis.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / n;

    let origin = origin.or_else(|| points.first().map(|(at, _)| *at));
    let slope = if let (true, Some(origin)) = (active.len() >= MIN_SEGMENTS, origin) {
        let xs: Vec<f64> = active.iter().map(|s| hours_between(origin, s.end)).collect();
        let ys: Vec<f64> = active.iter().map(|s| s.rate).collect();
        linear_slope(&xs, &ys)
    } else {
        0.0
    };

    let active_segments = active.len();
    let recent: Vec<f64> = rates.iter().rev().take(3).copied().collect();
    let recent_rate = recent.iter().sum::<f64>() / recent.len() as f64;

    Some(SegmentStats {
        segments,
        active_segments,
        mean,
        min,
        max,
        std_dev: variance.sqrt(),
        range: max - min,
        slope,
        recent_rate,
    })
}

/// Slides a window start across `points`, accepting slices whose length is
/// within [0.5, 1.2] of `target` seconds.
fn scan_segments(points: &[(DateTime<Utc>, u8)], target: f64) -> Vec<Segment> {
    let step = (points.len() / 50).max(1);
    let lookahead = target * 1.5;
    let mut segments = Vec::new();

    let candidates = points.len().saturating_sub(1);
    for (start, &(start_at, start_battery)) in points.iter().enumerate().take(candidates).step_by(step) {
        let mut end = None;
        for &(at, battery) in points.iter().skip(start + 1) {
            let elapsed = at.signed_duration_since(start_at).num_seconds() as f64;
            end = Some((at, battery, elapsed));
            if elapsed >= target || elapsed > lookahead {
                break;
            }
        }

        let Some((end_at, end_battery, elapsed)) = end else {
            continue;
        };
        if elapsed >= target * 0.5 && elapsed <= target * 1.2 {
            let hours = elapsed / 3600.0;
            let drop = i32::from(start_battery) - i32::from(end_battery);
            segments.push(Segment {
                start: start_at,
                end: end_at,
                drop,
                hours,
                rate: f64::from(drop) / hours,
            });
        }
    }

    segments
}

// ============================================================================
// Session Estimate
// ============================================================================

/// Projection from the live session's own average rate.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionEstimate {
    pub used_percent: u8,
    pub tracked_hours: f64,
    pub rate: f64,
    pub hours_per_percent: f64,
    /// Hours until the stop threshold at the session rate
    pub remaining_hours: f64,
    /// Projected hours from session start to the stop threshold
    pub total_life_hours: f64,
}

impl SessionEstimate {
    /// Returns `None` until the session has used battery for a few minutes.
    pub fn from_session(session: &LiveSession, config: &TrackerConfig) -> Option<Self> {
        let used = session.battery_start.checked_sub(session.last_battery)?;
        let hours = session.tracked_hours();
        if used == 0 || hours <= MIN_ESTIMATE_HOURS {
            return None;
        }

        let rate = f64::from(used) / hours;
        let hours_per_percent = hours / f64::from(used);
        let stop = config.stop_threshold;
        Some(Self {
            used_percent: used,
            tracked_hours: hours,
            rate,
            hours_per_percent,
            remaining_hours: f64::from(session.last_battery.saturating_sub(stop)) * hours_per_percent,
            total_life_hours: f64::from(session.battery_start.saturating_sub(stop))
                * hours_per_percent,
        })
    }

    /// Total life in days, once it spans at least one.
    pub fn total_life_days(&self) -> Option<f64> {
        (self.total_life_hours >= 24.0).then(|| self.total_life_hours / 24.0)
    }
}

// ============================================================================
// Discharge Report
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WindowReport {
    pub window: StandardWindow,
    pub rate: WindowRate,
}

/// Everything the reporting layer renders about discharge.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DischargeReport {
    pub generated_at: DateTime<Utc>,
    pub sample_count: usize,
    pub reading_count: usize,
    pub windows: Vec<WindowReport>,
    pub segments: Option<SegmentStats>,
    pub trend: Trend,
    /// Last hour against last three hours, when both are discharging
    pub hourly_trend: Option<PairTrend>,
    pub estimate: Option<SessionEstimate>,
}

impl DischargeReport {
    pub fn build(
        samples: &[SampleRecord],
        session: Option<&LiveSession>,
        now: DateTime<Utc>,
        config: &TrackerConfig,
    ) -> Self {
        let windows: Vec<WindowReport> = StandardWindow::ALL
            .iter()
            .map(|&window| WindowReport {
                window,
                rate: window_rate(samples, window.duration(), now),
            })
            .collect();

        let segments = segment_stats(samples, session.map(|s| s.started_at), config);
        let trend = segments
            .as_ref()
            .map(|s| classify_trend(s.slope, s.recent_rate, config.trend_slope_threshold))
            .unwrap_or_default();

        let rate_of = |w: StandardWindow| {
            windows
                .iter()
                .find(|r| r.window == w)
                .and_then(|r| r.rate.rate())
        };
        let hourly_trend = match (
            rate_of(StandardWindow::OneHour),
            rate_of(StandardWindow::ThreeHours),
        ) {
            (Some(current), Some(previous)) => {
                Some(compare_rates(current, previous, config.pair_tolerance))
            }
            _ => None,
        };

        Self {
            generated_at: now,
            sample_count: samples.len(),
            reading_count: samples.iter().filter(|s| s.battery.is_some()).count(),
            windows,
            segments,
            trend,
            hourly_trend,
            estimate: session.and_then(|s| SessionEstimate::from_session(s, config)),
        }
    }

    pub fn window(&self, window: StandardWindow) -> Option<&WindowRate> {
        self.windows
            .iter()
            .find(|r| r.window == window)
            .map(|r| &r.rate)
    }
}
