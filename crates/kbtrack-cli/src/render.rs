//! Plain-text renderers for the `kbtrack` subcommands.

use chrono::{DateTime, Utc};
use kbtrack_core::{
    format_hours_minutes, CompletedSession, DischargeReport, LiveSession, SessionEstimate,
    TrackerConfig, WindowRate, WindowReport,
};
use kbtrack_store::Snapshot;
use serde::Serialize;

use crate::error::Result;

const RULE_WIDTH: usize = 60;

fn rule() -> String {
    "=".repeat(RULE_WIDTH)
}

fn timestamp(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%d %H:%M UTC").to_string()
}

fn hours_to_duration(hours: f64) -> String {
    format_hours_minutes((hours.max(0.0) * 3600.0).round() as u64)
}

fn window_line(window: &WindowReport) -> String {
    let detail = match &window.rate {
        WindowRate::Discharging {
            rate,
            hours_per_percent,
            drop,
            ..
        } => format!("{rate:.2}%/hr ({hours_per_percent:.1} h per 1%, -{drop}%)"),
        WindowRate::Stable { .. } => "stable".to_string(),
        WindowRate::Insufficient { .. } => "not enough data".to_string(),
    };
    format!("  {:<4} {detail}", window.window.label())
}

// ============================================================================
// status
// ============================================================================

/// Renders `kbtrack status`.
pub fn status(snapshot: &Snapshot, config: &TrackerConfig, now: DateTime<Utc>) -> String {
    let Some(session) = snapshot.live.as_ref() else {
        let mut lines = vec!["No active tracking session".to_string()];
        if let Some((at, battery)) = snapshot.last_reading().and_then(|s| s.reading()) {
            lines.push(format!("Last reading: {battery}% at {}", timestamp(at)));
        }
        return lines.join("\n") + "\n";
    };

    let mut lines = header(session);
    lines.push(String::new());
    lines.push("Current Status:".to_string());
    lines.push(format!(
        "  Status: {} {}",
        session.status.icon(),
        session.status
    ));
    lines.push(format!(
        "  Battery: {}% (started at {}%)",
        session.last_battery, session.battery_start
    ));
    lines.push(format!("  Used: {}%", session.used_percent()));
    lines.push(format!(
        "  Connected time: {}",
        format_hours_minutes(session.accumulated_seconds)
    ));
    lines.push(format!("  Started: {}", timestamp(session.started_at)));
    if let Some(last) = session.last_sample_at {
        let ago = session.seconds_since_last_sample(now);
        lines.push(format!(
            "  Last sample: {} ({} ago)",
            timestamp(last),
            format_hours_minutes(ago)
        ));
    }
    if let Some(issue) = session.last_issue {
        lines.push(format!("  Last issue: {issue}"));
    }

    lines.push(String::new());
    lines.push("Discharge Rate:".to_string());
    lines.extend(snapshot.report.windows.iter().map(window_line));

    lines.push(String::new());
    match &snapshot.report.estimate {
        Some(estimate) => lines.extend(estimate_lines(session, estimate, config)),
        None => lines.push(
            "Gathering data... (estimates available after some battery usage)".to_string(),
        ),
    }

    lines.join("\n") + "\n"
}

fn header(session: &LiveSession) -> Vec<String> {
    let name = match &session.device_address {
        Some(address) => format!("Keyboard {address}"),
        None => "Keyboard".to_string(),
    };
    let connection = if session.is_connected {
        "Connected ✓"
    } else {
        "Disconnected ✗"
    };
    vec![rule(), format!("{name}: {connection}"), rule()]
}

fn estimate_lines(
    session: &LiveSession,
    estimate: &SessionEstimate,
    config: &TrackerConfig,
) -> Vec<String> {
    let stop = config.stop_threshold;
    let mut lines = vec![
        "Session Rate:".to_string(),
        format!("  {:.2}% per hour", estimate.rate),
        format!("  {:.1} hours per 1%", estimate.hours_per_percent),
        String::new(),
        "Estimates:".to_string(),
        format!(
            "  Remaining: ~{} ({}% → {stop}%)",
            hours_to_duration(estimate.remaining_hours),
            session.last_battery
        ),
        format!(
            "  Total life: ~{} ({}% → {stop}%)",
            hours_to_duration(estimate.total_life_hours),
            session.battery_start
        ),
    ];
    if let Some(days) = estimate.total_life_days() {
        lines.push(format!("  (~{days:.1} days)"));
    }
    lines
}

// ============================================================================
// history
// ============================================================================

/// Renders `kbtrack history`, newest session first.
pub fn history(snapshot: &Snapshot) -> String {
    if snapshot.history.is_empty() {
        return "No completed sessions yet\n".to_string();
    }

    let mut lines = vec!["Completed Battery Cycles:".to_string(), rule()];
    for session in snapshot.history_newest_first() {
        lines.extend(session_lines(session));
        lines.push(String::new());
    }
    lines.join("\n")
}

fn session_lines(session: &CompletedSession) -> Vec<String> {
    let mut lines = vec![
        format!(
            "Session {}: {} → {}",
            session.session_num,
            session.started.format("%Y-%m-%d"),
            session.ended.format("%Y-%m-%d")
        ),
        format!("  Time: {}", session.formatted),
        format!(
            "  Battery: {}% → {}% ({}% used)",
            session.battery_start,
            session.battery_end,
            session.used_percent()
        ),
    ];
    if let Some(rate) = session.average_rate() {
        lines.push(format!("  Average: {rate:.2}%/hr"));
    }
    lines.push(format!("  Reason: {}", session.stop_reason));
    lines
}

// ============================================================================
// stats
// ============================================================================

/// Renders `kbtrack stats`.
pub fn stats(snapshot: &Snapshot) -> String {
    let report = &snapshot.report;
    let mut lines = vec![
        "Discharge Statistics".to_string(),
        rule(),
        format!(
            "Samples: {} ({} with battery)",
            report.sample_count, report.reading_count
        ),
        String::new(),
        "Windows:".to_string(),
    ];
    lines.extend(report.windows.iter().map(window_line));
    if let Some(pair) = report.hourly_trend {
        lines.push(format!("  Last hour vs 3h: {}", pair.icon()));
    }

    lines.push(String::new());
    match &report.segments {
        Some(segments) => {
            lines.push(format!(
                "Segments: {} ({} active)",
                segments.segments.len(),
                segments.active_segments
            ));
            lines.push(format!("  Mean: {:.2}%/hr", segments.mean));
            lines.push(format!(
                "  Min / Max: {:.2} / {:.2}%/hr",
                segments.min, segments.max
            ));
            lines.push(format!("  Std dev: {:.2}", segments.std_dev));
            lines.push(format!("  Range: {:.2}", segments.range));
            lines.push(format!("  Recent: {:.2}%/hr", segments.recent_rate));
            lines.push(format!("  Slope: {:+.3} %/hr per hour", segments.slope));
        }
        None => lines.push("Segments: not enough history yet".to_string()),
    }
    lines.push(format!("Trend: {} {}", report.trend.icon(), report.trend));

    lines.join("\n") + "\n"
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct JsonReport<'a> {
    live: Option<&'a LiveSession>,
    history: &'a [CompletedSession],
    report: &'a DischargeReport,
}

/// Renders `kbtrack stats --json`.
pub fn stats_json(snapshot: &Snapshot) -> Result<String> {
    let report = JsonReport {
        live: snapshot.live.as_ref(),
        history: &snapshot.history,
        report: &snapshot.report,
    };
    Ok(serde_json::to_string_pretty(&report)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use kbtrack_core::{ProbeIssue, SampleRecord, SessionStatus, StopReason};
    use std::collections::BTreeSet;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap()
    }

    fn sample(minutes_ago: i64, battery: u8) -> SampleRecord {
        SampleRecord {
            timestamp: now() - Duration::minutes(minutes_ago),
            battery: Some(battery),
            connected: true,
            confidence: 1.0,
            elapsed_seconds: 60,
            sources: BTreeSet::new(),
            issue: None,
            status: SessionStatus::Tracking,
        }
    }

    fn live_session() -> LiveSession {
        let mut session = LiveSession::start(80, now() - Duration::hours(2));
        session.last_battery = 70;
        session.lowest_battery = 70;
        session.accumulated_seconds = 7200;
        session.last_sample_at = Some(now());
        session
    }

    fn snapshot(live: Option<LiveSession>, samples: Vec<SampleRecord>) -> Snapshot {
        let config = TrackerConfig::default();
        let report = DischargeReport::build(&samples, live.as_ref(), now(), &config);
        Snapshot {
            live,
            samples,
            history: Vec::new(),
            report,
        }
    }

    fn completed(num: u32, day: u32, reason: StopReason) -> CompletedSession {
        CompletedSession {
            session_num: num,
            started: Utc.with_ymd_and_hms(2025, 2, day, 8, 0, 0).unwrap(),
            ended: Utc.with_ymd_and_hms(2025, 2, day + 1, 8, 0, 0).unwrap(),
            stop_reason: reason,
            battery_start: 90,
            battery_end: 5,
            total_seconds: 36_000,
            formatted: "10h 0m".to_string(),
            sample_count: 600,
            lowest_battery: 5,
        }
    }

    #[test]
    fn test_status_without_session() {
        let text = status(&snapshot(None, Vec::new()), &TrackerConfig::default(), now());
        assert_eq!(text, "No active tracking session\n");
    }

    #[test]
    fn test_status_without_session_shows_last_reading() {
        let text = status(
            &snapshot(None, vec![sample(5, 42)]),
            &TrackerConfig::default(),
            now(),
        );
        assert!(text.contains("No active tracking session"));
        assert!(text.contains("Last reading: 42% at 2025-03-01 11:55 UTC"));
    }

    #[test]
    fn test_status_with_estimates() {
        let snap = snapshot(Some(live_session()), vec![sample(60, 80), sample(0, 70)]);
        let text = status(&snap, &TrackerConfig::default(), now());

        assert!(text.contains("Keyboard: Connected ✓"));
        assert!(text.contains("  Status: > Tracking"));
        assert!(text.contains("  Battery: 70% (started at 80%)"));
        assert!(text.contains("  Used: 10%"));
        assert!(text.contains("  Connected time: 2h 0m"));
        assert!(text.contains("  Started: 2025-03-01 10:00 UTC"));
        assert!(text.contains("  15m  not enough data"));
        assert!(text.contains("  1h   10.00%/hr (0.1 h per 1%, -10%)"));
        assert!(text.contains("  5.00% per hour"));
        assert!(text.contains("  0.2 hours per 1%"));
        assert!(text.contains("  Remaining: ~13h 0m (70% → 5%)"));
        assert!(text.contains("  Total life: ~15h 0m (80% → 5%)"));
        assert!(!text.contains("days"));
        assert!(!text.contains("Gathering data"));
    }

    #[test]
    fn test_status_gathering_data() {
        let mut session = live_session();
        session.last_battery = 80;
        session.accumulated_seconds = 120;
        let text = status(
            &snapshot(Some(session), Vec::new()),
            &TrackerConfig::default(),
            now(),
        );
        assert!(text.contains("Gathering data..."));
        assert!(!text.contains("Estimates:"));
    }

    #[test]
    fn test_status_degraded_session() {
        let mut session = live_session();
        session.status = SessionStatus::Paused;
        session.is_connected = false;
        session.last_issue = Some(ProbeIssue::PeripheralNotFound);
        session.device_address = Some("FC:00:72:C2:AC:AF".to_string());
        session.last_sample_at = Some(now() - Duration::minutes(90));

        let text = status(
            &snapshot(Some(session), Vec::new()),
            &TrackerConfig::default(),
            now(),
        );
        assert!(text.contains("Keyboard FC:00:72:C2:AC:AF: Disconnected ✗"));
        assert!(text.contains("  Status: = Paused"));
        assert!(text.contains("  Last issue: keyboard not found"));
        assert!(text.contains("(1h 30m ago)"));
    }

    #[test]
    fn test_status_shows_days_for_long_life() {
        let mut session = live_session();
        session.battery_start = 90;
        session.last_battery = 80;
        session.accumulated_seconds = 10 * 3600;
        let text = status(
            &snapshot(Some(session), Vec::new()),
            &TrackerConfig::default(),
            now(),
        );
        // 1 h per 1%, 85 points to the stop threshold
        assert!(text.contains("  Total life: ~85h 0m (90% → 5%)"));
        assert!(text.contains("  (~3.5 days)"));
    }

    #[test]
    fn test_history_empty() {
        assert_eq!(history(&snapshot(None, Vec::new())), "No completed sessions yet\n");
    }

    #[test]
    fn test_history_newest_first() {
        let mut snap = snapshot(None, Vec::new());
        snap.history = vec![
            completed(1, 10, StopReason::BatteryDepleted),
            completed(2, 20, StopReason::ChargingDetected),
        ];
        let text = history(&snap);

        let second = text.find("Session 2: 2025-02-20 → 2025-02-21").unwrap();
        let first = text.find("Session 1: 2025-02-10 → 2025-02-11").unwrap();
        assert!(second < first);
        assert!(text.contains("  Time: 10h 0m"));
        assert!(text.contains("  Battery: 90% → 5% (85% used)"));
        assert!(text.contains("  Average: 8.50%/hr"));
        assert!(text.contains("  Reason: charging_detected"));
        assert!(text.contains("  Reason: battery_depleted"));
    }

    #[test]
    fn test_history_skips_average_without_drain() {
        let mut session = completed(1, 10, StopReason::ManualReset);
        session.battery_end = 90;
        let mut snap = snapshot(None, Vec::new());
        snap.history = vec![session];
        let text = history(&snap);
        assert!(text.contains("(0% used)"));
        assert!(!text.contains("Average"));
    }

    #[test]
    fn test_stats_without_history() {
        let text = stats(&snapshot(None, vec![sample(0, 70)]));
        assert!(text.contains("Samples: 1 (1 with battery)"));
        assert!(text.contains("Segments: not enough history yet"));
        assert!(text.contains("Trend: → stable"));
    }

    #[test]
    fn test_stats_with_segments() {
        // One point per 6 minutes over 6 hours, losing 1% each time.
        let samples: Vec<SampleRecord> = (0..=60u8)
            .map(|i| sample(360 - i64::from(i) * 6, 90 - i))
            .collect();
        let snap = snapshot(None, samples);
        let text = stats(&snap);

        assert!(snap.report.segments.is_some());
        assert!(text.contains("Samples: 61 (61 with battery)"));
        assert!(text.contains("Segments: "));
        assert!(text.contains("  Mean: 10.00%/hr"));
        assert!(text.contains("  1h   10.00%/hr"));
        assert!(text.contains("  Last hour vs 3h: →"));
        assert!(text.contains("Trend: → stable"));
    }

    #[test]
    fn test_stats_json() {
        let snap = snapshot(Some(live_session()), vec![sample(60, 80), sample(0, 70)]);
        let json = stats_json(&snap).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(value["live"]["batteryStart"], 80);
        assert_eq!(value["history"], serde_json::json!([]));
        assert_eq!(value["report"]["readingCount"], 2);
        assert_eq!(value["report"]["windows"][1]["rate"]["kind"], "discharging");
    }
}
