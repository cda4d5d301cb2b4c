//! kbtrack Core - Domain types, session state machine and discharge statistics
//!
//! This crate owns every decision kbtrack makes: when a battery session
//! starts, accrues, degrades and ends, and how the sample log is reduced
//! into discharge rates and trends. It performs no I/O; persistence lives
//! in `kbtrack-store` and probing in `kbtrackd`.
//!
//! All code follows the panic-free policy: no `.unwrap()`, `.expect()`,
//! `panic!()`, `unreachable!()`, `todo!()`, or direct indexing `[i]`.

pub mod config;
pub mod error;
pub mod machine;
pub mod probe;
pub mod sample;
pub mod session;
pub mod stats;
pub mod trend;

// Re-exports for convenience
pub use config::TrackerConfig;
pub use error::{DomainError, DomainResult};
pub use machine::{advance, reset, CycleEvent, Transition};
pub use probe::{ConnectivityAssessment, ProbeIssue, ProbeResult, SignalSource};
pub use sample::SampleRecord;
pub use session::{
    format_hours_minutes, CompletedSession, Finalization, LiveSession, SessionStatus, StopReason,
};
pub use stats::{
    segment_stats, window_rate, DischargeReport, Segment, SegmentStats, SessionEstimate,
    StandardWindow, WindowRate, WindowReport,
};
pub use trend::{classify_trend, compare_rates, linear_slope, PairTrend, Trend};
