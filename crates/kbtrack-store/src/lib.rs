//! kbtrack Store - Durable state for the tracker
//!
//! Three files live in the data directory: the live session
//! (`current.json`), the rolling sample log (`samples.jsonl`) and the
//! completed-session archive (`sessions.json`). Every write replaces the
//! target atomically, and callers hold [`DataLock`] across a full
//! load-decide-write cycle.

pub mod atomic;
pub mod error;
pub mod history;
pub mod legacy;
pub mod live;
pub mod lock;
pub mod samples;
pub mod schema;

use chrono::{DateTime, Utc};
use kbtrack_core::{
    CompletedSession, DischargeReport, Finalization, LiveSession, SampleRecord, TrackerConfig,
};
use std::path::{Path, PathBuf};
use tracing::warn;

pub use error::{StoreError, StoreResult};
pub use history::{Archived, HistoryArchive};
pub use live::LiveSessionStore;
pub use lock::DataLock;
pub use samples::{SampleLog, DEFAULT_RETENTION};
pub use schema::SchemaVersion;

// ============================================================================
// Data Directory Layout
// ============================================================================

/// Paths of every file kbtrack keeps in its data directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataDir {
    root: PathBuf,
}

impl DataDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn current(&self) -> PathBuf {
        self.root.join("current.json")
    }

    pub fn samples(&self) -> PathBuf {
        self.root.join("samples.jsonl")
    }

    pub fn history(&self) -> PathBuf {
        self.root.join("sessions.json")
    }

    pub fn lock(&self) -> PathBuf {
        self.root.join("kbtrack.lock")
    }

    pub fn pid_file(&self) -> PathBuf {
        self.root.join("kbtrackd.pid")
    }

    pub fn log_file(&self) -> PathBuf {
        self.root.join("daemon.log")
    }

    /// Creates the directory if needed.
    pub fn ensure(&self) -> StoreResult<()> {
        std::fs::create_dir_all(&self.root).map_err(|e| StoreError::io(&self.root, e))
    }
}

// ============================================================================
// Store
// ============================================================================

/// All persisted tracker state behind one handle.
#[derive(Debug, Clone)]
pub struct Store {
    dir: DataDir,
    pub live: LiveSessionStore,
    pub samples: SampleLog,
    pub history: HistoryArchive,
}

impl Store {
    pub fn open(dir: DataDir, sample_retention: usize) -> Self {
        Self {
            live: LiveSessionStore::new(dir.current()),
            samples: SampleLog::new(dir.samples(), sample_retention),
            history: HistoryArchive::new(dir.history()),
            dir,
        }
    }

    pub fn dir(&self) -> &DataDir {
        &self.dir
    }

    /// Blocks until this process owns the data directory.
    pub fn lock(&self) -> StoreResult<DataLock> {
        self.dir.ensure()?;
        DataLock::acquire(&self.dir.lock())
    }

    /// Loads the live session, completing any interrupted finalization.
    ///
    /// If the session on disk was already archived the previous run died
    /// between the archive write and the live-file delete; the delete is
    /// finished here and no session is returned.
    pub fn load_live(&self) -> StoreResult<Option<LiveSession>> {
        let Some(session) = self.live.load()? else {
            return Ok(None);
        };

        let history = self.history.load()?;
        if let Some(done) = HistoryArchive::find_started(&history, session.started_at) {
            warn!(
                session = done.session_num,
                "Live session already archived, removing leftover file"
            );
            self.live.clear()?;
            return Ok(None);
        }
        Ok(Some(session))
    }

    /// Read-only view of everything on disk plus computed statistics.
    ///
    /// Takes no lock; each file is replaced atomically so every read sees a
    /// complete version.
    pub fn snapshot(&self, now: DateTime<Utc>, config: &TrackerConfig) -> StoreResult<Snapshot> {
        let history = self.history.load()?;
        let live = self
            .live
            .load()?
            .filter(|s| HistoryArchive::find_started(&history, s.started_at).is_none());
        let samples = self.samples.read_all()?;
        let report = DischargeReport::build(&samples, live.as_ref(), now, config);
        Ok(Snapshot {
            live,
            samples,
            history,
            report,
        })
    }

    /// Archives a terminated session, then hands the live file to `next`.
    ///
    /// A successor replaces the old file in one rename, so no crash point
    /// leaves the data directory without a live session when one was
    /// opened. Without a successor the file is removed.
    ///
    /// Safe to repeat: the archive skips sessions it already holds.
    pub fn finalize(
        &self,
        finalization: Finalization,
        next: Option<&LiveSession>,
    ) -> StoreResult<CompletedSession> {
        let archived = self.history.archive(finalization)?;
        self.live.store(next)?;
        Ok(archived.session)
    }
}

/// Everything the reporting layer reads.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub live: Option<LiveSession>,
    pub samples: Vec<SampleRecord>,
    pub history: Vec<CompletedSession>,
    pub report: DischargeReport,
}

impl Snapshot {
    /// Completed sessions, newest first.
    pub fn history_newest_first(&self) -> impl Iterator<Item = &CompletedSession> {
        self.history.iter().rev()
    }

    /// Most recent sample carrying a battery reading.
    pub fn last_reading(&self) -> Option<&SampleRecord> {
        self.samples.iter().rev().find(|s| s.battery.is_some())
    }
}
