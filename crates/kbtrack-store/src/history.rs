//! Completed-session archive (`sessions.json`).

use chrono::{DateTime, Utc};
use kbtrack_core::{CompletedSession, Finalization};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::atomic::{read_optional, write_atomic_with};
use crate::error::{StoreError, StoreResult};
use crate::legacy::RawLegacyHistory;

/// Result of archiving a finalization.
#[derive(Debug, Clone, PartialEq)]
pub struct Archived {
    pub session: CompletedSession,
    /// False when the session was already present from an earlier attempt
    pub appended: bool,
}

/// Append-only list of completed sessions, rewritten wholesale.
#[derive(Debug, Clone)]
pub struct HistoryArchive {
    path: PathBuf,
}

impl HistoryArchive {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads all completed sessions in archive order.
    ///
    /// Accepts the current array form and the legacy `{"sessions": [...]}`
    /// wrapper. Missing or corrupt files load as empty.
    pub fn load(&self) -> StoreResult<Vec<CompletedSession>> {
        Ok(self.read()?.unwrap_or_default())
    }

    /// `Ok(None)` means the file exists but could not be decoded.
    fn read(&self) -> StoreResult<Option<Vec<CompletedSession>>> {
        let Some(bytes) = read_optional(&self.path)? else {
            return Ok(Some(Vec::new()));
        };

        if let Ok(sessions) = serde_json::from_slice::<Vec<CompletedSession>>(&bytes) {
            return Ok(Some(sessions));
        }
        match serde_json::from_slice::<RawLegacyHistory>(&bytes) {
            Ok(legacy) => Ok(Some(legacy.into_sessions())),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Corrupt history file, treating as empty");
                Ok(None)
            }
        }
    }

    /// Next sequential session number.
    pub fn next_number(sessions: &[CompletedSession]) -> u32 {
        sessions
            .iter()
            .map(|s| s.session_num)
            .max()
            .map_or(1, |max| max.saturating_add(1))
    }

    /// Returns the archived session that started at `started`, if any.
    pub fn find_started(
        sessions: &[CompletedSession],
        started: DateTime<Utc>,
    ) -> Option<&CompletedSession> {
        sessions.iter().find(|s| s.started == started)
    }

    /// Appends the finalized session unless it is already archived.
    pub fn archive(&self, finalization: Finalization) -> StoreResult<Archived> {
        let mut sessions = match self.read()? {
            Some(sessions) => sessions,
            None => {
                self.preserve_corrupt()?;
                Vec::new()
            }
        };

        if let Some(existing) = Self::find_started(&sessions, finalization.session.started_at) {
            warn!(
                session = existing.session_num,
                "Session already archived, skipping duplicate"
            );
            return Ok(Archived {
                session: existing.clone(),
                appended: false,
            });
        }

        let completed = finalization.into_completed(Self::next_number(&sessions));
        info!(
            session = completed.session_num,
            reason = %completed.stop_reason,
            battery_start = completed.battery_start,
            battery_end = completed.battery_end,
            duration = %completed.formatted,
            "Session archived"
        );
        sessions.push(completed.clone());
        self.write(&sessions)?;

        Ok(Archived {
            session: completed,
            appended: true,
        })
    }

    /// Copies an undecodable archive aside before it is replaced.
    fn preserve_corrupt(&self) -> StoreResult<()> {
        let backup = self.path.with_extension("json.bak");
        fs::copy(&self.path, &backup).map_err(|e| StoreError::io(&backup, e))?;
        warn!(backup = %backup.display(), "Saved corrupt history before rewriting");
        Ok(())
    }

    fn write(&self, sessions: &[CompletedSession]) -> StoreResult<()> {
        write_atomic_with(&self.path, |out| {
            serde_json::to_writer_pretty(&mut *out, sessions)?;
            out.write_all(b"\n").map_err(|e| StoreError::io(&self.path, e))
        })
    }
}
