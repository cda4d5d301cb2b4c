//! The live session file (`current.json`).

use kbtrack_core::LiveSession;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::atomic::{read_optional, remove_if_exists, write_atomic_with};
use crate::error::{StoreError, StoreResult};
use crate::legacy::RawLegacySession;
use crate::schema::SchemaVersion;

/// Versioned envelope written to disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LiveSessionFile {
    schema_version: SchemaVersion,
    #[serde(flatten)]
    session: LiveSession,
}

/// Stored schema version only, to check compatibility before a full decode.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VersionProbe {
    schema_version: Option<SchemaVersion>,
}

/// Reads and writes the single live session record.
#[derive(Debug, Clone)]
pub struct LiveSessionStore {
    path: PathBuf,
}

impl LiveSessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the live session.
    ///
    /// Missing or undecodable files load as `None`. A file stamped with an
    /// incompatible schema is an error so it is never silently overwritten.
    pub fn load(&self) -> StoreResult<Option<LiveSession>> {
        let Some(bytes) = read_optional(&self.path)? else {
            return Ok(None);
        };
        decode(&self.path, &bytes)
    }

    /// Persists `session` atomically.
    pub fn save(&self, session: &LiveSession) -> StoreResult<()> {
        let file = LiveSessionFile {
            schema_version: SchemaVersion::CURRENT,
            session: session.clone(),
        };
        write_atomic_with(&self.path, |out| {
            serde_json::to_writer_pretty(out, &file)?;
            Ok(())
        })
    }

    /// Deletes the live session file; a missing file is not an error.
    pub fn clear(&self) -> StoreResult<()> {
        remove_if_exists(&self.path)
    }

    /// Persists `Some` and deletes on `None`.
    pub fn store(&self, session: Option<&LiveSession>) -> StoreResult<()> {
        match session {
            Some(session) => self.save(session),
            None => self.clear(),
        }
    }
}

fn decode(path: &Path, bytes: &[u8]) -> StoreResult<Option<LiveSession>> {
    let version = match serde_json::from_slice::<VersionProbe>(bytes) {
        Ok(probe) => probe.schema_version,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Corrupt live session file, ignoring");
            return Ok(None);
        }
    };

    match version {
        Some(found) if !found.is_compatible_with(&SchemaVersion::CURRENT) => {
            Err(StoreError::IncompatibleSchema {
                path: path.to_path_buf(),
                found,
                expected: SchemaVersion::CURRENT,
            })
        }
        Some(found) => {
            if found.is_newer_than(&SchemaVersion::CURRENT) {
                debug!(path = %path.display(), version = %found, "Reading newer minor schema");
            }
            decode_current(path, bytes)
        }
        None => match serde_json::from_slice::<RawLegacySession>(bytes) {
            Ok(raw) => {
                debug!(path = %path.display(), "Migrating legacy live session");
                Ok(Some(raw.into_live_session()))
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Unrecognized live session format, ignoring");
                Ok(None)
            }
        },
    }
}

fn decode_current(path: &Path, bytes: &[u8]) -> StoreResult<Option<LiveSession>> {
    match serde_json::from_slice::<LiveSessionFile>(bytes) {
        Ok(file) => Ok(Some(file.session)),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Undecodable live session, ignoring");
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use kbtrack_core::{ProbeIssue, SessionStatus};
    use std::fs;
    use tempfile::TempDir;

    fn store(dir: &TempDir) -> LiveSessionStore {
        LiveSessionStore::new(dir.path().join("current.json"))
    }

    fn session() -> LiveSession {
        let mut session =
            LiveSession::start(91, Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap());
        session.status = SessionStatus::Blocked;
        session.last_issue = Some(ProbeIssue::PoweredOff);
        session.accumulated_seconds = 1800;
        session
    }

    #[test]
    fn test_missing_file_is_none() {
        let dir = TempDir::new().unwrap();
        assert!(store(&dir).load().unwrap().is_none());
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        store.save(&session()).unwrap();

        let raw = fs::read_to_string(store.path()).unwrap();
        assert!(raw.contains("\"schemaVersion\": \"2.0\""));
        assert!(raw.contains("\"lastIssue\": \"poweredOff\""));
        assert_eq!(store.load().unwrap(), Some(session()));
    }

    #[test]
    fn test_store_none_deletes() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        store.save(&session()).unwrap();
        store.store(None).unwrap();
        assert!(!store.path().exists());
        store.store(None).unwrap();
    }

    #[test]
    fn test_corrupt_file_is_none() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        fs::write(store.path(), "{\"status\": \"track").unwrap();
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn test_newer_major_schema_is_rejected() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        fs::write(store.path(), r#"{"schemaVersion": "3.0", "whatever": true}"#).unwrap();
        let err = store.load().unwrap_err();
        assert!(matches!(err, StoreError::IncompatibleSchema { .. }));
    }

    #[test]
    fn test_legacy_file_migrates() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        fs::write(
            store.path(),
            r#"{"status":"tracking","keyboardAddress":"FC:00:72:C2:AC:AF","batteryStart":88,
               "batteryPrevious":80,"batteryCurrent":80,"connected":true,
               "accumulatedSeconds":7200,"startedAt":"2025-01-10T08:00:00Z"}"#,
        )
        .unwrap();

        let session = store.load().unwrap().unwrap();
        assert_eq!(session.battery_start, 88);
        assert_eq!(session.last_battery, 80);
        assert_eq!(session.accumulated_seconds, 7200);

        store.save(&session).unwrap();
        assert_eq!(store.load().unwrap(), Some(session));
    }
}
