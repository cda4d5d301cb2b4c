//! Storage error types.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

use crate::schema::SchemaVersion;

/// Errors raised while persisting tracker state.
///
/// Load paths never produce these for missing or corrupt files; those
/// degrade to empty state. Only writes, locking and schema mismatches
/// surface to the caller.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Filesystem operation failed
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Value could not be encoded
    #[error("Serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),

    /// Temp file could not replace the target
    #[error("Failed to replace {}: {source}", path.display())]
    Persist {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Advisory lock could not be taken
    #[error("Failed to lock {}: {source}", path.display())]
    Lock {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// File was written by an incompatible release
    #[error("Incompatible schema in {}: found {found}, expected {expected}", path.display())]
    IncompatibleSchema {
        path: PathBuf,
        found: SchemaVersion,
        expected: SchemaVersion,
    },
}

impl StoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Result type for storage operations.
pub type StoreResult<T> = Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_display_includes_path() {
        let err = StoreError::io(
            "/tmp/kbtrack/current.json",
            io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        );
        let msg = err.to_string();
        assert!(msg.contains("/tmp/kbtrack/current.json"));
        assert!(msg.contains("denied"));
    }

    #[test]
    fn test_incompatible_schema_display() {
        let err = StoreError::IncompatibleSchema {
            path: PathBuf::from("current.json"),
            found: SchemaVersion::new(3, 0),
            expected: SchemaVersion::CURRENT,
        };
        assert_eq!(
            err.to_string(),
            "Incompatible schema in current.json: found 3.0, expected 2.0"
        );
    }
}
