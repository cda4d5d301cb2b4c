//! Error types for report rendering.
//!
//! **Panic-Free Policy:** No `.unwrap()`, `.expect()`, `panic!()`,
//! `unreachable!()`, or `todo!()` outside tests.

use kbtrack_store::StoreError;
use thiserror::Error;

/// Errors raised while gathering or encoding a report.
#[derive(Error, Debug)]
pub enum CliError {
    /// The data directory could not be read.
    ///
    /// Missing or corrupt files are not errors; this only covers I/O
    /// failures and schema versions newer than this build understands.
    #[error("Failed to read tracking data: {0}")]
    Store(#[from] StoreError),

    /// The report could not be encoded as JSON.
    #[error("Failed to encode report: {0}")]
    Json(#[from] serde_json::Error),
}

/// Convenience Result type alias for reporting.
pub type Result<T> = std::result::Result<T, CliError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::path::PathBuf;

    #[test]
    fn test_store_error_display() {
        let error: CliError = StoreError::Io {
            path: PathBuf::from("/data/current.json"),
            source: io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        }
        .into();
        let display = format!("{error}");
        assert!(display.contains("Failed to read tracking data"));
        assert!(display.contains("current.json"));
    }

    #[test]
    fn test_json_error_from_conversion() {
        let json_error = serde_json::from_str::<serde_json::Value>("{ nope").unwrap_err();
        let error: CliError = json_error.into();
        assert!(matches!(error, CliError::Json(_)));
        assert!(format!("{error}").contains("Failed to encode report"));
    }
}
