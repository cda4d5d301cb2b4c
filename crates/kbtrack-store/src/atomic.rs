//! Write-temp-then-rename file replacement.

use std::fs;
use std::io::{self, Write};
use std::path::Path;
use tempfile::NamedTempFile;

use crate::error::{StoreError, StoreResult};

/// Replaces `path` with `contents` so readers see either the old or the new
/// file, never a partial one.
pub fn write_atomic(path: &Path, contents: &[u8]) -> StoreResult<()> {
    write_atomic_with(path, |out| {
        out.write_all(contents).map_err(|e| StoreError::io(path, e))
    })
}

/// Streams a new version of `path` through `fill`, then swaps it in.
///
/// The temp file is created in the target's directory so the final rename
/// stays on one filesystem. If `fill` fails the temp file is dropped and the
/// target keeps its previous content.
pub fn write_atomic_with<F>(path: &Path, fill: F) -> StoreResult<()>
where
    F: FnOnce(&mut dyn Write) -> StoreResult<()>,
{
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir).map_err(|e| StoreError::io(dir, e))?;

    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| StoreError::io(dir, e))?;
    fill(&mut tmp as &mut dyn Write)?;
    tmp.flush()
        .and_then(|()| tmp.as_file().sync_all())
        .map_err(|e| StoreError::io(tmp.path(), e))?;
    tmp.persist(path).map_err(|e| StoreError::Persist {
        path: path.to_path_buf(),
        source: e.error,
    })?;
    Ok(())
}

/// Removes `path`, treating an already-missing file as success.
pub fn remove_if_exists(path: &Path) -> StoreResult<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(StoreError::io(path, e)),
    }
}

/// Reads `path`, mapping a missing file to `None`.
pub fn read_optional(path: &Path) -> StoreResult<Option<Vec<u8>>> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(StoreError::io(path, e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_write_replaces_content() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.json");
        write_atomic(&path, b"first").unwrap();
        write_atomic(&path, b"second").unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"second");
    }

    #[test]
    fn test_write_creates_parent_dirs() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested/deeper/state.json");
        write_atomic(&path, b"{}").unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_no_temp_files_left_behind() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.json");
        write_atomic(&path, b"x").unwrap();
        let entries: Vec<_> = fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    /// Serializes one field, then fails on the next.
    #[derive(serde::Serialize)]
    struct HalfWritten {
        battery: u8,
        broken: Unserializable,
    }

    struct Unserializable;

    impl serde::Serialize for Unserializable {
        fn serialize<S: serde::Serializer>(&self, _: S) -> Result<S::Ok, S::Error> {
            Err(serde::ser::Error::custom("refused"))
        }
    }

    fn file_names(dir: &TempDir) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn test_serialization_failure_keeps_old_content() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("current.json");
        write_atomic(&path, b"{\"lastBattery\":80}").unwrap();

        let value = HalfWritten {
            battery: 42,
            broken: Unserializable,
        };
        let err = write_atomic_with(&path, |out| {
            serde_json::to_writer_pretty(out, &value)?;
            Ok(())
        })
        .unwrap_err();

        assert!(matches!(err, StoreError::Serialize(_)), "{err:?}");
        assert_eq!(fs::read(&path).unwrap(), b"{\"lastBattery\":80}");
        assert_eq!(file_names(&dir), vec!["current.json".to_string()]);
    }

    #[test]
    fn test_failed_fill_after_partial_write_keeps_old_content() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("sessions.json");
        write_atomic(&path, b"[]\n").unwrap();

        let result = write_atomic_with(&path, |out| {
            out.write_all(b"[{\"sessionNum\": 1,")
                .map_err(|e| StoreError::io(&path, e))?;
            Err(StoreError::io(&path, io::Error::other("interrupted")))
        });

        assert!(result.is_err());
        assert_eq!(fs::read(&path).unwrap(), b"[]\n");
        assert_eq!(file_names(&dir), vec!["sessions.json".to_string()]);
    }

    #[test]
    fn test_rename_failure_leaves_no_temp_file() {
        let dir = TempDir::new().unwrap();
        let sibling = dir.path().join("sessions.json");
        write_atomic(&sibling, b"[]\n").unwrap();
        // A directory in the target's place makes the final rename fail.
        let target = dir.path().join("current.json");
        fs::create_dir(&target).unwrap();
        fs::write(target.join("keep"), b"old").unwrap();

        let err = write_atomic(&target, b"{}").unwrap_err();

        assert!(matches!(err, StoreError::Persist { .. }), "{err:?}");
        assert_eq!(fs::read(target.join("keep")).unwrap(), b"old");
        assert_eq!(fs::read(&sibling).unwrap(), b"[]\n");
        assert_eq!(
            file_names(&dir),
            vec!["current.json".to_string(), "sessions.json".to_string()]
        );
    }

    #[test]
    fn test_remove_missing_is_ok() {
        let dir = TempDir::new().unwrap();
        assert!(remove_if_exists(&dir.path().join("nope")).is_ok());
    }

    #[test]
    fn test_read_optional_missing() {
        let dir = TempDir::new().unwrap();
        assert!(read_optional(&dir.path().join("nope")).unwrap().is_none());
    }
}
