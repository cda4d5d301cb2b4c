//! Exclusive advisory lock around the load-decide-write cycle.

use std::fs::{File, OpenOptions};
use std::io;
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{StoreError, StoreResult};

/// Holds an exclusive `flock` on the data directory's lock file.
///
/// The lock is released when the guard is dropped, and by the kernel if the
/// process dies while holding it.
#[derive(Debug)]
pub struct DataLock {
    file: File,
    path: PathBuf,
}

impl DataLock {
    /// Blocks until the exclusive lock is acquired.
    pub fn acquire(path: &Path) -> StoreResult<Self> {
        Self::lock(path, libc::LOCK_EX)
    }

    /// Acquires the lock without waiting; `Ok(None)` if another process holds it.
    pub fn try_acquire(path: &Path) -> StoreResult<Option<Self>> {
        match Self::lock(path, libc::LOCK_EX | libc::LOCK_NB) {
            Ok(lock) => Ok(Some(lock)),
            Err(StoreError::Lock { source, .. })
                if source.kind() == io::ErrorKind::WouldBlock =>
            {
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    fn lock(path: &Path, operation: libc::c_int) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| StoreError::io(parent, e))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(path)
            .map_err(|e| StoreError::io(path, e))?;

        // SAFETY: the descriptor is owned by `file`, which outlives the call.
        let result = unsafe { libc::flock(file.as_raw_fd(), operation) };
        if result != 0 {
            return Err(StoreError::Lock {
                path: path.to_path_buf(),
                source: io::Error::last_os_error(),
            });
        }

        debug!(path = %path.display(), "Acquired data lock");
        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for DataLock {
    fn drop(&mut self) {
        // SAFETY: the descriptor is still open; closing it would also unlock.
        unsafe {
            libc::flock(self.file.as_raw_fd(), libc::LOCK_UN);
        }
    }
}
