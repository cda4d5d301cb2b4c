//! Rolling sample log (`samples.jsonl`).

use kbtrack_core::SampleRecord;
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::atomic::{read_optional, write_atomic};
use crate::error::StoreResult;

/// Default number of samples retained.
pub const DEFAULT_RETENTION: usize = 5000;

/// Newline-delimited JSON log of samples, oldest first.
///
/// Each append rewrites the whole file through an atomic replace, which
/// keeps pruning and appending a single step.
#[derive(Debug, Clone)]
pub struct SampleLog {
    path: PathBuf,
    retention: usize,
}

impl SampleLog {
    pub fn new(path: impl Into<PathBuf>, retention: usize) -> Self {
        Self {
            path: path.into(),
            retention: retention.max(1),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn retention(&self) -> usize {
        self.retention
    }

    /// Loads every parseable sample; bad lines are skipped.
    pub fn read_all(&self) -> StoreResult<Vec<SampleRecord>> {
        let Some(bytes) = read_optional(&self.path)? else {
            return Ok(Vec::new());
        };

        let text = String::from_utf8_lossy(&bytes);
        let mut samples = Vec::new();
        let mut skipped = 0usize;
        for line in text.lines().filter(|l| !l.trim().is_empty()) {
            match serde_json::from_str::<SampleRecord>(line) {
                Ok(sample) => samples.push(sample),
                Err(_) => skipped += 1,
            }
        }
        if skipped > 0 {
            warn!(path = %self.path.display(), skipped, "Skipped unparseable sample lines");
        }
        Ok(samples)
    }

    /// The newest `n` samples, oldest first.
    pub fn read_recent(&self, n: usize) -> StoreResult<Vec<SampleRecord>> {
        let mut samples = self.read_all()?;
        let excess = samples.len().saturating_sub(n);
        samples.drain(..excess);
        Ok(samples)
    }

    /// Appends one sample, dropping the oldest beyond retention.
    pub fn append(&self, sample: &SampleRecord) -> StoreResult<()> {
        let mut samples = self.read_all()?;
        samples.push(sample.clone());
        let excess = samples.len().saturating_sub(self.retention);
        samples.drain(..excess);
        self.write(&samples)
    }

    fn write(&self, samples: &[SampleRecord]) -> StoreResult<()> {
        let mut out = Vec::with_capacity(samples.len() * 192);
        for sample in samples {
            serde_json::to_writer(&mut out, sample)?;
            out.push(b'\n');
        }
        write_atomic(&self.path, &out)
    }
}
