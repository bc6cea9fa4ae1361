// SPDX-License-Identifier: GPL-3.0-or-later

//! Scoped ownership of temporary media files.
//!
//! Every intermediate file the pipeline creates is wrapped in a [`ScopedFile`].
//! The file is removed exactly once: either through [`ScopedFile::release`] or,
//! if the owner goes away first (error, cancellation, panic), on drop.
//! Removal failures never propagate; they are logged and recorded in a shared
//! [`CleanupLedger`] so the caller can report them after the run.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::{trace, warn};

/// A temporary asset that could not be removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanupFailure {
    pub path: PathBuf,
    pub message: String,
}

/// Shared record of cleanup failures for one pipeline run.
#[derive(Debug, Clone, Default)]
pub struct CleanupLedger {
    inner: Arc<Mutex<Vec<CleanupFailure>>>,
}

impl CleanupLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, failure: CleanupFailure) {
        warn!(
            target: "cleanup",
            path = %failure.path.display(),
            error = %failure.message,
            "failed to remove temporary asset"
        );
        if let Ok(mut guard) = self.inner.lock() {
            guard.push(failure);
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().map(|guard| guard.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Retrieve and clear all recorded failures.
    pub fn drain(&self) -> Vec<CleanupFailure> {
        match self.inner.lock() {
            Ok(mut guard) => std::mem::take(&mut *guard),
            Err(_) => Vec::new(),
        }
    }
}

/// A file on disk owned by the current run.
#[derive(Debug)]
pub struct ScopedFile {
    path: PathBuf,
    ledger: CleanupLedger,
    armed: bool,
}

impl ScopedFile {
    /// Take ownership of `path`. The file does not need to exist yet.
    pub fn new(path: impl Into<PathBuf>, ledger: CleanupLedger) -> Self {
        Self {
            path: path.into(),
            ledger,
            armed: true,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Remove the file now, returning the failure if removal did not succeed.
    ///
    /// A file that was never created counts as released.
    pub fn release(mut self) -> std::result::Result<(), CleanupFailure> {
        self.armed = false;
        self.remove()
    }

    fn remove(&self) -> std::result::Result<(), CleanupFailure> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => {
                trace!(target: "cleanup", path = %self.path.display(), "removed temporary asset");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => {
                let failure = CleanupFailure {
                    path: self.path.clone(),
                    message: e.to_string(),
                };
                self.ledger.record(failure.clone());
                Err(failure)
            }
        }
    }
}

impl Drop for ScopedFile {
    fn drop(&mut self) {
        if self.armed {
            self.armed = false;
            let _ = self.remove();
        }
    }
}

/// A media file with a known duration.
#[derive(Debug)]
pub struct MediaAsset {
    pub file: ScopedFile,
    pub duration: Duration,
}

impl MediaAsset {
    pub fn path(&self) -> &Path {
        self.file.path()
    }

    pub fn release(self) -> std::result::Result<(), CleanupFailure> {
        self.file.release()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn release_removes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fragment.mp3");
        std::fs::write(&path, b"data").unwrap();

        let ledger = CleanupLedger::new();
        let file = ScopedFile::new(&path, ledger.clone());
        assert!(file.release().is_ok());
        assert!(!path.exists());
        assert!(ledger.is_empty());
    }

    #[test]
    fn drop_removes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audio.mp3");
        std::fs::write(&path, b"data").unwrap();

        {
            let _file = ScopedFile::new(&path, CleanupLedger::new());
        }
        assert!(!path.exists());
    }

    #[test]
    fn missing_file_is_not_a_failure() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = CleanupLedger::new();
        let file = ScopedFile::new(dir.path().join("never-created.mp3"), ledger.clone());
        assert!(file.release().is_ok());
        assert!(ledger.is_empty());
    }

    #[test]
    fn failed_removal_is_recorded() {
        let dir = tempfile::tempdir().unwrap();
        // A non-empty directory cannot be removed with remove_file.
        let path = dir.path().join("not-a-file");
        std::fs::create_dir(&path).unwrap();
        std::fs::write(path.join("inner"), b"x").unwrap();

        let ledger = CleanupLedger::new();
        let file = ScopedFile::new(&path, ledger.clone());
        let failure = file.release().unwrap_err();
        assert_eq!(failure.path, path);
        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger.drain().len(), 1);
        assert!(ledger.is_empty());
    }
}
