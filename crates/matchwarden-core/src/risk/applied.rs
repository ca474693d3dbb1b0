//! Applied markers: the per-match "already scored" guard.
//!
//! Presence of `<dir>/<match_id>.ok` means the match must never be
//! reapplied. Markers are create-only; together with the outbox this
//! turns at-least-once delivery into effectively-once application.

use std::fs::OpenOptions;
use std::io::Write;
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::fs_atomic::{self, FsAtomicError};

/// Errors from the applied-marker store.
#[derive(Debug, Error)]
pub enum AppliedError {
    /// The marker directory cannot be created.
    #[error("applied marker dir: {0}")]
    Dir(#[from] FsAtomicError),

    /// A marker cannot be checked or written.
    #[error("applied marker {}: {source}", path.display())]
    Io {
        /// Marker path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

/// Marker store rooted at one directory.
#[derive(Debug, Clone)]
pub struct AppliedStore {
    dir: PathBuf,
}

impl AppliedStore {
    /// Creates a marker store rooted at `dir`.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path(&self, match_id: &str) -> PathBuf {
        self.dir.join(format!("{match_id}.ok"))
    }

    /// The directory markers live in.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Whether `match_id` has already been applied.
    ///
    /// # Errors
    ///
    /// Returns [`AppliedError::Io`] if the marker cannot be checked
    /// (anything other than a clean not-found).
    pub fn is_applied(&self, match_id: &str) -> Result<bool, AppliedError> {
        let path = self.path(match_id);
        match std::fs::metadata(&path) {
            Ok(_) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(source) => Err(AppliedError::Io { path, source }),
        }
    }

    /// Creates the marker for `match_id`.
    ///
    /// # Errors
    ///
    /// Returns [`AppliedError`] if the directory or marker cannot be
    /// written.
    pub fn mark_applied(&self, match_id: &str) -> Result<(), AppliedError> {
        fs_atomic::ensure_dir(&self.dir)?;
        let path = self.path(match_id);
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(&path)
            .map_err(|source| AppliedError::Io {
                path: path.clone(),
                source,
            })?;
        file.write_all(b"ok\n")
            .map_err(|source| AppliedError::Io { path, source })
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn unmarked_match_is_not_applied() {
        let dir = TempDir::new().unwrap();
        let store = AppliedStore::new(dir.path().join("applied"));
        assert!(!store.is_applied("M1").unwrap());
    }

    #[test]
    fn mark_then_check() {
        let dir = TempDir::new().unwrap();
        let store = AppliedStore::new(dir.path().join("applied"));

        store.mark_applied("M1").unwrap();
        assert!(store.is_applied("M1").unwrap());
        assert!(!store.is_applied("M2").unwrap());

        // Marking twice is harmless.
        store.mark_applied("M1").unwrap();
        assert!(store.is_applied("M1").unwrap());
    }
}
