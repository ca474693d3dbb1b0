//! Per-player risk state persistence.
//!
//! One JSON file per player under `risk/players/`. Last-write-wins with
//! a single-worker assumption; no locking. A missing file reads as
//! "no state yet" (`Ok(None)`), while an unreadable or corrupt file is
//! an error — the two conditions are deliberately distinguished so a
//! corrupt state is never silently reset to zero.

use std::fs::OpenOptions;
use std::io::Write;
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};

use thiserror::Error;

use super::RiskState;
use crate::fs_atomic::{self, FsAtomicError};

/// Errors from risk state persistence.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The state file exists but cannot be read.
    #[error("read risk state {}: {source}", path.display())]
    Read {
        /// State file path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The state file exists but does not parse.
    #[error("parse risk state {}: {source}", path.display())]
    Parse {
        /// State file path.
        path: PathBuf,
        /// Underlying JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// The state cannot be serialized or written.
    #[error("write risk state {}: {source}", path.display())]
    Write {
        /// State file path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The players directory cannot be created.
    #[error("risk state dir: {0}")]
    Dir(#[from] FsAtomicError),

    /// Serialization failure.
    #[error("encode risk state: {0}")]
    Encode(#[source] serde_json::Error),
}

/// Abstract persistence of longitudinal risk state.
pub trait RiskStore {
    /// Loads a player's state; `Ok(None)` means no state exists yet.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] for unreadable or corrupt state.
    fn load(&self, player_id: &str) -> Result<Option<RiskState>, StoreError>;

    /// Persists a player's state.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the state cannot be written.
    fn save(&self, state: &RiskState) -> Result<(), StoreError>;
}

/// File-backed risk store: `<dir>/<player_id>.json`.
#[derive(Debug, Clone)]
pub struct FileRiskStore {
    dir: PathBuf,
}

impl FileRiskStore {
    /// Creates the store, ensuring `dir` exists with 0700 permissions.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Dir`] if the directory cannot be created.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        fs_atomic::ensure_dir(&dir)?;
        Ok(Self { dir })
    }

    fn path(&self, player_id: &str) -> PathBuf {
        self.dir.join(format!("{player_id}.json"))
    }

    /// The directory states live in.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl RiskStore for FileRiskStore {
    fn load(&self, player_id: &str) -> Result<Option<RiskState>, StoreError> {
        let path = self.path(player_id);
        let bytes = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(StoreError::Read { path, source }),
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|source| StoreError::Parse { path, source })
    }

    fn save(&self, state: &RiskState) -> Result<(), StoreError> {
        let path = self.path(&state.player_id);
        let mut bytes = serde_json::to_vec_pretty(state).map_err(StoreError::Encode)?;
        bytes.push(b'\n');

        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(&path)
            .map_err(|source| StoreError::Write {
                path: path.clone(),
                source,
            })?;
        file.write_all(&bytes)
            .map_err(|source| StoreError::Write { path, source })
    }
}
