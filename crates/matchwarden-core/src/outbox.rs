//! Durable at-least-once event outbox backed by directory-state
//! transitions.
//!
//! An event's state *is* the subdirectory its file lives in:
//!
//! ```text
//! root/
//!   pending/      enqueued, unclaimed
//!   processing/   claimed by exactly one worker
//!   done/         handled successfully
//!   failed/       terminal failure (may carry <name>.err.txt sidecars)
//! ```
//!
//! Every transition is a `rename(2)` within `root/`, relying on the
//! filesystem's atomic-rename contract. The directory is the lock: no
//! in-process mutexes are needed, and concurrent workers race safely on
//! claim because only one rename out of `pending/` can succeed.
//!
//! Invariants:
//!
//! - an event file resides in exactly one of the four subdirectories;
//! - rename is the sole state-transition primitive;
//! - an event payload is never rewritten after creation.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::fs_atomic::{self, FsAtomicError};

/// Event type emitted when a match's telemetry is considered complete.
pub const EVENT_MATCH_FINALIZED: &str = "match_finalized";

const STATE_DIRS: [&str; 4] = ["pending", "processing", "done", "failed"];

/// A queued pipeline event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Sortable unique id: `<unix_nanos>_<instance>_<match_id>`.
    pub id: String,
    /// Event type tag; unknown types pass through to handlers untouched.
    #[serde(rename = "type")]
    pub event_type: String,
    /// Match the event refers to.
    pub match_id: String,
    /// Finalize moment; the grace window counts from here.
    pub created_at: DateTime<Utc>,
}

impl Event {
    /// Builds a `match_finalized` event for `match_id`.
    ///
    /// The id sorts old-to-new and is unique per (instance, nanosecond).
    #[must_use]
    pub fn match_finalized(
        instance: &str,
        match_id: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        let match_id = match_id.into();
        let nanos = created_at.timestamp_nanos_opt().unwrap_or_default();
        Self {
            id: format!("{nanos}_{instance}_{match_id}"),
            event_type: EVENT_MATCH_FINALIZED.to_string(),
            match_id,
            created_at,
        }
    }
}

/// An event claimed out of `pending/`, together with the `processing/`
/// path that owns it until the worker transitions it.
#[derive(Debug, Clone)]
pub struct Claimed {
    /// The decoded event.
    pub event: Event,
    /// Path of the event file inside `processing/`.
    pub processing_path: PathBuf,
}

/// Errors from outbox operations.
#[derive(Debug, Error)]
pub enum OutboxError {
    /// Nothing claimable in `pending/`. Normal idle condition, not a
    /// fault.
    #[error("no pending events")]
    NoPending,

    /// Directory creation failed.
    #[error("outbox ensure: {0}")]
    Ensure(#[from] FsAtomicError),

    /// Event serialization failed.
    #[error("outbox event encode: {0}")]
    Encode(#[source] serde_json::Error),

    /// A claimed event file could not be decoded; the file has been
    /// moved to `failed/`.
    #[error("outbox event decode {}: {source}", path.display())]
    Decode {
        /// Path of the poisoned event file (now under `failed/`).
        path: PathBuf,
        /// Underlying JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// An I/O failure during a queue operation.
    #[error("outbox {context}: {source}")]
    Io {
        /// Description of the failing operation.
        context: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

impl OutboxError {
    fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }
}

/// Filesystem-backed event queue.
#[derive(Debug, Clone)]
pub struct Outbox {
    root: PathBuf,
}

impl Outbox {
    /// Creates an outbox rooted at `root`. Call [`Outbox::ensure`] (or
    /// any mutating operation, which ensures implicitly) before first
    /// use.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The outbox root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Creates the four state subdirectories with 0700 permissions.
    /// Idempotent.
    ///
    /// # Errors
    ///
    /// Returns [`OutboxError::Ensure`] if a directory cannot be created.
    pub fn ensure(&self) -> Result<(), OutboxError> {
        for dir in STATE_DIRS {
            fs_atomic::ensure_dir(&self.root.join(dir))?;
        }
        Ok(())
    }

    /// Enqueues `event` into `pending/`.
    ///
    /// The event is written to `pending/<id>.tmp` and renamed to
    /// `pending/<id>.json`. A rename collision means the event is
    /// already queued and is treated as success; the temp file is
    /// cleaned up best-effort.
    ///
    /// # Errors
    ///
    /// Returns [`OutboxError`] if serialization or the write/rename
    /// fails for any reason other than a duplicate id.
    pub fn enqueue(&self, event: &Event) -> Result<(), OutboxError> {
        self.ensure()?;

        let bytes = serde_json::to_vec(event).map_err(OutboxError::Encode)?;

        let pending = self.root.join("pending");
        let tmp = pending.join(format!("{}.tmp", event.id));
        let dst = pending.join(format!("{}.json", event.id));

        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(&tmp)
            .map_err(|e| OutboxError::io("open pending temp file", e))?;
        file.write_all(&bytes)
            .map_err(|e| OutboxError::io("write pending temp file", e))?;
        drop(file);

        if let Err(rename_err) = fs::rename(&tmp, &dst) {
            let _ = fs::remove_file(&tmp);
            // Duplicate id: the event is already queued.
            if dst.exists() {
                debug!(id = %event.id, "event already queued");
                return Ok(());
            }
            return Err(OutboxError::io("rename pending temp file", rename_err));
        }

        Ok(())
    }

    /// Atomically claims one pending event by renaming it into
    /// `processing/`.
    ///
    /// Rename failures during the scan mean a peer won the race and are
    /// skipped. A read or parse failure *after* a successful claim is
    /// terminal for that event: the file is moved to `failed/` and the
    /// error surfaced.
    ///
    /// # Errors
    ///
    /// Returns [`OutboxError::NoPending`] when nothing is claimable,
    /// or the decode/read error for a poisoned event.
    pub fn claim_one(&self) -> Result<Claimed, OutboxError> {
        self.ensure()?;

        let pending = self.root.join("pending");
        let entries =
            fs::read_dir(&pending).map_err(|e| OutboxError::io("list pending directory", e))?;

        for entry in entries {
            let entry = entry.map_err(|e| OutboxError::io("read pending entry", e))?;
            let src = entry.path();
            if src.is_dir() || src.extension().is_none_or(|ext| ext != "json") {
                continue;
            }
            let Some(name) = src.file_name() else {
                continue;
            };

            let dst = self.root.join("processing").join(name);

            // Atomic claim: if the rename succeeds, we own the event.
            if fs::rename(&src, &dst).is_err() {
                continue;
            }

            let bytes = match fs::read(&dst) {
                Ok(bytes) => bytes,
                Err(e) => {
                    let _ = fs::rename(&dst, self.root.join("failed").join(name));
                    return Err(OutboxError::io("read claimed event", e));
                },
            };

            match serde_json::from_slice::<Event>(&bytes) {
                Ok(event) => {
                    return Ok(Claimed {
                        event,
                        processing_path: dst,
                    });
                },
                Err(source) => {
                    let failed = self.root.join("failed").join(name);
                    let _ = fs::rename(&dst, &failed);
                    return Err(OutboxError::Decode {
                        path: failed,
                        source,
                    });
                },
            }
        }

        Err(OutboxError::NoPending)
    }

    /// Moves a claimed event to `done/`.
    ///
    /// # Errors
    ///
    /// Returns [`OutboxError::Io`] if the rename fails.
    pub fn mark_done(&self, processing_path: &Path) -> Result<(), OutboxError> {
        self.transition(processing_path, "done")
    }

    /// Moves a claimed event to `failed/`, first writing a best-effort
    /// `<name>.err.txt` sidecar with `reason`.
    ///
    /// Sidecar write failures never block the state transition.
    ///
    /// # Errors
    ///
    /// Returns [`OutboxError::Io`] if the rename itself fails.
    pub fn mark_failed(&self, processing_path: &Path, reason: &str) -> Result<(), OutboxError> {
        if let Some(name) = processing_path.file_name() {
            let sidecar = self
                .root
                .join("failed")
                .join(format!("{}.err.txt", name.to_string_lossy()));
            let _ = write_restricted(&sidecar, format!("{reason}\n").as_bytes());
        }
        self.transition(processing_path, "failed")
    }

    /// Moves a claimed event back to `pending/` for a later retry.
    ///
    /// # Errors
    ///
    /// Returns [`OutboxError::Io`] if the rename fails.
    pub fn requeue(&self, processing_path: &Path) -> Result<(), OutboxError> {
        self.transition(processing_path, "pending")
    }

    fn transition(&self, processing_path: &Path, state: &str) -> Result<(), OutboxError> {
        let name = processing_path
            .file_name()
            .ok_or_else(|| {
                OutboxError::io(
                    "resolve event file name",
                    std::io::Error::new(std::io::ErrorKind::InvalidInput, "path has no file name"),
                )
            })?
            .to_os_string();
        fs::rename(processing_path, self.root.join(state).join(name))
            .map_err(|e| OutboxError::io(format!("move event to {state}"), e))
    }
}

fn write_restricted(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?;
    file.write_all(bytes)
}
