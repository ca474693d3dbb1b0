//! Atomic file I/O primitives for state files owned by this crate.
//!
//! The keystore and configuration writers use the temp-file + fsync +
//! rename protocol: a crash at any point leaves either the old complete
//! file or the new complete file on disk, never a partial write. All
//! files are created 0600 and all directories 0700.

use std::fs::{self, File};
use std::io::Write;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

/// Errors from atomic filesystem operations.
#[derive(Debug, thiserror::Error)]
pub enum FsAtomicError {
    /// The target path has no parent directory (cannot create temp file).
    #[error("path has no parent directory: {}", path.display())]
    NoParentDirectory {
        /// Path with no parent.
        path: std::path::PathBuf,
    },

    /// An I/O error occurred during the operation.
    #[error("I/O error during {context}: {source}")]
    Io {
        /// Description of the operation that failed.
        context: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

impl FsAtomicError {
    fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }
}

/// Creates `dir` (and any missing parents) with 0700 permissions.
///
/// Idempotent; an existing directory is left untouched.
///
/// # Errors
///
/// Returns [`FsAtomicError::Io`] if the directory cannot be created.
pub fn ensure_dir(dir: &Path) -> Result<(), FsAtomicError> {
    if !dir.exists() {
        fs::create_dir_all(dir).map_err(|e| FsAtomicError::io("create directory", e))?;
        fs::set_permissions(dir, fs::Permissions::from_mode(0o700))
            .map_err(|e| FsAtomicError::io("set directory permissions", e))?;
    }
    Ok(())
}

/// Writes `data` to `path` atomically via temp file + rename.
///
/// The temp file is created in the same directory as `path` so the final
/// rename stays on one filesystem. Data is fsynced before the rename and
/// the parent directory is fsynced after it.
///
/// # Errors
///
/// Returns [`FsAtomicError`] if any filesystem operation fails.
pub fn atomic_write(path: &Path, data: &[u8]) -> Result<(), FsAtomicError> {
    let parent = path
        .parent()
        .ok_or_else(|| FsAtomicError::NoParentDirectory {
            path: path.to_path_buf(),
        })?;

    ensure_dir(parent)?;

    // NamedTempFile creates with 0600 on Unix.
    let mut tmp = tempfile::NamedTempFile::new_in(parent)
        .map_err(|e| FsAtomicError::io("create temp file", e))?;

    tmp.write_all(data)
        .map_err(|e| FsAtomicError::io("write temp file", e))?;
    tmp.flush()
        .map_err(|e| FsAtomicError::io("flush temp file", e))?;
    tmp.as_file()
        .sync_all()
        .map_err(|e| FsAtomicError::io("fsync temp file", e))?;

    tmp.persist(path)
        .map_err(|e| FsAtomicError::io("rename temp file to final path", e.error))?;

    // fsync the parent so the rename itself is durable.
    File::open(parent)
        .and_then(|d| d.sync_all())
        .map_err(|e| FsAtomicError::io("fsync parent directory", e))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn atomic_write_creates_file_with_restrictive_permissions() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state").join("record.json");

        atomic_write(&path, b"{\"v\":1}").unwrap();

        assert_eq!(fs::read(&path).unwrap(), b"{\"v\":1}");
        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);

        let dir_mode = fs::metadata(path.parent().unwrap())
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(dir_mode & 0o777, 0o700);
    }

    #[test]
    fn atomic_write_replaces_existing_content() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("record.json");

        atomic_write(&path, b"old").unwrap();
        atomic_write(&path, b"new").unwrap();

        assert_eq!(fs::read(&path).unwrap(), b"new");
    }

    #[test]
    fn ensure_dir_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("a").join("b");

        ensure_dir(&nested).unwrap();
        ensure_dir(&nested).unwrap();

        assert!(nested.is_dir());
    }
}
