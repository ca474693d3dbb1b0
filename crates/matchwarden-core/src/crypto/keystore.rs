//! Disk-backed keystore for the signing keypair.
//!
//! The key lives in a single versioned JSON record:
//!
//! ```json
//! { "version": 1, "key_id": "dev-...", "priv_b64": "..." }
//! ```
//!
//! `priv_b64` is the unpadded standard-base64 encoding of the 32-byte
//! Ed25519 seed. `key_id` is non-secret and stable per file, derived
//! from a prefix of the public key. The record is loaded if present,
//! otherwise generated and written atomically (temp + rename, 0600).
//!
//! A present-but-corrupt record is an error, never silently regenerated:
//! regenerating would orphan every token signed by the previous key.

use std::path::{Path, PathBuf};

use base64::Engine;
use base64::engine::general_purpose::{STANDARD_NO_PAD, URL_SAFE_NO_PAD};
use ed25519_dalek::{SigningKey, VerifyingKey};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::fs_atomic::{self, FsAtomicError};

/// Supported keystore record version.
const KEYSTORE_VERSION: u32 = 1;

/// Number of public-key bytes folded into the key id label.
const KEY_ID_PREFIX_LEN: usize = 12;

/// Errors from keystore load/create operations.
#[derive(Debug, Error)]
pub enum KeystoreError {
    /// I/O failure reading the record.
    #[error("keystore read {}: {source}", path.display())]
    Read {
        /// Record path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The record is not valid JSON.
    #[error("keystore parse {}: {source}", path.display())]
    Parse {
        /// Record path.
        path: PathBuf,
        /// Underlying JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// The record carries an unsupported version number.
    #[error("keystore unsupported version {version} (want {KEYSTORE_VERSION})")]
    UnsupportedVersion {
        /// Version found in the record.
        version: u32,
    },

    /// A required record field is empty.
    #[error("keystore record missing field: {field}")]
    MissingField {
        /// Name of the empty field.
        field: &'static str,
    },

    /// The private key is not valid base64.
    #[error("keystore private key decode: {0}")]
    Decode(#[from] base64::DecodeError),

    /// The decoded private key has the wrong length.
    #[error("keystore private key wrong length: got {got} want {want}")]
    WrongKeyLength {
        /// Decoded length.
        got: usize,
        /// Expected seed length.
        want: usize,
    },

    /// Writing the new record failed.
    #[error("keystore write: {0}")]
    Write(#[from] FsAtomicError),

    /// Serializing the new record failed.
    #[error("keystore marshal: {0}")]
    Marshal(#[source] serde_json::Error),
}

#[derive(Debug, Serialize, Deserialize)]
struct KeyRecordV1 {
    version: u32,
    key_id: String,
    priv_b64: String,
}

/// Load-or-create store for one signing key at a fixed path.
#[derive(Debug, Clone)]
pub struct DiskKeystore {
    path: PathBuf,
}

impl DiskKeystore {
    /// Creates a keystore rooted at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Loads the persisted key, or generates and persists a new one.
    ///
    /// Returns the key id together with the signing key.
    ///
    /// # Errors
    ///
    /// Returns [`KeystoreError`] if an existing record is unreadable or
    /// malformed, or if a fresh record cannot be written.
    pub fn load_or_create(&self) -> Result<(String, SigningKey), KeystoreError> {
        match std::fs::read(&self.path) {
            Ok(bytes) => self.parse_record(&bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => self.create_record(),
            Err(source) => Err(KeystoreError::Read {
                path: self.path.clone(),
                source,
            }),
        }
    }

    fn parse_record(&self, bytes: &[u8]) -> Result<(String, SigningKey), KeystoreError> {
        let record: KeyRecordV1 =
            serde_json::from_slice(bytes).map_err(|source| KeystoreError::Parse {
                path: self.path.clone(),
                source,
            })?;

        if record.version != KEYSTORE_VERSION {
            return Err(KeystoreError::UnsupportedVersion {
                version: record.version,
            });
        }
        if record.key_id.is_empty() {
            return Err(KeystoreError::MissingField { field: "key_id" });
        }
        if record.priv_b64.is_empty() {
            return Err(KeystoreError::MissingField { field: "priv_b64" });
        }

        let seed = STANDARD_NO_PAD.decode(&record.priv_b64)?;
        let seed: [u8; 32] = seed
            .as_slice()
            .try_into()
            .map_err(|_| KeystoreError::WrongKeyLength {
                got: seed.len(),
                want: 32,
            })?;

        Ok((record.key_id, SigningKey::from_bytes(&seed)))
    }

    fn create_record(&self) -> Result<(String, SigningKey), KeystoreError> {
        let mut rng = rand::thread_rng();
        let signing_key = SigningKey::generate(&mut rng);
        let key_id = derive_key_id(&signing_key.verifying_key());

        let record = KeyRecordV1 {
            version: KEYSTORE_VERSION,
            key_id: key_id.clone(),
            priv_b64: STANDARD_NO_PAD.encode(signing_key.to_bytes()),
        };

        let mut out = serde_json::to_vec_pretty(&record).map_err(KeystoreError::Marshal)?;
        out.push(b'\n');

        fs_atomic::atomic_write(&self.path, &out)?;

        Ok((key_id, signing_key))
    }

    /// Path of the underlying record.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Derives the stable, non-secret key id for a public key.
#[must_use]
pub fn derive_key_id(public: &VerifyingKey) -> String {
    let bytes = public.to_bytes();
    format!("dev-{}", URL_SAFE_NO_PAD.encode(&bytes[..KEY_ID_PREFIX_LEN]))
}

#[cfg(test)]
mod tests {
    use std::os::unix::fs::PermissionsExt;

    use tempfile::TempDir;

    use super::*;

    #[test]
    fn create_then_load_returns_same_key() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("keys").join("signing_key.json");

        let store = DiskKeystore::new(&path);
        let (key_id, key) = store.load_or_create().unwrap();
        let (key_id2, key2) = store.load_or_create().unwrap();

        assert_eq!(key_id, key_id2);
        assert_eq!(key.to_bytes(), key2.to_bytes());
        assert!(key_id.starts_with("dev-"));
    }

    #[test]
    fn record_has_restrictive_permissions() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("signing_key.json");

        DiskKeystore::new(&path).load_or_create().unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn corrupt_record_is_an_error_not_regenerated() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("signing_key.json");
        std::fs::write(&path, b"not json").unwrap();

        let err = DiskKeystore::new(&path).load_or_create().unwrap_err();
        assert!(matches!(err, KeystoreError::Parse { .. }));

        // The corrupt record must survive untouched.
        assert_eq!(std::fs::read(&path).unwrap(), b"not json");
    }

    #[test]
    fn wrong_version_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("signing_key.json");
        std::fs::write(
            &path,
            br#"{"version":2,"key_id":"dev-x","priv_b64":"AAAA"}"#,
        )
        .unwrap();

        let err = DiskKeystore::new(&path).load_or_create().unwrap_err();
        assert!(matches!(
            err,
            KeystoreError::UnsupportedVersion { version: 2 }
        ));
    }

    #[test]
    fn key_id_matches_public_key_prefix() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("signing_key.json");

        let (key_id, key) = DiskKeystore::new(&path).load_or_create().unwrap();
        assert_eq!(key_id, derive_key_id(&key.verifying_key()));
    }
}
