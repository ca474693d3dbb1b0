//! Ed25519 signing and verification primitives.
//!
//! One signing keypair is active at a time; rotation is a future
//! extension. The private key never leaves this module except through
//! the disk keystore record.

pub mod keystore;

use ed25519_dalek::{Signature, Signer as _, SigningKey, Verifier, VerifyingKey};
use rand::RngCore;
use sha2::{Digest, Sha256};

pub use keystore::{DiskKeystore, KeystoreError};

/// Length of an Ed25519 public key in bytes.
pub const PUBLIC_KEY_LEN: usize = 32;

/// Length of an Ed25519 signature in bytes.
pub const SIGNATURE_LEN: usize = 64;

/// Returns 32 cryptographically random bytes.
#[must_use]
pub fn nonce32() -> [u8; 32] {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes
}

/// SHA-256 digest of `bytes`.
#[must_use]
pub fn sha256(bytes: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hasher.finalize().into()
}

/// A signing identity: a stable, non-secret key id plus the Ed25519
/// signing key it labels.
pub struct SignerIdentity {
    key_id: String,
    signing_key: SigningKey,
}

impl SignerIdentity {
    /// Wraps an existing signing key under `key_id`.
    #[must_use]
    pub const fn new(key_id: String, signing_key: SigningKey) -> Self {
        Self {
            key_id,
            signing_key,
        }
    }

    /// Generates an ephemeral in-memory signer for tests and tooling.
    #[must_use]
    pub fn ephemeral(key_id: impl Into<String>) -> Self {
        let mut rng = rand::thread_rng();
        Self {
            key_id: key_id.into(),
            signing_key: SigningKey::generate(&mut rng),
        }
    }

    /// Loads (or creates) the persisted signing key at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`KeystoreError`] if the keystore record cannot be read,
    /// parsed, or written.
    pub fn from_keystore(path: impl Into<std::path::PathBuf>) -> Result<Self, KeystoreError> {
        let (key_id, signing_key) = DiskKeystore::new(path).load_or_create()?;
        Ok(Self {
            key_id,
            signing_key,
        })
    }

    /// The stable key id label.
    #[must_use]
    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    /// The public half of the keypair.
    #[must_use]
    pub fn verifying_key(&self) -> VerifyingKey {
        self.signing_key.verifying_key()
    }

    /// The public key as raw bytes.
    #[must_use]
    pub fn public_bytes(&self) -> [u8; PUBLIC_KEY_LEN] {
        self.signing_key.verifying_key().to_bytes()
    }

    /// Signs `payload` and returns the 64-byte signature.
    #[must_use]
    pub fn sign(&self, payload: &[u8]) -> Vec<u8> {
        self.signing_key.sign(payload).to_bytes().to_vec()
    }
}

impl std::fmt::Debug for SignerIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never expose key material through Debug.
        f.debug_struct("SignerIdentity")
            .field("key_id", &self.key_id)
            .finish_non_exhaustive()
    }
}

/// Verifies an Ed25519 signature over `payload`.
///
/// Returns `false` for malformed keys or signatures rather than erroring;
/// callers treat any failure as "not verified".
#[must_use]
pub fn verify(public: &[u8], payload: &[u8], signature: &[u8]) -> bool {
    let Ok(public) = <[u8; PUBLIC_KEY_LEN]>::try_from(public) else {
        return false;
    };
    let Ok(key) = VerifyingKey::from_bytes(&public) else {
        return false;
    };
    let Ok(signature) = Signature::from_slice(signature) else {
        return false;
    };
    key.verify(payload, &signature).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_then_verify_roundtrip() {
        let signer = SignerIdentity::ephemeral("test-key");
        let sig = signer.sign(b"payload");

        assert!(verify(&signer.public_bytes(), b"payload", &sig));
    }

    #[test]
    fn verify_rejects_tampered_payload() {
        let signer = SignerIdentity::ephemeral("test-key");
        let sig = signer.sign(b"payload");

        assert!(!verify(&signer.public_bytes(), b"payload2", &sig));
    }

    #[test]
    fn verify_rejects_wrong_key() {
        let signer = SignerIdentity::ephemeral("a");
        let other = SignerIdentity::ephemeral("b");
        let sig = signer.sign(b"payload");

        assert!(!verify(&other.public_bytes(), b"payload", &sig));
    }

    #[test]
    fn verify_tolerates_malformed_inputs() {
        assert!(!verify(b"short", b"payload", &[0u8; 64]));
        assert!(!verify(&[0u8; 32], b"payload", b"short"));
    }

    #[test]
    fn nonce32_is_nontrivial() {
        let a = nonce32();
        let b = nonce32();
        assert_ne!(a, b);
    }

    #[test]
    fn sha256_known_vector() {
        // SHA-256("abc")
        let digest = sha256(b"abc");
        assert_eq!(
            hex(&digest),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    fn hex(bytes: &[u8]) -> String {
        bytes.iter().map(|b| format!("{b:02x}")).collect()
    }
}
