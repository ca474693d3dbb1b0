//! Trust service: session-start token issuance and token introspection.
//!
//! Issues an OPEN tier token at session start (VERIFIED requires a
//! platform integrity companion and is granted elsewhere), exports the
//! active public key, and introspects presented tokens against the
//! service's own key using the offline verifier.

use std::path::PathBuf;

use chrono::{DateTime, TimeDelta, Utc};
use thiserror::Error;

use crate::crypto::{self, KeystoreError, PUBLIC_KEY_LEN, SignerIdentity};
use crate::token::{
    self, PublicKeySet, SessionRef, TierToken, TokenError, TrustTier,
};

/// Environment variable naming the signing key path.
pub const ENV_SIGNING_KEY_PATH: &str = "MATCHWARDEN_SIGNING_KEY_PATH";

const DEFAULT_SIGNING_KEY_PATH: &str = "./.matchwarden/dev_signing_key.json";

/// Token lifetime granted at session start, in minutes.
const SESSION_TOKEN_TTL_MINUTES: i64 = 10;

/// Errors from the trust service.
#[derive(Debug, Error)]
pub enum TrustError {
    /// The signing key cannot be loaded or created.
    #[error("signing key: {0}")]
    Keystore(#[from] KeystoreError),

    /// The session ref is incomplete.
    #[error("ref.session_id and ref.match_id are required")]
    IncompleteRef,

    /// Token canonicalization or signing failed.
    #[error(transparent)]
    Token(#[from] TokenError),
}

/// The active public key, exported for offline verifiers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicKey {
    /// Stable key id label.
    pub key_id: String,
    /// Raw Ed25519 public key bytes.
    pub ed25519: [u8; PUBLIC_KEY_LEN],
}

/// Everything a game client receives at session start.
#[derive(Debug, Clone)]
pub struct SessionGrant {
    /// The session the grant is bound to.
    pub session_ref: SessionRef,
    /// Fresh 32-byte nonce; its hash is committed inside the token.
    pub nonce: [u8; 32],
    /// Signed OPEN tier token.
    pub open_token: TierToken,
    /// Token expiry.
    pub expires_at: DateTime<Utc>,
}

/// Result of introspecting a presented token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Introspection {
    /// Whether the token verified.
    pub valid: bool,
    /// `"ok"` or the stable rejection tag.
    pub reason: &'static str,
}

/// Issues and introspects tier tokens with one active signing key.
#[derive(Debug)]
pub struct TrustService {
    signer: SignerIdentity,
}

impl TrustService {
    /// Creates a service around an existing signer.
    #[must_use]
    pub const fn new(signer: SignerIdentity) -> Self {
        Self { signer }
    }

    /// Creates a service from the `MATCHWARDEN_SIGNING_KEY_PATH`
    /// environment variable (dev default when unset), loading or
    /// creating the persisted key.
    ///
    /// # Errors
    ///
    /// Returns [`TrustError::Keystore`] if the key cannot be loaded or
    /// created.
    pub fn from_env() -> Result<Self, TrustError> {
        let path = std::env::var(ENV_SIGNING_KEY_PATH)
            .map_or_else(|_| PathBuf::from(DEFAULT_SIGNING_KEY_PATH), PathBuf::from);
        Ok(Self::new(SignerIdentity::from_keystore(path)?))
    }

    /// Starts a session: commits to a fresh nonce and issues a signed
    /// OPEN tier token valid for ten minutes.
    ///
    /// # Errors
    ///
    /// Returns [`TrustError::IncompleteRef`] for refs missing session or
    /// match id, or [`TrustError::Token`] if signing fails.
    pub fn start_session(
        &self,
        session_ref: SessionRef,
        now: DateTime<Utc>,
    ) -> Result<SessionGrant, TrustError> {
        if session_ref.session_id.is_empty() || session_ref.match_id.is_empty() {
            return Err(TrustError::IncompleteRef);
        }

        let expires_at = now + TimeDelta::minutes(SESSION_TOKEN_TTL_MINUTES);
        let nonce = crypto::nonce32();

        let unsigned = TierToken {
            session_ref: session_ref.clone(),
            tier: TrustTier::Open,
            nonce_hash: crypto::sha256(&nonce).to_vec(),
            issued_at: Some(now),
            expires_at: Some(expires_at),
            signature: None,
        };
        let open_token = token::sign_tier_token(&self.signer, unsigned, now)?;

        Ok(SessionGrant {
            session_ref,
            nonce,
            open_token,
            expires_at,
        })
    }

    /// The active public key. Clients may cache it; rotation is a future
    /// extension.
    #[must_use]
    pub fn public_key(&self) -> PublicKey {
        PublicKey {
            key_id: self.signer.key_id().to_string(),
            ed25519: self.signer.public_bytes(),
        }
    }

    /// Introspects a presented token against this service's key.
    #[must_use]
    pub fn introspect(&self, presented: Option<&TierToken>, now: DateTime<Utc>) -> Introspection {
        let keys = PublicKeySet::from([(
            self.signer.key_id().to_string(),
            self.signer.public_bytes(),
        )]);
        match token::verify_tier_token_offline(presented, &keys, now) {
            Ok(()) => Introspection {
                valid: true,
                reason: "ok",
            },
            Err(rejection) => Introspection {
                valid: false,
                reason: rejection.tag(),
            },
        }
    }
}
