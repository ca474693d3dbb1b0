//! Tier tokens: canonical encoding, signing, and offline verification.
//!
//! A tier token is a short-lived signed attestation of a session's trust
//! level. The signature is taken over the *canonical payload*: the JCS
//! (RFC 8785) encoding of the token with its `signature` field absent.
//! That makes the payload the single authoritative object; the wrapper
//! fields exist for convenience and must byte-match the payload on
//! verification.
//!
//! # Canonical invariant
//!
//! For every token the signer produces:
//!
//! ```text
//! marshal(unmarshal(signature.payload)) == signature.payload
//! ```
//!
//! bit-for-bit. Verification enforces this before trusting any wrapper
//! field, so a token cannot smuggle divergent plaintext next to a valid
//! signature.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::crypto::{self, PUBLIC_KEY_LEN, SignerIdentity};

/// The session/match/player triple that tokens and telemetry refer to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRef {
    /// Opaque session identifier.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub session_id: String,
    /// Match identifier.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub match_id: String,
    /// Player identifier.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub player_id: String,
}

/// Trust tier attested by a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrustTier {
    /// Baseline tier: the session exists and was issued a token.
    #[serde(rename = "OPEN")]
    Open,
    /// Elevated tier backed by a platform integrity check.
    #[serde(rename = "VERIFIED")]
    Verified,
}

/// A detached signature over a canonical byte payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedEnvelope {
    /// Label of the key that produced the signature.
    pub key_id: String,
    /// The exact canonical bytes that were signed.
    #[serde(with = "b64")]
    pub payload: Vec<u8>,
    /// Ed25519 signature over `payload`.
    #[serde(with = "b64")]
    pub signature: Vec<u8>,
    /// When the signature was produced.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signed_at: Option<DateTime<Utc>>,
}

/// A signed attestation of a session's trust tier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TierToken {
    /// The session this token attests to.
    #[serde(rename = "ref")]
    pub session_ref: SessionRef,
    /// Attested trust tier.
    pub tier: TrustTier,
    /// SHA-256 of the session nonce.
    #[serde(default, with = "b64", skip_serializing_if = "Vec::is_empty")]
    pub nonce_hash: Vec<u8>,
    /// Issuance time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issued_at: Option<DateTime<Utc>>,
    /// Expiry time; tokens without one never verify.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    /// Signature envelope; absent in the canonical payload form.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<SignedEnvelope>,
}

/// Known public keys for offline verification, keyed by key id.
pub type PublicKeySet = HashMap<String, [u8; PUBLIC_KEY_LEN]>;

/// Errors while building or signing a token.
#[derive(Debug, Error)]
pub enum TokenError {
    /// Canonical serialization failed.
    #[error("token canonicalization failed: {0}")]
    Canonicalize(#[source] serde_json::Error),
}

/// Verification failure reasons.
///
/// Each variant's display form is the stable reason tag exposed to
/// callers; tags never change once shipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TokenRejection {
    /// No token was supplied.
    #[error("missing_token")]
    MissingToken,
    /// The token carries no signature envelope.
    #[error("missing_signature")]
    MissingSignature,
    /// The envelope is present but payload or signature bytes are empty.
    #[error("missing_signature_bytes")]
    MissingSignatureBytes,
    /// The envelope's key id is not in the provided keyset.
    #[error("unknown_key_id")]
    UnknownKeyId,
    /// The payload does not decode into a token.
    #[error("bad_payload")]
    BadPayload,
    /// The payload is not in canonical (signature-free, JCS) form.
    #[error("payload_not_canonical")]
    PayloadNotCanonical,
    /// Wrapper `ref` differs from the signed payload.
    #[error("ref_mismatch")]
    RefMismatch,
    /// Wrapper `tier` differs from the signed payload.
    #[error("tier_mismatch")]
    TierMismatch,
    /// Wrapper `nonce_hash` differs from the signed payload.
    #[error("nonce_hash_mismatch")]
    NonceHashMismatch,
    /// Wrapper `issued_at` differs from the signed payload.
    #[error("issued_at_mismatch")]
    IssuedAtMismatch,
    /// Wrapper `expires_at` differs from the signed payload.
    #[error("expires_at_mismatch")]
    ExpiresAtMismatch,
    /// The token has no expiry.
    #[error("missing_expires_at")]
    MissingExpiresAt,
    /// The token has expired.
    #[error("expired")]
    Expired,
    /// The signature does not verify over the payload.
    #[error("bad_signature")]
    BadSignature,
}

impl TokenRejection {
    /// The stable reason tag for this rejection.
    #[must_use]
    pub fn tag(&self) -> &'static str {
        match self {
            Self::MissingToken => "missing_token",
            Self::MissingSignature => "missing_signature",
            Self::MissingSignatureBytes => "missing_signature_bytes",
            Self::UnknownKeyId => "unknown_key_id",
            Self::BadPayload => "bad_payload",
            Self::PayloadNotCanonical => "payload_not_canonical",
            Self::RefMismatch => "ref_mismatch",
            Self::TierMismatch => "tier_mismatch",
            Self::NonceHashMismatch => "nonce_hash_mismatch",
            Self::IssuedAtMismatch => "issued_at_mismatch",
            Self::ExpiresAtMismatch => "expires_at_mismatch",
            Self::MissingExpiresAt => "missing_expires_at",
            Self::Expired => "expired",
            Self::BadSignature => "bad_signature",
        }
    }
}

/// Returns the canonical (signature-free, JCS) byte encoding of `token`.
///
/// # Errors
///
/// Returns [`TokenError::Canonicalize`] if serialization fails.
pub fn canonical_payload(token: &TierToken) -> Result<Vec<u8>, TokenError> {
    let mut unsigned = token.clone();
    unsigned.signature = None;
    serde_jcs::to_vec(&unsigned).map_err(TokenError::Canonicalize)
}

/// Signs `token` with `signer`, attaching a [`SignedEnvelope`] whose
/// payload is the canonical encoding of the signature-free token.
///
/// Any pre-existing signature on `token` is discarded.
///
/// # Errors
///
/// Returns [`TokenError`] if canonical serialization fails.
pub fn sign_tier_token(
    signer: &SignerIdentity,
    mut token: TierToken,
    signed_at: DateTime<Utc>,
) -> Result<TierToken, TokenError> {
    token.signature = None;
    let payload = canonical_payload(&token)?;
    let signature = signer.sign(&payload);

    token.signature = Some(SignedEnvelope {
        key_id: signer.key_id().to_string(),
        payload,
        signature,
        signed_at: Some(signed_at),
    });
    Ok(token)
}

/// Verifies a tier token without network calls.
///
/// Checks run in a fixed order and the first failure decides the reason:
/// envelope presence, key id, payload decode, canonical shape and
/// encoding, wrapper/payload field equality, expiry, and finally the
/// signature itself.
///
/// # Errors
///
/// Returns the [`TokenRejection`] for the first failing check.
pub fn verify_tier_token_offline(
    token: Option<&TierToken>,
    keys: &PublicKeySet,
    now: DateTime<Utc>,
) -> Result<(), TokenRejection> {
    let token = token.ok_or(TokenRejection::MissingToken)?;
    let envelope = token
        .signature
        .as_ref()
        .ok_or(TokenRejection::MissingSignature)?;
    if envelope.payload.is_empty() || envelope.signature.is_empty() {
        return Err(TokenRejection::MissingSignatureBytes);
    }

    let public = keys
        .get(&envelope.key_id)
        .ok_or(TokenRejection::UnknownKeyId)?;

    // Decode the signed payload.
    let signed: TierToken =
        serde_json::from_slice(&envelope.payload).map_err(|_| TokenRejection::BadPayload)?;

    // Canonical shape: the payload itself must be signature-free.
    if signed.signature.is_some() {
        return Err(TokenRejection::PayloadNotCanonical);
    }

    // Canonical encoding: re-marshalling must reproduce the payload
    // bit-for-bit.
    match canonical_payload(&signed) {
        Ok(canonical) if canonical == envelope.payload => {},
        _ => return Err(TokenRejection::PayloadNotCanonical),
    }

    // Wrapper fields must exactly match the signed payload fields.
    if token.session_ref != signed.session_ref {
        return Err(TokenRejection::RefMismatch);
    }
    if token.tier != signed.tier {
        return Err(TokenRejection::TierMismatch);
    }
    if token.nonce_hash != signed.nonce_hash {
        return Err(TokenRejection::NonceHashMismatch);
    }
    if token.issued_at != signed.issued_at {
        return Err(TokenRejection::IssuedAtMismatch);
    }
    if token.expires_at != signed.expires_at {
        return Err(TokenRejection::ExpiresAtMismatch);
    }

    // Expiry, against the caller-supplied clock.
    let expires_at = token.expires_at.ok_or(TokenRejection::MissingExpiresAt)?;
    if now > expires_at {
        return Err(TokenRejection::Expired);
    }

    if !crypto::verify(public, &envelope.payload, &envelope.signature) {
        return Err(TokenRejection::BadSignature);
    }

    Ok(())
}

/// Base64 (standard, padded) serde adapter for byte fields, matching the
/// wire convention for bytes-in-JSON.
mod b64 {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &Vec<u8>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        STANDARD.decode(s).map_err(serde::de::Error::custom)
    }
}
