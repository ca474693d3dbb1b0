//! Telemetry ingestion: submission validation and the per-match sink.
//!
//! Accepted submissions are appended to a per-match JSONL file, one
//! timestamped line per submission:
//!
//! ```text
//! <RFC3339-nanosecond UTC timestamp><space><wire JSON>\n
//! ```
//!
//! Telemetry durability is the primary contract: after a successful sink
//! append the service enqueues a `match_finalized` outbox event, but an
//! enqueue failure is logged and never fails ingestion.

pub mod loader;
pub mod wire;

use std::collections::HashMap;
use std::fs::OpenOptions;
use std::io::Write;
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, SecondsFormat, Utc};
use thiserror::Error;
use tracing::{info, warn};

use crate::crypto::{self, PUBLIC_KEY_LEN};
use crate::fs_atomic::{self, FsAtomicError};
use crate::outbox::{Event, Outbox};
pub use wire::{
    CounterValue, Histogram, PlayerAggregates, QuantileBundle, SubmitMatchAggregatesRequest,
    TELEMETRY_SCHEMA_ID,
};

/// Environment variable naming the telemetry sink directory.
pub const ENV_TELEMETRY_DIR: &str = "MATCHWARDEN_TELEMETRY_DIR";
/// Environment variable enabling server-signature enforcement (`1`).
pub const ENV_REQUIRE_SERVER_SIG: &str = "MATCHWARDEN_REQUIRE_TELEMETRY_SERVER_SIG";
/// Environment variable with allowed server keys
/// (`keyId:base64pub,keyId:base64pub`).
pub const ENV_SERVER_PUBKEYS: &str = "MATCHWARDEN_TELEMETRY_SERVER_PUBKEYS";
/// Environment variable naming the outbox directory.
pub const ENV_OUTBOX_DIR: &str = "MATCHWARDEN_OUTBOX_DIR";
/// Environment variable naming this server instance (event id component).
pub const ENV_INSTANCE_ID: &str = "MATCHWARDEN_SERVER_INSTANCE_ID";
/// Environment variable restricting enqueue to explicit finalize
/// submissions (`1`) once the wire schema supports the flag.
pub const ENV_FINALIZE_ONLY: &str = "MATCHWARDEN_OUTBOX_ON_FINALIZE_ONLY";

const DEFAULT_TELEMETRY_DIR: &str = "./.matchwarden/telemetry";
const DEFAULT_OUTBOX_DIR: &str = "./.matchwarden/outbox";
const DEFAULT_INSTANCE_ID: &str = "dev";

/// Errors from telemetry service construction or internal failures.
///
/// Submission *rejections* are not errors; they come back as
/// [`SubmitOutcome`] with a stable reason tag.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// The sink directory cannot be created.
    #[error("telemetry sink dir: {0}")]
    SinkDir(#[from] FsAtomicError),

    /// An allowed-server-keys entry is malformed.
    #[error("bad server key entry {entry:?}: {detail}")]
    BadServerKey {
        /// The offending `keyId:base64pub` entry.
        entry: String,
        /// What was wrong with it.
        detail: String,
    },

    /// Serializing the accepted request for the sink failed.
    #[error("marshal telemetry: {0}")]
    Marshal(#[source] serde_json::Error),

    /// Appending to the sink file failed.
    #[error("write telemetry sink {}: {source}", path.display())]
    SinkWrite {
        /// Sink file path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

/// Result of one submission: accepted into the sink, or rejected with a
/// stable reason tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitOutcome {
    /// Whether the submission was persisted.
    pub accepted: bool,
    /// `"ok"` on acceptance, otherwise a stable rejection tag.
    pub reason: String,
}

impl SubmitOutcome {
    fn accepted() -> Self {
        Self {
            accepted: true,
            reason: "ok".to_string(),
        }
    }

    fn rejected(reason: impl Into<String>) -> Self {
        Self {
            accepted: false,
            reason: reason.into(),
        }
    }
}

/// Telemetry service configuration.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Directory holding per-match sink files.
    pub sink_dir: PathBuf,
    /// Outbox root for `match_finalized` events.
    pub outbox_dir: PathBuf,
    /// Whether submissions must carry a valid server signature.
    pub require_signature: bool,
    /// Allowed server public keys, keyed by key id.
    pub allowed_server_keys: HashMap<String, [u8; PUBLIC_KEY_LEN]>,
    /// Instance label folded into event ids.
    pub instance_id: String,
    /// When set, suppress enqueue until the wire schema carries a real
    /// finalize flag; today every accepted submission enqueues.
    pub enqueue_on_finalize_only: bool,
}

impl TelemetryConfig {
    /// Builds a configuration from `MATCHWARDEN_*` environment
    /// variables, with dev-friendly defaults.
    ///
    /// # Errors
    ///
    /// Returns [`TelemetryError::BadServerKey`] if the allowed-keys
    /// variable is malformed.
    pub fn from_env() -> Result<Self, TelemetryError> {
        let sink_dir = std::env::var(ENV_TELEMETRY_DIR)
            .unwrap_or_else(|_| DEFAULT_TELEMETRY_DIR.to_string());
        let outbox_dir =
            std::env::var(ENV_OUTBOX_DIR).unwrap_or_else(|_| DEFAULT_OUTBOX_DIR.to_string());
        let instance_id =
            std::env::var(ENV_INSTANCE_ID).unwrap_or_else(|_| DEFAULT_INSTANCE_ID.to_string());

        Ok(Self {
            sink_dir: sink_dir.into(),
            outbox_dir: outbox_dir.into(),
            require_signature: env_flag(ENV_REQUIRE_SERVER_SIG),
            allowed_server_keys: parse_allowed_server_keys(
                &std::env::var(ENV_SERVER_PUBKEYS).unwrap_or_default(),
            )?,
            instance_id,
            enqueue_on_finalize_only: env_flag(ENV_FINALIZE_ONLY),
        })
    }
}

fn env_flag(name: &str) -> bool {
    std::env::var(name).as_deref() == Ok("1")
}

/// Parses `keyId:base64pub,keyId:base64pub` into a key map.
///
/// # Errors
///
/// Returns [`TelemetryError::BadServerKey`] for entries without a colon,
/// with invalid base64, or with a key that is not 32 bytes.
pub fn parse_allowed_server_keys(
    raw: &str,
) -> Result<HashMap<String, [u8; PUBLIC_KEY_LEN]>, TelemetryError> {
    let mut keys = HashMap::new();
    for entry in raw.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        let Some((key_id, b64)) = entry.split_once(':') else {
            return Err(TelemetryError::BadServerKey {
                entry: entry.to_string(),
                detail: "want keyId:base64pub".to_string(),
            });
        };
        let decoded =
            STANDARD
                .decode(b64.trim())
                .map_err(|e| TelemetryError::BadServerKey {
                    entry: entry.to_string(),
                    detail: e.to_string(),
                })?;
        let public: [u8; PUBLIC_KEY_LEN] =
            decoded
                .as_slice()
                .try_into()
                .map_err(|_| TelemetryError::BadServerKey {
                    entry: entry.to_string(),
                    detail: format!("key length {} (want {PUBLIC_KEY_LEN})", decoded.len()),
                })?;
        keys.insert(key_id.trim().to_string(), public);
    }
    Ok(keys)
}

/// Replaces every run of characters outside `[A-Za-z0-9._-]` with a
/// single `_`; an empty input becomes `"empty"`.
///
/// Idempotent on its own output; characters already in the safe set are
/// preserved bitwise.
#[must_use]
pub fn sanitize_match_id(raw: &str) -> String {
    if raw.is_empty() {
        return "empty".to_string();
    }
    let mut out = String::with_capacity(raw.len());
    let mut in_run = false;
    for c in raw.chars() {
        if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
            out.push(c);
            in_run = false;
        } else if !in_run {
            out.push('_');
            in_run = true;
        }
    }
    out
}

/// Sink file path for a match inside `sink_dir`.
#[must_use]
pub fn sink_path(sink_dir: &Path, match_id: &str) -> PathBuf {
    sink_dir.join(format!("match_{}.jsonl", sanitize_match_id(match_id)))
}

/// Validates submissions, appends them to the per-match sink, and
/// enqueues finalize events.
#[derive(Debug)]
pub struct TelemetryService {
    config: TelemetryConfig,
    outbox: Outbox,
}

impl TelemetryService {
    /// Creates the service, ensuring the sink directory exists with
    /// restrictive permissions.
    ///
    /// # Errors
    ///
    /// Returns [`TelemetryError::SinkDir`] if the sink directory cannot
    /// be created.
    pub fn new(config: TelemetryConfig) -> Result<Self, TelemetryError> {
        fs_atomic::ensure_dir(&config.sink_dir)?;
        let outbox = Outbox::new(&config.outbox_dir);
        Ok(Self { config, outbox })
    }

    /// Validates and persists one submission.
    ///
    /// The acceptance checks run in a fixed order; the first failure
    /// produces `accepted=false` with its stable tag. Acceptance means
    /// the submission line is durably appended to the sink. Outbox
    /// enqueue happens after the append and its failure does not fail
    /// the submission.
    ///
    /// # Errors
    ///
    /// Returns [`TelemetryError`] only for internal failures
    /// (serialization, sink I/O) — never for rejected input.
    pub fn submit(
        &self,
        request: &SubmitMatchAggregatesRequest,
        now: DateTime<Utc>,
    ) -> Result<SubmitOutcome, TelemetryError> {
        if let Some(reason) = self.validate(request)? {
            return Ok(SubmitOutcome::rejected(reason));
        }

        self.append_to_sink(request, now)?;

        // Today every accepted submission is treated as the finalize
        // moment; the toggle narrows this once the wire schema grows a
        // real finalize flag.
        if !self.config.enqueue_on_finalize_only {
            let event = Event::match_finalized(&self.config.instance_id, &request.match_id, now);
            if let Err(e) = self.outbox.enqueue(&event) {
                // Telemetry is already durable; never fail ingestion here.
                warn!(match_id = %request.match_id, error = %e, "outbox enqueue failed");
            }
        }

        Ok(SubmitOutcome::accepted())
    }

    /// Runs the ordered acceptance checks; `Some(tag)` is a rejection.
    fn validate(
        &self,
        request: &SubmitMatchAggregatesRequest,
    ) -> Result<Option<String>, TelemetryError> {
        if request.match_id.is_empty() {
            return Ok(Some("missing_match_id".to_string()));
        }
        if request.game_build_id.is_empty() {
            return Ok(Some("missing_game_build_id".to_string()));
        }
        if request.players.is_empty() {
            return Ok(Some("missing_players".to_string()));
        }

        // Optional signature enforcement (deployment decides auth).
        if self.config.require_signature {
            let Some(envelope) = &request.server_signature else {
                return Ok(Some("missing_server_signature".to_string()));
            };
            if envelope.payload.is_empty() || envelope.signature.is_empty() {
                return Ok(Some("missing_server_signature".to_string()));
            }
            let Some(public) = self.config.allowed_server_keys.get(&envelope.key_id) else {
                return Ok(Some("unknown_server_key_id".to_string()));
            };

            let canonical = request
                .canonical_unsigned()
                .map_err(TelemetryError::Marshal)?;
            if canonical != envelope.payload {
                return Ok(Some("server_signature_payload_mismatch".to_string()));
            }
            if !crypto::verify(public, &envelope.payload, &envelope.signature) {
                return Ok(Some("bad_server_signature".to_string()));
            }
        }

        for (i, player) in request.players.iter().enumerate() {
            let Some(session_ref) = &player.session_ref else {
                return Ok(Some(format!("player_{i}_missing_ref")));
            };
            if !session_ref.match_id.is_empty() && session_ref.match_id != request.match_id {
                return Ok(Some("ref_match_id_mismatch".to_string()));
            }
            if player.telemetry_schema_id != TELEMETRY_SCHEMA_ID {
                return Ok(Some("schema_id_mismatch".to_string()));
            }
            for histogram in &player.histograms {
                if histogram.bucket_count != 0
                    && histogram.bucket_count as usize != histogram.buckets.len()
                {
                    return Ok(Some("histogram_bucket_count_mismatch".to_string()));
                }
            }
        }

        Ok(None)
    }

    fn append_to_sink(
        &self,
        request: &SubmitMatchAggregatesRequest,
        now: DateTime<Utc>,
    ) -> Result<(), TelemetryError> {
        let path = sink_path(&self.config.sink_dir, &request.match_id);

        let json = serde_json::to_vec(request).map_err(TelemetryError::Marshal)?;

        // One line, one write.
        let mut line =
            Vec::with_capacity(json.len() + 36);
        line.extend_from_slice(now.to_rfc3339_opts(SecondsFormat::Nanos, true).as_bytes());
        line.push(b' ');
        line.extend_from_slice(&json);
        line.push(b'\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .mode(0o600)
            .open(&path)
            .map_err(|source| TelemetryError::SinkWrite {
                path: path.clone(),
                source,
            })?;
        file.write_all(&line)
            .map_err(|source| TelemetryError::SinkWrite {
                path: path.clone(),
                source,
            })?;

        info!(match_id = %request.match_id, players = request.players.len(), "telemetry appended");
        Ok(())
    }
}
