//! Maps one player's per-match aggregates into a bounded risk
//! contribution.
//!
//! This does not make enforcement decisions; it produces the bounded
//! signal that longitudinal scoring folds in.

use chrono::{DateTime, Utc};
use thiserror::Error;

use super::mapping::MappingConfig;
use super::scoring::{soft_score, z_score};
use super::MatchRisk;
use crate::telemetry::wire::PlayerAggregates;

/// Errors mapping a player's aggregates.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MapError {
    /// The player entry has no session ref.
    #[error("missing session ref")]
    MissingSessionRef,

    /// The session ref has no player id.
    #[error("missing player_id")]
    MissingPlayerId,

    /// The player's schema id differs from the configured guardrail.
    #[error("telemetry schema mismatch: got {got:?} want {want:?}")]
    SchemaMismatch {
        /// Schema the player reported.
        got: String,
        /// Schema the config expects.
        want: String,
    },
}

/// Converts one player's aggregates into a [`MatchRisk`] at `at`.
///
/// Counter rules read `counter / normalization` (non-positive
/// normalization reads raw) weighted and soft-capped. Quantile rules
/// z-score the selected percentile against the configured baseline; a
/// missing bundle skips the rule, a missing counter reads as zero.
/// Higher-than-baseline is suspicious by default; invert a signal by
/// negating its mean/weight in config rather than special-casing here.
///
/// # Errors
///
/// Returns [`MapError`] for a missing ref/player id or a schema
/// mismatch when the guardrail is configured.
pub fn map_aggregates_to_match_risk(
    player: &PlayerAggregates,
    cfg: &MappingConfig,
    at: DateTime<Utc>,
) -> Result<MatchRisk, MapError> {
    let session_ref = player
        .session_ref
        .as_ref()
        .ok_or(MapError::MissingSessionRef)?;
    if session_ref.player_id.is_empty() {
        return Err(MapError::MissingPlayerId);
    }

    // Schema guardrail: refuse to mix meanings across schema versions.
    if !cfg.expected_schema_id.is_empty() && player.telemetry_schema_id != cfg.expected_schema_id {
        return Err(MapError::SchemaMismatch {
            got: player.telemetry_schema_id.clone(),
            want: cfg.expected_schema_id.clone(),
        });
    }

    let per_cap = if cfg.per_signal_cap > 0.0 {
        cfg.per_signal_cap
    } else {
        1.0
    };

    let mut total = 0.0;

    for (name, rule) in &cfg.counters {
        #[allow(clippy::cast_precision_loss)]
        let mut raw = player.counter(name) as f64;
        if rule.normalization > 0.0 {
            raw /= rule.normalization;
        }
        total += soft_score(raw * rule.weight, per_cap);
    }

    for (name, rule) in &cfg.quantiles {
        let Some(bundle) = player.quantile_bundle(name) else {
            continue;
        };
        let z = z_score(rule.pctl.select(bundle), rule.mean, rule.std);
        total += soft_score(z * rule.weight, per_cap);
    }

    Ok(MatchRisk {
        player_id: session_ref.player_id.clone(),
        value: total,
        at,
    })
}
