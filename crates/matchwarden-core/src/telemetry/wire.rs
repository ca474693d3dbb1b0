//! Wire types for per-match telemetry submissions.
//!
//! Field names follow the wire schema (snake_case); unset fields are
//! omitted on the wire. The request JSON appended to the sink is the
//! complete original submission.

use serde::{Deserialize, Serialize};

use crate::token::{SessionRef, SignedEnvelope};

/// Telemetry schema id expected from current game builds.
pub const TELEMETRY_SCHEMA_ID: &str = "matchwarden.telemetry.v1";

/// A named scalar counter aggregated over one match.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CounterValue {
    /// Counter name, e.g. `kills_per_minute`.
    pub name: String,
    /// Aggregated value.
    #[serde(default)]
    pub value: u64,
}

/// A named bundle of latency-style percentiles.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QuantileBundle {
    /// Bundle name, e.g. `shot_interval_ms`.
    pub name: String,
    /// 50th percentile.
    #[serde(default)]
    pub p50: f64,
    /// 75th percentile.
    #[serde(default)]
    pub p75: f64,
    /// 90th percentile.
    #[serde(default)]
    pub p90: f64,
    /// 95th percentile.
    #[serde(default)]
    pub p95: f64,
    /// 99th percentile.
    #[serde(default)]
    pub p99: f64,
}

/// A named histogram with explicit bucket counts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Histogram {
    /// Histogram name.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    /// Declared bucket count; when non-zero it must equal `buckets.len()`.
    #[serde(default)]
    pub bucket_count: u32,
    /// Per-bucket totals.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub buckets: Vec<u64>,
}

/// One player's aggregates for one match.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlayerAggregates {
    /// The session this player played under.
    #[serde(rename = "ref", default, skip_serializing_if = "Option::is_none")]
    pub session_ref: Option<SessionRef>,
    /// Schema id the game build produced these aggregates with.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub telemetry_schema_id: String,
    /// Named scalar counters.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub counters: Vec<CounterValue>,
    /// Named percentile bundles.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub quantiles: Vec<QuantileBundle>,
    /// Named histograms.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub histograms: Vec<Histogram>,
}

impl PlayerAggregates {
    /// Returns a counter value by name, 0 if missing.
    #[must_use]
    pub fn counter(&self, name: &str) -> u64 {
        self.counters
            .iter()
            .find(|c| c.name == name)
            .map_or(0, |c| c.value)
    }

    /// Returns a quantile bundle by name.
    #[must_use]
    pub fn quantile_bundle(&self, name: &str) -> Option<&QuantileBundle> {
        self.quantiles.iter().find(|q| q.name == name)
    }
}

/// A game server's end-of-match telemetry submission.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SubmitMatchAggregatesRequest {
    /// Match identifier.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub match_id: String,
    /// Build that produced the aggregates.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub game_build_id: String,
    /// Per-player aggregates.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub players: Vec<PlayerAggregates>,
    /// Optional server signature over the unsigned request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_signature: Option<SignedEnvelope>,
}

impl SubmitMatchAggregatesRequest {
    /// Canonical (JCS) bytes of this request with `server_signature`
    /// absent; the object server signatures are taken over.
    ///
    /// # Errors
    ///
    /// Returns the serialization error if canonical encoding fails.
    pub fn canonical_unsigned(&self) -> Result<Vec<u8>, serde_json::Error> {
        let mut unsigned = self.clone();
        unsigned.server_signature = None;
        serde_jcs::to_vec(&unsigned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counter_lookup_defaults_to_zero() {
        let player = PlayerAggregates {
            counters: vec![CounterValue {
                name: "kills_per_minute".to_string(),
                value: 7,
            }],
            ..PlayerAggregates::default()
        };

        assert_eq!(player.counter("kills_per_minute"), 7);
        assert_eq!(player.counter("headshot_ratio"), 0);
    }

    #[test]
    fn canonical_unsigned_strips_signature_and_is_stable() {
        let mut req = SubmitMatchAggregatesRequest {
            match_id: "M1".to_string(),
            game_build_id: "build-1".to_string(),
            ..SubmitMatchAggregatesRequest::default()
        };
        let unsigned = req.canonical_unsigned().unwrap();

        req.server_signature = Some(SignedEnvelope {
            key_id: "k".to_string(),
            payload: unsigned.clone(),
            signature: vec![1, 2, 3],
            signed_at: None,
        });

        assert_eq!(req.canonical_unsigned().unwrap(), unsigned);
    }

    #[test]
    fn wire_json_uses_snake_case_and_omits_unset() {
        let req = SubmitMatchAggregatesRequest {
            match_id: "M1".to_string(),
            game_build_id: "b".to_string(),
            players: vec![PlayerAggregates {
                session_ref: Some(crate::token::SessionRef {
                    session_id: "S".to_string(),
                    match_id: "M1".to_string(),
                    player_id: "P".to_string(),
                }),
                telemetry_schema_id: TELEMETRY_SCHEMA_ID.to_string(),
                ..PlayerAggregates::default()
            }],
            server_signature: None,
        };

        let json = serde_json::to_string(&req).unwrap();
        assert!(json.contains("\"match_id\":\"M1\""));
        assert!(json.contains("\"telemetry_schema_id\""));
        assert!(!json.contains("server_signature"));
        assert!(!json.contains("histograms"));
    }
}
