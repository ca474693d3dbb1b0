//! Longitudinal risk scoring: bounded per-match signal mapping, decayed
//! accumulation, idempotent application, and the audit ledger.
//!
//! The pipeline produces a risk score only. Nothing in this module makes
//! enforcement decisions or gates players.

pub mod applied;
pub mod handler;
pub mod ledger;
pub mod mapper;
pub mod mapping;
pub mod scoring;
pub mod store;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use applied::AppliedStore;
pub use handler::{RiskHandler, RiskHandlerConfig};
pub use ledger::LedgerLine;
pub use mapper::map_aggregates_to_match_risk;
pub use mapping::MappingConfig;
pub use scoring::{ScoringConfig, apply_match_risk, soft_score, z_score};
pub use store::{FileRiskStore, RiskStore};

/// Longitudinal risk state for one player.
///
/// Invariant: `0 ≤ total_risk ≤ risk_cap`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskState {
    /// Player identifier.
    #[serde(rename = "PlayerID")]
    pub player_id: String,
    /// Accumulated, decayed risk.
    #[serde(rename = "TotalRisk")]
    pub total_risk: f64,
    /// When the state last changed; decay counts from here.
    #[serde(rename = "LastUpdate")]
    pub last_update: DateTime<Utc>,
}

impl RiskState {
    /// A fresh zero state anchored at `at`.
    #[must_use]
    pub fn zero(player_id: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self {
            player_id: player_id.into(),
            total_risk: 0.0,
            last_update: at,
        }
    }
}

/// Risk contribution from a single match, before longitudinal folding.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchRisk {
    /// Player identifier.
    pub player_id: String,
    /// Bounded per-match contribution (≥ 0).
    pub value: f64,
    /// Submission timestamp the contribution derives from.
    pub at: DateTime<Utc>,
}
