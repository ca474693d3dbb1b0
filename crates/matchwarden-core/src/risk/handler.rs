//! The `match_finalized` handler: replay, map, fold, ledger, mark.
//!
//! Step order is load-bearing. The ledger append happens *before* the
//! applied marker is created: a crash between the two causes at most a
//! repeated ledger append on retry (observable in the audit log), never
//! a lost application. The applied marker then short-circuits every
//! later delivery of the same match, turning the outbox's at-least-once
//! into effectively-once.

use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use thiserror::Error;
use tracing::{debug, info};

use super::applied::{AppliedError, AppliedStore};
use super::ledger::{self, LedgerError, LedgerLine};
use super::mapper::{self, MapError};
use super::mapping::MappingConfig;
use super::scoring::{self, ScoringConfig};
use super::store::{FileRiskStore, RiskStore, StoreError};
use super::RiskState;
use crate::outbox::{Claimed, EVENT_MATCH_FINALIZED};
use crate::telemetry::loader::{self, LoaderError};
use crate::worker::Disposition;

/// Handler configuration.
#[derive(Debug, Clone)]
pub struct RiskHandlerConfig {
    /// Directory holding per-match sink files.
    pub telemetry_dir: PathBuf,
    /// Risk root; players/, applied/, and ledger/ live beneath it.
    pub risk_dir: PathBuf,
    /// Minimum age of a finalize event before it is applied; younger
    /// events are requeued. Absorbs late-arriving telemetry.
    pub finalize_grace: Duration,
    /// Telemetry→risk mapping.
    pub mapping: MappingConfig,
    /// Longitudinal scoring parameters.
    pub scoring: ScoringConfig,
}

/// Errors that fail the event (worker moves it to `failed/`).
#[derive(Debug, Error)]
pub enum RiskHandlerError {
    /// The sink for the match cannot be replayed.
    #[error("telemetry replay for match {match_id}: {source}")]
    Replay {
        /// Match id from the event.
        match_id: String,
        /// Underlying loader error.
        #[source]
        source: LoaderError,
    },

    /// A player's aggregates cannot be mapped.
    #[error("map player aggregates for match {match_id}: {source}")]
    Map {
        /// Match id from the event.
        match_id: String,
        /// Underlying mapping error.
        #[source]
        source: MapError,
    },

    /// Risk state load/save failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The ledger append failed.
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    /// The applied marker could not be checked or written.
    #[error(transparent)]
    Applied(#[from] AppliedError),
}

/// Applies finalized matches to longitudinal risk state.
pub struct RiskHandler {
    config: RiskHandlerConfig,
    store: FileRiskStore,
    applied: AppliedStore,
}

impl RiskHandler {
    /// Creates the handler, preparing the players directory.
    ///
    /// # Errors
    ///
    /// Returns [`RiskHandlerError::Store`] if the players directory
    /// cannot be created.
    pub fn new(config: RiskHandlerConfig) -> Result<Self, RiskHandlerError> {
        let store = FileRiskStore::new(config.risk_dir.join("players"))?;
        let applied = AppliedStore::new(config.risk_dir.join("applied"));
        Ok(Self {
            config,
            store,
            applied,
        })
    }

    /// Handles one claimed event with a single `now` for the whole
    /// invocation (keeps the grace window monotone across retries).
    ///
    /// # Errors
    ///
    /// Returns [`RiskHandlerError`] for failures in replay, mapping,
    /// state persistence, ledger, or marker steps; these fail the event.
    pub fn handle(
        &self,
        claimed: &Claimed,
        now: DateTime<Utc>,
    ) -> Result<Disposition, RiskHandlerError> {
        let event = &claimed.event;

        // Unknown event types are not ours to fail.
        if event.event_type != EVENT_MATCH_FINALIZED {
            info!(event = %event.id, event_type = %event.event_type, "skipping unsupported event type");
            return Ok(Disposition::Done);
        }

        // Grace window: the sink may still be in flux right after
        // finalize.
        if !self.config.finalize_grace.is_zero() {
            let grace = TimeDelta::from_std(self.config.finalize_grace)
                .unwrap_or_else(|_| TimeDelta::zero());
            let retry_at = event.created_at + grace;
            if now < retry_at {
                info!(
                    match_id = %event.match_id,
                    retry_at = %retry_at,
                    "inside grace window, retrying later"
                );
                return Ok(Disposition::RetryLater);
            }
        }

        // Idempotency: a marker means a previous delivery completed.
        if self.applied.is_applied(&event.match_id)? {
            info!(match_id = %event.match_id, "already applied, skipping");
            return Ok(Disposition::Done);
        }

        let lines = loader::load_match_lines(&self.config.telemetry_dir, &event.match_id)
            .map_err(|source| RiskHandlerError::Replay {
                match_id: event.match_id.clone(),
                source,
            })?;
        if lines.is_empty() {
            info!(match_id = %event.match_id, "empty sink, nothing to apply");
            return Ok(Disposition::Done);
        }

        let mut players = std::collections::BTreeMap::new();
        let mut last_at: Option<DateTime<Utc>> = None;
        let mut scored = 0usize;

        for line in &lines {
            last_at = Some(line.at);

            for player in &line.request.players {
                let match_risk =
                    mapper::map_aggregates_to_match_risk(player, &self.config.mapping, line.at)
                        .map_err(|source| RiskHandlerError::Map {
                            match_id: event.match_id.clone(),
                            source,
                        })?;

                // Ledger reflects the last submission's value per player.
                players.insert(match_risk.player_id.clone(), match_risk.value);

                let prev = self
                    .store
                    .load(&match_risk.player_id)?
                    .unwrap_or_else(|| RiskState::zero(&match_risk.player_id, match_risk.at));

                let next =
                    scoring::apply_match_risk(&prev, &match_risk, &self.config.scoring, match_risk.at);
                self.store.save(&next)?;

                debug!(
                    match_id = %event.match_id,
                    player = %match_risk.player_id,
                    match_risk = match_risk.value,
                    total_before = prev.total_risk,
                    total_after = next.total_risk,
                    "player scored"
                );
                scored += 1;
            }
        }

        // Ledger before marker: a crash in between repeats an append on
        // retry instead of losing the application.
        let at = last_at.unwrap_or(now);
        ledger::append_match_line(
            &self.config.risk_dir,
            &LedgerLine {
                match_id: event.match_id.clone(),
                at,
                players,
            },
        )?;

        self.applied.mark_applied(&event.match_id)?;

        info!(match_id = %event.match_id, players = scored, "match applied");
        Ok(Disposition::Done)
    }
}
