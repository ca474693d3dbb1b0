//! Mapping configuration: how telemetry turns into per-match risk.
//!
//! All values are server-controlled and live in a JSON config file in
//! deployment. The statistical baselines here are population parameters,
//! not enforcement thresholds.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::telemetry::wire::QuantileBundle;

/// Percentile selector for quantile rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[allow(missing_docs)]
pub enum Percentile {
    #[serde(rename = "p50")]
    P50,
    #[serde(rename = "p75")]
    P75,
    #[serde(rename = "p90")]
    P90,
    #[serde(rename = "p95")]
    P95,
    #[serde(rename = "p99")]
    P99,
}

impl Percentile {
    /// Reads the selected percentile out of a bundle.
    #[must_use]
    pub const fn select(self, bundle: &QuantileBundle) -> f64 {
        match self {
            Self::P50 => bundle.p50,
            Self::P75 => bundle.p75,
            Self::P90 => bundle.p90,
            Self::P95 => bundle.p95,
            Self::P99 => bundle.p99,
        }
    }
}

/// Maps a per-match counter into a risk contribution.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CounterRule {
    /// Signal weight.
    pub weight: f64,
    /// Optional normalization: the counter is divided by this to read as
    /// "per unit". Values ≤ 0 disable normalization. Per-minute
    /// normalization in the game server is preferred; this keeps the
    /// mapping stable across match lengths either way.
    #[serde(default)]
    pub normalization: f64,
}

/// Maps a percentile observation against a statistical baseline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuantileRule {
    /// Signal weight.
    pub weight: f64,
    /// Which percentile of the bundle to read.
    pub pctl: Percentile,
    /// Population mean for that percentile.
    #[serde(default)]
    pub mean: f64,
    /// Population standard deviation; ≤ 0 zeroes the signal.
    #[serde(default)]
    pub std: f64,
}

/// Full telemetry→risk mapping configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MappingConfig {
    /// Schema guardrail: players reporting a different schema are
    /// rejected. Empty disables the check.
    #[serde(default)]
    pub expected_schema_id: String,
    /// Saturation cap applied to every individual signal contribution.
    #[serde(default)]
    pub per_signal_cap: f64,
    /// Counter rules by counter name.
    #[serde(default)]
    pub counters: BTreeMap<String, CounterRule>,
    /// Quantile rules by bundle name.
    #[serde(default)]
    pub quantiles: BTreeMap<String, QuantileRule>,
}

/// Errors loading a mapping configuration.
#[derive(Debug, Error)]
pub enum MappingConfigError {
    /// The file cannot be read.
    #[error("read mapping config {}: {source}", path.display())]
    Read {
        /// Config path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The file is not a valid mapping config.
    #[error("parse mapping config {}: {source}", path.display())]
    Parse {
        /// Config path.
        path: PathBuf,
        /// Underlying JSON error.
        #[source]
        source: serde_json::Error,
    },
}

impl MappingConfig {
    /// Loads a mapping config from a JSON file, applying defaults:
    /// a non-positive `per_signal_cap` becomes 1.0.
    ///
    /// # Errors
    ///
    /// Returns [`MappingConfigError`] for unreadable or malformed files,
    /// including unknown percentile keys in quantile rules.
    pub fn load(path: &Path) -> Result<Self, MappingConfigError> {
        let bytes = std::fs::read(path).map_err(|source| MappingConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut cfg: Self =
            serde_json::from_slice(&bytes).map_err(|source| MappingConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        if cfg.per_signal_cap <= 0.0 {
            cfg.per_signal_cap = 1.0;
        }
        Ok(cfg)
    }
}
