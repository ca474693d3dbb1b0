//! Replay loader for per-match sink files.
//!
//! Yields `(timestamp, submission)` pairs in file (append) order, which
//! is what keeps longitudinal decay monotone within a match. Blank lines
//! are skipped; a line without a parseable timestamp prefix or with
//! malformed JSON is a hard error — the sink is machine-written and a
//! broken line means the file cannot be trusted for scoring.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use thiserror::Error;

use super::sink_path;
use super::wire::SubmitMatchAggregatesRequest;

/// One replayed sink line.
#[derive(Debug, Clone)]
pub struct TelemetryLine {
    /// Ingestion timestamp from the line prefix.
    pub at: DateTime<Utc>,
    /// The original submission.
    pub request: SubmitMatchAggregatesRequest,
}

/// Errors from sink replay.
#[derive(Debug, Error)]
pub enum LoaderError {
    /// A match id is required to resolve the sink path.
    #[error("match id is required")]
    MissingMatchId,

    /// The sink file cannot be opened or read.
    #[error("open telemetry sink {}: {source}", path.display())]
    Open {
        /// Sink file path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A line has no `<timestamp><space><json>` shape.
    #[error("telemetry line {line_no} in {}: missing timestamp prefix", path.display())]
    MissingTimestamp {
        /// Sink file path.
        path: PathBuf,
        /// 1-based line number.
        line_no: usize,
    },

    /// A line's timestamp prefix does not parse as RFC 3339.
    #[error("telemetry line {line_no} in {}: bad timestamp {ts:?}", path.display())]
    BadTimestamp {
        /// Sink file path.
        path: PathBuf,
        /// 1-based line number.
        line_no: usize,
        /// The unparseable prefix.
        ts: String,
    },

    /// A line's JSON body does not decode as a submission.
    #[error("telemetry line {line_no} in {}: {source}", path.display())]
    BadLine {
        /// Sink file path.
        path: PathBuf,
        /// 1-based line number.
        line_no: usize,
        /// Underlying JSON error.
        #[source]
        source: serde_json::Error,
    },
}

/// Whether a loader error means the sink file simply does not exist.
#[must_use]
pub fn is_sink_missing(err: &LoaderError) -> bool {
    matches!(
        err,
        LoaderError::Open { source, .. } if source.kind() == std::io::ErrorKind::NotFound
    )
}

/// Loads every submission line for `match_id` from `telemetry_dir`, in
/// file order.
///
/// # Errors
///
/// Returns [`LoaderError`] for a missing/unreadable sink or any
/// malformed line.
pub fn load_match_lines(
    telemetry_dir: &Path,
    match_id: &str,
) -> Result<Vec<TelemetryLine>, LoaderError> {
    if match_id.is_empty() {
        return Err(LoaderError::MissingMatchId);
    }

    let path = sink_path(telemetry_dir, match_id);
    let file = File::open(&path).map_err(|source| LoaderError::Open {
        path: path.clone(),
        source,
    })?;

    let mut lines = Vec::new();
    for (idx, line) in BufReader::new(file).lines().enumerate() {
        let line_no = idx + 1;
        let line = line.map_err(|source| LoaderError::Open {
            path: path.clone(),
            source,
        })?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        // Format: "<RFC3339Nano> <JSON>"
        let Some((ts, json)) = line.split_once(' ') else {
            return Err(LoaderError::MissingTimestamp {
                path: path.clone(),
                line_no,
            });
        };
        if ts.is_empty() || json.is_empty() {
            return Err(LoaderError::MissingTimestamp {
                path: path.clone(),
                line_no,
            });
        }

        let at = DateTime::parse_from_rfc3339(ts)
            .map_err(|_| LoaderError::BadTimestamp {
                path: path.clone(),
                line_no,
                ts: ts.to_string(),
            })?
            .with_timezone(&Utc);

        let request =
            serde_json::from_str(json).map_err(|source| LoaderError::BadLine {
                path: path.clone(),
                line_no,
                source,
            })?;

        lines.push(TelemetryLine { at, request });
    }

    Ok(lines)
}
