//! Append-only, day-sharded audit ledger of per-match risk
//! contributions.
//!
//! One line per successful application, appended to
//! `<risk_root>/ledger/<YYYY-MM-DD>/ledger.jsonl` where the day is the
//! UTC date of the line's `at` timestamp.

use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::io::Write;
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::fs_atomic::{self, FsAtomicError};

/// Ledger file name inside each day directory.
pub const LEDGER_FILE: &str = "ledger.jsonl";

/// One applied match: per-player match-risk values as last observed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerLine {
    /// Match identifier.
    pub match_id: String,
    /// Timestamp of the last telemetry line that fed this application.
    pub at: DateTime<Utc>,
    /// Per-player match-risk values.
    pub players: BTreeMap<String, f64>,
}

/// Errors appending to the ledger.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// The day directory cannot be created.
    #[error("ledger day dir: {0}")]
    Dir(#[from] FsAtomicError),

    /// The line cannot be serialized.
    #[error("encode ledger line: {0}")]
    Encode(#[source] serde_json::Error),

    /// The append itself failed.
    #[error("append ledger {}: {source}", path.display())]
    Append {
        /// Ledger file path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

/// Appends `line` to the day-sharded ledger under `risk_root`.
///
/// # Errors
///
/// Returns [`LedgerError`] if the day directory or the append fails.
pub fn append_match_line(risk_root: &Path, line: &LedgerLine) -> Result<(), LedgerError> {
    let day = line.at.date_naive().format("%Y-%m-%d").to_string();
    let dir = risk_root.join("ledger").join(day);
    fs_atomic::ensure_dir(&dir)?;

    let path = dir.join(LEDGER_FILE);

    let mut bytes = serde_json::to_vec(line).map_err(LedgerError::Encode)?;
    bytes.push(b'\n');

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .mode(0o600)
        .open(&path)
        .map_err(|source| LedgerError::Append {
            path: path.clone(),
            source,
        })?;
    file.write_all(&bytes)
        .map_err(|source| LedgerError::Append { path, source })
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn lines_shard_by_utc_day_of_at() {
        let dir = TempDir::new().unwrap();
        let at = Utc.with_ymd_and_hms(2026, 3, 14, 23, 59, 58).unwrap();

        append_match_line(
            dir.path(),
            &LedgerLine {
                match_id: "M1".to_string(),
                at,
                players: BTreeMap::from([("P1".to_string(), 0.5)]),
            },
        )
        .unwrap();

        let path = dir.path().join("ledger").join("2026-03-14").join(LEDGER_FILE);
        let content = std::fs::read_to_string(path).unwrap();
        assert_eq!(content.lines().count(), 1);

        let parsed: LedgerLine = serde_json::from_str(content.trim()).unwrap();
        assert_eq!(parsed.match_id, "M1");
        assert!((parsed.players["P1"] - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn appends_accumulate_within_a_day() {
        let dir = TempDir::new().unwrap();
        let at = Utc.with_ymd_and_hms(2026, 3, 14, 10, 0, 0).unwrap();
        let line = LedgerLine {
            match_id: "M1".to_string(),
            at,
            players: BTreeMap::new(),
        };

        append_match_line(dir.path(), &line).unwrap();
        append_match_line(dir.path(), &line).unwrap();

        let path = dir.path().join("ledger").join("2026-03-14").join(LEDGER_FILE);
        assert_eq!(std::fs::read_to_string(path).unwrap().lines().count(), 2);
    }
}
