//! Time-based retention: prunes the sink, ledger, markers, outbox
//! terminals, and (optionally) player state by age.
//!
//! Selection is driven by *content* timestamps wherever the artefact
//! carries one, so a backup/restore or filesystem copy that rewrites
//! mtimes cannot trigger mass deletion. Only the applied markers — tiny
//! files whose retention is pure space reclamation after the ledger
//! prune — fall back to mtime.
//!
//! Policy throughout: data we cannot interpret is never deleted and
//! never auto-corrected; unparseable artefacts are logged and skipped.
//! In dry-run mode no pass mutates the filesystem and no pass counts a
//! deletion.
//!
//! Per-pass errors are surfaced to the log and the sweep continues with
//! the next target.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate, TimeDelta, Utc};
use serde::Deserialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::risk::RiskState;

/// Retention sweep configuration.
#[derive(Debug, Clone)]
pub struct RetentionConfig {
    /// Root directory holding `telemetry/`, `outbox/`, and `risk/`.
    pub root: PathBuf,
    /// Everything strictly older than this is eligible for deletion.
    pub cutoff: DateTime<Utc>,
    /// Log-only mode: nothing is deleted, nothing is counted.
    pub dry_run: bool,
    /// Whether to include `risk/players/` in the sweep.
    pub prune_players: bool,
}

/// What one sweep removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepTotals {
    /// Files removed.
    pub files_deleted: u64,
    /// Directories removed (day shards and emptied subdirectories).
    pub dirs_deleted: u64,
}

impl SweepTotals {
    fn add(&mut self, other: Self) {
        self.files_deleted += other.files_deleted;
        self.dirs_deleted += other.dirs_deleted;
    }
}

/// Errors inside a single retention pass.
#[derive(Debug, Error)]
pub enum RetentionError {
    /// Directory listing or file I/O failed.
    #[error("retention I/O at {}: {source}", path.display())]
    Io {
        /// Path involved in the failure.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

impl RetentionError {
    fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

// Lenient view of an outbox event: retention only needs created_at, and
// a file missing it must be skipped rather than rejected.
#[derive(Debug, Deserialize)]
struct StoredEventStamp {
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
}

/// Runs every retention pass under `config.root`.
///
/// Pass failures are logged and do not stop the sweep.
pub fn run(config: &RetentionConfig) -> SweepTotals {
    let mut totals = SweepTotals::default();

    let passes: [(&str, PassResult); 4] = [
        (
            "telemetry",
            prune_telemetry(&config.root.join("telemetry"), config),
        ),
        (
            "ledger",
            prune_ledger_days(&config.root.join("risk").join("ledger"), config),
        ),
        (
            "applied",
            prune_applied_markers(&config.root.join("risk").join("applied"), config),
        ),
        ("outbox", prune_outbox_terminals(&config.root.join("outbox"), config)),
    ];
    for (pass, result) in passes {
        match result {
            Ok(sub) => totals.add(sub),
            Err(e) => warn!(pass, error = %e, "retention pass failed"),
        }
    }

    if config.prune_players {
        match prune_player_states(&config.root.join("risk").join("players"), config) {
            Ok(sub) => totals.add(sub),
            Err(e) => warn!(pass = "players", error = %e, "retention pass failed"),
        }
    }

    totals
}

type PassResult = Result<SweepTotals, RetentionError>;

/// Deletes `match_*.jsonl` sink files whose *last* parseable line
/// timestamp is older than the cutoff. Files where no timestamp ever
/// parses are skipped.
fn prune_telemetry(dir: &Path, config: &RetentionConfig) -> PassResult {
    let mut totals = SweepTotals::default();
    let Some(entries) = read_dir_if_present(dir)? else {
        return Ok(totals);
    };

    for entry in entries {
        let path = entry.path();
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if path.is_dir() || !name.starts_with("match_") || !name.ends_with(".jsonl") {
            continue;
        }

        let last = last_line_timestamp(&path)?;
        let Some(last) = last else {
            info!(path = %path.display(), "skip telemetry (no parseable timestamp)");
            continue;
        };

        if last < config.cutoff {
            totals.files_deleted += remove_file(&path, config.dry_run, "telemetry")?;
        }
    }

    totals.dirs_deleted += remove_empty_dirs(dir, config.dry_run)?;
    Ok(totals)
}

/// Removes whole `YYYY-MM-DD` ledger day directories once the day has
/// fully ended before the cutoff. Non-date directories are ignored.
fn prune_ledger_days(ledger_root: &Path, config: &RetentionConfig) -> PassResult {
    let mut totals = SweepTotals::default();
    let Some(entries) = read_dir_if_present(ledger_root)? else {
        return Ok(totals);
    };

    for entry in entries {
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        let name = entry.file_name();
        let Ok(day) = NaiveDate::parse_from_str(&name.to_string_lossy(), "%Y-%m-%d") else {
            continue;
        };

        // The shard is prunable only once its entire day ended before
        // the cutoff.
        let day_end = day
            .and_hms_opt(0, 0, 0)
            .map(|midnight| midnight.and_utc() + TimeDelta::hours(24));
        let Some(day_end) = day_end else { continue };

        if day_end < config.cutoff {
            if config.dry_run {
                info!(path = %path.display(), "DRY delete ledger day");
                continue;
            }
            fs::remove_dir_all(&path).map_err(|e| RetentionError::io(&path, e))?;
            info!(path = %path.display(), "deleted ledger day");
            totals.dirs_deleted += 1;
        }
    }

    Ok(totals)
}

/// Deletes `*.ok` markers older than the cutoff by mtime.
fn prune_applied_markers(dir: &Path, config: &RetentionConfig) -> PassResult {
    let mut totals = SweepTotals::default();
    let Some(entries) = read_dir_if_present(dir)? else {
        return Ok(totals);
    };

    for entry in entries {
        let path = entry.path();
        if path.is_dir() || !path.extension().is_some_and(|e| e == "ok") {
            continue;
        }

        let modified = entry
            .metadata()
            .and_then(|m| m.modified())
            .map_err(|e| RetentionError::io(&path, e))?;
        if DateTime::<Utc>::from(modified) < config.cutoff {
            totals.files_deleted += remove_file(&path, config.dry_run, "applied marker")?;
        }
    }

    totals.dirs_deleted += remove_empty_dirs(dir, config.dry_run)?;
    Ok(totals)
}

/// Prunes `done/` and `failed/` event files by embedded `created_at`,
/// plus `failed/` reason sidecars via their paired JSON. Never touches
/// `pending/` or `processing/`.
fn prune_outbox_terminals(outbox_root: &Path, config: &RetentionConfig) -> PassResult {
    let mut totals = SweepTotals::default();

    for sub in ["done", "failed"] {
        let dir = outbox_root.join(sub);
        totals.add(prune_outbox_events(&dir, config)?);
        if sub == "failed" {
            totals.add(prune_failed_sidecars(&dir, config)?);
        }
        totals.dirs_deleted += remove_empty_dirs(&dir, config.dry_run)?;
    }

    Ok(totals)
}

fn prune_outbox_events(dir: &Path, config: &RetentionConfig) -> PassResult {
    let mut totals = SweepTotals::default();
    let Some(entries) = read_dir_if_present(dir)? else {
        return Ok(totals);
    };

    let mut scanned = 0u64;
    let mut skipped = 0u64;

    for entry in entries {
        let path = entry.path();
        if path.is_dir() || !path.extension().is_some_and(|e| e == "json") {
            continue;
        }
        scanned += 1;

        let Some(created_at) = read_created_at(&path)? else {
            info!(path = %path.display(), "skip outbox event (missing or invalid created_at)");
            skipped += 1;
            continue;
        };

        if created_at < config.cutoff {
            totals.files_deleted += remove_file(&path, config.dry_run, "outbox event")?;
        }
    }

    info!(
        dir = %dir.display(),
        scanned,
        deleted = totals.files_deleted,
        skipped,
        "outbox retention pass"
    );
    Ok(totals)
}

/// A sidecar is deleted only when its paired `.json` exists, parses, and
/// carries a `created_at` older than the cutoff. Orphaned or ambiguous
/// sidecars are kept for the operator.
fn prune_failed_sidecars(dir: &Path, config: &RetentionConfig) -> PassResult {
    let mut totals = SweepTotals::default();
    let Some(entries) = read_dir_if_present(dir)? else {
        return Ok(totals);
    };

    for entry in entries {
        let path = entry.path();
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if path.is_dir() || !name.ends_with(".err.txt") {
            continue;
        }

        let paired_name = name.trim_end_matches(".err.txt");
        if !paired_name.ends_with(".json") {
            info!(path = %path.display(), "skip outbox sidecar (unexpected name)");
            continue;
        }
        let paired = dir.join(paired_name);
        if !paired.exists() {
            info!(path = %path.display(), "skip outbox sidecar (missing paired json)");
            continue;
        }

        let Some(created_at) = read_created_at(&paired)? else {
            info!(path = %path.display(), "skip outbox sidecar (paired json has no created_at)");
            continue;
        };

        if created_at < config.cutoff {
            totals.files_deleted += remove_file(&path, config.dry_run, "outbox sidecar")?;
        }
    }

    Ok(totals)
}

/// Deletes player state files whose `LastUpdate` is older than the
/// cutoff. Unparseable state is skipped.
fn prune_player_states(dir: &Path, config: &RetentionConfig) -> PassResult {
    let mut totals = SweepTotals::default();
    let Some(entries) = read_dir_if_present(dir)? else {
        return Ok(totals);
    };

    for entry in entries {
        let path = entry.path();
        if path.is_dir() || !path.extension().is_some_and(|e| e == "json") {
            continue;
        }

        let bytes = fs::read(&path).map_err(|e| RetentionError::io(&path, e))?;
        let Ok(state) = serde_json::from_slice::<RiskState>(&bytes) else {
            info!(path = %path.display(), "skip unparseable player state");
            continue;
        };

        if state.last_update < config.cutoff {
            totals.files_deleted += remove_file(&path, config.dry_run, "player state")?;
        }
    }

    totals.dirs_deleted += remove_empty_dirs(dir, config.dry_run)?;
    Ok(totals)
}

// ---------------------------------------------------------------------------
// Shared helpers
// ---------------------------------------------------------------------------

/// Returns the last successfully parsed line-prefix timestamp of a sink
/// file, if any line had one.
fn last_line_timestamp(path: &Path) -> Result<Option<DateTime<Utc>>, RetentionError> {
    let content = fs::read_to_string(path).map_err(|e| RetentionError::io(path, e))?;

    let mut last = None;
    for line in content.lines() {
        let Some((ts, _)) = line.split_once(' ') else {
            continue;
        };
        if let Ok(at) = DateTime::parse_from_rfc3339(ts) {
            last = Some(at.with_timezone(&Utc));
        }
    }
    Ok(last)
}

fn read_created_at(path: &Path) -> Result<Option<DateTime<Utc>>, RetentionError> {
    let bytes = fs::read(path).map_err(|e| RetentionError::io(path, e))?;
    match serde_json::from_slice::<StoredEventStamp>(&bytes) {
        Ok(stamp) => Ok(stamp.created_at),
        Err(_) => Ok(None),
    }
}

fn read_dir_if_present(dir: &Path) -> Result<Option<Vec<fs::DirEntry>>, RetentionError> {
    match fs::read_dir(dir) {
        Ok(entries) => {
            let collected: Result<Vec<_>, _> = entries.collect();
            collected
                .map(Some)
                .map_err(|e| RetentionError::io(dir, e))
        },
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(RetentionError::io(dir, e)),
    }
}

fn remove_file(path: &Path, dry_run: bool, what: &str) -> Result<u64, RetentionError> {
    if dry_run {
        info!(path = %path.display(), "DRY delete {what}");
        return Ok(0);
    }
    fs::remove_file(path).map_err(|e| RetentionError::io(path, e))?;
    info!(path = %path.display(), "deleted {what}");
    Ok(1)
}

/// Removes now-empty subdirectories bottom-up, never `root` itself.
fn remove_empty_dirs(root: &Path, dry_run: bool) -> Result<u64, RetentionError> {
    if !root.is_dir() {
        return Ok(0);
    }

    let mut dirs = Vec::new();
    collect_dirs(root, &mut dirs)?;

    let mut deleted = 0;
    // Children sort after parents in collection order; walk in reverse.
    for dir in dirs.iter().rev() {
        if dir == root {
            continue;
        }
        let count = fs::read_dir(dir)
            .map_err(|e| RetentionError::io(dir, e))?
            .count();
        if count != 0 {
            continue;
        }
        if dry_run {
            info!(path = %dir.display(), "DRY delete empty dir");
            continue;
        }
        fs::remove_dir(dir).map_err(|e| RetentionError::io(dir, e))?;
        info!(path = %dir.display(), "deleted empty dir");
        deleted += 1;
    }

    Ok(deleted)
}

fn collect_dirs(dir: &Path, out: &mut Vec<PathBuf>) -> Result<(), RetentionError> {
    out.push(dir.to_path_buf());
    let entries = fs::read_dir(dir).map_err(|e| RetentionError::io(dir, e))?;
    for entry in entries {
        let entry = entry.map_err(|e| RetentionError::io(dir, e))?;
        let path = entry.path();
        if path.is_dir() {
            collect_dirs(&path, out)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use chrono::SecondsFormat;
    use tempfile::TempDir;

    use super::*;
    use crate::outbox::{Event, Outbox};
    use crate::risk::ledger::{self, LedgerLine};

    fn config(root: &Path, cutoff: DateTime<Utc>) -> RetentionConfig {
        RetentionConfig {
            root: root.to_path_buf(),
            cutoff,
            dry_run: false,
            prune_players: false,
        }
    }

    fn write_sink_line(root: &Path, match_id: &str, at: DateTime<Utc>) {
        let dir = root.join("telemetry");
        fs::create_dir_all(&dir).unwrap();
        let line = format!(
            "{} {{\"match_id\":\"{match_id}\"}}\n",
            at.to_rfc3339_opts(SecondsFormat::Nanos, true)
        );
        fs::write(dir.join(format!("match_{match_id}.jsonl")), line).unwrap();
    }

    fn snapshot(root: &Path) -> BTreeMap<PathBuf, Vec<u8>> {
        let mut out = BTreeMap::new();
        let mut stack = vec![root.to_path_buf()];
        while let Some(dir) = stack.pop() {
            for entry in fs::read_dir(&dir).unwrap() {
                let path = entry.unwrap().path();
                if path.is_dir() {
                    out.insert(path.clone(), Vec::new());
                    stack.push(path);
                } else {
                    out.insert(path.clone(), fs::read(&path).unwrap());
                }
            }
        }
        out
    }

    #[test]
    fn sink_pruned_by_last_line_timestamp_boundary() {
        let tmp = TempDir::new().unwrap();
        let cutoff = Utc::now();
        write_sink_line(tmp.path(), "A", cutoff - TimeDelta::nanoseconds(1));
        write_sink_line(tmp.path(), "B", cutoff + TimeDelta::nanoseconds(1));

        let totals = run(&config(tmp.path(), cutoff));

        assert_eq!(totals.files_deleted, 1);
        let dir = tmp.path().join("telemetry");
        assert!(!dir.join("match_A.jsonl").exists());
        assert!(dir.join("match_B.jsonl").exists());
        // The walk root itself survives even when emptied of old files.
        assert!(dir.is_dir());
    }

    #[test]
    fn sink_without_timestamps_is_skipped() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("telemetry");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("match_X.jsonl"), b"garbage line\nanother\n").unwrap();

        let totals = run(&config(tmp.path(), Utc::now()));

        assert_eq!(totals.files_deleted, 0);
        assert!(dir.join("match_X.jsonl").exists());
    }

    #[test]
    fn last_timestamp_wins_over_earlier_lines() {
        let tmp = TempDir::new().unwrap();
        let cutoff = Utc::now();
        let dir = tmp.path().join("telemetry");
        fs::create_dir_all(&dir).unwrap();
        // Old first line, fresh last line: the file stays.
        let content = format!(
            "{} {{}}\nnot a timestamp line\n{} {{}}\n",
            (cutoff - TimeDelta::days(90)).to_rfc3339(),
            (cutoff + TimeDelta::hours(1)).to_rfc3339(),
        );
        fs::write(dir.join("match_M.jsonl"), content).unwrap();

        run(&config(tmp.path(), cutoff));
        assert!(dir.join("match_M.jsonl").exists());
    }

    #[test]
    fn ledger_days_prune_once_the_day_has_ended() {
        let tmp = TempDir::new().unwrap();
        let cutoff = Utc::now();

        let old = cutoff - TimeDelta::days(40);
        let fresh = cutoff - TimeDelta::hours(1);
        for at in [old, fresh] {
            ledger::append_match_line(
                &tmp.path().join("risk"),
                &LedgerLine {
                    match_id: "M".to_string(),
                    at,
                    players: BTreeMap::new(),
                },
            )
            .unwrap();
        }

        let totals = run(&config(tmp.path(), cutoff));

        let ledger_root = tmp.path().join("risk").join("ledger");
        let old_day = old.date_naive().format("%Y-%m-%d").to_string();
        let fresh_day = fresh.date_naive().format("%Y-%m-%d").to_string();
        assert!(!ledger_root.join(old_day).exists());
        assert!(ledger_root.join(fresh_day).exists());
        assert_eq!(totals.dirs_deleted, 1);
    }

    #[test]
    fn non_date_ledger_dirs_are_ignored() {
        let tmp = TempDir::new().unwrap();
        let stray = tmp.path().join("risk").join("ledger").join("notes");
        fs::create_dir_all(&stray).unwrap();
        fs::write(stray.join("keep.txt"), b"x").unwrap();

        run(&config(tmp.path(), Utc::now() + TimeDelta::days(365)));

        assert!(stray.join("keep.txt").exists());
    }

    #[test]
    fn outbox_terminal_events_prune_by_created_at_only() {
        let tmp = TempDir::new().unwrap();
        let cutoff = Utc::now();
        let outbox = Outbox::new(tmp.path().join("outbox"));
        outbox.ensure().unwrap();

        let old = Event::match_finalized("dev", "OLD", cutoff - TimeDelta::days(90));
        let fresh = Event::match_finalized("dev", "NEW", cutoff - TimeDelta::hours(1));
        let stale_pending = Event::match_finalized("dev", "PEND", cutoff - TimeDelta::days(90));

        // Old and fresh land in done/; the stale one stays pending.
        for (event, dir) in [(&old, "done"), (&fresh, "done")] {
            let path = tmp
                .path()
                .join("outbox")
                .join(dir)
                .join(format!("{}.json", event.id));
            fs::write(&path, serde_json::to_vec(event).unwrap()).unwrap();
        }
        outbox.enqueue(&stale_pending).unwrap();

        // A failed event with its sidecar, old enough to prune.
        let failed = Event::match_finalized("dev", "FAIL", cutoff - TimeDelta::days(90));
        let failed_json = tmp
            .path()
            .join("outbox")
            .join("failed")
            .join(format!("{}.json", failed.id));
        fs::write(&failed_json, serde_json::to_vec(&failed).unwrap()).unwrap();
        let sidecar = tmp
            .path()
            .join("outbox")
            .join("failed")
            .join(format!("{}.json.err.txt", failed.id));
        fs::write(&sidecar, b"boom\n").unwrap();

        // And one event with no created_at: skipped.
        let opaque = tmp.path().join("outbox").join("done").join("opaque.json");
        fs::write(&opaque, br#"{"id":"x","type":"match_finalized"}"#).unwrap();

        run(&config(tmp.path(), cutoff));

        let done = tmp.path().join("outbox").join("done");
        assert!(!done.join(format!("{}.json", old.id)).exists());
        assert!(done.join(format!("{}.json", fresh.id)).exists());
        assert!(done.join("opaque.json").exists());

        assert!(!failed_json.exists());
        assert!(!sidecar.exists());

        // pending/ is never touched.
        assert_eq!(
            fs::read_dir(tmp.path().join("outbox").join("pending"))
                .unwrap()
                .count(),
            1
        );
    }

    #[test]
    fn orphan_sidecar_is_kept() {
        let tmp = TempDir::new().unwrap();
        let failed = tmp.path().join("outbox").join("failed");
        fs::create_dir_all(&failed).unwrap();
        fs::write(failed.join("gone.json.err.txt"), b"reason\n").unwrap();

        run(&config(tmp.path(), Utc::now() + TimeDelta::days(365)));

        assert!(failed.join("gone.json.err.txt").exists());
    }

    #[test]
    fn player_states_prune_by_last_update_when_enabled() {
        let tmp = TempDir::new().unwrap();
        let cutoff = Utc::now();
        let players = tmp.path().join("risk").join("players");
        fs::create_dir_all(&players).unwrap();

        let old = RiskState {
            player_id: "OLD".to_string(),
            total_risk: 1.0,
            last_update: cutoff - TimeDelta::days(90),
        };
        let fresh = RiskState {
            player_id: "NEW".to_string(),
            total_risk: 1.0,
            last_update: cutoff + TimeDelta::hours(1),
        };
        for state in [&old, &fresh] {
            fs::write(
                players.join(format!("{}.json", state.player_id)),
                serde_json::to_vec(state).unwrap(),
            )
            .unwrap();
        }
        fs::write(players.join("corrupt.json"), b"{oops").unwrap();

        // Disabled by default.
        let mut cfg = config(tmp.path(), cutoff);
        run(&cfg);
        assert!(players.join("OLD.json").exists());

        cfg.prune_players = true;
        run(&cfg);
        assert!(!players.join("OLD.json").exists());
        assert!(players.join("NEW.json").exists());
        assert!(players.join("corrupt.json").exists());
    }

    #[test]
    fn applied_markers_prune_by_mtime() {
        let tmp = TempDir::new().unwrap();
        let applied = tmp.path().join("risk").join("applied");
        fs::create_dir_all(&applied).unwrap();
        fs::write(applied.join("M1.ok"), b"ok\n").unwrap();

        // Fresh marker survives a past cutoff...
        run(&config(tmp.path(), Utc::now() - TimeDelta::days(1)));
        assert!(applied.join("M1.ok").exists());

        // ...and falls to a future cutoff.
        run(&config(tmp.path(), Utc::now() + TimeDelta::days(1)));
        assert!(!applied.join("M1.ok").exists());
    }

    #[test]
    fn dry_run_neither_mutates_nor_counts() {
        let tmp = TempDir::new().unwrap();
        let cutoff = Utc::now();

        // Populate every target with prunable content.
        write_sink_line(tmp.path(), "A", cutoff - TimeDelta::days(90));
        ledger::append_match_line(
            &tmp.path().join("risk"),
            &LedgerLine {
                match_id: "M".to_string(),
                at: cutoff - TimeDelta::days(90),
                players: BTreeMap::new(),
            },
        )
        .unwrap();
        let failed = tmp.path().join("outbox").join("failed");
        fs::create_dir_all(&failed).unwrap();
        let event = Event::match_finalized("dev", "F", cutoff - TimeDelta::days(90));
        fs::write(
            failed.join(format!("{}.json", event.id)),
            serde_json::to_vec(&event).unwrap(),
        )
        .unwrap();
        fs::write(failed.join(format!("{}.json.err.txt", event.id)), b"r\n").unwrap();
        let players = tmp.path().join("risk").join("players");
        fs::create_dir_all(&players).unwrap();
        fs::write(
            players.join("P.json"),
            serde_json::to_vec(&RiskState {
                player_id: "P".to_string(),
                total_risk: 0.0,
                last_update: cutoff - TimeDelta::days(90),
            })
            .unwrap(),
        )
        .unwrap();

        let before = snapshot(tmp.path());
        let totals = run(&RetentionConfig {
            root: tmp.path().to_path_buf(),
            cutoff,
            dry_run: true,
            prune_players: true,
        });

        assert_eq!(totals, SweepTotals::default());
        assert_eq!(snapshot(tmp.path()), before);
    }

    #[test]
    fn emptied_subdirectories_are_removed_bottom_up() {
        let tmp = TempDir::new().unwrap();
        let nested = tmp.path().join("telemetry").join("a").join("b");
        fs::create_dir_all(&nested).unwrap();

        let totals = run(&config(tmp.path(), Utc::now()));

        assert!(!tmp.path().join("telemetry").join("a").exists());
        assert!(tmp.path().join("telemetry").is_dir());
        assert_eq!(totals.dirs_deleted, 2);
    }
}
