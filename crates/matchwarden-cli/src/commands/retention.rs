//! The retention subcommand.

use std::path::PathBuf;

use chrono::{TimeDelta, Utc};
use clap::Args;
use matchwarden_core::retention::{self, RetentionConfig};
use tracing::info;

use super::{CliError, default_root};

/// Retention sweep flags.
#[derive(Args, Debug)]
pub struct RetentionArgs {
    /// Path to the .matchwarden root; auto-discovered from the current
    /// directory when present
    #[arg(long)]
    root: Option<PathBuf>,

    /// Retention window in days
    #[arg(long, default_value_t = 60)]
    days: i64,

    /// Log-only mode; pass --dry-run=false to actually delete
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set, num_args = 0..=1, default_missing_value = "true")]
    dry_run: bool,

    /// Also prune risk/players/ state by LastUpdate
    #[arg(long)]
    prune_players: bool,
}

/// Runs one retention sweep.
///
/// # Errors
///
/// Returns [`CliError::Config`] when no root can be determined or the
/// window is not positive.
pub fn run(args: &RetentionArgs) -> Result<(), CliError> {
    let Some(root) = args.root.clone().or_else(default_root) else {
        return Err(CliError::Config(
            "could not determine .matchwarden root. Run from the directory holding \
             ./.matchwarden, or pass --root /path/to/.matchwarden"
                .to_string(),
        ));
    };
    if args.days <= 0 {
        return Err(CliError::Config(
            "--days must be > 0 (e.g. 60 for two months)".to_string(),
        ));
    }

    let now = Utc::now();
    let cutoff = now - TimeDelta::days(args.days);

    info!(
        root = %root.display(),
        days = args.days,
        cutoff = %cutoff,
        dry_run = args.dry_run,
        prune_players = args.prune_players,
        "retention sweep starting"
    );

    let totals = retention::run(&RetentionConfig {
        root,
        cutoff,
        dry_run: args.dry_run,
        prune_players: args.prune_players,
    });

    info!(
        files_deleted = totals.files_deleted,
        dirs_deleted = totals.dirs_deleted,
        dry_run = args.dry_run,
        "retention sweep done"
    );
    Ok(())
}
