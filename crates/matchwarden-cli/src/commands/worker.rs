//! The risk worker subcommand.
//!
//! Wires the outbox worker to the risk handler under a current-thread
//! tokio runtime, with SIGINT/SIGTERM feeding a cancellation token.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use chrono::Utc;
use clap::Args;
use matchwarden_core::risk::{MappingConfig, RiskHandler, RiskHandlerConfig, ScoringConfig};
use matchwarden_core::telemetry::TELEMETRY_SCHEMA_ID;
use matchwarden_core::worker::{Worker, WorkerConfig};
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::{CliError, default_root, parse_duration};

/// Risk worker flags.
#[derive(Args, Debug)]
pub struct WorkerArgs {
    /// Path to the .matchwarden root (derives outbox/telemetry/risk and
    /// the default mapping config); auto-discovered from the current
    /// directory when present
    #[arg(long)]
    root: Option<PathBuf>,

    /// Outbox root directory
    #[arg(long)]
    outbox_dir: Option<PathBuf>,

    /// Telemetry sink directory
    #[arg(long)]
    telemetry_dir: Option<PathBuf>,

    /// Risk storage directory
    #[arg(long)]
    risk_dir: Option<PathBuf>,

    /// Risk mapping config JSON
    #[arg(long)]
    mapping_config: Option<PathBuf>,

    /// Risk decay factor per hour, in (0,1]
    #[arg(long, default_value_t = 0.999)]
    decay_factor: f64,

    /// Maximum longitudinal risk cap
    #[arg(long, default_value_t = 10.0)]
    risk_cap: f64,

    /// Grace window after finalize before processing (e.g. 30s)
    #[arg(long, default_value = "0s", value_parser = parse_duration)]
    finalize_grace: Duration,

    /// Poll interval (e.g. 1s)
    #[arg(long, default_value = "1s", value_parser = parse_duration)]
    poll_interval: Duration,

    /// Process a single event then exit
    #[arg(long)]
    once: bool,
}

struct ResolvedPaths {
    outbox_dir: PathBuf,
    telemetry_dir: PathBuf,
    risk_dir: PathBuf,
    mapping_config: PathBuf,
}

fn resolve_paths(args: &WorkerArgs) -> Result<ResolvedPaths, CliError> {
    let root = args.root.clone().or_else(default_root);

    let derive = |explicit: &Option<PathBuf>, leaf: &str| {
        explicit
            .clone()
            .or_else(|| root.as_ref().map(|r| r.join(leaf)))
    };

    let mapping_config = args.mapping_config.clone().or_else(|| {
        let root = root.as_ref()?;
        let dev = root.join("risk_mapping.dev.json");
        Some(if dev.exists() {
            dev
        } else {
            root.join("risk_mapping.example.json")
        })
    });

    match (
        derive(&args.outbox_dir, "outbox"),
        derive(&args.telemetry_dir, "telemetry"),
        derive(&args.risk_dir, "risk"),
        mapping_config,
    ) {
        (Some(outbox_dir), Some(telemetry_dir), Some(risk_dir), Some(mapping_config)) => {
            Ok(ResolvedPaths {
                outbox_dir,
                telemetry_dir,
                risk_dir,
                mapping_config,
            })
        },
        _ => Err(CliError::Config(
            "missing required paths. Provide --root <.matchwarden> OR set \
             --outbox-dir, --telemetry-dir, --risk-dir, --mapping-config"
                .to_string(),
        )),
    }
}

fn validate(args: &WorkerArgs) -> Result<(), CliError> {
    if args.decay_factor <= 0.0 || args.decay_factor > 1.0 {
        return Err(CliError::Config(
            "--decay-factor must be in (0,1]".to_string(),
        ));
    }
    if args.risk_cap <= 0.0 {
        return Err(CliError::Config("--risk-cap must be > 0".to_string()));
    }
    if args.poll_interval.is_zero() {
        return Err(CliError::Config("--poll-interval must be > 0".to_string()));
    }
    Ok(())
}

/// Runs the worker until cancelled (or once).
///
/// # Errors
///
/// Returns [`CliError::Config`] for invalid flags and
/// [`CliError::Runtime`] for startup or loop failures.
pub fn run(args: WorkerArgs) -> Result<(), CliError> {
    validate(&args)?;
    let paths = resolve_paths(&args)?;

    let mut mapping = MappingConfig::load(&paths.mapping_config)
        .map_err(|e| CliError::Config(e.to_string()))?;
    if mapping.expected_schema_id.is_empty() {
        mapping.expected_schema_id = TELEMETRY_SCHEMA_ID.to_string();
    }

    let handler = RiskHandler::new(RiskHandlerConfig {
        telemetry_dir: paths.telemetry_dir.clone(),
        risk_dir: paths.risk_dir.clone(),
        finalize_grace: args.finalize_grace,
        mapping,
        scoring: ScoringConfig {
            decay_factor: args.decay_factor,
            risk_cap: args.risk_cap,
        },
    })
    .context("initialize risk handler")?;

    let worker = Worker::new(WorkerConfig {
        outbox_dir: paths.outbox_dir.clone(),
        poll_interval: args.poll_interval,
        once: args.once,
    })
    .context("initialize worker")?;

    info!(
        once = args.once,
        poll = ?args.poll_interval,
        grace = ?args.finalize_grace,
        outbox = %paths.outbox_dir.display(),
        telemetry = %paths.telemetry_dir.display(),
        risk = %paths.risk_dir.display(),
        mapping = %paths.mapping_config.display(),
        "risk worker starting"
    );

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("build tokio runtime")?;

    runtime.block_on(async {
        let cancel = CancellationToken::new();
        spawn_signal_listener(cancel.clone());

        worker
            .run(cancel, |claimed, _cancel| {
                // One clock reading per invocation keeps the grace
                // window monotone across retries.
                let now = Utc::now();
                handler
                    .handle(claimed, now)
                    .map_err(matchwarden_core::worker::HandlerError::from)
            })
            .await
            .context("worker loop")
    })?;

    info!("exiting cleanly");
    Ok(())
}

fn spawn_signal_listener(cancel: CancellationToken) {
    tokio::spawn(async move {
        use tokio::signal::unix::{SignalKind, signal};

        let Ok(mut sigterm) = signal(SignalKind::terminate()) else {
            return;
        };
        let Ok(mut sigint) = signal(SignalKind::interrupt()) else {
            return;
        };

        tokio::select! {
            _ = sigterm.recv() => info!("received SIGTERM"),
            _ = sigint.recv() => info!("received SIGINT"),
        }
        cancel.cancel();
    });
}
