//! matchwarden - trust-and-telemetry pipeline tools.
//!
//! Subcommands:
//! - `worker`: claim `match_finalized` events from the outbox and apply
//!   them to longitudinal risk state.
//! - `retention`: prune sink, ledger, marker, outbox, and player-state
//!   artefacts by content age.
//! - `issue-key`: load or create the signing key and print its public
//!   half.
//!
//! Exit codes: 0 success, 1 runtime failure, 2 invalid configuration.

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

mod commands;

use commands::CliError;

/// matchwarden - trust-and-telemetry pipeline tools
#[derive(Parser, Debug)]
#[command(name = "matchwarden")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the risk worker loop
    Worker(commands::worker::WorkerArgs),

    /// Prune aged pipeline artefacts
    Retention(commands::retention::RetentionArgs),

    /// Load or create the signing key and print its public half
    IssueKey(commands::issue_key::IssueKeyArgs),
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = EnvFilter::try_new(&cli.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    let result = match cli.command {
        Commands::Worker(args) => commands::worker::run(args),
        Commands::Retention(args) => commands::retention::run(&args),
        Commands::IssueKey(args) => commands::issue_key::run(&args),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(CliError::Config(message)) => {
            eprintln!("error: {message}");
            ExitCode::from(2)
        },
        Err(CliError::Runtime(error)) => {
            eprintln!("fatal: {error:#}");
            ExitCode::from(1)
        },
    }
}
