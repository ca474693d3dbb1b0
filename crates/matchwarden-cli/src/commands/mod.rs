//! Subcommand implementations.

pub mod issue_key;
pub mod retention;
pub mod worker;

use std::path::PathBuf;

/// Command failure split by exit-code class.
#[derive(Debug)]
pub enum CliError {
    /// Invalid configuration: exit code 2.
    Config(String),
    /// Runtime failure: exit code 1.
    Runtime(anyhow::Error),
}

impl From<anyhow::Error> for CliError {
    fn from(error: anyhow::Error) -> Self {
        Self::Runtime(error)
    }
}

/// Returns `./.matchwarden` when it exists under the current directory,
/// the conventional dev root.
#[must_use]
pub fn default_root() -> Option<PathBuf> {
    let candidate = std::env::current_dir().ok()?.join(".matchwarden");
    candidate.is_dir().then_some(candidate)
}

/// Clap value parser for humantime-style durations (`30s`, `5m`).
pub fn parse_duration(raw: &str) -> Result<std::time::Duration, String> {
    humantime::parse_duration(raw).map_err(|e| e.to_string())
}
