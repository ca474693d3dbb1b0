//! The issue-key subcommand: bootstrap or inspect the signing key.

use std::path::PathBuf;

use anyhow::Context;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use clap::Args;
use matchwarden_core::crypto::SignerIdentity;

use super::CliError;

/// Signing key flags.
#[derive(Args, Debug)]
pub struct IssueKeyArgs {
    /// Keystore record path
    #[arg(long, default_value = "./.matchwarden/dev_signing_key.json")]
    key_path: PathBuf,
}

/// Loads or creates the signing key and prints its public half in the
/// `keyId:base64pub` form the telemetry allowlist consumes.
///
/// # Errors
///
/// Returns [`CliError::Runtime`] if the keystore cannot be loaded or
/// created.
pub fn run(args: &IssueKeyArgs) -> Result<(), CliError> {
    let signer = SignerIdentity::from_keystore(&args.key_path)
        .with_context(|| format!("keystore at {}", args.key_path.display()))?;

    println!(
        "{}:{}",
        signer.key_id(),
        STANDARD.encode(signer.public_bytes())
    );
    Ok(())
}
