//! Authentication command handlers for OAuth flow.
//!
//! This module implements the CLI commands for:
//! - `ledger auth` - Initial OAuth consent flow
//! - `ledger auth --verify` - Verify and refresh authentication

use crate::api::TokenProvider;
use crate::commands::Out;
use crate::{Config, Result};
use anyhow::Context;

/// Handles the `ledger auth` command - runs the OAuth consent flow
///
/// This is the ONLY command that asks the user for consent in a browser. It prints the consent URL,
/// waits for Google to redirect back to a local listener and saves the tokens to `token.json` with
/// the Sheets and Forms scopes.
///
/// # Errors
/// Returns an error if OAuth flow fails or if client_secret.json is missing
pub async fn auth(config: &Config) -> Result<Out<()>> {
    let _ = TokenProvider::initialize(&config.client_secret_path(), &config.token_path()).await?;
    Ok(format!("Saved the OAuth token to '{}'", config.token_path().display()).into())
}

/// Handles the `ledger auth --verify` command - verifies authentication
///
/// This command NEVER starts an interactive OAuth flow. It checks that the stored token exists and
/// carries the required scopes, then refreshes it.
///
/// If the token is missing, invalid, or has the wrong scopes, this command will fail with an error
/// message telling the user to run `ledger auth`.
pub async fn auth_verify(config: &Config) -> Result<Out<()>> {
    let mut token_provider = TokenProvider::load(config).await.context(
        "Unable to use the existing tokens found in the token JSON file. \n\n\
        You should run 'ledger auth' (without the --verify flag).",
    )?;
    token_provider
        .refresh()
        .await
        .context("Unable to refresh the token")?;
    Ok(format!(
        "Your OAuth token is valid until {}",
        token_provider.expires_at().to_rfc3339()
    )
    .into())
}
