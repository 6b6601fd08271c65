use crate::commands::Out;
use crate::model::LedgerLayout;
use crate::{Config, Result};
use anyhow::Context;
use std::path::Path;

/// Creates the data directory, its subdirectories and:
/// - Creates an initial `config.json` file naming the spreadsheet, the form, the ledger tab and its
///   layout, along with default range names and item ids
/// - Copies `secret_file` into its default location in the data dir.
///
/// # Arguments
/// - `ledger_home` - The directory that will be the root of data directory, e.g. `$HOME/ledger`
/// - `secret_file` - The downloaded OAuth 2.0 client credentials JSON needed to start the Google
///   OAuth workflow.
/// - `sheet_url` - The URL of the spreadsheet that holds the ledger and the reference ranges.
/// - `form_id` - The id of the Google Form whose submissions are recorded.
/// - `ledger_sheet_id` - The stable id of the ledger tab (the `gid` in the sheet's URL).
///
/// # Errors
/// - Returns an error if the URL is not a spreadsheet URL or any file operations fail.
pub async fn init(
    ledger_home: &Path,
    secret_file: &Path,
    sheet_url: &str,
    form_id: &str,
    ledger_sheet_id: i64,
    layout: LedgerLayout,
) -> Result<Out<()>> {
    let config = Config::create(
        ledger_home,
        secret_file,
        sheet_url,
        form_id,
        ledger_sheet_id,
        layout,
    )
    .await
    .context("Unable to create the data directory and configs")?;
    Ok(format!(
        "Created the ledger directory at '{}', run 'ledger auth' next",
        config.root().display()
    )
    .into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_init() {
        let dir = TempDir::new().unwrap();
        let secret = dir.path().join("secret.json");
        std::fs::write(&secret, "{}").unwrap();
        let home = dir.path().join("ledger");

        let out = init(
            &home,
            &secret,
            "https://docs.google.com/spreadsheets/d/abc123/edit#gid=0",
            "form-1",
            7,
            LedgerLayout::Split,
        )
        .await
        .unwrap();
        assert!(out.message().contains("ledger auth"));

        let config = Config::load(&home).await.unwrap();
        assert_eq!(config.spreadsheet_id(), "abc123");
        assert_eq!(config.ledger_sheet_id(), 7);
        assert_eq!(config.layout(), LedgerLayout::Split);

        assert!(init(&home, &secret, "https://example.com", "form-1", 7, LedgerLayout::Unified)
            .await
            .is_err());
    }
}
