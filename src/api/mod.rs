//! Seams to the two external services, the spreadsheet and the form.
//!
//! Each service is a small async trait with a Google implementation and an in-memory test
//! implementation. Which one is used is decided by `Mode`, so the whole program can run
//! top-to-bottom without touching Google.

mod files;
mod form;
mod form_test_client;
mod oauth;
mod sheet;
pub(crate) mod sheet_test_client;
mod workbook;

use crate::model::CellRange;
use crate::{Config, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

pub(crate) use oauth::TokenProvider;
pub use workbook::AppendedRow;
pub(crate) use workbook::Workbook;

#[cfg(test)]
pub(crate) use form_test_client::{TestForm, TestFormState};
#[cfg(test)]
pub(crate) use sheet_test_client::{TestSheet, TestSheetState};

/// The scopes that the stored token must carry: the ledger is written through the Sheets API and
/// the choices are replaced through the Forms API.
pub(crate) const OAUTH_SCOPES: &[&str] = &[
    "https://www.googleapis.com/auth/spreadsheets",
    "https://www.googleapis.com/auth/forms.body",
];

/// Set this environment variable to run against the in-memory services.
pub const TEST_MODE_ENV: &str = "LEDGER_IN_TEST_MODE";

/// Selects the implementation of the service traits.
#[derive(Debug, Default, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    #[default]
    Google,
    Testing,
}

serde_plain::derive_display_from_serialize!(Mode);

impl Mode {
    /// `Testing` when `LEDGER_IN_TEST_MODE` is set to anything other than empty, `0` or `false`.
    pub fn from_env() -> Self {
        match std::env::var(TEST_MODE_ENV) {
            Ok(value) if !matches!(value.trim(), "" | "0" | "false") => Mode::Testing,
            _ => Mode::Google,
        }
    }
}

/// The properties of one tab of the spreadsheet.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub(crate) struct SheetProps {
    pub(crate) title: String,
    pub(crate) row_count: u32,
    pub(crate) column_count: u32,
}

/// Values to be written into an A1 range.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub(crate) struct SheetRange {
    pub(crate) range: String,
    pub(crate) values: Vec<Vec<String>>,
}

impl SheetRange {
    pub(crate) fn new(range: impl Into<String>, values: Vec<Vec<String>>) -> Self {
        Self {
            range: range.into(),
            values,
        }
    }
}

/// The spreadsheet operations that the handlers need.
#[async_trait::async_trait]
pub(crate) trait Sheet {
    /// The properties of the tab whose stable id is `sheet_id`.
    async fn sheet(&mut self, sheet_id: i64) -> Result<SheetProps>;

    /// Resolves the named range `name`. `None` when the spreadsheet has no such range.
    async fn named_range(&mut self, name: &str) -> Result<Option<CellRange>>;

    /// Reads `range`, given in A1 notation or as the name of a named range. Like the Sheets API,
    /// trailing empty cells and rows are not returned.
    async fn get(&mut self, range: &str) -> Result<Vec<Vec<String>>>;

    /// Writes literal values, interpreted as if a user had typed them.
    async fn write_ranges(&mut self, data: &[SheetRange]) -> Result<()>;

    /// Appends `count` blank rows to the bottom of the tab `sheet_id`.
    async fn insert_rows(&mut self, sheet_id: i64, count: u32) -> Result<()>;
}

/// How a choice question presents its options.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChoiceWidget {
    DropDown,
    Radio,
}

serde_plain::derive_display_from_serialize!(ChoiceWidget);

/// The form operations that the synchronizer needs.
#[async_trait::async_trait]
pub(crate) trait Form {
    /// Replaces every choice of the item `item_id` with `choices`, in order.
    async fn set_choices(
        &mut self,
        item_id: u64,
        widget: ChoiceWidget,
        choices: &[String],
    ) -> Result<()>;
}

/// Acquires a handle to the spreadsheet named in `config`.
pub(crate) async fn sheet(config: &Config, mode: Mode) -> Result<Box<dyn Sheet + Send>> {
    debug!("Opening spreadsheet {} in {mode} mode", config.spreadsheet_id());
    match mode {
        Mode::Google => {
            let token_provider = TokenProvider::load(config).await?;
            Ok(Box::new(
                sheet::GoogleSheet::new(config.clone(), token_provider).await?,
            ))
        }
        Mode::Testing => Ok(Box::new(sheet_test_client::TestSheet::new(
            config.spreadsheet_id(),
        ))),
    }
}

/// Acquires a handle to the form named in `config`.
pub(crate) async fn form(config: &Config, mode: Mode) -> Result<Box<dyn Form + Send>> {
    debug!("Opening form {} in {mode} mode", config.form_id());
    match mode {
        Mode::Google => {
            let token_provider = TokenProvider::load(config).await?;
            Ok(Box::new(form::GoogleForm::new(
                config.form_id(),
                token_provider,
            )))
        }
        Mode::Testing => Ok(Box::new(form_test_client::TestForm::new(config.form_id()))),
    }
}

/// Builds the HTTP client used for the REST calls that the `sheets` crate does not cover.
pub(crate) fn http_client() -> Result<reqwest::Client> {
    use anyhow::Context;
    reqwest::Client::builder()
        .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("Unable to build the HTTP client")
}
