//! Records Google Form submissions as rows of a Google Sheets ledger and keeps the form's choice
//! lists in sync with reference ranges maintained in the same spreadsheet.

mod api;
pub mod args;
pub mod commands;
mod config;
mod error;
pub mod model;
mod options;
mod recorder;
mod server;
mod utils;

pub use api::{AppendedRow, ChoiceWidget, Mode, TEST_MODE_ENV};
pub use config::{BeneficiaryRule, Config, ItemIds, RangeNames, WebhookConfig};
pub use error::{Error, Result};
pub use options::{RefreshedItem, SyncReport};
pub use recorder::{Outcome, RecordReport};
