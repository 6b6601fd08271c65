//! These structs provide the CLI interface for the ledger CLI.

use crate::commands::SyncTarget;
use crate::config::DEFAULT_LEDGER_SHEET_ID;
use crate::model::{A1Range, LedgerLayout};
use clap::{Parser, Subcommand};
use std::convert::Infallible;
use std::fmt::{Display, Formatter};
use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::error;
use tracing::level_filters::LevelFilter;

/// ledger: records Google Form submissions in a Google Sheets ledger.
///
/// Each submission of the expense form becomes one or more rows of the ledger tab: spending and
/// income are one row, a balance reinitialization is an adjusting row for the difference and a
/// transfer is one row per account plus an optional commission row. The form's account and
/// category lists are kept in step with the reference ranges of the spreadsheet.
///
/// You will need set up a Google API OAuth client for this, with access to the Sheets and Forms
/// APIs. Run `ledger init` and then `ledger auth` once, then either pipe events to `ledger record`
/// and `ledger sync` or run `ledger serve` and point the form and spreadsheet triggers at it.
#[derive(Debug, Parser, Clone)]
pub struct Args {
    #[clap(flatten)]
    common: Common,

    #[command(subcommand)]
    command: Command,
}

impl Args {
    pub fn new(common: Common, command: Command) -> Self {
        Self { common, command }
    }

    pub fn common(&self) -> &Common {
        &self.common
    }

    pub fn command(&self) -> &Command {
        &self.command
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Create the data directory and initialize the configuration files.
    ///
    /// This is the first command you should run. You need a few things ready beforehand.
    ///
    /// - Decide what directory you want to store configuration in and pass this as --ledger-home.
    ///   By default, it will be $HOME/ledger.
    ///
    /// - Get the URL of the spreadsheet and pass it as --sheet-url, and the id of the form (the
    ///   long string in its edit URL) as --form-id.
    ///
    /// - Set up your Google OAuth client credentials and download them to a file. You will pass
    ///   this as --client-secret.
    Init(InitArgs),
    /// Authenticate with Google via OAuth.
    Auth(AuthArgs),
    /// Record one form submission, given as JSON.
    Record(RecordArgs),
    /// Refresh the choice lists of the form from the reference ranges.
    Sync(SyncArgs),
    /// Run the webhook server that receives form submissions and cell edits.
    Serve(ServeArgs),
}

/// Arguments common to all subcommands.
#[derive(Debug, Parser, Clone)]
pub struct Common {
    /// The logging verbosity. One of, from least to most verbose:
    /// off, error, warn, info, debug, trace
    ///
    /// This can be overridden by RUST_LOG.
    #[arg(long, default_value_t = LevelFilter::INFO)]
    log_level: LevelFilter,

    /// The directory where the configuration and the OAuth files are held. Defaults to ~/ledger
    #[arg(long, env = "LEDGER_HOME", default_value_t = default_ledger_home())]
    ledger_home: DisplayPath,
}

impl Common {
    pub fn new(log_level: LevelFilter, ledger_home: PathBuf) -> Self {
        Self {
            log_level,
            ledger_home: ledger_home.into(),
        }
    }

    pub fn log_level(&self) -> LevelFilter {
        self.log_level
    }

    pub fn ledger_home(&self) -> &DisplayPath {
        &self.ledger_home
    }
}

/// (Not shown): Args for the `ledger init` command.
#[derive(Debug, Parser, Clone)]
pub struct InitArgs {
    /// The URL of the spreadsheet. It looks like this:
    /// https://docs.google.com/spreadsheets/d/1a7Km9FxQwRbPt82JvN4LzYpH5OcGnWsT6iDuE3VhMjX
    #[arg(long)]
    sheet_url: String,

    /// The id of the form whose submissions are recorded.
    #[arg(long)]
    form_id: String,

    /// The path to your downloaded OAuth client credentials. This file will be copied to the
    /// default secrets location in the main data directory.
    #[arg(long)]
    client_secret: PathBuf,

    /// The stable id of the ledger tab, the number after `gid=` in its URL.
    #[arg(long, default_value_t = DEFAULT_LEDGER_SHEET_ID)]
    ledger_sheet_id: i64,

    /// The column layout of the ledger tab: unified or split.
    #[arg(long, default_value_t = LedgerLayout::Unified)]
    layout: LedgerLayout,
}

impl InitArgs {
    pub fn new(
        sheet_url: impl Into<String>,
        form_id: impl Into<String>,
        client_secret: impl Into<PathBuf>,
    ) -> Self {
        Self {
            sheet_url: sheet_url.into(),
            form_id: form_id.into(),
            client_secret: client_secret.into(),
            ledger_sheet_id: DEFAULT_LEDGER_SHEET_ID,
            layout: LedgerLayout::default(),
        }
    }

    pub fn sheet_url(&self) -> &str {
        &self.sheet_url
    }

    pub fn form_id(&self) -> &str {
        &self.form_id
    }

    pub fn client_secret(&self) -> &Path {
        &self.client_secret
    }

    pub fn ledger_sheet_id(&self) -> i64 {
        self.ledger_sheet_id
    }

    pub fn layout(&self) -> LedgerLayout {
        self.layout
    }
}

/// (Not shown): Args for the `ledger auth` command.
#[derive(Debug, Parser, Clone)]
pub struct AuthArgs {
    /// Verify and refresh authentication.
    #[arg(long)]
    verify: bool,
}

impl AuthArgs {
    pub fn new(verify: bool) -> Self {
        Self { verify }
    }

    pub fn verify(&self) -> bool {
        self.verify
    }
}

/// (Not shown): Args for the `ledger record` command.
#[derive(Debug, Parser, Clone)]
pub struct RecordArgs {
    /// A file holding the submission JSON. The submission is read from stdin when this is absent.
    #[arg(long)]
    file: Option<PathBuf>,
}

impl RecordArgs {
    pub fn new(file: Option<PathBuf>) -> Self {
        Self { file }
    }

    pub fn file(&self) -> Option<&Path> {
        self.file.as_deref()
    }
}

/// (Not shown): Args for the `ledger sync` command.
#[derive(Debug, Parser, Clone)]
pub struct SyncArgs {
    /// Refresh every choice item.
    #[arg(long, conflicts_with_all = ["sheet_id", "range"], required_unless_present = "range")]
    all: bool,

    /// The stable id of the tab that was edited.
    #[arg(long, requires = "range")]
    sheet_id: Option<i64>,

    /// The edited range in A1 notation, e.g. `A2:A9`.
    #[arg(long, requires = "sheet_id")]
    range: Option<A1Range>,
}

impl SyncArgs {
    pub fn all() -> Self {
        Self {
            all: true,
            sheet_id: None,
            range: None,
        }
    }

    pub fn edit(sheet_id: i64, range: A1Range) -> Self {
        Self {
            all: false,
            sheet_id: Some(sheet_id),
            range: Some(range),
        }
    }

    pub fn target(&self) -> SyncTarget {
        match (self.all, self.sheet_id, &self.range) {
            (false, Some(sheet_id), Some(range)) => SyncTarget::Edit {
                sheet_id,
                range: range.clone(),
            },
            _ => SyncTarget::All,
        }
    }
}

/// (Not shown): Args for the `ledger serve` command.
#[derive(Debug, Parser, Clone)]
pub struct ServeArgs {
    /// The port to listen on. Defaults to the port in the config file.
    #[arg(long)]
    port: Option<u16>,
}

impl ServeArgs {
    pub fn new(port: Option<u16>) -> Self {
        Self { port }
    }

    pub fn port(&self) -> Option<u16> {
        self.port
    }
}

fn default_ledger_home() -> DisplayPath {
    DisplayPath(match dirs::home_dir() {
        Some(home) => home.join("ledger"),
        None => {
            error!(
                "There was an error when trying to get your home directory. You can get around \
                this by providing --ledger-home or LEDGER_HOME instead of relying on the default \
                ledger home directory. If you continue using the program right now, you may have \
                problems!",
            );
            PathBuf::from("ledger")
        }
    })
}

#[derive(Debug, Default, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct DisplayPath(PathBuf);

impl From<PathBuf> for DisplayPath {
    fn from(value: PathBuf) -> Self {
        DisplayPath(value)
    }
}

impl Deref for DisplayPath {
    type Target = Path;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl AsRef<Path> for DisplayPath {
    fn as_ref(&self) -> &Path {
        &self.0
    }
}

impl Display for DisplayPath {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.to_string_lossy())
    }
}

impl FromStr for DisplayPath {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(PathBuf::from(s)))
    }
}

impl DisplayPath {
    pub fn new(path: PathBuf) -> Self {
        Self(path)
    }

    pub fn path(&self) -> &Path {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_sync() {
        let args = Args::try_parse_from(["ledger", "sync", "--all"]).unwrap();
        let Command::Sync(sync) = args.command() else {
            panic!("expected sync")
        };
        assert!(matches!(sync.target(), SyncTarget::All));

        let args = Args::try_parse_from([
            "ledger",
            "--log-level",
            "debug",
            "sync",
            "--sheet-id",
            "765911459",
            "--range",
            "A2:A9",
        ])
        .unwrap();
        assert_eq!(args.common().log_level(), LevelFilter::DEBUG);
        let Command::Sync(sync) = args.command() else {
            panic!("expected sync")
        };
        let SyncTarget::Edit { sheet_id, range } = sync.target() else {
            panic!("expected an edit")
        };
        assert_eq!(sheet_id, 765911459);
        assert_eq!(range.to_string(), "A2:A9");

        assert!(Args::try_parse_from(["ledger", "sync"]).is_err());
        assert!(Args::try_parse_from(["ledger", "sync", "--range", "A1"]).is_err());
        assert!(Args::try_parse_from(["ledger", "sync", "--all", "--range", "A1"]).is_err());
    }

    #[test]
    fn test_parse_init() {
        let args = Args::try_parse_from([
            "ledger",
            "init",
            "--sheet-url",
            "https://docs.google.com/spreadsheets/d/abc",
            "--form-id",
            "f1",
            "--client-secret",
            "/tmp/secret.json",
            "--layout",
            "split",
        ])
        .unwrap();
        let Command::Init(init) = args.command() else {
            panic!("expected init")
        };
        assert_eq!(init.layout(), LedgerLayout::Split);
        assert_eq!(init.ledger_sheet_id(), DEFAULT_LEDGER_SHEET_ID);
    }
}
