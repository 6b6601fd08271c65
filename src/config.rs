//! Configuration file handling.
//!
//! The configuration file is stored at `$LEDGER_HOME/config.json`. It names the spreadsheet and the
//! form, the ledger tab and its layout, the named reference ranges, the ids of the form items that
//! the handlers read or update, and the locations of the OAuth files.

use crate::model::{LedgerLayout, TitleMapping};
use crate::{utils, Result};
use anyhow::{bail, ensure, Context};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const APP_NAME: &str = "ledger";
const CONFIG_VERSION: u8 = 1;
const SECRETS: &str = ".secrets";
const CLIENT_SECRET_JSON: &str = "client_secret.json";
const TOKEN_JSON: &str = "token.json";
const CONFIG_JSON: &str = "config.json";

/// The stable id of the `Transactions` tab that the form writes to.
pub const DEFAULT_LEDGER_SHEET_ID: i64 = 1732160294;
pub const DEFAULT_WEBHOOK_PORT: u16 = 8080;

/// The configuration of the app, loaded from `$LEDGER_HOME/config.json`. It also knows where the
/// other files of the home directory live.
#[derive(Debug, Clone)]
pub struct Config {
    root: PathBuf,
    secrets: PathBuf,
    config_path: PathBuf,
    config_file: ConfigFile,
    spreadsheet_id: String,
}

impl Config {
    /// Creates the home directory and its `.secrets` subdirectory, copies `secret_file` to its
    /// default location and writes an initial `config.json`.
    ///
    /// # Errors
    /// - `spreadsheet_url` is not the URL of a Google Sheet.
    /// - Any of the file operations fail.
    pub async fn create(
        dir: impl Into<PathBuf>,
        secret_file: &Path,
        spreadsheet_url: &str,
        form_id: &str,
        ledger_sheet_id: i64,
        layout: LedgerLayout,
    ) -> Result<Self> {
        let spreadsheet_id = extract_spreadsheet_id(spreadsheet_url)?;
        ensure!(!form_id.trim().is_empty(), "The form id cannot be empty");

        let maybe_relative = dir.into();
        utils::make_dir(&maybe_relative)
            .await
            .context("Unable to create the ledger home directory")?;
        let root = utils::canonicalize(&maybe_relative).await?;

        let secrets = root.join(SECRETS);
        utils::make_dir(&secrets).await?;
        utils::copy(secret_file, secrets.join(CLIENT_SECRET_JSON)).await?;

        let config_file = ConfigFile {
            spreadsheet_url: spreadsheet_url.to_string(),
            form_id: form_id.trim().to_string(),
            ledger_sheet_id,
            layout,
            ..ConfigFile::default()
        };
        let config_path = root.join(CONFIG_JSON);
        config_file.save(&config_path).await?;

        Ok(Self {
            root,
            secrets,
            config_path,
            config_file,
            spreadsheet_id,
        })
    }

    /// Loads `$LEDGER_HOME/config.json` after checking that the home directory is laid out as
    /// `create` leaves it.
    pub async fn load(ledger_home: impl Into<PathBuf>) -> Result<Self> {
        let maybe_relative = ledger_home.into();
        let root = utils::canonicalize(&maybe_relative)
            .await
            .context("The ledger home directory is missing, run 'ledger init'")?;
        ensure!(
            root.is_dir(),
            "The ledger home '{}' is not a directory",
            root.display()
        );

        let config_path = root.join(CONFIG_JSON);
        if !config_path.is_file() {
            bail!("The config file is missing '{}'", config_path.display())
        }
        let config_file = ConfigFile::load(&config_path).await?;
        let spreadsheet_id = extract_spreadsheet_id(&config_file.spreadsheet_url)?;

        let secrets = root.join(SECRETS);
        if !secrets.is_dir() {
            bail!("The secrets directory is missing '{}'", secrets.display())
        }

        Ok(Self {
            root,
            secrets,
            config_path,
            config_file,
            spreadsheet_id,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn secrets(&self) -> &Path {
        &self.secrets
    }

    pub fn spreadsheet_url(&self) -> &str {
        &self.config_file.spreadsheet_url
    }

    pub fn spreadsheet_id(&self) -> &str {
        &self.spreadsheet_id
    }

    pub fn form_id(&self) -> &str {
        &self.config_file.form_id
    }

    pub fn ledger_sheet_id(&self) -> i64 {
        self.config_file.ledger_sheet_id
    }

    pub fn layout(&self) -> LedgerLayout {
        self.config_file.layout
    }

    pub fn ranges(&self) -> &RangeNames {
        &self.config_file.ranges
    }

    pub fn items(&self) -> &ItemIds {
        &self.config_file.items
    }

    pub fn title_mapping(&self) -> &TitleMapping {
        &self.config_file.title_aliases
    }

    pub fn webhook(&self) -> &WebhookConfig {
        &self.config_file.webhook
    }

    /// The beneficiary of a balance reinitialization on `account`: the first rule whose prefix
    /// starts the account name.
    pub fn reinit_beneficiary(&self, account: &str) -> Option<&str> {
        self.config_file
            .reinit_beneficiaries
            .iter()
            .find(|rule| {
                !rule.account_prefix.is_empty() && account.starts_with(&rule.account_prefix)
            })
            .map(|rule| rule.beneficiary.as_str())
    }

    /// Returns the stored `client_secret_path` if it is absolute, otherwise resolves it against the
    /// home directory.
    pub fn client_secret_path(&self) -> PathBuf {
        self.resolve(self.config_file.client_secret_path())
    }

    /// Returns the stored `token_path` if it is absolute, otherwise resolves it against the home
    /// directory.
    pub fn token_path(&self) -> PathBuf {
        self.resolve(self.config_file.token_path())
    }

    fn resolve(&self, p: PathBuf) -> PathBuf {
        if p.is_absolute() {
            return p;
        }
        self.root.join(p)
    }

    #[cfg(test)]
    pub(crate) fn config_file_mut(&mut self) -> &mut ConfigFile {
        &mut self.config_file
    }
}

/// The names of the named ranges that the handlers read.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
#[serde(default)]
pub struct RangeNames {
    pub accounts: String,
    /// Parallel to `accounts`: the stored balance of each account.
    pub accounts_amount: String,
    pub expense_categories: String,
    pub income_categories: String,
}

impl Default for RangeNames {
    fn default() -> Self {
        Self {
            accounts: "BalancesAccounts".to_string(),
            accounts_amount: "BalancesAccountsAmount".to_string(),
            expense_categories: "OverviewExpenseCategories".to_string(),
            income_categories: "OverviewIncomeCategories".to_string(),
        }
    }
}

/// The ids of the form items that the handlers read or update.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq)]
#[serde(default)]
pub struct ItemIds {
    pub action: u64,
    pub origin_account: u64,
    pub destination_account: u64,
    pub expense_category: u64,
    pub income_category: u64,
}

impl Default for ItemIds {
    fn default() -> Self {
        Self {
            action: 174839173,
            origin_account: 1832671484,
            destination_account: 1737254564,
            expense_category: 1943381995,
            income_category: 709409363,
        }
    }
}

/// Sets the beneficiary of reinitialization rows for accounts whose name starts with
/// `account_prefix`.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct BeneficiaryRule {
    pub account_prefix: String,
    pub beneficiary: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
#[serde(default)]
pub struct WebhookConfig {
    pub port: u16,
    /// When set, requests must carry it in the `x-ledger-token` header.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_WEBHOOK_PORT,
            token: None,
        }
    }
}

/// Represents the serialization and deserialization format of the configuration file.
///
/// Example configuration:
/// ```json
/// {
///   "app_name": "ledger",
///   "config_version": 1,
///   "spreadsheet_url": "https://docs.google.com/spreadsheets/d/17mXT41id8C608abnZv3vgZvMMGN8WF8amWNrdivDc5A",
///   "form_id": "1jotd2iqim96fmh0Hh1XJ-uHSbHhOCdjEXQoTofkkG6o",
///   "ledger_sheet_id": 1732160294,
///   "layout": "unified",
///   "title_aliases": { "Transfer fee": "commission" },
///   "reinit_beneficiaries": [{ "account_prefix": "A", "beneficiary": "Andrei" }],
///   "webhook": { "port": 8080 }
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub(crate) struct ConfigFile {
    /// Application name, should always be "ledger"
    app_name: String,

    config_version: u8,

    /// URL of the spreadsheet that holds the ledger and the reference ranges.
    spreadsheet_url: String,

    /// The id of the form, as it appears in its edit URL.
    form_id: String,

    ledger_sheet_id: i64,

    #[serde(default)]
    layout: LedgerLayout,

    #[serde(default)]
    ranges: RangeNames,

    #[serde(default)]
    items: ItemIds,

    /// Extra form item titles, checked when the file is loaded.
    #[serde(default)]
    title_aliases: TitleMapping,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    reinit_beneficiaries: Vec<BeneficiaryRule>,

    #[serde(default)]
    webhook: WebhookConfig,

    /// Path to the OAuth 2.0 client credentials file, relative to the home directory or absolute.
    /// Defaults to `.secrets/client_secret.json`.
    #[serde(skip_serializing_if = "Option::is_none")]
    client_secret_path: Option<PathBuf>,

    /// Path to the OAuth token file. Defaults to `.secrets/token.json`.
    #[serde(skip_serializing_if = "Option::is_none")]
    token_path: Option<PathBuf>,
}

impl Default for ConfigFile {
    fn default() -> Self {
        Self {
            app_name: APP_NAME.to_string(),
            config_version: CONFIG_VERSION,
            spreadsheet_url: String::new(),
            form_id: String::new(),
            ledger_sheet_id: DEFAULT_LEDGER_SHEET_ID,
            layout: LedgerLayout::default(),
            ranges: RangeNames::default(),
            items: ItemIds::default(),
            title_aliases: TitleMapping::default(),
            reinit_beneficiaries: Vec::new(),
            webhook: WebhookConfig::default(),
            client_secret_path: None,
            token_path: None,
        }
    }
}

impl ConfigFile {
    pub(crate) async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let config: ConfigFile = utils::deserialize(path).await?;
        ensure!(
            config.app_name == APP_NAME,
            "Invalid app_name in config file: expected '{}', got '{}'",
            APP_NAME,
            config.app_name
        );
        ensure!(
            config.config_version == CONFIG_VERSION,
            "Unsupported config_version {} in {}",
            config.config_version,
            path.display()
        );
        Ok(config)
    }

    pub(crate) async fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let data = serde_json::to_string_pretty(self).context("Unable to serialize config")?;
        utils::write(path, data)
            .await
            .context("Unable to write config file")
    }

    #[cfg(test)]
    pub(crate) fn set_reinit_beneficiaries(&mut self, rules: Vec<BeneficiaryRule>) {
        self.reinit_beneficiaries = rules;
    }

    #[cfg(test)]
    pub(crate) fn set_layout(&mut self, layout: LedgerLayout) {
        self.layout = layout;
    }

    #[cfg(test)]
    pub(crate) fn set_webhook_token(&mut self, token: Option<String>) {
        self.webhook.token = token;
    }

    fn client_secret_path(&self) -> PathBuf {
        self.client_secret_path
            .clone()
            .unwrap_or_else(|| PathBuf::from(SECRETS).join(CLIENT_SECRET_JSON))
    }

    fn token_path(&self) -> PathBuf {
        self.token_path
            .clone()
            .unwrap_or_else(|| PathBuf::from(SECRETS).join(TOKEN_JSON))
    }
}

/// Extracts the spreadsheet id from a Google Sheets URL such as
/// `https://docs.google.com/spreadsheets/d/SPREADSHEET_ID/edit#gid=0`.
fn extract_spreadsheet_id(sheet_url: &str) -> Result<String> {
    let parsed = url::Url::parse(sheet_url)
        .with_context(|| format!("'{sheet_url}' is not a valid URL"))?;
    let id = parsed
        .path_segments()
        .and_then(|mut segments| {
            segments
                .by_ref()
                .skip_while(|s| *s != "d")
                .nth(1)
                .map(str::to_string)
        })
        .filter(|id| !id.is_empty())
        .with_context(|| {
            format!(
                "Invalid Google Sheets URL '{sheet_url}'. \
                Expected: https://docs.google.com/spreadsheets/d/SPREADSHEET_ID"
            )
        })?;
    Ok(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::FormField;
    use tempfile::TempDir;

    const URL: &str =
        "https://docs.google.com/spreadsheets/d/7KpXm2RfZwNJgs84QhVYno5DU6iM9Wlr3bCzAv1txRpL/edit";

    #[tokio::test]
    async fn test_config_create_and_load() {
        let dir = TempDir::new().unwrap();
        let home_dir = dir.path().join("ledger_home");
        let secret_source_file = dir.path().join("x.json");
        utils::write(&secret_source_file, "12345").await.unwrap();

        let config = Config::create(
            &home_dir,
            &secret_source_file,
            URL,
            "form123",
            42,
            LedgerLayout::Split,
        )
        .await
        .unwrap();
        assert_eq!(
            "7KpXm2RfZwNJgs84QhVYno5DU6iM9Wlr3bCzAv1txRpL",
            config.spreadsheet_id()
        );
        assert_eq!(config.form_id(), "form123");
        assert!(config.secrets().is_dir());
        let found = utils::read(config.client_secret_path()).await.unwrap();
        assert_eq!(found, "12345");
        assert!(secret_source_file.is_file());

        let loaded = Config::load(&home_dir).await.unwrap();
        assert_eq!(loaded.ledger_sheet_id(), 42);
        assert_eq!(loaded.layout(), LedgerLayout::Split);
        assert_eq!(loaded.ranges(), &RangeNames::default());
        assert_eq!(loaded.items().action, 174839173);
        assert_eq!(loaded.webhook().port, DEFAULT_WEBHOOK_PORT);
        assert_eq!(loaded.token_path(), loaded.root().join(".secrets/token.json"));
    }

    #[tokio::test]
    async fn test_config_load_missing_home() {
        let dir = TempDir::new().unwrap();
        assert!(Config::load(dir.path().join("nope")).await.is_err());
    }

    #[tokio::test]
    async fn test_config_load_home_is_a_file() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("ledger");
        utils::write(&file, "").await.unwrap();
        let err = Config::load(&file).await.unwrap_err().to_string();
        assert!(err.contains("is not a directory"), "{err}");
    }

    #[tokio::test]
    async fn test_config_file_validation() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");

        utils::write(
            &path,
            r#"{"app_name":"budget","config_version":1,"spreadsheet_url":"","form_id":"f",
                "ledger_sheet_id":1}"#,
        )
        .await
        .unwrap();
        let err = ConfigFile::load(&path).await.unwrap_err().to_string();
        assert!(err.contains("app_name"));

        utils::write(
            &path,
            r#"{"app_name":"ledger","config_version":1,"spreadsheet_url":"","form_id":"f",
                "ledger_sheet_id":1,"title_aliases":{"Payee":"payee"}}"#,
        )
        .await
        .unwrap();
        assert!(ConfigFile::load(&path).await.is_err());
    }

    #[tokio::test]
    async fn test_config_file_save_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        let original = ConfigFile {
            spreadsheet_url: URL.to_string(),
            form_id: "f".to_string(),
            title_aliases: TitleMapping::new(vec![("Payee", FormField::Beneficiary)]).unwrap(),
            reinit_beneficiaries: vec![BeneficiaryRule {
                account_prefix: "Y".to_string(),
                beneficiary: "Yasmin".to_string(),
            }],
            token_path: Some(PathBuf::from("/etc/token.json")),
            ..ConfigFile::default()
        };
        original.save(&path).await.unwrap();
        let loaded = ConfigFile::load(&path).await.unwrap();
        assert_eq!(original, loaded);
        assert_eq!(loaded.token_path(), PathBuf::from("/etc/token.json"));
    }

    #[tokio::test]
    async fn test_reinit_beneficiary() {
        let dir = TempDir::new().unwrap();
        let secret = dir.path().join("s.json");
        utils::write(&secret, "{}").await.unwrap();
        let mut config = Config::create(
            dir.path(),
            &secret,
            URL,
            "f",
            1,
            LedgerLayout::Unified,
        )
        .await
        .unwrap();
        config.config_file_mut().set_reinit_beneficiaries(vec![
            BeneficiaryRule {
                account_prefix: "A".to_string(),
                beneficiary: "Andrei".to_string(),
            },
            BeneficiaryRule {
                account_prefix: "Y".to_string(),
                beneficiary: "Yasmin".to_string(),
            },
        ]);
        assert_eq!(config.reinit_beneficiary("A Cash"), Some("Andrei"));
        assert_eq!(config.reinit_beneficiary("Y Bank"), Some("Yasmin"));
        assert_eq!(config.reinit_beneficiary("Joint"), None);
    }

    #[test]
    fn test_extract_spreadsheet_id() {
        assert_eq!(
            extract_spreadsheet_id("https://docs.google.com/spreadsheets/d/abc-123_X/edit#gid=0")
                .unwrap(),
            "abc-123_X"
        );
        assert_eq!(
            extract_spreadsheet_id("https://example.com/spreadsheets/d/MySheetIDX?usp=sharing")
                .unwrap(),
            "MySheetIDX"
        );
        assert!(extract_spreadsheet_id("https://docs.google.com/spreadsheets/").is_err());
        assert!(extract_spreadsheet_id("").is_err());
    }
}
