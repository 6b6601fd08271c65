//! Implements the `Sheet` trait against the Google Sheets v4 API.
//!
//! Cell values go through the `sheets` client. Spreadsheet metadata (tab properties and named
//! ranges) and row insertion go through plain REST calls with `reqwest`.

use crate::api::{http_client, Sheet, SheetProps, SheetRange, TokenProvider};
use crate::model::CellRange;
use crate::{Config, Result};
use anyhow::{bail, Context};
use serde::Deserialize;
use serde_json::json;
use sheets::types::{
    BatchUpdateValuesRequest, DateTimeRenderOption, Dimension, ValueInputOption, ValueRange,
    ValueRenderOption,
};
use tracing::trace;

const SHEETS_API: &str = "https://sheets.googleapis.com/v4/spreadsheets";

/// Talks to one spreadsheet. The `TokenProvider` is asked for a fresh token before every call.
pub(super) struct GoogleSheet {
    spreadsheet_id: String,
    token_provider: TokenProvider,
    client: sheets::Client,
    http: reqwest::Client,
}

impl GoogleSheet {
    pub(super) async fn new(config: Config, mut token_provider: TokenProvider) -> Result<Self> {
        let client = create_sheets_client(&mut token_provider).await?;
        Ok(Self {
            spreadsheet_id: config.spreadsheet_id().to_string(),
            token_provider,
            client,
            http: http_client()?,
        })
    }

    async fn refresh_client(&mut self) -> Result<()> {
        self.client = create_sheets_client(&mut self.token_provider).await?;
        Ok(())
    }

    async fn metadata(&mut self) -> Result<Metadata> {
        let token = self.token_provider.token_with_refresh().await?.to_string();
        let url = format!("{SHEETS_API}/{}", self.spreadsheet_id);
        let response = self
            .http
            .get(&url)
            .bearer_auth(token)
            .query(&[("fields", "sheets.properties,namedRanges")])
            .send()
            .await
            .context("Failed to request the spreadsheet metadata")?;
        let response = check_status(response, "read the spreadsheet metadata").await?;
        response
            .json()
            .await
            .context("Failed to parse the spreadsheet metadata")
    }
}

#[async_trait::async_trait]
impl Sheet for GoogleSheet {
    async fn sheet(&mut self, sheet_id: i64) -> Result<SheetProps> {
        trace!("sheet {sheet_id}");
        let metadata = self.metadata().await?;
        metadata
            .props(sheet_id)
            .with_context(|| format!("No sheet with id {sheet_id} in the spreadsheet"))
    }

    async fn named_range(&mut self, name: &str) -> Result<Option<CellRange>> {
        trace!("named_range {name}");
        let metadata = self.metadata().await?;
        let Some(named) = metadata.named_ranges.iter().find(|r| r.name == name) else {
            return Ok(None);
        };
        let grid = &named.range;
        let props = metadata.props(grid.sheet_id).with_context(|| {
            format!("The named range '{name}' is on an unknown sheet {}", grid.sheet_id)
        })?;
        Ok(Some(CellRange::new(
            grid.sheet_id,
            grid.start_row_index + 1,
            grid.start_column_index + 1,
            grid.end_row_index.unwrap_or(props.row_count),
            grid.end_column_index.unwrap_or(props.column_count),
        )))
    }

    async fn get(&mut self, range: &str) -> Result<Vec<Vec<String>>> {
        trace!("get {range}");
        self.refresh_client().await?;
        let response = self
            .client
            .spreadsheets()
            .values_get(
                &self.spreadsheet_id,
                range,
                DateTimeRenderOption::FormattedString,
                Dimension::Rows,
                ValueRenderOption::FormattedValue,
            )
            .await
            .map_err(map_client_error)
            .with_context(|| format!("Failed to read {range}"))?;
        Ok(response.body.values)
    }

    async fn write_ranges(&mut self, data: &[SheetRange]) -> Result<()> {
        self.refresh_client().await?;
        let value_ranges: Vec<ValueRange> = data
            .iter()
            .map(|sr| ValueRange {
                major_dimension: Some(Dimension::Rows),
                range: sr.range.clone(),
                values: sr.values.clone(),
            })
            .collect();

        let request = BatchUpdateValuesRequest {
            data: value_ranges,
            include_values_in_response: Some(false),
            response_date_time_render_option: None,
            response_value_render_option: None,
            value_input_option: Some(ValueInputOption::UserEntered),
        };

        self.client
            .spreadsheets()
            .values_batch_update(&self.spreadsheet_id, &request)
            .await
            .map_err(map_client_error)
            .context("Failed to write ranges")?;
        Ok(())
    }

    async fn insert_rows(&mut self, sheet_id: i64, count: u32) -> Result<()> {
        trace!("insert_rows {sheet_id} {count}");
        let token = self.token_provider.token_with_refresh().await?.to_string();
        let url = format!("{SHEETS_API}/{}:batchUpdate", self.spreadsheet_id);
        let body = json!({
            "requests": [{
                "appendDimension": {
                    "sheetId": sheet_id,
                    "dimension": "ROWS",
                    "length": count,
                }
            }]
        });
        let response = self
            .http
            .post(&url)
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .context("Failed to request the row insertion")?;
        check_status(response, "insert rows").await?;
        Ok(())
    }
}

/// Creates a `sheets` client that carries a fresh access token.
async fn create_sheets_client(token_provider: &mut TokenProvider) -> Result<sheets::Client> {
    let access_token = token_provider.token_with_refresh().await?;
    // Only the access token is used, refreshing is done by the `TokenProvider`.
    Ok(sheets::Client::new(
        String::new(),
        String::new(),
        String::new(),
        access_token.to_string(),
        String::new(),
    ))
}

fn map_client_error(e: sheets::ClientError) -> anyhow::Error {
    anyhow::Error::new(e).context("The Google Sheets API request failed")
}

/// Turns a non-success response into an error that carries the response body.
pub(super) async fn check_status(
    response: reqwest::Response,
    action: &str,
) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "Unable to read response body".to_string());
    bail!("Unable to {action}, Google returned {status}: {body}")
}

/// The parts of a `spreadsheets.get` response that are requested. Fields that are zero are left
/// out of the JSON by Google, hence the defaults.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Metadata {
    #[serde(default)]
    sheets: Vec<SheetEntry>,
    #[serde(default)]
    named_ranges: Vec<NamedRange>,
}

impl Metadata {
    fn props(&self, sheet_id: i64) -> Option<SheetProps> {
        self.sheets
            .iter()
            .map(|s| &s.properties)
            .find(|p| p.sheet_id == sheet_id)
            .map(|p| SheetProps {
                title: p.title.clone(),
                row_count: p.grid_properties.row_count,
                column_count: p.grid_properties.column_count,
            })
    }
}

#[derive(Debug, Deserialize)]
struct SheetEntry {
    properties: SheetProperties,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SheetProperties {
    #[serde(default)]
    sheet_id: i64,
    title: String,
    #[serde(default)]
    grid_properties: GridProperties,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GridProperties {
    #[serde(default)]
    row_count: u32,
    #[serde(default)]
    column_count: u32,
}

#[derive(Debug, Deserialize)]
struct NamedRange {
    name: String,
    range: GridRange,
}

/// A 0-based, half-open rectangle. Missing end indexes mean the range is unbounded.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GridRange {
    #[serde(default)]
    sheet_id: i64,
    #[serde(default)]
    start_row_index: u32,
    end_row_index: Option<u32>,
    #[serde(default)]
    start_column_index: u32,
    end_column_index: Option<u32>,
}
