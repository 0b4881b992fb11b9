//! HTTP client for the Google Sheets v4 and Drive v3 APIs.
//!
//! Every call takes an already-valid access token; token refresh and retry
//! policy belong to the pipeline. Whole-tab reads are split into row pages
//! sized from the tab's grid so very large sheets never arrive in a single
//! response.

use crate::config::IngestConfig;
use crate::error::{IngestResult, SheetsError, SheetsResult};
use crate::http::{build_client, check_status};
use crate::range::{quote_sheet_name, row_window, RangeSpec};
use crate::types::{AccessToken, SheetMetadata, SheetTab, SpreadsheetFile, SpreadsheetRef};
use async_trait::async_trait;
use microsaasify_tables::RawTable;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

const SPREADSHEET_MIME_QUERY: &str =
    "mimeType='application/vnd.google-apps.spreadsheet' and trashed=false";

const METADATA_FIELDS: &str = "spreadsheetId,spreadsheetUrl,properties.title,\
    sheets.properties(title,index,gridProperties)";

/// Spreadsheet provider operations used by the ingestion pipeline.
#[async_trait]
pub trait SheetsApi: Send + Sync {
    async fn fetch_metadata(
        &self,
        sheet: &SpreadsheetRef,
        token: &AccessToken,
    ) -> SheetsResult<SheetMetadata>;

    /// Reads the referenced range; the first row becomes the header.
    async fn fetch_range(
        &self,
        sheet: &SpreadsheetRef,
        token: &AccessToken,
    ) -> SheetsResult<RawTable>;

    /// Spreadsheets visible to the token's account, most recently modified first.
    async fn list_spreadsheets(&self, token: &AccessToken) -> SheetsResult<Vec<SpreadsheetFile>>;
}

// ── Wire types ──

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SpreadsheetResponse {
    spreadsheet_id: String,
    #[serde(default)]
    spreadsheet_url: String,
    #[serde(default)]
    properties: Option<SpreadsheetProperties>,
    #[serde(default)]
    sheets: Vec<SheetEntry>,
}

#[derive(Deserialize)]
struct SpreadsheetProperties {
    #[serde(default)]
    title: Option<String>,
}

#[derive(Deserialize)]
struct SheetEntry {
    #[serde(default)]
    properties: Option<SheetProperties>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SheetProperties {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    index: Option<u32>,
    #[serde(default)]
    grid_properties: Option<GridProperties>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GridProperties {
    #[serde(default)]
    row_count: u32,
    #[serde(default)]
    column_count: u32,
}

#[derive(Deserialize)]
struct ValueRangeResponse {
    #[serde(default)]
    values: Vec<Vec<serde_json::Value>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileListResponse {
    #[serde(default)]
    files: Vec<DriveFile>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DriveFile {
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    web_view_link: String,
}

impl From<SpreadsheetResponse> for SheetMetadata {
    fn from(resp: SpreadsheetResponse) -> Self {
        let sheets = resp
            .sheets
            .into_iter()
            .enumerate()
            .map(|(pos, entry)| {
                let props = entry.properties;
                let grid = props.as_ref().and_then(|p| p.grid_properties.as_ref());
                SheetTab {
                    title: props
                        .as_ref()
                        .and_then(|p| p.title.clone())
                        .unwrap_or_else(|| format!("Sheet{}", pos + 1)),
                    index: props.as_ref().and_then(|p| p.index).unwrap_or(pos as u32),
                    row_count: grid.map(|g| g.row_count).unwrap_or(0),
                    column_count: grid.map(|g| g.column_count).unwrap_or(0),
                }
            })
            .collect();

        Self {
            id: resp.spreadsheet_id,
            name: resp
                .properties
                .and_then(|p| p.title)
                .unwrap_or_else(|| "Untitled".to_string()),
            url: resp.spreadsheet_url,
            sheets,
        }
    }
}

/// Google implementation of [`SheetsApi`].
pub struct GoogleSheetsClient {
    client: Client,
    sheets_base_url: String,
    drive_base_url: String,
    page_rows: u32,
    max_list_pages: u32,
}

impl GoogleSheetsClient {
    pub fn new(config: &IngestConfig) -> IngestResult<Self> {
        Ok(Self {
            client: build_client(config.request_timeout())?,
            sheets_base_url: config.sheets_api_base_url.trim_end_matches('/').to_string(),
            drive_base_url: config.drive_api_base_url.trim_end_matches('/').to_string(),
            page_rows: config.page_rows.max(1),
            max_list_pages: config.max_list_pages.max(1),
        })
    }

    async fn get_values(
        &self,
        spreadsheet_id: &str,
        range: &str,
        token: &AccessToken,
    ) -> SheetsResult<Vec<Vec<serde_json::Value>>> {
        let url = format!(
            "{}/v4/spreadsheets/{}/values/{}",
            self.sheets_base_url,
            urlencoding::encode(spreadsheet_id),
            urlencoding::encode(range),
        );
        let resp = self
            .client
            .get(&url)
            .bearer_auth(&token.token)
            .query(&[("majorDimension", "ROWS"), ("valueRenderOption", "FORMATTED_VALUE")])
            .send()
            .await?;

        let body: ValueRangeResponse = check_status(resp, "read range").await?.json().await?;
        Ok(body.values)
    }

    /// Reads a whole tab in row windows sized from its grid.
    async fn read_paged(
        &self,
        sheet: &SpreadsheetRef,
        tab_name: Option<String>,
        token: &AccessToken,
    ) -> SheetsResult<Vec<Vec<serde_json::Value>>> {
        let metadata = self.fetch_metadata(sheet, token).await?;
        let tab = metadata.tab(tab_name.as_deref()).ok_or_else(|| {
            SheetsError::PermissionRevoked(match &tab_name {
                Some(name) => format!("tab {name} not found in spreadsheet {}", metadata.id),
                None => format!("spreadsheet {} has no tabs", metadata.id),
            })
        })?;

        if tab.row_count <= self.page_rows {
            return self
                .get_values(&sheet.spreadsheet_id, &quote_sheet_name(&tab.title), token)
                .await;
        }

        let mut values = Vec::new();
        let mut first_row = 1u32;
        while first_row <= tab.row_count {
            let last_row = first_row.saturating_add(self.page_rows - 1).min(tab.row_count);
            let window = row_window(Some(&tab.title), first_row, last_row);
            let mut page = self.get_values(&sheet.spreadsheet_id, &window, token).await?;

            // Trailing empty rows are omitted per page; keep later pages aligned.
            let expected = (last_row - first_row + 1) as usize;
            let base = values.len();
            values.append(&mut page);
            if last_row < tab.row_count {
                values.resize(base + expected, Vec::new());
            }

            debug!(
                "read rows {first_row}-{last_row} of {} from {}",
                tab.row_count, sheet.spreadsheet_id
            );
            first_row = last_row.saturating_add(1);
            if last_row == u32::MAX {
                break;
            }
        }

        while values.last().is_some_and(|row| row_is_blank(row)) {
            values.pop();
        }
        Ok(values)
    }
}

fn row_is_blank(row: &[serde_json::Value]) -> bool {
    row.iter().all(|v| match v {
        serde_json::Value::Null => true,
        serde_json::Value::String(s) => s.trim().is_empty(),
        _ => false,
    })
}

#[async_trait]
impl SheetsApi for GoogleSheetsClient {
    async fn fetch_metadata(
        &self,
        sheet: &SpreadsheetRef,
        token: &AccessToken,
    ) -> SheetsResult<SheetMetadata> {
        let url = format!(
            "{}/v4/spreadsheets/{}",
            self.sheets_base_url,
            urlencoding::encode(&sheet.spreadsheet_id)
        );
        let resp = self
            .client
            .get(&url)
            .bearer_auth(&token.token)
            .query(&[("fields", METADATA_FIELDS)])
            .send()
            .await?;

        let body: SpreadsheetResponse = check_status(resp, "spreadsheet metadata")
            .await?
            .json()
            .await?;
        Ok(body.into())
    }

    async fn fetch_range(
        &self,
        sheet: &SpreadsheetRef,
        token: &AccessToken,
    ) -> SheetsResult<RawTable> {
        let values = match sheet.range_spec() {
            RangeSpec::Explicit(range) => {
                self.get_values(&sheet.spreadsheet_id, &range, token).await?
            }
            RangeSpec::WholeSheet(tab) => self.read_paged(sheet, tab, token).await?,
        };
        Ok(RawTable::from_json_values(values)?)
    }

    async fn list_spreadsheets(&self, token: &AccessToken) -> SheetsResult<Vec<SpreadsheetFile>> {
        let url = format!("{}/drive/v3/files", self.drive_base_url);
        let mut files = Vec::new();
        let mut page_token: Option<String> = None;

        for _ in 0..self.max_list_pages {
            let mut req = self
                .client
                .get(&url)
                .bearer_auth(&token.token)
                .query(&[
                    ("q", SPREADSHEET_MIME_QUERY),
                    ("pageSize", "100"),
                    ("fields", "nextPageToken,files(id,name,webViewLink)"),
                    ("orderBy", "modifiedTime desc"),
                ]);
            if let Some(pt) = &page_token {
                req = req.query(&[("pageToken", pt.as_str())]);
            }

            let body: FileListResponse = check_status(req.send().await?, "list spreadsheets")
                .await?
                .json()
                .await?;

            files.extend(body.files.into_iter().map(|f| SpreadsheetFile {
                id: f.id,
                name: f.name,
                url: f.web_view_link,
            }));

            match body.next_page_token {
                Some(next) if !next.is_empty() => page_token = Some(next),
                _ => break,
            }
        }

        Ok(files)
    }
}
