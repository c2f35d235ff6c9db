//! Google Sheets v4 backend.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, info};

use super::oauth::{access_token, load_credentials};
use super::{CellView, CellWrite, StoreConnector, TabularStore};
use crate::core::config::StoreInfo;
use crate::core::error::StoreError;

const GRID_FIELDS: &str =
    "sheets.data.rowData.values(formattedValue,userEnteredFormat.numberFormat)";
const METADATA_FIELDS: &str = "sheets.properties(sheetId,title,index)";

pub struct SheetsConnector {
    client: reqwest::Client,
}

impl SheetsConnector {
    pub fn new(timeout: Duration) -> Result<Self, StoreError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| StoreError::Connection(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self { client })
    }
}

#[derive(Debug, Deserialize)]
struct Spreadsheet {
    #[serde(default)]
    sheets: Vec<Sheet>,
}

#[derive(Debug, Deserialize)]
struct Sheet {
    #[serde(default)]
    properties: Option<SheetProperties>,
    #[serde(default)]
    data: Vec<GridData>,
}

#[derive(Debug, Deserialize)]
struct SheetProperties {
    title: String,
    #[serde(default)]
    index: usize,
}

#[derive(Debug, Deserialize)]
struct GridData {
    #[serde(default, rename = "rowData")]
    row_data: Vec<RowData>,
}

#[derive(Debug, Default, Deserialize)]
struct RowData {
    #[serde(default)]
    values: Vec<CellData>,
}

#[derive(Debug, Default, Deserialize)]
struct CellData {
    #[serde(default, rename = "formattedValue")]
    formatted_value: Option<String>,
    #[serde(default, rename = "userEnteredFormat")]
    user_entered_format: Option<CellFormat>,
}

#[derive(Debug, Deserialize)]
struct CellFormat {
    #[serde(default, rename = "numberFormat")]
    number_format: Option<NumberFormat>,
}

#[derive(Debug, Deserialize)]
struct NumberFormat {
    #[serde(default)]
    pattern: Option<String>,
}

impl From<&CellData> for CellView {
    fn from(cell: &CellData) -> Self {
        CellView {
            text: cell.formatted_value.clone().unwrap_or_default(),
            pattern: cell
                .user_entered_format
                .as_ref()
                .and_then(|f| f.number_format.as_ref())
                .and_then(|n| n.pattern.clone()),
        }
    }
}

#[async_trait]
impl StoreConnector for SheetsConnector {
    async fn open(&self, info: &StoreInfo) -> Result<Box<dyn TabularStore>, StoreError> {
        let credentials = load_credentials(&info.credentials_path()).await?;
        let token = access_token(&self.client, &credentials, &info.token_url).await?;

        let base = format!(
            "{}/v4/spreadsheets/{}",
            info.api_base.trim_end_matches('/'),
            urlencoding::encode(&info.file_id)
        );
        let response = self
            .client
            .get(&base)
            .bearer_auth(&token)
            .query(&[("fields", METADATA_FIELDS)])
            .send()
            .await
            .map_err(|e| StoreError::Connection(format!("spreadsheet request failed: {}", e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| StoreError::Connection(format!("failed to read spreadsheet: {}", e)))?;
        if !status.is_success() {
            return Err(StoreError::Connection(format!(
                "cannot open spreadsheet {} (HTTP {}): {}",
                info.file_id, status, body
            )));
        }

        let meta: Spreadsheet = serde_json::from_str(&body)
            .map_err(|e| StoreError::Connection(format!("malformed spreadsheet metadata: {}", e)))?;
        let mut props: Vec<SheetProperties> =
            meta.sheets.into_iter().filter_map(|s| s.properties).collect();
        props.sort_by_key(|p| p.index);
        let titles: Vec<String> = props.into_iter().map(|p| p.title).collect();

        info!(
            "Opened spreadsheet {} ({} sheet(s))",
            info.file_id,
            titles.len()
        );
        Ok(Box::new(SheetsStore {
            client: self.client.clone(),
            base,
            token,
            titles,
            staged: Vec::new(),
        }))
    }
}

pub struct SheetsStore {
    client: reqwest::Client,
    base: String,
    token: String,
    titles: Vec<String>,
    staged: Vec<CellWrite>,
}

impl SheetsStore {
    fn title(&self, sheet_index: usize) -> Result<&str, StoreError> {
        self.titles
            .get(sheet_index)
            .map(String::as_str)
            .ok_or(StoreError::SheetNotFound(sheet_index))
    }
}

/// `'My Sheet'!B5` style reference for a zero-based cell.
fn a1(title: &str, row: usize, column: usize) -> String {
    format!("{}!{}{}", quote_title(title), column_letters(column), row + 1)
}

fn quote_title(title: &str) -> String {
    format!("'{}'", title.replace('\'', "''"))
}

fn column_letters(column: usize) -> String {
    let mut n = column + 1;
    let mut letters = Vec::new();
    while n > 0 {
        let rem = (n - 1) % 26;
        letters.push((b'A' + rem as u8) as char);
        n = (n - 1) / 26;
    }
    letters.iter().rev().collect()
}

#[async_trait]
impl TabularStore for SheetsStore {
    async fn read_date_column(
        &mut self,
        sheet_index: usize,
        rows: usize,
    ) -> Result<Vec<CellView>, StoreError> {
        let range = format!("{}!A1:A{}", quote_title(self.title(sheet_index)?), rows);
        debug!("Loading date column {}", range);

        let response = self
            .client
            .get(&self.base)
            .bearer_auth(&self.token)
            .query(&[
                ("includeGridData", "true"),
                ("ranges", range.as_str()),
                ("fields", GRID_FIELDS),
            ])
            .send()
            .await
            .map_err(|e| StoreError::Request(format!("cell load failed: {}", e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| StoreError::Request(format!("failed to read cells: {}", e)))?;
        if !status.is_success() {
            return Err(StoreError::Request(format!(
                "cell load failed (HTTP {}): {}",
                status, body
            )));
        }

        let grid: Spreadsheet = serde_json::from_str(&body)
            .map_err(|e| StoreError::Request(format!("malformed cell data: {}", e)))?;

        // Empty rows come back as `{}` so positions stay aligned; trailing
        // empty rows are omitted.
        let cells = grid
            .sheets
            .first()
            .and_then(|s| s.data.first())
            .map(|d| {
                d.row_data
                    .iter()
                    .take(rows)
                    .map(|r| r.values.first().map(CellView::from).unwrap_or_default())
                    .collect()
            })
            .unwrap_or_default();
        Ok(cells)
    }

    fn set_cell(
        &mut self,
        sheet_index: usize,
        row: usize,
        column: usize,
        value: i64,
    ) -> Result<(), StoreError> {
        self.title(sheet_index)?;
        self.staged.push(CellWrite {
            sheet_index,
            row,
            column,
            value,
        });
        Ok(())
    }

    async fn flush(&mut self) -> Result<(), StoreError> {
        let writes = std::mem::take(&mut self.staged);
        if writes.is_empty() {
            return Ok(());
        }

        let mut data = Vec::with_capacity(writes.len());
        for w in &writes {
            data.push(json!({
                "range": a1(self.title(w.sheet_index)?, w.row, w.column),
                "values": [[w.value]],
            }));
        }
        let payload = json!({ "valueInputOption": "RAW", "data": data });

        let response = self
            .client
            .post(format!("{}/values:batchUpdate", self.base))
            .bearer_auth(&self.token)
            .json(&payload)
            .send()
            .await
            .map_err(|e| StoreError::Request(format!("batch update failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StoreError::Request(format!(
                "batch update failed (HTTP {}): {}",
                status, body
            )));
        }
        debug!("Flushed {} cell(s)", writes.len());
        Ok(())
    }

    fn discard(&mut self) {
        self.staged.clear();
    }
}
