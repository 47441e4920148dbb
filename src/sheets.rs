//! Sheet gateway: destination setup, row appends and read-back

use async_trait::async_trait;
use google_sheets4::api::{
    AddSheetRequest, BatchUpdateSpreadsheetRequest, Request, SheetProperties, Spreadsheet,
    ValueRange,
};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::auth::{GoogleAuth, SheetsHub, SHEETS_SCOPE};
use crate::error::Result;
use crate::models::{Destination, SheetRow, SHEET_HEADERS};

/// Cells are written exactly as given, without formula or date parsing
const VALUE_INPUT_OPTION: &str = "RAW";

/// Appends always insert new rows instead of overwriting trailing blanks
const INSERT_DATA_OPTION: &str = "INSERT_ROWS";

/// Operations the sync needs from a spreadsheet provider
#[async_trait]
pub trait SheetGateway: Send + Sync {
    /// Make sure a usable credential exists for the spreadsheet scope
    async fn authenticate(&self) -> Result<()>;

    /// Create the tab if missing and write the header row if the sheet has none
    async fn ensure_sheet_and_headers(&self, destination: &Destination) -> Result<()>;

    /// Append one row after the last non-empty row
    async fn append_row(&self, destination: &Destination, row: &SheetRow) -> Result<()>;

    /// Every row of the four data columns, header included
    async fn read_rows(&self, destination: &Destination) -> Result<Vec<Vec<String>>>;
}

/// Google Sheets-backed destination
pub struct GoogleSheet {
    hub: SheetsHub,
    auth: GoogleAuth,
}

impl GoogleSheet {
    pub fn new(auth: &GoogleAuth) -> Result<Self> {
        Ok(Self {
            hub: auth.sheets_hub()?,
            auth: auth.clone(),
        })
    }

    async fn add_sheet(&self, destination: &Destination) -> Result<()> {
        let request = BatchUpdateSpreadsheetRequest {
            requests: Some(vec![Request {
                add_sheet: Some(AddSheetRequest {
                    properties: Some(SheetProperties {
                        title: Some(destination.sheet_name.clone()),
                        ..Default::default()
                    }),
                }),
                ..Default::default()
            }]),
            ..Default::default()
        };

        self.hub
            .spreadsheets()
            .batch_update(request, &destination.spreadsheet_id)
            .add_scope(SHEETS_SCOPE)
            .doit()
            .await?;

        info!("Created sheet tab '{}'", destination.sheet_name);
        Ok(())
    }

    async fn write_header(&self, destination: &Destination) -> Result<()> {
        let request = ValueRange {
            values: Some(vec![row_values(&SheetRow::header())]),
            ..Default::default()
        };

        self.hub
            .spreadsheets()
            .values_update(request, &destination.spreadsheet_id, &destination.header_range())
            .value_input_option(VALUE_INPUT_OPTION)
            .add_scope(SHEETS_SCOPE)
            .doit()
            .await?;

        info!("Wrote header row to '{}'", destination.sheet_name);
        Ok(())
    }
}

#[async_trait]
impl SheetGateway for GoogleSheet {
    async fn authenticate(&self) -> Result<()> {
        // Both scopes at once; the cached token then serves either hub
        self.auth.authorize_all().await
    }

    async fn ensure_sheet_and_headers(&self, destination: &Destination) -> Result<()> {
        let (_, spreadsheet) = self
            .hub
            .spreadsheets()
            .get(&destination.spreadsheet_id)
            .add_scope(SHEETS_SCOPE)
            .doit()
            .await?;

        if !has_sheet(&spreadsheet, &destination.sheet_name) {
            self.add_sheet(destination).await?;
        }

        let (_, existing) = self
            .hub
            .spreadsheets()
            .values_get(&destination.spreadsheet_id, &destination.header_range())
            .add_scope(SHEETS_SCOPE)
            .doit()
            .await?;

        match header_status(&values_to_strings(existing.values)) {
            HeaderStatus::Missing => self.write_header(destination).await?,
            HeaderStatus::Present => debug!("Header row already present"),
            HeaderStatus::Different(found) => warn!(
                "First row of '{}' is {:?}, expected {:?}; leaving it unchanged",
                destination.sheet_name, found, SHEET_HEADERS
            ),
        }
        Ok(())
    }

    async fn append_row(&self, destination: &Destination, row: &SheetRow) -> Result<()> {
        let request = ValueRange {
            values: Some(vec![row_values(row)]),
            ..Default::default()
        };

        let (_, response) = self
            .hub
            .spreadsheets()
            .values_append(request, &destination.spreadsheet_id, &destination.data_range())
            .value_input_option(VALUE_INPUT_OPTION)
            .insert_data_option(INSERT_DATA_OPTION)
            .add_scope(SHEETS_SCOPE)
            .doit()
            .await?;

        let updated = response.updates.as_ref();
        debug!(
            "Appended row at {} ({} cells)",
            updated
                .and_then(|u| u.updated_range.as_deref())
                .unwrap_or("<unknown range>"),
            updated.and_then(|u| u.updated_cells).unwrap_or(0)
        );
        Ok(())
    }

    async fn read_rows(&self, destination: &Destination) -> Result<Vec<Vec<String>>> {
        let (_, range) = self
            .hub
            .spreadsheets()
            .values_get(&destination.spreadsheet_id, &destination.data_range())
            .add_scope(SHEETS_SCOPE)
            .doit()
            .await?;

        Ok(values_to_strings(range.values))
    }
}

/// What the first row of the destination holds
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeaderStatus {
    Missing,
    Present,
    Different(Vec<String>),
}

pub fn header_status(rows: &[Vec<String>]) -> HeaderStatus {
    match rows.first() {
        None => HeaderStatus::Missing,
        Some(first) if first.iter().all(|cell| cell.trim().is_empty()) => HeaderStatus::Missing,
        Some(first) if first.iter().map(String::as_str).eq(SHEET_HEADERS) => HeaderStatus::Present,
        Some(first) => HeaderStatus::Different(first.clone()),
    }
}

fn has_sheet(spreadsheet: &Spreadsheet, name: &str) -> bool {
    spreadsheet
        .sheets
        .iter()
        .flatten()
        .filter_map(|sheet| sheet.properties.as_ref()?.title.as_deref())
        .any(|title| title == name)
}

fn row_values(row: &SheetRow) -> Vec<Value> {
    row.cells()
        .iter()
        .map(|cell| Value::String((*cell).to_string()))
        .collect()
}

fn values_to_strings(values: Option<Vec<Vec<Value>>>) -> Vec<Vec<String>> {
    values
        .unwrap_or_default()
        .into_iter()
        .map(|row| {
            row.into_iter()
                .map(|cell| match cell {
                    Value::String(s) => s,
                    Value::Null => String::new(),
                    other => other.to_string(),
                })
                .collect()
        })
        .collect()
}
