//! Google Sheets roster source.

use crate::core::roster::RosterRow;
use crate::error::RosterError;
use crate::services::google_auth::{ServiceAccountKey, SHEETS_READONLY_SCOPE};
use crate::services::{api_error, RosterSource};
use chrono::Utc;
use log::{debug, info};
use reqwest::blocking::Client;
use reqwest::Url;
use serde::Deserialize;
use serde_json::Value;

pub const DEFAULT_BASE_URL: &str = "https://sheets.googleapis.com/v4";

#[derive(Debug, Deserialize)]
struct SpreadsheetMeta {
    #[serde(default)]
    sheets: Vec<SheetMeta>,
}

#[derive(Debug, Deserialize)]
struct SheetMeta {
    properties: SheetProperties,
}

#[derive(Debug, Deserialize)]
struct SheetProperties {
    title: String,
    #[serde(default)]
    index: usize,
}

#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<Value>>,
}

/// Reads the roster from one worksheet of a spreadsheet.
pub struct GoogleSheetsRoster {
    http: Client,
    base_url: String,
    credentials: ServiceAccountKey,
    spreadsheet_key: String,
    worksheet_index: usize,
}

impl GoogleSheetsRoster {
    pub fn new(http: Client, credentials: ServiceAccountKey, spreadsheet_key: impl Into<String>) -> Self {
        Self {
            http,
            base_url: DEFAULT_BASE_URL.to_string(),
            credentials,
            spreadsheet_key: spreadsheet_key.into(),
            worksheet_index: 0,
        }
    }

    /// Read a worksheet other than the first.
    pub fn with_worksheet_index(mut self, index: usize) -> Self {
        self.worksheet_index = index;
        self
    }

    fn url(&self, segments: &[&str], query: &[(&str, &str)]) -> Result<Url, RosterError> {
        let mut url = Url::parse(&self.base_url).map_err(|e| RosterError::Decode(e.to_string()))?;
        url.path_segments_mut()
            .map_err(|_| RosterError::Decode(format!("base URL {} cannot take a path", self.base_url)))?
            .extend(segments);
        url.query_pairs_mut().extend_pairs(query);
        Ok(url)
    }

    fn get_json<T: serde::de::DeserializeOwned>(&self, url: Url, token: &str) -> Result<T, RosterError> {
        let response = self.http.get(url).bearer_auth(token).send()?;
        if !response.status().is_success() {
            let (status, message) = api_error(response);
            return Err(RosterError::Api { status, message });
        }
        response
            .json::<T>()
            .map_err(|e| RosterError::Decode(e.to_string()))
    }

    fn worksheet_title(&self, token: &str) -> Result<String, RosterError> {
        let url = self.url(
            &["spreadsheets", &self.spreadsheet_key],
            &[("fields", "sheets.properties(title,index)")],
        )?;
        let meta: SpreadsheetMeta = self.get_json(url, token)?;
        meta.sheets
            .into_iter()
            .map(|s| s.properties)
            .find(|p| p.index == self.worksheet_index)
            .map(|p| p.title)
            .ok_or_else(|| {
                RosterError::Decode(format!("spreadsheet has no worksheet {}", self.worksheet_index))
            })
    }
}

impl RosterSource for GoogleSheetsRoster {
    fn fetch_rows(&self) -> Result<Vec<RosterRow>, RosterError> {
        let token = self
            .credentials
            .access_token(&self.http, &[SHEETS_READONLY_SCOPE], Utc::now())?;
        let title = self.worksheet_title(&token)?;
        debug!("reading worksheet {:?}", title);

        let range = format!("'{}'", title.replace('\'', "''"));
        let url = self.url(
            &["spreadsheets", &self.spreadsheet_key, "values", &range],
            &[("valueRenderOption", "UNFORMATTED_VALUE"), ("majorDimension", "ROWS")],
        )?;
        let values: ValueRange = self.get_json(url, &token)?;
        let rows = records_from_values(values.values);
        info!("loaded {} roster rows", rows.len());
        Ok(rows)
    }
}

/// Turn a header row plus data rows into header -> cell maps.
///
/// Blank rows are dropped; short rows are padded with empty cells.
fn records_from_values(values: Vec<Vec<Value>>) -> Vec<RosterRow> {
    let mut rows = values.into_iter();
    let header: Vec<String> = match rows.next() {
        Some(header) => header.iter().map(|c| cell_text(c).trim().to_string()).collect(),
        None => return Vec::new(),
    };

    rows.filter(|row| row.iter().any(|c| !cell_text(c).trim().is_empty()))
        .map(|row| {
            header
                .iter()
                .enumerate()
                .filter(|(_, name)| !name.is_empty())
                .map(|(i, name)| (name.clone(), row.get(i).map(cell_text).unwrap_or_default()))
                .collect()
        })
        .collect()
}

fn cell_text(cell: &Value) -> String {
    match cell {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => (if *b { "TRUE" } else { "FALSE" }).to_string(),
        other => other.to_string(),
    }
}
