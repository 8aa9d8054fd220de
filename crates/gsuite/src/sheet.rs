//! Google Sheets access
//!
//! Spreadsheets are addressed by logical name (`vehicleSheet`,
//! `stationSheet`) so callers never handle raw spreadsheet IDs.

use std::collections::HashMap;
use std::sync::Arc;

use google_auth::TokenSource;
use reqwest::header::AUTHORIZATION;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, warn};
use url::Url;

use crate::a1::{column_name, is_a1_range};
use crate::error::{Error, Result};

pub const SHEETS_API_BASE: &str = "https://sheets.googleapis.com/v4";

pub const VEHICLE_SHEET: &str = "vehicleSheet";
pub const STATION_SHEET: &str = "stationSheet";

/// A row of cell values as the API exchanges them.
pub type Row = Vec<Value>;

#[derive(Deserialize)]
struct Spreadsheet {
    #[serde(default)]
    sheets: Vec<SheetEntry>,
}

#[derive(Deserialize)]
struct SheetEntry {
    properties: SheetProperties,
}

#[derive(Deserialize)]
struct SheetProperties {
    title: String,
}

#[derive(Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Row>,
}

pub struct SheetsClient {
    client: reqwest::Client,
    api_base: String,
    tokens: Arc<TokenSource>,
    spreadsheets: HashMap<String, String>,
}

impl SheetsClient {
    /// `spreadsheets` maps logical names to spreadsheet IDs.
    pub fn new(
        client: reqwest::Client,
        tokens: Arc<TokenSource>,
        spreadsheets: HashMap<String, String>,
    ) -> Self {
        Self::with_api_base(client, tokens, spreadsheets, SHEETS_API_BASE)
    }

    pub fn with_api_base(
        client: reqwest::Client,
        tokens: Arc<TokenSource>,
        spreadsheets: HashMap<String, String>,
        api_base: impl Into<String>,
    ) -> Self {
        Self {
            client,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            tokens,
            spreadsheets,
        }
    }

    pub fn spreadsheet_id(&self, sheet: &str) -> Result<&str> {
        self.spreadsheets
            .get(sheet)
            .map(String::as_str)
            .ok_or_else(|| Error::UnknownSheet(sheet.to_string()))
    }

    /// Append `rows` after the table found in `range` of the named
    /// spreadsheet, interpreting values as if typed by a user. Returns the
    /// HTTP status of the API response.
    pub async fn append_rows(&self, sheet: &str, range: &str, rows: Vec<Row>) -> Result<u16> {
        if !is_a1_range(range) {
            return Err(Error::InvalidRange(range.to_string()));
        }
        let spreadsheet_id = self.spreadsheet_id(sheet)?;

        let mut url = self.endpoint(&[spreadsheet_id, "values", &format!("{range}:append")])?;
        url.query_pairs_mut()
            .append_pair("valueInputOption", "USER_ENTERED");

        let bearer = self.tokens.access_token().await?;
        let response = self
            .client
            .post(url)
            .header(AUTHORIZATION, bearer)
            .json(&json!({ "values": rows }))
            .send()
            .await
            .map_err(|e| Error::Http(format!("sheets append request failed: {e}")))?;

        let status = checked(response).await?.status().as_u16();
        debug!(sheet, range, status, "appended rows");
        Ok(status)
    }

    /// Titles of all sheets (tabs) in a spreadsheet.
    pub async fn list_sheets(&self, spreadsheet_id: &str) -> Result<Vec<String>> {
        let mut url = self.endpoint(&[spreadsheet_id])?;
        url.query_pairs_mut()
            .append_pair("fields", "sheets.properties.title");

        let spreadsheet: Spreadsheet = self.get_json(url).await?;
        Ok(spreadsheet
            .sheets
            .into_iter()
            .map(|s| s.properties.title)
            .collect())
    }

    /// Every row below the header of `sheet`, columns `A` through the
    /// `columns`-th.
    pub async fn get_range(
        &self,
        spreadsheet_id: &str,
        sheet: &str,
        columns: i64,
    ) -> Result<Vec<Row>> {
        if columns <= 0 {
            return Err(Error::InvalidColumn(columns));
        }
        let range = format!("{sheet}!A2:{}", column_name(columns));
        let url = self.endpoint(&[spreadsheet_id, "values", &range])?;

        let values: ValueRange = self.get_json(url).await?;
        Ok(values.values)
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = Url::parse(&format!("{}/spreadsheets", self.api_base))
            .map_err(|e| Error::Http(format!("invalid sheets API base: {e}")))?;
        url.path_segments_mut()
            .map_err(|_| Error::Http("sheets API base cannot carry a path".into()))?
            .extend(segments);
        Ok(url)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: Url) -> Result<T> {
        let bearer = self.tokens.access_token().await?;
        let response = self
            .client
            .get(url)
            .header(AUTHORIZATION, bearer)
            .send()
            .await
            .map_err(|e| Error::Http(format!("sheets request failed: {e}")))?;

        checked(response)
            .await?
            .json::<T>()
            .await
            .map_err(|e| Error::Parse(e.to_string()))
    }
}

async fn checked(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| String::from("<no body>"));
    warn!(status = status.as_u16(), "sheets API error");
    Err(Error::Api {
        status: status.as_u16(),
        body,
    })
}
