//! Google Sheets client

use super::{
    build_aggregate_query, is_valid_sheet_id, parse_aggregate_rows, parse_csv,
    parse_gviz_response, SheetFetcher, SheetQuery,
};
use crate::aggregate::DailyAggregate;
use crate::config::SheetsConfig;
use crate::error::{Error, Result};
use crate::meta::DataType;
use crate::normalize::RawRow;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

/// Tab name that means "the first tab" and needs no explicit selection
const DEFAULT_TAB_NAME: &str = "Sheet1";

/// Grid id used for queries when a source has none
const DEFAULT_GRID_ID: &str = "0";

/// HTTP client for CSV exports and gviz queries
pub struct GoogleSheetsClient {
    client: Client,
    base_url: Url,
}

impl GoogleSheetsClient {
    pub fn new(config: &SheetsConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(Duration::from_secs(config.timeout_secs))
            .gzip(true)
            .brotli(true)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .map_err(|e| Error::Sheet(format!("Failed to create HTTP client: {}", e)))?;

        let mut base = config.base_url.trim().to_string();
        if !base.ends_with('/') {
            base.push('/');
        }

        Ok(Self {
            client,
            base_url: Url::parse(&base)?,
        })
    }

    fn sheet_url(&self, sheet_id: &str, endpoint: &str, params: &[(&str, &str)]) -> Result<Url> {
        if !is_valid_sheet_id(sheet_id) {
            return Err(Error::InvalidInput(format!("Invalid sheet id: {}", sheet_id)));
        }

        let mut url = self
            .base_url
            .join(&format!("spreadsheets/d/{}/{}", sheet_id, endpoint))?;
        url.query_pairs_mut().extend_pairs(params);
        Ok(url)
    }

    /// Preferred CSV URL: explicit grid id, then named tab, then the first tab
    pub fn export_url(
        &self,
        sheet_id: &str,
        tab_name: Option<&str>,
        grid_id: Option<&str>,
    ) -> Result<Url> {
        match (grid_id, tab_name) {
            (Some(gid), _) => self.sheet_url(sheet_id, "export", &[("format", "csv"), ("gid", gid)]),
            (None, Some(tab)) if tab != DEFAULT_TAB_NAME => {
                self.sheet_url(sheet_id, "gviz/tq", &[("tqx", "out:csv"), ("sheet", tab)])
            }
            _ => self.sheet_url(sheet_id, "export", &[("format", "csv")]),
        }
    }

    /// Second-chance CSV URL through the gviz endpoint
    pub fn alternate_export_url(&self, sheet_id: &str, grid_id: Option<&str>) -> Result<Url> {
        match grid_id {
            Some(gid) => self.sheet_url(sheet_id, "gviz/tq", &[("tqx", "out:csv"), ("gid", gid)]),
            None => self.sheet_url(sheet_id, "gviz/tq", &[("tqx", "out:csv")]),
        }
    }

    async fn get_text(&self, url: Url) -> Result<(StatusCode, String)> {
        debug!("Fetching: {}", url);
        let response = self.client.get(url).send().await?;
        let status = response.status();
        let body = response.text().await?;
        Ok((status, body))
    }

    async fn gviz_query(&self, sheet_id: &str, grid_id: &str, query: &str) -> Result<String> {
        let url = self.sheet_url(
            sheet_id,
            "gviz/tq",
            &[("tq", query), ("gid", grid_id), ("headers", "1")],
        )?;
        let (status, body) = self.get_text(url).await?;
        if !status.is_success() {
            return Err(not_accessible(status));
        }
        reject_html(&body)?;
        Ok(body)
    }
}

fn not_accessible(status: StatusCode) -> Error {
    Error::Sheet(format!(
        "Sheet not accessible ({}). Make sure it's published to web or shared with \"Anyone with link\".",
        status.as_u16()
    ))
}

/// Private sheets redirect to a sign-in page that is served with status 200
fn reject_html(body: &str) -> Result<()> {
    let lower: String = body
        .trim_start()
        .chars()
        .take(16)
        .collect::<String>()
        .to_ascii_lowercase();
    if lower.starts_with("<!doctype html") || lower.starts_with("<html") {
        return Err(Error::Sheet(
            "Sheet returned an HTML page instead of data. Make sure it's published to web or shared with \"Anyone with link\".".to_string(),
        ));
    }
    Ok(())
}

#[async_trait]
impl SheetFetcher for GoogleSheetsClient {
    async fn fetch_rows(
        &self,
        sheet_id: &str,
        tab_name: Option<&str>,
        grid_id: Option<&str>,
    ) -> Result<Vec<RawRow>> {
        let url = self.export_url(sheet_id, tab_name, grid_id)?;
        let (status, mut body) = self.get_text(url).await?;

        if !status.is_success() {
            warn!(sheet_id, status = status.as_u16(), "CSV export failed, trying alternate URL");
            let alt = self.alternate_export_url(sheet_id, grid_id)?;
            let (alt_status, alt_body) = self.get_text(alt).await?;
            if !alt_status.is_success() {
                return Err(not_accessible(status));
            }
            body = alt_body;
        }

        reject_html(&body)?;
        let rows = parse_csv(&body)?;
        info!(sheet_id, rows = rows.len(), bytes = body.len(), "Fetched sheet");
        Ok(rows)
    }
}

#[async_trait]
impl SheetQuery for GoogleSheetsClient {
    async fn query_daily(
        &self,
        sheet_id: &str,
        data_type: DataType,
        grid_id: Option<&str>,
    ) -> Result<Vec<DailyAggregate>> {
        let gid = grid_id.unwrap_or(DEFAULT_GRID_ID);

        debug!(sheet_id, gid, "Detecting query columns");
        let body = self.gviz_query(sheet_id, gid, "SELECT * LIMIT 0").await?;
        let header_response = parse_gviz_response(&body, "Could not fetch column headers")?;
        header_response.check_status("Failed to get headers")?;
        let headers = header_response.headers();

        let aggregate = build_aggregate_query(&headers, data_type)?;
        debug!(query = %aggregate.query, "Running aggregate query");

        let body = self.gviz_query(sheet_id, gid, &aggregate.query).await?;
        let response = parse_gviz_response(&body, "Invalid response format from Google Sheets")?;
        response.check_status("Query error")?;

        let days = parse_aggregate_rows(response.rows(), &aggregate.metrics);
        info!(sheet_id, rows = response.rows().len(), days = days.len(), "Queried daily totals");
        Ok(days)
    }
}
