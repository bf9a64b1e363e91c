//! Spreadsheet collaborators
//!
//! Two ways to read a platform sheet:
//! - [`SheetFetcher`]: download the tab as CSV and hand back raw rows
//! - [`SheetQuery`]: let the spreadsheet service group and sum by date
//!
//! [`GoogleSheetsClient`] implements both against Google Sheets.

mod export;
mod gviz;
mod google;

pub use export::*;
pub use google::*;
pub use gviz::*;

use crate::aggregate::DailyAggregate;
use crate::error::{Error, Result};
use crate::meta::DataType;
use crate::normalize::RawRow;
use async_trait::async_trait;
use regex::Regex;
use std::sync::OnceLock;

/// Fetches every row of a sheet tab
#[async_trait]
pub trait SheetFetcher: Send + Sync {
    async fn fetch_rows(
        &self,
        sheet_id: &str,
        tab_name: Option<&str>,
        grid_id: Option<&str>,
    ) -> Result<Vec<RawRow>>;
}

/// Asks the spreadsheet service for per-day sums
#[async_trait]
pub trait SheetQuery: Send + Sync {
    async fn query_daily(
        &self,
        sheet_id: &str,
        data_type: DataType,
        grid_id: Option<&str>,
    ) -> Result<Vec<DailyAggregate>>;
}

fn sheet_url_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"/spreadsheets/d/([A-Za-z0-9_-]+)").expect("static sheet url pattern")
    })
}

fn gid_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[#?&]gid=(\d+)").expect("static gid pattern"))
}

fn sheet_id_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9_-]+$").expect("static sheet id pattern"))
}

pub fn is_valid_sheet_id(sheet_id: &str) -> bool {
    sheet_id_re().is_match(sheet_id)
}

/// A sheet given either as a bare id or as a full URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetReference {
    pub sheet_id: String,
    pub sheet_url: String,
    pub gid: Option<String>,
}

/// Resolve a sheet id and optional grid id from user input
pub fn parse_sheet_reference(input: &str) -> Result<SheetReference> {
    let input = input.trim();

    if let Some(caps) = sheet_url_re().captures(input) {
        return Ok(SheetReference {
            sheet_id: caps[1].to_string(),
            sheet_url: input.to_string(),
            gid: gid_re().captures(input).map(|c| c[1].to_string()),
        });
    }

    if is_valid_sheet_id(input) {
        return Ok(SheetReference {
            sheet_id: input.to_string(),
            sheet_url: format!("https://docs.google.com/spreadsheets/d/{}/edit", input),
            gid: None,
        });
    }

    Err(Error::InvalidInput(format!(
        "Not a Google Sheets URL or sheet id: {}",
        input
    )))
}
