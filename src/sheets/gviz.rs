//! Google Visualization (gviz) query protocol
//!
//! The query endpoint answers with JavaScript of the form
//! `google.visualization.Query.setResponse({...});`. This module unwraps that
//! envelope, picks the date and metric columns out of the header row and turns
//! grouped result rows into [`DailyAggregate`]s.

use crate::aggregate::{merge_daily, DailyAggregate};
use crate::error::{Error, Result};
use crate::meta::DataType;
use crate::normalize::{normalize_date, parse_numeric_str, CanonicalField};
use chrono::NaiveDate;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use std::sync::OnceLock;
use tracing::debug;

/// Header spellings per field, matched case-insensitively after trimming
const DATE_COLUMNS: &[&str] = &[
    "METRICS_DATE",
    "ORDERED_DATE",
    "Date",
    "Sales Date",
    "date",
    "Order Date",
    "Report Date",
    "Day",
];
const SPEND_COLUMNS: &[&str] = &[
    "TOTAL_BUDGET_BURNT",
    "Spend",
    "Spends",
    "Cost",
    "Budget Burnt",
    "SPENDS",
];
const IMPRESSIONS_COLUMNS: &[&str] = &["TOTAL_IMPRESSIONS", "Impressions", "IMPRESSIONS", "Views"];
const CLICKS_COLUMNS: &[&str] = &["TOTAL_CLICKS", "Clicks", "CLICKS"];
const SALES_COLUMNS: &[&str] = &[
    "TOTAL_GMV",
    "GMV",
    "Revenue",
    "Sales",
    "Total GMV",
    "Total Sales",
];
const ORDERS_COLUMNS: &[&str] = &[
    "TOTAL_CONVERSIONS",
    "UNITS_SOLD",
    "Orders",
    "Quantity",
    "Conversions",
    "Units Sold",
];

/// Number of headers quoted back when no date column exists
const HEADERS_IN_ERROR: usize = 15;

#[derive(Debug, Clone, Deserialize)]
pub struct GvizResponse {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub errors: Vec<GvizError>,
    #[serde(default)]
    pub table: Option<GvizTable>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GvizError {
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub detailed_message: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GvizTable {
    #[serde(default)]
    pub cols: Vec<GvizColumn>,
    #[serde(default)]
    pub rows: Vec<GvizRow>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GvizColumn {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GvizRow {
    #[serde(default)]
    pub c: Vec<Option<GvizCell>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GvizCell {
    #[serde(default)]
    pub v: Option<Value>,
    #[serde(default)]
    pub f: Option<String>,
}

impl GvizResponse {
    /// Column labels in sheet order, blank for unlabeled columns
    pub fn headers(&self) -> Vec<String> {
        self.table
            .as_ref()
            .map(|t| {
                t.cols
                    .iter()
                    .map(|c| c.label.clone().unwrap_or_default())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn rows(&self) -> &[GvizRow] {
        self.table.as_ref().map(|t| t.rows.as_slice()).unwrap_or(&[])
    }

    /// Fail on `status: "error"`, joining the reported messages
    pub fn check_status(&self, fallback: &str) -> Result<()> {
        if self.status.as_deref() != Some("error") {
            return Ok(());
        }

        let details: Vec<&str> = self
            .errors
            .iter()
            .filter_map(|e| {
                e.detailed_message
                    .as_deref()
                    .or(e.message.as_deref())
                    .or(e.reason.as_deref())
            })
            .collect();

        if details.is_empty() {
            Err(Error::Sheet(fallback.to_string()))
        } else {
            Err(Error::Sheet(details.join("; ")))
        }
    }
}

fn envelope_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"google\.visualization\.Query\.setResponse\(([\s\S]*)\);?\s*$")
            .expect("static gviz envelope pattern")
    })
}

fn gviz_date_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"Date\((\d+),(\d+),(\d+)").expect("static gviz date pattern"))
}

/// Pull the JSON payload out of a `setResponse(...)` body
pub fn unwrap_gviz_envelope(body: &str) -> Option<&str> {
    envelope_re()
        .captures(body)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

/// Parse a gviz body, failing with `missing` when no envelope is present
pub fn parse_gviz_response(body: &str, missing: &str) -> Result<GvizResponse> {
    let payload = unwrap_gviz_envelope(body).ok_or_else(|| Error::Sheet(missing.to_string()))?;
    Ok(serde_json::from_str(payload)?)
}

/// Spreadsheet column letter for a 0-based index (`0` → `A`, `26` → `AA`)
pub fn column_letter(index: usize) -> String {
    let mut letters = Vec::new();
    let mut n = index + 1;
    while n > 0 {
        let rem = (n - 1) % 26;
        letters.push(b'A' + rem as u8);
        n = (n - 1) / 26;
    }
    letters.reverse();
    String::from_utf8_lossy(&letters).into_owned()
}

fn find_column(headers: &[String], variants: &[&str]) -> Option<String> {
    headers
        .iter()
        .position(|header| {
            let header = header.trim();
            variants.iter().any(|v| v.eq_ignore_ascii_case(header))
        })
        .map(column_letter)
}

/// Column letters found for the date and each metric
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnLayout {
    pub date: Option<String>,
    pub spend: Option<String>,
    pub impressions: Option<String>,
    pub clicks: Option<String>,
    pub sales: Option<String>,
    pub orders: Option<String>,
}

pub fn detect_columns(headers: &[String]) -> ColumnLayout {
    ColumnLayout {
        date: find_column(headers, DATE_COLUMNS),
        spend: find_column(headers, SPEND_COLUMNS),
        impressions: find_column(headers, IMPRESSIONS_COLUMNS),
        clicks: find_column(headers, CLICKS_COLUMNS),
        sales: find_column(headers, SALES_COLUMNS),
        orders: find_column(headers, ORDERS_COLUMNS),
    }
}

/// A grouped daily query and the metric carried by each summed column
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregateQuery {
    pub query: String,
    pub metrics: Vec<CanonicalField>,
}

/// Build `SELECT date, SUM(..) ... GROUP BY date` for the detected columns.
///
/// Ads tabs sum every metric found; sales tabs only sales and orders.
pub fn build_aggregate_query(headers: &[String], data_type: DataType) -> Result<AggregateQuery> {
    let layout = detect_columns(headers);
    debug!(?layout, "Detected query columns");

    let date_col = layout.date.clone().ok_or_else(|| {
        let available: Vec<&str> = headers
            .iter()
            .take(HEADERS_IN_ERROR)
            .map(String::as_str)
            .collect();
        Error::Sheet(format!(
            "Could not find date column. Available headers: {}",
            available.join(", ")
        ))
    })?;

    let candidates: Vec<(CanonicalField, &Option<String>)> = match data_type {
        DataType::Ads => vec![
            (CanonicalField::Spend, &layout.spend),
            (CanonicalField::Impressions, &layout.impressions),
            (CanonicalField::Clicks, &layout.clicks),
            (CanonicalField::Sales, &layout.sales),
            (CanonicalField::Orders, &layout.orders),
        ],
        DataType::Sales => vec![
            (CanonicalField::Sales, &layout.sales),
            (CanonicalField::Orders, &layout.orders),
        ],
    };

    let mut select = vec![date_col.clone()];
    let mut metrics = Vec::new();
    for (field, column) in candidates {
        if let Some(column) = column {
            select.push(format!("SUM({})", column));
            metrics.push(field);
        }
    }

    let query = format!(
        "SELECT {} WHERE {} IS NOT NULL GROUP BY {} ORDER BY {}",
        select.join(", "),
        date_col,
        date_col,
        date_col
    );

    Ok(AggregateQuery { query, metrics })
}

/// Date of a grouped row: formatted value first, then `Date(Y,M,D)` with a
/// 0-based month, then any other date string.
pub fn gviz_date(cell: &GvizCell) -> String {
    if let Some(formatted) = cell.f.as_deref() {
        let date = normalize_date(formatted);
        if !date.is_empty() {
            return date;
        }
    }

    let Some(Value::String(raw)) = &cell.v else {
        return String::new();
    };

    if let Some(caps) = gviz_date_re().captures(raw) {
        let parts = (
            caps[1].parse::<i32>(),
            caps[2].parse::<u32>(),
            caps[3].parse::<u32>(),
        );
        if let (Ok(year), Ok(month), Ok(day)) = parts {
            return NaiveDate::from_ymd_opt(year, month + 1, day)
                .map(|d| d.format("%Y-%m-%d").to_string())
                .unwrap_or_default();
        }
    }

    normalize_date(raw)
}

fn gviz_number(cell: Option<&Option<GvizCell>>) -> f64 {
    let value = match cell.and_then(|c| c.as_ref()).and_then(|c| c.v.as_ref()) {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) => parse_numeric_str(s),
        _ => 0.0,
    };
    if value.is_finite() && value > 0.0 {
        value
    } else {
        0.0
    }
}

/// Turn grouped result rows into daily aggregates, skipping rows without a
/// date. Groups that land on the same calendar day are summed.
pub fn parse_aggregate_rows(rows: &[GvizRow], metrics: &[CanonicalField]) -> Vec<DailyAggregate> {
    let mut aggregates = Vec::with_capacity(rows.len());

    for row in rows {
        let Some(Some(date_cell)) = row.c.first() else {
            continue;
        };
        if matches!(date_cell.v, None | Some(Value::Null)) {
            continue;
        }

        let date = gviz_date(date_cell);
        if date.is_empty() {
            debug!(v = ?date_cell.v, f = ?date_cell.f, "Skipping query row without a date");
            continue;
        }

        let mut aggregate = DailyAggregate {
            date,
            ..Default::default()
        };
        for (offset, field) in metrics.iter().enumerate() {
            let value = gviz_number(row.c.get(offset + 1));
            match field {
                CanonicalField::Spend => aggregate.spend = value,
                CanonicalField::Impressions => aggregate.impressions = value,
                CanonicalField::Clicks => aggregate.clicks = value,
                CanonicalField::Sales => aggregate.sales = value,
                CanonicalField::Orders => aggregate.orders = value,
                _ => {}
            }
        }
        aggregates.push(aggregate);
    }

    merge_daily(aggregates)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn headers(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn cell(v: Value, f: Option<&str>) -> Option<GvizCell> {
        Some(GvizCell {
            v: Some(v),
            f: f.map(str::to_string),
        })
    }

    #[test]
    fn test_column_letters() {
        assert_eq!(column_letter(0), "A");
        assert_eq!(column_letter(25), "Z");
        assert_eq!(column_letter(26), "AA");
        assert_eq!(column_letter(27), "AB");
        assert_eq!(column_letter(701), "ZZ");
        assert_eq!(column_letter(702), "AAA");
    }

    #[test]
    fn test_unwrap_envelope() {
        let body = "/*O_o*/\ngoogle.visualization.Query.setResponse({\"status\":\"ok\"});";
        assert_eq!(unwrap_gviz_envelope(body), Some("{\"status\":\"ok\"}"));
        assert_eq!(unwrap_gviz_envelope("<html>login</html>"), None);

        let parsed = parse_gviz_response(body, "missing").unwrap();
        assert!(parsed.check_status("failed").is_ok());
        assert!(parse_gviz_response("nope", "missing").is_err());
    }

    #[test]
    fn test_error_status_joins_messages() {
        let response: GvizResponse = serde_json::from_value(json!({
            "status": "error",
            "errors": [
                {"reason": "invalid_query", "message": "Invalid query", "detailed_message": "NO_COLUMN: Q"},
                {"message": "Second"}
            ]
        }))
        .unwrap();
        let err = response.check_status("Query error").unwrap_err();
        assert_eq!(err.to_string(), "Sheet error: NO_COLUMN: Q; Second");

        let bare: GvizResponse = serde_json::from_value(json!({"status": "error"})).unwrap();
        let err = bare.check_status("Query error").unwrap_err();
        assert_eq!(err.to_string(), "Sheet error: Query error");
    }

    #[test]
    fn test_ads_query_uses_all_metrics() {
        let cols = headers(&[
            "CAMPAIGN_NAME",
            "METRICS_DATE",
            "TOTAL_IMPRESSIONS",
            "TOTAL_CLICKS",
            "TOTAL_BUDGET_BURNT",
            "TOTAL_GMV",
        ]);
        let query = build_aggregate_query(&cols, DataType::Ads).unwrap();
        assert_eq!(
            query.query,
            "SELECT B, SUM(E), SUM(C), SUM(D), SUM(F) WHERE B IS NOT NULL GROUP BY B ORDER BY B"
        );
        assert_eq!(
            query.metrics,
            vec![
                CanonicalField::Spend,
                CanonicalField::Impressions,
                CanonicalField::Clicks,
                CanonicalField::Sales
            ]
        );
    }

    #[test]
    fn test_sales_query_limits_metrics() {
        let cols = headers(&[" sales date ", "Spend", "GMV", "Units Sold"]);
        let query = build_aggregate_query(&cols, DataType::Sales).unwrap();
        assert_eq!(
            query.query,
            "SELECT A, SUM(C), SUM(D) WHERE A IS NOT NULL GROUP BY A ORDER BY A"
        );
        assert_eq!(query.metrics, vec![CanonicalField::Sales, CanonicalField::Orders]);
    }

    #[test]
    fn test_missing_date_column() {
        let cols: Vec<String> = (0..20).map(|i| format!("col{}", i)).collect();
        let err = build_aggregate_query(&cols, DataType::Ads).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("Could not find date column. Available headers: col0, col1"));
        assert!(message.contains("col14"));
        assert!(!message.contains("col15"));
    }

    #[test]
    fn test_gviz_dates() {
        let formatted = GvizCell {
            v: Some(json!("Date(2024,11,24)")),
            f: Some("24/12/2024".to_string()),
        };
        assert_eq!(gviz_date(&formatted), "2024-12-24");

        let zero_based = GvizCell {
            v: Some(json!("Date(2024,0,5)")),
            f: None,
        };
        assert_eq!(gviz_date(&zero_based), "2024-01-05");

        let text = GvizCell {
            v: Some(json!("Dec 24, 2024")),
            f: Some("Total".to_string()),
        };
        assert_eq!(gviz_date(&text), "2024-12-24");

        let number = GvizCell {
            v: Some(json!(45650)),
            f: None,
        };
        assert_eq!(gviz_date(&number), "");
    }

    #[test]
    fn test_parse_aggregate_rows() {
        let rows = vec![
            GvizRow {
                c: vec![
                    cell(json!("Date(2024,11,24)"), None),
                    cell(json!(120.5), Some("120.5")),
                    cell(json!("₹1,000"), None),
                ],
            },
            GvizRow {
                c: vec![None, cell(json!(1), None)],
            },
            GvizRow {
                c: vec![cell(json!("Grand Total"), None), cell(json!(999), None)],
            },
            GvizRow {
                c: vec![cell(json!("2024-12-25"), None), None],
            },
        ];
        let metrics = [CanonicalField::Spend, CanonicalField::Sales];
        let aggregates = parse_aggregate_rows(&rows, &metrics);

        assert_eq!(aggregates.len(), 2);
        assert_eq!(aggregates[0].date, "2024-12-24");
        assert_eq!(aggregates[0].spend, 120.5);
        assert_eq!(aggregates[0].sales, 1000.0);
        assert_eq!(aggregates[1].date, "2024-12-25");
        assert_eq!(aggregates[1].spend, 0.0);
    }

    #[test]
    fn test_same_day_groups_are_summed() {
        let rows = vec![
            GvizRow {
                c: vec![cell(json!("Date(2024,11,24,9,0,0)"), None), cell(json!(10), None)],
            },
            GvizRow {
                c: vec![cell(json!("Date(2024,11,24,18,0,0)"), None), cell(json!(20), None)],
            },
        ];
        let aggregates = parse_aggregate_rows(&rows, &[CanonicalField::Spend]);

        assert_eq!(aggregates.len(), 1);
        assert_eq!(aggregates[0].date, "2024-12-24");
        assert_eq!(aggregates[0].spend, 30.0);
    }
}
