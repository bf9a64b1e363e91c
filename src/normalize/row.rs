//! Raw and canonical row types and the per-row normalizer

use super::{normalize_date, parse_numeric, CanonicalField, ColumnMapper, ColumnTarget};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A single spreadsheet cell
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(untagged)]
pub enum CellValue {
    Number(f64),
    Text(String),
    #[default]
    Empty,
}

impl CellValue {
    pub fn is_empty(&self) -> bool {
        match self {
            CellValue::Empty => true,
            CellValue::Text(text) => text.trim().is_empty(),
            CellValue::Number(_) => false,
        }
    }

    /// Cell content as text, numbers rendered without a trailing `.0`
    pub fn as_text(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => {
                write!(f, "{}", *n as i64)
            }
            CellValue::Number(n) => write!(f, "{}", n),
            CellValue::Text(text) => f.write_str(text),
            CellValue::Empty => Ok(()),
        }
    }
}

impl From<&str> for CellValue {
    fn from(value: &str) -> Self {
        if value.trim().is_empty() {
            CellValue::Empty
        } else {
            CellValue::Text(value.to_string())
        }
    }
}

impl From<String> for CellValue {
    fn from(value: String) -> Self {
        if value.trim().is_empty() {
            CellValue::Empty
        } else {
            CellValue::Text(value)
        }
    }
}

impl From<f64> for CellValue {
    fn from(value: f64) -> Self {
        CellValue::Number(value)
    }
}

/// One sheet row as ordered (column, cell) pairs.
///
/// Column order is significant: the first non-zero sales column wins.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawRow {
    cells: Vec<(String, CellValue)>,
}

impl RawRow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, column: impl Into<String>, value: impl Into<CellValue>) {
        self.cells.push((column.into(), value.into()));
    }

    /// First cell under `column`, compared case-insensitively
    pub fn get(&self, column: &str) -> Option<&CellValue> {
        self.cells
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(column))
            .map(|(_, value)| value)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &CellValue)> {
        self.cells.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.cells.iter().map(|(name, _)| name.as_str())
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

impl<K: Into<String>, V: Into<CellValue>> FromIterator<(K, V)> for RawRow {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            cells: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// A row in canonical shape
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NormalizedRow {
    /// `YYYY-MM-DD`, or empty when no date column parsed
    pub date: String,
    pub spend: f64,
    pub impressions: f64,
    pub clicks: f64,
    pub sales: f64,
    pub orders: f64,
    pub campaign_name: String,
    pub city: Option<String>,
    pub brand: Option<String>,
    /// Columns with no canonical target, keyed by normalized name
    pub extra: BTreeMap<String, CellValue>,
}

impl NormalizedRow {
    pub fn has_valid_date(&self) -> bool {
        super::is_iso_date(&self.date)
    }
}

fn metric_value(value: &CellValue) -> f64 {
    let n = parse_numeric(value);
    if n.is_finite() && n > 0.0 {
        n
    } else {
        0.0
    }
}

/// Map one raw row onto the canonical shape. Never fails.
pub fn normalize_row(raw: &RawRow, mapper: &ColumnMapper) -> NormalizedRow {
    let mut row = NormalizedRow::default();

    for (column, value) in raw.iter() {
        match mapper.resolve_column(column) {
            ColumnTarget::Canonical(field) => match field {
                CanonicalField::Date => {
                    let date = normalize_date(&value.as_text());
                    if !date.is_empty() {
                        row.date = date;
                    }
                }
                CanonicalField::Spend => row.spend += metric_value(value),
                CanonicalField::Impressions => row.impressions += metric_value(value),
                CanonicalField::Clicks => row.clicks += metric_value(value),
                CanonicalField::Orders => row.orders += metric_value(value),
                CanonicalField::Sales => {
                    if row.sales == 0.0 {
                        row.sales = metric_value(value);
                    }
                }
                CanonicalField::CampaignName => row.campaign_name = value.as_text(),
                CanonicalField::City => row.city = Some(value.as_text()),
                CanonicalField::Brand => row.brand = Some(value.as_text()),
            },
            ColumnTarget::PassThrough(key) => {
                row.extra.insert(key, value.clone());
            }
        }
    }

    row
}
