//! Reporting date ranges and presets

use crate::error::{Error, Result};
use chrono::{Datelike, Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Named reporting window relative to "today"
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum RangePreset {
    Today,
    #[serde(rename = "last-7-days")]
    #[value(name = "last-7-days")]
    Last7Days,
    #[serde(rename = "last-30-days")]
    #[value(name = "last-30-days")]
    Last30Days,
    ThisMonth,
    LastMonth,
    ThisYear,
}

impl RangePreset {
    pub const ALL: [RangePreset; 6] = [
        RangePreset::Today,
        RangePreset::Last7Days,
        RangePreset::Last30Days,
        RangePreset::ThisMonth,
        RangePreset::LastMonth,
        RangePreset::ThisYear,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RangePreset::Today => "today",
            RangePreset::Last7Days => "last-7-days",
            RangePreset::Last30Days => "last-30-days",
            RangePreset::ThisMonth => "this-month",
            RangePreset::LastMonth => "last-month",
            RangePreset::ThisYear => "this-year",
        }
    }
}

impl std::fmt::Display for RangePreset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RangePreset {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim().to_lowercase();
        RangePreset::ALL
            .into_iter()
            .find(|preset| preset.as_str() == wanted)
            .ok_or_else(|| Error::InvalidInput(format!("Unknown date range preset: {}", s)))
    }
}

/// Inclusive date window; an open end means unbounded
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

fn first_of_month(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap_or(date)
}

impl DateRange {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn new(from: Option<NaiveDate>, to: Option<NaiveDate>) -> Result<Self> {
        if let (Some(from), Some(to)) = (from, to) {
            if from > to {
                return Err(Error::InvalidInput(format!(
                    "Start date {} is after end date {}",
                    from, to
                )));
            }
        }
        Ok(Self { from, to })
    }

    /// Resolve a preset against a given "today"
    pub fn from_preset(preset: RangePreset, today: NaiveDate) -> Self {
        let (from, to) = match preset {
            RangePreset::Today => (today, today),
            RangePreset::Last7Days => (today - Duration::days(7), today),
            RangePreset::Last30Days => (today - Duration::days(30), today),
            RangePreset::ThisMonth => (first_of_month(today), today),
            RangePreset::LastMonth => {
                let end = first_of_month(today) - Duration::days(1);
                (first_of_month(end), end)
            }
            RangePreset::ThisYear => (
                NaiveDate::from_ymd_opt(today.year(), 1, 1).unwrap_or(today),
                today,
            ),
        };
        Self {
            from: Some(from),
            to: Some(to),
        }
    }

    pub fn from_str_bound(&self) -> Option<String> {
        self.from.map(|d| d.format("%Y-%m-%d").to_string())
    }

    pub fn to_str_bound(&self) -> Option<String> {
        self.to.map(|d| d.format("%Y-%m-%d").to_string())
    }
}

impl std::fmt::Display for DateRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (self.from, self.to) {
            (None, None) => write!(f, "all time"),
            (Some(from), None) => write!(f, "since {}", from),
            (None, Some(to)) => write!(f, "until {}", to),
            (Some(from), Some(to)) => write!(f, "{} to {}", from, to),
        }
    }
}
