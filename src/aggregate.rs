//! Daily aggregation of normalized rows

use crate::meta::DataType;
use crate::normalize::NormalizedRow;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

/// Totals for one (date, platform, data type)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedDay {
    pub date: String,
    pub platform: String,
    pub data_type: DataType,
    pub total_spend: f64,
    pub total_impressions: f64,
    pub total_clicks: f64,
    pub total_sales: f64,
    pub total_orders: f64,
}

/// Per-day sums as returned by a server-side sheet query
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DailyAggregate {
    pub date: String,
    pub spend: f64,
    pub impressions: f64,
    pub clicks: f64,
    pub sales: f64,
    pub orders: f64,
}

impl AggregatedDay {
    fn empty(date: &str, platform: &str, data_type: DataType) -> Self {
        Self {
            date: date.to_string(),
            platform: platform.to_string(),
            data_type,
            total_spend: 0.0,
            total_impressions: 0.0,
            total_clicks: 0.0,
            total_sales: 0.0,
            total_orders: 0.0,
        }
    }

    pub fn from_daily(daily: DailyAggregate, platform: &str, data_type: DataType) -> Self {
        Self {
            date: daily.date,
            platform: platform.to_string(),
            data_type,
            total_spend: daily.spend,
            total_impressions: daily.impressions,
            total_clicks: daily.clicks,
            total_sales: daily.sales,
            total_orders: daily.orders,
        }
    }
}

/// Group rows by date and sum the five metrics.
///
/// Rows without a date are skipped. The result is ordered by date.
pub fn aggregate_by_date(
    rows: &[NormalizedRow],
    platform: &str,
    data_type: DataType,
) -> Vec<AggregatedDay> {
    let mut days: BTreeMap<&str, (AggregatedDay, usize)> = BTreeMap::new();

    for row in rows.iter().filter(|r| !r.date.is_empty()) {
        let (day, count) = days
            .entry(row.date.as_str())
            .or_insert_with(|| (AggregatedDay::empty(&row.date, platform, data_type), 0));
        day.total_spend += row.spend;
        day.total_impressions += row.impressions;
        day.total_clicks += row.clicks;
        day.total_sales += row.sales;
        day.total_orders += row.orders;
        *count += 1;
    }

    days.into_values()
        .map(|(day, count)| {
            debug!(date = %day.date, platform, rows = count, "Aggregated day");
            day
        })
        .collect()
}

/// Fold per-day sums that share a date into one entry per date.
///
/// A grouped sheet query can return several groups for one calendar day when
/// the date column holds datetimes or mixed text formats. Result is ordered
/// by date.
pub fn merge_daily(daily: Vec<DailyAggregate>) -> Vec<DailyAggregate> {
    let groups = daily.len();
    let mut days: BTreeMap<String, DailyAggregate> = BTreeMap::new();

    for d in daily {
        let day = days.entry(d.date.clone()).or_insert_with(|| DailyAggregate {
            date: d.date.clone(),
            ..Default::default()
        });
        day.spend += d.spend;
        day.impressions += d.impressions;
        day.clicks += d.clicks;
        day.sales += d.sales;
        day.orders += d.orders;
    }

    if days.len() < groups {
        debug!(groups, days = days.len(), "Merged query groups sharing a date");
    }
    days.into_values().collect()
}
