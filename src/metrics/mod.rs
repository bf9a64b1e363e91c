//! Read-side reporting over stored daily metrics
//!
//! Ads and sales tabs measure different things. Ads rows carry spend,
//! impressions, clicks and ad-attributed sales; sales rows carry product sales
//! and orders. Combined sales add the two without deduplication.

mod range;

pub use range::*;

use crate::error::Result;
use crate::meta::{DailyMetric, DataType, MetaDb, MetricsFilter};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// `numerator / denominator`, or 0 when the denominator is not positive
fn ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator > 0.0 {
        numerator / denominator
    } else {
        0.0
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsSummary {
    pub total_spend: f64,
    pub total_impressions: f64,
    pub total_clicks: f64,
    /// Ad-attributed plus product sales
    pub total_sales: f64,
    pub total_ads_sales: f64,
    pub total_product_sales: f64,
    pub total_orders: f64,
    pub avg_cpi: f64,
    pub avg_ctr: f64,
    pub avg_roas: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlatformMetrics {
    pub platform: String,
    pub total_spend: f64,
    pub total_sales: f64,
    pub total_impressions: f64,
    pub roas: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrendPoint {
    pub date: String,
    pub spend: f64,
    pub sales: f64,
    pub impressions: f64,
    pub clicks: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MonthlySummary {
    /// `YYYY-MM`
    pub month: String,
    pub platform: String,
    pub days: usize,
    pub total_spend: f64,
    pub total_impressions: f64,
    pub total_clicks: f64,
    pub total_sales: f64,
    pub total_orders: f64,
    pub avg_cpi: f64,
    pub avg_ctr: f64,
    pub avg_roas: f64,
}

/// Totals over a set of daily metrics
pub fn summarize(metrics: &[DailyMetric]) -> MetricsSummary {
    let mut summary = MetricsSummary::default();

    for m in metrics {
        match m.data_type {
            DataType::Ads => {
                summary.total_spend += m.total_spend;
                summary.total_impressions += m.total_impressions;
                summary.total_clicks += m.total_clicks;
                summary.total_ads_sales += m.total_sales;
            }
            DataType::Sales => {
                summary.total_product_sales += m.total_sales;
                summary.total_orders += m.total_orders;
            }
        }
    }

    summary.total_sales = summary.total_ads_sales + summary.total_product_sales;
    summary.avg_cpi = ratio(summary.total_spend, summary.total_impressions);
    summary.avg_ctr = ratio(summary.total_clicks, summary.total_impressions) * 100.0;
    summary.avg_roas = ratio(summary.total_sales, summary.total_spend);
    summary
}

/// Per-platform sums across data types, sorted by platform
pub fn by_platform(metrics: &[DailyMetric]) -> Vec<PlatformMetrics> {
    let mut platforms: BTreeMap<&str, PlatformMetrics> = BTreeMap::new();

    for m in metrics {
        let entry = platforms
            .entry(m.platform.as_str())
            .or_insert_with(|| PlatformMetrics {
                platform: m.platform.clone(),
                ..Default::default()
            });
        entry.total_spend += m.total_spend;
        entry.total_sales += m.total_sales;
        entry.total_impressions += m.total_impressions;
    }

    platforms
        .into_values()
        .map(|mut p| {
            p.roas = ratio(p.total_sales, p.total_spend);
            p
        })
        .collect()
}

/// Per-date sums across platforms and data types, oldest first
pub fn daily_trend(metrics: &[DailyMetric]) -> Vec<TrendPoint> {
    let mut days: BTreeMap<&str, TrendPoint> = BTreeMap::new();

    for m in metrics {
        let point = days.entry(m.date.as_str()).or_insert_with(|| TrendPoint {
            date: m.date.clone(),
            ..Default::default()
        });
        point.spend += m.total_spend;
        point.sales += m.total_sales;
        point.impressions += m.total_impressions;
        point.clicks += m.total_clicks;
    }

    days.into_values().collect()
}

/// Per (month, platform) roll-up, newest month first
pub fn monthly_summary(metrics: &[DailyMetric]) -> Vec<MonthlySummary> {
    let mut months: BTreeMap<(String, &str), MonthlySummary> = BTreeMap::new();

    for m in metrics {
        let month: String = m.date.chars().take(7).collect();
        let entry = months
            .entry((month.clone(), m.platform.as_str()))
            .or_insert_with(|| MonthlySummary {
                month,
                platform: m.platform.clone(),
                ..Default::default()
            });
        entry.days += 1;
        entry.total_spend += m.total_spend;
        entry.total_impressions += m.total_impressions;
        entry.total_clicks += m.total_clicks;
        entry.total_sales += m.total_sales;
        entry.total_orders += m.total_orders;
    }

    let mut rows: Vec<MonthlySummary> = months
        .into_values()
        .map(|mut s| {
            s.avg_cpi = ratio(s.total_spend, s.total_impressions);
            s.avg_ctr = ratio(s.total_clicks, s.total_impressions) * 100.0;
            s.avg_roas = ratio(s.total_sales, s.total_spend);
            s
        })
        .collect();
    rows.sort_by(|a, b| b.month.cmp(&a.month).then_with(|| a.platform.cmp(&b.platform)));
    rows
}

fn filter_for(range: &DateRange, platform: Option<&str>) -> MetricsFilter {
    MetricsFilter {
        from: range.from_str_bound(),
        to: range.to_str_bound(),
        platform: platform.map(str::to_string),
        data_type: None,
    }
}

pub async fn load_summary(db: &MetaDb, range: &DateRange, platform: Option<&str>) -> Result<MetricsSummary> {
    let metrics = db.get_daily_metrics(&filter_for(range, platform)).await?;
    Ok(summarize(&metrics))
}

pub async fn load_by_platform(db: &MetaDb, range: &DateRange) -> Result<Vec<PlatformMetrics>> {
    let metrics = db.get_daily_metrics(&filter_for(range, None)).await?;
    Ok(by_platform(&metrics))
}

pub async fn load_daily_trend(
    db: &MetaDb,
    range: &DateRange,
    platform: Option<&str>,
) -> Result<Vec<TrendPoint>> {
    let metrics = db.get_daily_metrics(&filter_for(range, platform)).await?;
    Ok(daily_trend(&metrics))
}

pub async fn load_monthly_summary(
    db: &MetaDb,
    range: &DateRange,
    platform: Option<&str>,
) -> Result<Vec<MonthlySummary>> {
    let metrics = db.get_daily_metrics(&filter_for(range, platform)).await?;
    Ok(monthly_summary(&metrics))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::AggregatedDay;
    use chrono::NaiveDate;
    use tempfile::TempDir;

    fn metric(date: &str, platform: &str, data_type: DataType, spend: f64, sales: f64) -> DailyMetric {
        DailyMetric {
            id: format!("{}-{}-{}", date, platform, data_type),
            date: date.to_string(),
            platform: platform.to_string(),
            data_type,
            total_spend: spend,
            total_impressions: 1000.0,
            total_clicks: 20.0,
            total_sales: sales,
            total_orders: 5.0,
            cpi: 0.0,
            ctr: 0.0,
            cpc: 0.0,
            roas: 0.0,
            synced_at: "2025-01-01T00:00:00Z".to_string(),
        }
    }

    #[test]
    fn test_summary_splits_by_data_type() {
        let metrics = vec![
            metric("2024-12-24", "swiggy", DataType::Ads, 100.0, 300.0),
            metric("2024-12-24", "swiggy", DataType::Sales, 0.0, 700.0),
            metric("2024-12-25", "zepto", DataType::Ads, 100.0, 200.0),
        ];
        let summary = summarize(&metrics);

        assert_eq!(summary.total_spend, 200.0);
        assert_eq!(summary.total_impressions, 2000.0);
        assert_eq!(summary.total_clicks, 40.0);
        assert_eq!(summary.total_ads_sales, 500.0);
        assert_eq!(summary.total_product_sales, 700.0);
        assert_eq!(summary.total_sales, 1200.0);
        assert_eq!(summary.total_orders, 5.0);
        assert_eq!(summary.avg_cpi, 0.1);
        assert_eq!(summary.avg_ctr, 2.0);
        assert_eq!(summary.avg_roas, 6.0);
    }

    #[test]
    fn test_zero_spend_gives_zero_roas() {
        let metrics = vec![metric("2024-12-24", "blinkit", DataType::Sales, 0.0, 500.0)];
        let summary = summarize(&metrics);
        assert_eq!(summary.avg_roas, 0.0);
        assert_eq!(summary.avg_cpi, 0.0);
        assert_eq!(summary.avg_ctr, 0.0);

        let empty = summarize(&[]);
        assert_eq!(empty, MetricsSummary::default());
    }

    #[test]
    fn test_by_platform_sorted_with_roas() {
        let metrics = vec![
            metric("2024-12-24", "zepto", DataType::Ads, 50.0, 100.0),
            metric("2024-12-24", "blinkit", DataType::Sales, 0.0, 90.0),
            metric("2024-12-25", "zepto", DataType::Sales, 0.0, 50.0),
        ];
        let platforms = by_platform(&metrics);

        assert_eq!(platforms.len(), 2);
        assert_eq!(platforms[0].platform, "blinkit");
        assert_eq!(platforms[0].roas, 0.0);
        assert_eq!(platforms[1].total_sales, 150.0);
        assert_eq!(platforms[1].roas, 3.0);
    }

    #[test]
    fn test_daily_trend_ascending() {
        let metrics = vec![
            metric("2024-12-25", "zepto", DataType::Ads, 5.0, 1.0),
            metric("2024-12-24", "swiggy", DataType::Ads, 10.0, 2.0),
            metric("2024-12-25", "swiggy", DataType::Ads, 20.0, 3.0),
        ];
        let trend = daily_trend(&metrics);

        assert_eq!(trend.len(), 2);
        assert_eq!(trend[0].date, "2024-12-24");
        assert_eq!(trend[1].spend, 25.0);
        assert_eq!(trend[1].sales, 4.0);
        assert_eq!(trend[1].clicks, 40.0);
    }

    #[test]
    fn test_monthly_summary_newest_first() {
        let metrics = vec![
            metric("2024-11-30", "swiggy", DataType::Ads, 10.0, 40.0),
            metric("2024-12-01", "swiggy", DataType::Ads, 10.0, 10.0),
            metric("2024-12-02", "swiggy", DataType::Ads, 10.0, 10.0),
            metric("2024-12-02", "blinkit", DataType::Ads, 0.0, 10.0),
        ];
        let months = monthly_summary(&metrics);

        assert_eq!(months.len(), 3);
        assert_eq!(months[0].month, "2024-12");
        assert_eq!(months[0].platform, "blinkit");
        assert_eq!(months[0].avg_roas, 0.0);
        assert_eq!(months[1].platform, "swiggy");
        assert_eq!(months[1].days, 2);
        assert_eq!(months[1].avg_roas, 1.0);
        assert_eq!(months[2].month, "2024-11");
        assert_eq!(months[2].avg_roas, 4.0);
    }

    #[tokio::test]
    async fn test_load_summary_applies_range() {
        let tmp = TempDir::new().unwrap();
        let db = MetaDb::new(&tmp.path().join("metrics.db")).await.unwrap();

        let day = |date: &str, spend: f64| AggregatedDay {
            date: date.to_string(),
            platform: "swiggy".to_string(),
            data_type: DataType::Ads,
            total_spend: spend,
            total_impressions: 100.0,
            total_clicks: 1.0,
            total_sales: spend * 2.0,
            total_orders: 0.0,
        };
        db.upsert_daily_metrics(&[day("2024-12-01", 10.0), day("2025-01-05", 30.0)])
            .await
            .unwrap();

        let range = DateRange::new(NaiveDate::from_ymd_opt(2025, 1, 1), None).unwrap();
        let summary = load_summary(&db, &range, None).await.unwrap();
        assert_eq!(summary.total_spend, 30.0);
        assert_eq!(summary.avg_roas, 2.0);

        let all = load_summary(&db, &DateRange::all(), Some("swiggy")).await.unwrap();
        assert_eq!(all.total_spend, 40.0);

        let none = load_summary(&db, &DateRange::all(), Some("zepto")).await.unwrap();
        assert_eq!(none.total_spend, 0.0);
    }
}
