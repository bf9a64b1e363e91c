//! Reporting commands: summary, platform breakdown, trend and monthly rollups

use crate::config::Config;
use crate::error::Result;
use crate::meta::MetaDb;
use crate::metrics::{
    load_by_platform, load_daily_trend, load_monthly_summary, load_summary, DateRange,
    MetricsSummary, MonthlySummary, PlatformMetrics, RangePreset, TrendPoint,
};
use chrono::{Local, NaiveDate};
use serde::Serialize;

/// Date window as given on the command line
#[derive(Debug, Clone, Default)]
pub struct RangeOptions {
    pub preset: Option<RangePreset>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    /// Ignore dates entirely
    pub all: bool,
}

impl RangeOptions {
    /// Explicit dates win over a preset; with neither, the configured default applies
    pub fn resolve(&self, config: &Config, today: NaiveDate) -> Result<DateRange> {
        if self.all {
            return Ok(DateRange::all());
        }
        if self.from.is_some() || self.to.is_some() {
            return DateRange::new(self.from, self.to);
        }
        let preset = match self.preset {
            Some(preset) => preset,
            None => config.dashboard.range_preset()?,
        };
        Ok(DateRange::from_preset(preset, today))
    }
}

fn resolve_range(config: &Config, range: &RangeOptions) -> Result<DateRange> {
    range.resolve(config, Local::now().date_naive())
}

#[derive(Debug, Clone, Serialize)]
pub struct Report<T> {
    pub range: DateRange,
    pub platform: Option<String>,
    pub data: T,
}

pub async fn cmd_summary(
    config: &Config,
    db: &MetaDb,
    range: &RangeOptions,
    platform: Option<&str>,
) -> Result<Report<MetricsSummary>> {
    let range = resolve_range(config, range)?;
    let data = load_summary(db, &range, platform).await?;
    Ok(Report {
        range,
        platform: platform.map(str::to_string),
        data,
    })
}

pub async fn cmd_platforms(
    config: &Config,
    db: &MetaDb,
    range: &RangeOptions,
) -> Result<Report<Vec<PlatformMetrics>>> {
    let range = resolve_range(config, range)?;
    let data = load_by_platform(db, &range).await?;
    Ok(Report {
        range,
        platform: None,
        data,
    })
}

pub async fn cmd_trend(
    config: &Config,
    db: &MetaDb,
    range: &RangeOptions,
    platform: Option<&str>,
) -> Result<Report<Vec<TrendPoint>>> {
    let range = resolve_range(config, range)?;
    let data = load_daily_trend(db, &range, platform).await?;
    Ok(Report {
        range,
        platform: platform.map(str::to_string),
        data,
    })
}

pub async fn cmd_monthly(
    config: &Config,
    db: &MetaDb,
    range: &RangeOptions,
    platform: Option<&str>,
) -> Result<Report<Vec<MonthlySummary>>> {
    let range = resolve_range(config, range)?;
    let data = load_monthly_summary(db, &range, platform).await?;
    Ok(Report {
        range,
        platform: platform.map(str::to_string),
        data,
    })
}

fn print_heading<T>(title: &str, report: &Report<T>) {
    match &report.platform {
        Some(platform) => println!("\n📈 {} ({}, {})\n", title, platform, report.range),
        None => println!("\n📈 {} ({})\n", title, report.range),
    }
}

pub fn print_summary(report: &Report<MetricsSummary>) {
    print_heading("Summary", report);
    let s = &report.data;
    println!("Spend:         {:.2}", s.total_spend);
    println!("Impressions:   {:.0}", s.total_impressions);
    println!("Clicks:        {:.0}", s.total_clicks);
    println!(
        "Sales:         {:.2} (ads {:.2}, product {:.2})",
        s.total_sales, s.total_ads_sales, s.total_product_sales
    );
    println!("Orders:        {:.0}", s.total_orders);
    println!("Avg CPI:       {:.4}", s.avg_cpi);
    println!("Avg CTR:       {:.2}%", s.avg_ctr);
    println!("Avg ROAS:      {:.2}", s.avg_roas);
}

pub fn print_platforms(report: &Report<Vec<PlatformMetrics>>) {
    print_heading("By platform", report);
    if report.data.is_empty() {
        println!("No metrics in range.");
        return;
    }
    println!(
        "{:<16} {:>14} {:>14} {:>14} {:>8}",
        "PLATFORM", "SPEND", "SALES", "IMPRESSIONS", "ROAS"
    );
    for p in &report.data {
        println!(
            "{:<16} {:>14.2} {:>14.2} {:>14.0} {:>8.2}",
            p.platform, p.total_spend, p.total_sales, p.total_impressions, p.roas
        );
    }
}

pub fn print_trend(report: &Report<Vec<TrendPoint>>) {
    print_heading("Daily trend", report);
    if report.data.is_empty() {
        println!("No metrics in range.");
        return;
    }
    println!(
        "{:<12} {:>14} {:>14} {:>14} {:>10}",
        "DATE", "SPEND", "SALES", "IMPRESSIONS", "CLICKS"
    );
    for point in &report.data {
        println!(
            "{:<12} {:>14.2} {:>14.2} {:>14.0} {:>10.0}",
            point.date, point.spend, point.sales, point.impressions, point.clicks
        );
    }
}

pub fn print_monthly(report: &Report<Vec<MonthlySummary>>) {
    print_heading("Monthly", report);
    if report.data.is_empty() {
        println!("No metrics in range.");
        return;
    }
    println!(
        "{:<8} {:<12} {:>5} {:>14} {:>14} {:>8} {:>8}",
        "MONTH", "PLATFORM", "DAYS", "SPEND", "SALES", "CTR%", "ROAS"
    );
    for m in &report.data {
        println!(
            "{:<8} {:<12} {:>5} {:>14.2} {:>14.2} {:>8.2} {:>8.2}",
            m.month, m.platform, m.days, m.total_spend, m.total_sales, m.avg_ctr, m.avg_roas
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::AggregatedDay;
    use crate::meta::DataType;
    use tempfile::TempDir;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_range_resolution_order() {
        let config = Config::default();
        let today = date(2025, 3, 15);

        let range = RangeOptions::default().resolve(&config, today).unwrap();
        assert_eq!(range.from, Some(date(2025, 2, 13)));
        assert_eq!(range.to, Some(today));

        let options = RangeOptions {
            preset: Some(RangePreset::ThisMonth),
            from: Some(date(2025, 1, 1)),
            ..Default::default()
        };
        let range = options.resolve(&config, today).unwrap();
        assert_eq!(range.from, Some(date(2025, 1, 1)));
        assert_eq!(range.to, None);

        let options = RangeOptions {
            all: true,
            preset: Some(RangePreset::Today),
            ..Default::default()
        };
        assert_eq!(options.resolve(&config, today).unwrap(), DateRange::all());

        let options = RangeOptions {
            from: Some(date(2025, 2, 1)),
            to: Some(date(2025, 1, 1)),
            ..Default::default()
        };
        assert!(options.resolve(&config, today).is_err());
    }

    #[tokio::test]
    async fn test_summary_over_all_dates() {
        let temp = TempDir::new().unwrap();
        let db = MetaDb::new(&temp.path().join("test.db")).await.unwrap();
        db.upsert_daily_metrics(&[
            AggregatedDay {
                date: "2024-12-24".to_string(),
                platform: "swiggy".to_string(),
                data_type: DataType::Ads,
                total_spend: 100.0,
                total_impressions: 1000.0,
                total_clicks: 10.0,
                total_sales: 300.0,
                total_orders: 0.0,
            },
            AggregatedDay {
                date: "2024-12-24".to_string(),
                platform: "swiggy".to_string(),
                data_type: DataType::Sales,
                total_spend: 0.0,
                total_impressions: 0.0,
                total_clicks: 0.0,
                total_sales: 200.0,
                total_orders: 4.0,
            },
        ])
        .await
        .unwrap();

        let range = RangeOptions {
            all: true,
            ..Default::default()
        };
        let report = cmd_summary(&Config::default(), &db, &range, Some("swiggy"))
            .await
            .unwrap();
        assert_eq!(report.data.total_sales, 500.0);
        assert_eq!(report.data.avg_roas, 5.0);

        let report = cmd_platforms(&Config::default(), &db, &range).await.unwrap();
        assert_eq!(report.data.len(), 1);
        assert_eq!(report.data[0].platform, "swiggy");
    }
}
