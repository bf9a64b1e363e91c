//! Sync command implementation

use crate::error::Result;
use crate::meta::MetaDb;
use crate::sheets::{SheetFetcher, SheetQuery};
use crate::sync::{SyncMode, SyncResult, Syncer};
use serde::Serialize;

#[derive(Debug, Clone, Default)]
pub struct SyncOptions {
    /// Only sync this source; every active source otherwise
    pub source_id: Option<String>,
    pub mode: SyncMode,
    /// Hide the progress bar
    pub quiet: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub mode: SyncMode,
    pub succeeded: usize,
    pub failed: usize,
    pub results: Vec<SyncResult>,
}

impl SyncReport {
    fn from_results(mode: SyncMode, results: Vec<SyncResult>) -> Self {
        let succeeded = results.iter().filter(|r| r.success).count();
        Self {
            mode,
            succeeded,
            failed: results.len() - succeeded,
            results,
        }
    }

    pub fn has_failures(&self) -> bool {
        self.failed > 0
    }
}

/// Sync one source or every active source
pub async fn cmd_sync(
    db: &MetaDb,
    fetcher: &dyn SheetFetcher,
    query: &dyn SheetQuery,
    options: SyncOptions,
) -> Result<SyncReport> {
    let syncer = Syncer::new(db, fetcher, query);

    let results = match options.source_id {
        Some(source_id) => vec![syncer.sync_source_by_id(&source_id, options.mode).await],
        None => syncer.sync_all(options.mode, options.quiet).await?,
    };

    Ok(SyncReport::from_results(options.mode, results))
}

pub fn print_sync_report(report: &SyncReport) {
    if report.results.is_empty() {
        println!("No active sources to sync. Use 'adpulse sources add' to add one.");
        return;
    }

    println!("\n🔄 Sync ({} mode)\n", report.mode);
    for result in &report.results {
        if result.success {
            println!(
                "✓ {}: {} rows, {} days",
                result.source_name, result.rows_fetched, result.days_aggregated
            );
        } else {
            println!(
                "✗ {}: {}",
                result.source_name,
                result.error.as_deref().unwrap_or("unknown error")
            );
        }
    }
    println!("\n{} synced, {} failed", report.succeeded, report.failed);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::DailyAggregate;
    use crate::error::Error;
    use crate::meta::{DataSource, DataType};
    use crate::normalize::RawRow;
    use async_trait::async_trait;
    use tempfile::TempDir;

    struct OneDaySheet;

    #[async_trait]
    impl SheetFetcher for OneDaySheet {
        async fn fetch_rows(
            &self,
            sheet_id: &str,
            _tab_name: Option<&str>,
            _grid_id: Option<&str>,
        ) -> Result<Vec<RawRow>> {
            if sheet_id == "broken" {
                return Err(Error::Sheet("Sheet not accessible (403)".to_string()));
            }
            Ok(vec![[("Date", "2024-12-24"), ("Spend", "100")]
                .into_iter()
                .collect()])
        }
    }

    #[async_trait]
    impl SheetQuery for OneDaySheet {
        async fn query_daily(
            &self,
            _sheet_id: &str,
            _data_type: DataType,
            _grid_id: Option<&str>,
        ) -> Result<Vec<DailyAggregate>> {
            Ok(Vec::new())
        }
    }

    async fn add_source(db: &MetaDb, sheet_id: &str, platform: &str) -> DataSource {
        let source = DataSource::new(
            format!("{} ads", platform),
            sheet_id.to_string(),
            format!("https://docs.google.com/spreadsheets/d/{}/edit", sheet_id),
            platform,
            DataType::Ads,
        );
        db.insert_source(&source).await.unwrap();
        source
    }

    #[tokio::test]
    async fn test_sync_all_reports_failures() {
        let temp = TempDir::new().unwrap();
        let db = MetaDb::new(&temp.path().join("test.db")).await.unwrap();
        add_source(&db, "good", "swiggy").await;
        add_source(&db, "broken", "zepto").await;

        let options = SyncOptions {
            quiet: true,
            ..Default::default()
        };
        let report = cmd_sync(&db, &OneDaySheet, &OneDaySheet, options).await.unwrap();

        assert_eq!(report.results.len(), 2);
        assert_eq!(report.succeeded, 1);
        assert_eq!(report.failed, 1);
        assert!(report.has_failures());
    }

    #[tokio::test]
    async fn test_sync_single_source() {
        let temp = TempDir::new().unwrap();
        let db = MetaDb::new(&temp.path().join("test.db")).await.unwrap();
        let source = add_source(&db, "good", "swiggy").await;
        add_source(&db, "broken", "zepto").await;

        let options = SyncOptions {
            source_id: Some(source.id.clone()),
            quiet: true,
            ..Default::default()
        };
        let report = cmd_sync(&db, &OneDaySheet, &OneDaySheet, options).await.unwrap();

        assert_eq!(report.results.len(), 1);
        assert!(!report.has_failures());
        assert_eq!(report.results[0].days_aggregated, 1);
    }
}
