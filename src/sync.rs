//! Sync orchestration
//!
//! One pass per data source: fetch, normalize, keep rows with valid dates,
//! aggregate per day, upsert, mark the source synced. The query path skips
//! normalization and aggregation because the spreadsheet service returns
//! per-day sums directly.
//!
//! Every failure inside a pass becomes a failed [`SyncResult`]; a batch never
//! stops early.

use crate::aggregate::{aggregate_by_date, merge_daily, AggregatedDay};
use crate::meta::{DataSource, DataType, MetaDb, RunOutcome, RunStatus};
use crate::normalize::{build_mapper, normalize_row, NormalizedRow};
use crate::progress::SyncProgress;
use crate::sheets::{SheetFetcher, SheetQuery};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info, warn};

/// Grid id assumed by the query path when a source has none
const DEFAULT_QUERY_GRID_ID: &str = "0";

/// Which collaborator supplies the data
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum SyncMode {
    /// Download the CSV export and aggregate locally
    #[default]
    Csv,
    /// Let the spreadsheet service group and sum by date
    Query,
}

impl SyncMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncMode::Csv => "csv",
            SyncMode::Query => "query",
        }
    }
}

impl std::fmt::Display for SyncMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Steps of a sync pass, in order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStage {
    Fetch,
    Normalize,
    FilterValidDates,
    Aggregate,
    Upsert,
    MarkSynced,
}

impl SyncStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStage::Fetch => "fetch",
            SyncStage::Normalize => "normalize",
            SyncStage::FilterValidDates => "filter_valid_dates",
            SyncStage::Aggregate => "aggregate",
            SyncStage::Upsert => "upsert",
            SyncStage::MarkSynced => "mark_synced",
        }
    }
}

/// Outcome of one source's sync
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncResult {
    pub success: bool,
    pub source_id: String,
    pub source_name: String,
    pub rows_fetched: usize,
    pub days_aggregated: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SyncResult {
    fn not_found(source_id: &str, error: String) -> Self {
        Self {
            success: false,
            source_id: source_id.to_string(),
            source_name: "Unknown".to_string(),
            rows_fetched: 0,
            days_aggregated: 0,
            error: Some(error),
        }
    }
}

/// Counts gathered while a pass runs
#[derive(Debug, Default)]
struct Tally {
    rows_fetched: usize,
    days_aggregated: usize,
}

#[derive(Debug)]
struct SyncFailure {
    stage: SyncStage,
    message: String,
}

impl SyncFailure {
    fn new(stage: SyncStage, message: impl Into<String>) -> Self {
        Self {
            stage,
            message: message.into(),
        }
    }
}

type PassResult = std::result::Result<(), SyncFailure>;

/// Per-(platform, data type) write locks shared by every syncer in a process
#[derive(Clone, Default)]
pub struct PairLocks {
    inner: Arc<Mutex<HashMap<(String, DataType), Arc<Mutex<()>>>>>,
}

impl PairLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive write access to one (platform, data type) pair
    pub async fn acquire(&self, platform: &str, data_type: DataType) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.inner.lock().await;
            locks
                .entry((platform.to_string(), data_type))
                .or_default()
                .clone()
        };
        lock.lock_owned().await
    }
}

/// Runs sync passes against a store and the spreadsheet collaborators
pub struct Syncer<'a> {
    db: &'a MetaDb,
    fetcher: &'a dyn SheetFetcher,
    query: &'a dyn SheetQuery,
    locks: PairLocks,
}

impl<'a> Syncer<'a> {
    pub fn new(db: &'a MetaDb, fetcher: &'a dyn SheetFetcher, query: &'a dyn SheetQuery) -> Self {
        Self {
            db,
            fetcher,
            query,
            locks: PairLocks::new(),
        }
    }

    /// Share write locks with other syncers
    pub fn with_locks(mut self, locks: PairLocks) -> Self {
        self.locks = locks;
        self
    }

    /// Sync one source through the CSV path
    pub async fn sync_source(&self, source: &DataSource) -> SyncResult {
        self.sync_source_with_mode(source, SyncMode::Csv).await
    }

    /// Sync one source through the query path
    pub async fn sync_source_with_query(&self, source: &DataSource) -> SyncResult {
        self.sync_source_with_mode(source, SyncMode::Query).await
    }

    pub async fn sync_source_with_mode(&self, source: &DataSource, mode: SyncMode) -> SyncResult {
        info!(
            source = %source.name,
            platform = %source.platform,
            data_type = %source.data_type,
            %mode,
            "Starting sync"
        );

        let run_id = self.start_run(source, mode).await;
        let mut tally = Tally::default();

        let pass = match mode {
            SyncMode::Csv => self.csv_pass(source, &mut tally).await,
            SyncMode::Query => self.query_pass(source, &mut tally).await,
        };

        let (result, failed_stage) = match pass {
            Ok(()) => {
                info!(source = %source.name, days = tally.days_aggregated, "Sync complete");
                (
                    SyncResult {
                        success: true,
                        source_id: source.id.clone(),
                        source_name: source.name.clone(),
                        rows_fetched: tally.rows_fetched,
                        days_aggregated: tally.days_aggregated,
                        error: None,
                    },
                    None,
                )
            }
            Err(failure) => {
                warn!(
                    source = %source.name,
                    stage = failure.stage.as_str(),
                    "Sync failed: {}",
                    failure.message
                );
                (
                    SyncResult {
                        success: false,
                        source_id: source.id.clone(),
                        source_name: source.name.clone(),
                        rows_fetched: tally.rows_fetched,
                        days_aggregated: tally.days_aggregated,
                        error: Some(failure.message),
                    },
                    Some(failure.stage),
                )
            }
        };

        if let Some(run_id) = run_id {
            self.finish_run(&run_id, &result, failed_stage).await;
        }
        result
    }

    /// Sync an active source by id
    pub async fn sync_source_by_id(&self, source_id: &str, mode: SyncMode) -> SyncResult {
        let sources = match self.db.list_active_sources().await {
            Ok(sources) => sources,
            Err(e) => return SyncResult::not_found(source_id, e.to_string()),
        };

        match sources.into_iter().find(|s| s.id == source_id) {
            Some(source) => self.sync_source_with_mode(&source, mode).await,
            None => SyncResult::not_found(source_id, "Source not found".to_string()),
        }
    }

    /// Sync sources one after another, one result each
    pub async fn sync_each(
        &self,
        sources: &[DataSource],
        mode: SyncMode,
        progress: &SyncProgress,
    ) -> Vec<SyncResult> {
        let mut results = Vec::with_capacity(sources.len());

        for source in sources {
            progress.begin(&source.name);
            results.push(self.sync_source_with_mode(source, mode).await);
            progress.advance();
        }

        let succeeded = results.iter().filter(|r| r.success).count();
        info!(
            succeeded,
            failed = results.len() - succeeded,
            "Batch sync complete"
        );
        results
    }

    /// Sync every active source. The bar is hidden when `quiet`.
    pub async fn sync_all(&self, mode: SyncMode, quiet: bool) -> crate::Result<Vec<SyncResult>> {
        let sources = self.db.list_active_sources().await?;
        info!(count = sources.len(), %mode, "Syncing active sources");
        let progress = SyncProgress::start(sources.len(), quiet);
        let results = self.sync_each(&sources, mode, &progress).await;
        let succeeded = results.iter().filter(|r| r.success).count();
        progress.finish(succeeded, results.len() - succeeded);
        Ok(results)
    }

    async fn csv_pass(&self, source: &DataSource, tally: &mut Tally) -> PassResult {
        let rows = self
            .fetcher
            .fetch_rows(
                &source.sheet_id,
                source.tab_name.as_deref(),
                source.tab_gid.as_deref(),
            )
            .await
            .map_err(|e| SyncFailure::new(SyncStage::Fetch, e.to_string()))?;

        tally.rows_fetched = rows.len();
        if rows.is_empty() {
            return Err(SyncFailure::new(SyncStage::Fetch, "No data found in sheet"));
        }
        if let Some(first) = rows.first() {
            debug!(columns = ?first.columns().collect::<Vec<_>>(), "Sample raw row columns");
        }

        let mapper = build_mapper(self.db, &source.platform, source.data_type).await;
        let normalized: Vec<NormalizedRow> =
            rows.iter().map(|row| normalize_row(row, &mapper)).collect();

        let (valid, invalid): (Vec<NormalizedRow>, Vec<NormalizedRow>) =
            normalized.into_iter().partition(|row| row.has_valid_date());
        debug!(
            valid = valid.len(),
            total = rows.len(),
            "Rows with valid dates"
        );
        if !invalid.is_empty() {
            let samples: Vec<&str> = invalid.iter().take(5).map(|r| r.date.as_str()).collect();
            debug!(dropped = invalid.len(), ?samples, "Dropped rows without a valid date");
        }

        let days = aggregate_by_date(&valid, &source.platform, source.data_type);
        if days.is_empty() {
            return Err(SyncFailure::new(
                SyncStage::FilterValidDates,
                format!(
                    "No valid data to sync ({} rows fetched but 0 had valid dates)",
                    rows.len()
                ),
            ));
        }

        self.store(source, &days, tally).await
    }

    async fn query_pass(&self, source: &DataSource, tally: &mut Tally) -> PassResult {
        let grid_id = source.tab_gid.as_deref().unwrap_or(DEFAULT_QUERY_GRID_ID);
        let daily = self
            .query
            .query_daily(&source.sheet_id, source.data_type, Some(grid_id))
            .await
            .map_err(|e| SyncFailure::new(SyncStage::Fetch, e.to_string()))?;

        tally.rows_fetched = daily.len();
        if daily.is_empty() {
            return Err(SyncFailure::new(
                SyncStage::Aggregate,
                "No valid data to sync (query returned 0 days)",
            ));
        }

        let days: Vec<AggregatedDay> = merge_daily(daily)
            .into_iter()
            .map(|d| AggregatedDay::from_daily(d, &source.platform, source.data_type))
            .collect();

        self.store(source, &days, tally).await
    }

    /// Upsert and mark synced under the pair lock; the tally counts stored days
    async fn store(&self, source: &DataSource, days: &[AggregatedDay], tally: &mut Tally) -> PassResult {
        let _guard = self.locks.acquire(&source.platform, source.data_type).await;

        tally.days_aggregated = self
            .db
            .upsert_daily_metrics(days)
            .await
            .map_err(|e| SyncFailure::new(SyncStage::Upsert, e.to_string()))?;
        if tally.days_aggregated < days.len() {
            warn!(
                source = %source.name,
                skipped = days.len() - tally.days_aggregated,
                "Some daily totals were not stored"
            );
        }

        self.db
            .mark_source_synced(&source.id)
            .await
            .map_err(|e| SyncFailure::new(SyncStage::MarkSynced, e.to_string()))
    }

    async fn start_run(&self, source: &DataSource, mode: SyncMode) -> Option<String> {
        match self.db.start_sync_run(&source.id, mode.as_str()).await {
            Ok(run) => Some(run.id),
            Err(e) => {
                warn!(source = %source.name, "Failed to record sync run: {}", e);
                None
            }
        }
    }

    async fn finish_run(&self, run_id: &str, result: &SyncResult, failed_stage: Option<SyncStage>) {
        let outcome = RunOutcome {
            status: if result.success {
                RunStatus::Synced
            } else {
                RunStatus::Failed
            },
            failed_stage: failed_stage.map(|s| s.as_str()),
            rows_fetched: result.rows_fetched,
            days_aggregated: result.days_aggregated,
            error: result.error.as_deref(),
        };

        if let Err(e) = self.db.complete_sync_run(run_id, &outcome).await {
            warn!(run_id, "Failed to complete sync run record: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::DailyAggregate;
    use crate::error::{Error, Result};
    use crate::meta::{ColumnMapping, MetricsFilter};
    use crate::normalize::RawRow;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    /// Serves canned rows and daily sums keyed by sheet id
    #[derive(Default)]
    struct FakeSheets {
        rows: HashMap<String, Vec<RawRow>>,
        days: HashMap<String, Vec<DailyAggregate>>,
        fetches: AtomicUsize,
    }

    impl FakeSheets {
        fn with_rows(mut self, sheet_id: &str, rows: Vec<RawRow>) -> Self {
            self.rows.insert(sheet_id.to_string(), rows);
            self
        }

        fn with_days(mut self, sheet_id: &str, days: Vec<DailyAggregate>) -> Self {
            self.days.insert(sheet_id.to_string(), days);
            self
        }
    }

    #[async_trait]
    impl SheetFetcher for FakeSheets {
        async fn fetch_rows(
            &self,
            sheet_id: &str,
            _tab_name: Option<&str>,
            _grid_id: Option<&str>,
        ) -> Result<Vec<RawRow>> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            self.rows.get(sheet_id).cloned().ok_or_else(|| {
                Error::Sheet(
                    "Sheet not accessible (404). Make sure it's published to web or shared with \"Anyone with link\"."
                        .to_string(),
                )
            })
        }
    }

    #[async_trait]
    impl SheetQuery for FakeSheets {
        async fn query_daily(
            &self,
            sheet_id: &str,
            _data_type: DataType,
            grid_id: Option<&str>,
        ) -> Result<Vec<DailyAggregate>> {
            assert!(grid_id.is_some());
            self.days
                .get(sheet_id)
                .cloned()
                .ok_or_else(|| Error::Sheet("Could not find date column. Available headers: ".to_string()))
        }
    }

    fn row(cells: &[(&str, &str)]) -> RawRow {
        cells.iter().map(|(k, v)| (*k, *v)).collect()
    }

    fn ads_rows() -> Vec<RawRow> {
        vec![
            row(&[("METRICS_DATE", "2024-12-24"), ("TOTAL_BUDGET_BURNT", "10"), ("TOTAL_GMV", "40")]),
            row(&[("METRICS_DATE", "24/12/2024"), ("TOTAL_BUDGET_BURNT", "20"), ("TOTAL_GMV", "0")]),
            row(&[("METRICS_DATE", "2024-12-24"), ("TOTAL_BUDGET_BURNT", "0"), ("TOTAL_GMV", "")]),
            row(&[("METRICS_DATE", "Dec 25, 2024"), ("TOTAL_BUDGET_BURNT", "₹1,000"), ("TOTAL_GMV", "₹2,500")]),
            row(&[("METRICS_DATE", "Total"), ("TOTAL_BUDGET_BURNT", "1030"), ("TOTAL_GMV", "2540")]),
        ]
    }

    async fn setup() -> (MetaDb, TempDir) {
        let tmp = TempDir::new().unwrap();
        let db = MetaDb::new(&tmp.path().join("metrics.db")).await.unwrap();
        (db, tmp)
    }

    async fn add_source(db: &MetaDb, sheet_id: &str, platform: &str, data_type: DataType) -> DataSource {
        let source = DataSource::new(
            format!("{} {}", platform, data_type),
            sheet_id.to_string(),
            format!("https://docs.google.com/spreadsheets/d/{}/edit", sheet_id),
            platform,
            data_type,
        );
        db.insert_source(&source).await.unwrap();
        source
    }

    async fn all_metrics(db: &MetaDb) -> Vec<crate::meta::DailyMetric> {
        db.get_daily_metrics(&MetricsFilter::default()).await.unwrap()
    }

    #[tokio::test]
    async fn test_csv_sync_aggregates_and_marks_source() {
        let (db, _tmp) = setup().await;
        let sheets = FakeSheets::default().with_rows("swiggy-ads", ads_rows());
        let source = add_source(&db, "swiggy-ads", "swiggy", DataType::Ads).await;

        let result = Syncer::new(&db, &sheets, &sheets).sync_source(&source).await;

        assert!(result.success, "{:?}", result.error);
        assert_eq!(result.rows_fetched, 5);
        assert_eq!(result.days_aggregated, 2);

        let metrics = all_metrics(&db).await;
        assert_eq!(metrics.len(), 2);
        assert_eq!(metrics[0].date, "2024-12-24");
        assert_eq!(metrics[0].total_spend, 30.0);
        assert_eq!(metrics[0].total_sales, 40.0);
        assert_eq!(metrics[1].total_spend, 1000.0);

        let stored = db.get_source(&source.id).await.unwrap().unwrap();
        assert!(stored.last_synced_at.is_some());

        let run = db.get_latest_run(&source.id).await.unwrap().unwrap();
        assert_eq!(run.status, "synced");
        assert_eq!(run.days_aggregated, 2);
    }

    #[tokio::test]
    async fn test_resync_replaces_totals() {
        let (db, _tmp) = setup().await;
        let source = add_source(&db, "s1", "swiggy", DataType::Ads).await;

        let first = FakeSheets::default().with_rows("s1", ads_rows());
        assert!(Syncer::new(&db, &first, &first).sync_source(&source).await.success);

        let second = FakeSheets::default().with_rows(
            "s1",
            vec![row(&[("date", "2024-12-24"), ("spend", "5")])],
        );
        assert!(Syncer::new(&db, &second, &second).sync_source(&source).await.success);

        let metrics = all_metrics(&db).await;
        assert_eq!(metrics.len(), 2);
        assert_eq!(metrics[0].total_spend, 5.0);
        assert_eq!(metrics[1].total_spend, 1000.0);
    }

    #[tokio::test]
    async fn test_resync_same_data_is_idempotent() {
        let (db, _tmp) = setup().await;
        let sheets = FakeSheets::default().with_rows("s1", ads_rows());
        let source = add_source(&db, "s1", "swiggy", DataType::Ads).await;
        let syncer = Syncer::new(&db, &sheets, &sheets);

        assert!(syncer.sync_source(&source).await.success);
        let first = all_metrics(&db).await;
        assert!(syncer.sync_source(&source).await.success);
        let second = all_metrics(&db).await;

        let totals = |metrics: &[crate::meta::DailyMetric]| -> Vec<(String, f64, f64)> {
            metrics
                .iter()
                .map(|m| (m.date.clone(), m.total_spend, m.total_sales))
                .collect()
        };
        assert_eq!(first.len(), 2);
        assert_eq!(totals(&first), totals(&second));
        assert_eq!(
            first.iter().map(|m| &m.id).collect::<Vec<_>>(),
            second.iter().map(|m| &m.id).collect::<Vec<_>>()
        );
    }

    #[tokio::test]
    async fn test_query_groups_on_same_day_are_summed() {
        let (db, _tmp) = setup().await;
        let groups = vec![
            DailyAggregate {
                date: "2024-12-24".to_string(),
                spend: 10.0,
                ..Default::default()
            },
            DailyAggregate {
                date: "2024-12-24".to_string(),
                spend: 20.0,
                ..Default::default()
            },
        ];
        let sheets = FakeSheets::default().with_days("q", groups);
        let source = add_source(&db, "q", "swiggy", DataType::Ads).await;

        let result = Syncer::new(&db, &sheets, &sheets)
            .sync_source_with_query(&source)
            .await;

        assert!(result.success, "{:?}", result.error);
        assert_eq!(result.rows_fetched, 2);
        assert_eq!(result.days_aggregated, 1);
        let metrics = all_metrics(&db).await;
        assert_eq!(metrics.len(), 1);
        assert_eq!(metrics[0].total_spend, 30.0);
    }

    #[tokio::test]
    async fn test_days_aggregated_counts_stored_days() {
        let (db, _tmp) = setup().await;
        let days = vec![
            DailyAggregate {
                date: "2024-12-24".to_string(),
                spend: 10.0,
                ..Default::default()
            },
            DailyAggregate {
                date: "2024-13-40".to_string(),
                spend: 5.0,
                ..Default::default()
            },
        ];
        let sheets = FakeSheets::default().with_days("q", days);
        let source = add_source(&db, "q", "zepto", DataType::Ads).await;

        let result = Syncer::new(&db, &sheets, &sheets)
            .sync_source_with_query(&source)
            .await;

        assert!(result.success, "{:?}", result.error);
        assert_eq!(result.rows_fetched, 2);
        assert_eq!(result.days_aggregated, 1);
        assert_eq!(all_metrics(&db).await.len(), 1);
        let run = db.get_latest_run(&source.id).await.unwrap().unwrap();
        assert_eq!(run.days_aggregated, 1);
    }

    #[tokio::test]
    async fn test_empty_sheet_fails() {
        let (db, _tmp) = setup().await;
        let sheets = FakeSheets::default().with_rows("empty", vec![]);
        let source = add_source(&db, "empty", "zepto", DataType::Sales).await;

        let result = Syncer::new(&db, &sheets, &sheets).sync_source(&source).await;

        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("No data found in sheet"));
        let run = db.get_latest_run(&source.id).await.unwrap().unwrap();
        assert_eq!(run.status, "failed");
        assert_eq!(run.failed_stage.as_deref(), Some("fetch"));
        assert!(db.get_source(&source.id).await.unwrap().unwrap().last_synced_at.is_none());
    }

    #[tokio::test]
    async fn test_all_invalid_dates_fails() {
        let (db, _tmp) = setup().await;
        let sheets = FakeSheets::default().with_rows(
            "bad",
            vec![
                row(&[("date", "Total"), ("spend", "10")]),
                row(&[("date", ""), ("spend", "10")]),
                row(&[("campaign", "No date column")]),
            ],
        );
        let source = add_source(&db, "bad", "zepto", DataType::Ads).await;

        let result = Syncer::new(&db, &sheets, &sheets).sync_source(&source).await;

        assert!(!result.success);
        assert_eq!(
            result.error.as_deref(),
            Some("No valid data to sync (3 rows fetched but 0 had valid dates)")
        );
        assert_eq!(result.rows_fetched, 3);
        assert!(all_metrics(&db).await.is_empty());
    }

    #[tokio::test]
    async fn test_batch_continues_past_failures() {
        let (db, _tmp) = setup().await;
        let sheets = FakeSheets::default()
            .with_rows("a", ads_rows())
            .with_rows("c", vec![row(&[("Sales Date", "05-06-2024"), ("GMV", "99")])]);
        add_source(&db, "a", "swiggy", DataType::Ads).await;
        add_source(&db, "missing", "zepto", DataType::Ads).await;
        add_source(&db, "c", "blinkit", DataType::Sales).await;

        let results = Syncer::new(&db, &sheets, &sheets)
            .sync_all(SyncMode::Csv, true)
            .await
            .unwrap();

        assert_eq!(results.len(), 3);
        assert_eq!(sheets.fetches.load(Ordering::SeqCst), 3);
        let failed: Vec<&SyncResult> = results.iter().filter(|r| !r.success).collect();
        assert_eq!(failed.len(), 1);
        assert!(failed[0]
            .error
            .as_deref()
            .unwrap()
            .starts_with("Sheet not accessible (404)"));

        let blinkit = db
            .get_daily_metrics(&MetricsFilter {
                platform: Some("blinkit".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(blinkit.len(), 1);
        assert_eq!(blinkit[0].date, "2024-06-05");
        assert_eq!(blinkit[0].total_sales, 99.0);
    }

    #[tokio::test]
    async fn test_query_path() {
        let (db, _tmp) = setup().await;
        let days = vec![
            DailyAggregate {
                date: "2024-12-24".to_string(),
                spend: 100.0,
                impressions: 5000.0,
                clicks: 50.0,
                sales: 400.0,
                orders: 0.0,
            },
            DailyAggregate {
                date: "2024-12-25".to_string(),
                spend: 50.0,
                ..Default::default()
            },
        ];
        let sheets = FakeSheets::default()
            .with_days("q", days)
            .with_days("none", vec![]);
        let source = add_source(&db, "q", "instamart", DataType::Ads).await;
        let empty = add_source(&db, "none", "instamart", DataType::Sales).await;

        let syncer = Syncer::new(&db, &sheets, &sheets);
        let result = syncer.sync_source_with_query(&source).await;
        assert!(result.success);
        assert_eq!(result.rows_fetched, 2);
        assert_eq!(result.days_aggregated, 2);
        assert_eq!(sheets.fetches.load(Ordering::SeqCst), 0);

        let metrics = all_metrics(&db).await;
        assert_eq!(metrics.len(), 2);
        assert_eq!(metrics[0].roas, 4.0);

        let result = syncer.sync_source_with_query(&empty).await;
        assert!(!result.success);
        assert_eq!(
            result.error.as_deref(),
            Some("No valid data to sync (query returned 0 days)")
        );
    }

    #[tokio::test]
    async fn test_sync_by_id() {
        let (db, _tmp) = setup().await;
        let sheets = FakeSheets::default().with_rows("a", ads_rows());
        let source = add_source(&db, "a", "swiggy", DataType::Ads).await;
        let syncer = Syncer::new(&db, &sheets, &sheets);

        let missing = syncer.sync_source_by_id("nope", SyncMode::Csv).await;
        assert!(!missing.success);
        assert_eq!(missing.source_name, "Unknown");
        assert_eq!(missing.error.as_deref(), Some("Source not found"));

        db.set_source_active(&source.id, false).await.unwrap();
        let inactive = syncer.sync_source_by_id(&source.id, SyncMode::Csv).await;
        assert_eq!(inactive.error.as_deref(), Some("Source not found"));

        db.set_source_active(&source.id, true).await.unwrap();
        let found = syncer.sync_source_by_id(&source.id, SyncMode::Csv).await;
        assert!(found.success);
        assert_eq!(found.source_name, "swiggy ads");
    }

    #[tokio::test]
    async fn test_custom_mapping_applies() {
        let (db, _tmp) = setup().await;
        db.upsert_column_mapping(&ColumnMapping::new(
            "zepto".to_string(),
            DataType::Ads,
            "Ad Spend (INR)".to_string(),
            "spend".to_string(),
        ))
        .await
        .unwrap();

        let sheets = FakeSheets::default().with_rows(
            "z",
            vec![row(&[("Date", "2024-12-24"), ("Ad Spend (INR)", "₹75")])],
        );
        let source = add_source(&db, "z", "Zepto", DataType::Ads).await;

        let result = Syncer::new(&db, &sheets, &sheets).sync_source(&source).await;
        assert!(result.success);
        assert_eq!(all_metrics(&db).await[0].total_spend, 75.0);
    }

    #[tokio::test]
    async fn test_shared_locks_serialize_pairs() {
        let locks = PairLocks::new();
        let guard = locks.acquire("swiggy", DataType::Ads).await;

        // A different pair is not blocked
        let other = locks.acquire("swiggy", DataType::Sales).await;
        drop(other);

        let contender = locks.clone();
        let waiter = tokio::spawn(async move {
            let _g = contender.acquire("swiggy", DataType::Ads).await;
        });
        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());

        drop(guard);
        waiter.await.unwrap();
    }

    #[test]
    fn test_result_serializes_camel_case() {
        let result = SyncResult::not_found("abc", "Source not found".to_string());
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["sourceName"], "Unknown");
        assert_eq!(json["rowsFetched"], 0);
        assert_eq!(json["error"], "Source not found");
    }
}
