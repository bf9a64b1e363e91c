//! Metrics storage using SQLite
//!
//! This module handles all local storage including:
//! - Data sources (registered sheet tabs)
//! - Column mappings (per-platform overrides)
//! - Daily metrics (one row per date, platform and data type)
//! - Sync runs (history and stats)

mod schema;

pub use schema::*;

use crate::aggregate::AggregatedDay;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::normalize::is_iso_date;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{Sqlite, SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::{FromRow, QueryBuilder};
use std::str::FromStr;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Kind of data a sheet tab carries
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    sqlx::Type,
    clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum DataType {
    Ads,
    Sales,
}

impl std::fmt::Display for DataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DataType::Ads => write!(f, "ads"),
            DataType::Sales => write!(f, "sales"),
        }
    }
}

impl FromStr for DataType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "ads" => Ok(DataType::Ads),
            "sales" => Ok(DataType::Sales),
            _ => Err(Error::InvalidInput(format!("Unknown data type: {}", s))),
        }
    }
}

/// Sync run status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Running,
    Synced,
    Failed,
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunStatus::Running => write!(f, "running"),
            RunStatus::Synced => write!(f, "synced"),
            RunStatus::Failed => write!(f, "failed"),
        }
    }
}

impl FromStr for RunStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "running" => Ok(RunStatus::Running),
            "synced" => Ok(RunStatus::Synced),
            "failed" => Ok(RunStatus::Failed),
            _ => Err(Error::Config(format!("Unknown run status: {}", s))),
        }
    }
}

/// A registered sheet tab
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct DataSource {
    pub id: String,
    pub name: String,
    pub sheet_id: String,
    pub sheet_url: String,
    pub platform: String,
    pub data_type: DataType,
    pub tab_name: Option<String>,
    pub tab_gid: Option<String>,
    pub is_active: bool,
    pub last_synced_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl DataSource {
    pub fn new(
        name: String,
        sheet_id: String,
        sheet_url: String,
        platform: &str,
        data_type: DataType,
    ) -> Self {
        let now = Utc::now().to_rfc3339();
        Self {
            id: Uuid::new_v4().to_string(),
            name,
            sheet_id,
            sheet_url,
            platform: platform.trim().to_lowercase(),
            data_type,
            tab_name: None,
            tab_gid: None,
            is_active: true,
            last_synced_at: None,
            created_at: now.clone(),
            updated_at: now,
        }
    }
}

/// A per-platform column override
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ColumnMapping {
    pub id: String,
    pub platform: String,
    pub data_type: DataType,
    pub source_column: String,
    pub target_column: String,
    pub is_active: bool,
    pub created_at: String,
}

impl ColumnMapping {
    pub fn new(
        platform: String,
        data_type: DataType,
        source_column: String,
        target_column: String,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            platform: platform.trim().to_lowercase(),
            data_type,
            source_column: source_column.trim().to_lowercase(),
            target_column: target_column.trim().to_string(),
            is_active: true,
            created_at: Utc::now().to_rfc3339(),
        }
    }
}

/// A stored daily total with derived ratios
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, PartialEq)]
pub struct DailyMetric {
    pub id: String,
    pub date: String,
    pub platform: String,
    pub data_type: DataType,
    pub total_spend: f64,
    pub total_impressions: f64,
    pub total_clicks: f64,
    pub total_sales: f64,
    pub total_orders: f64,
    pub cpi: f64,
    pub ctr: f64,
    pub cpc: f64,
    pub roas: f64,
    pub synced_at: String,
}

/// Column list for daily metric reads, ratios computed with zero guards
const DAILY_METRIC_COLUMNS: &str = r#"
    id, date, platform, data_type,
    total_spend, total_impressions, total_clicks, total_sales, total_orders,
    CAST(CASE WHEN total_impressions > 0 THEN total_spend / total_impressions ELSE 0 END AS REAL) AS cpi,
    CAST(CASE WHEN total_impressions > 0 THEN total_clicks * 100.0 / total_impressions ELSE 0 END AS REAL) AS ctr,
    CAST(CASE WHEN total_clicks > 0 THEN total_spend / total_clicks ELSE 0 END AS REAL) AS cpc,
    CAST(CASE WHEN total_spend > 0 THEN total_sales / total_spend ELSE 0 END AS REAL) AS roas,
    synced_at
"#;

/// Filter for daily metric reads. Dates are inclusive `YYYY-MM-DD` bounds.
#[derive(Debug, Clone, Default)]
pub struct MetricsFilter {
    pub from: Option<String>,
    pub to: Option<String>,
    pub platform: Option<String>,
    pub data_type: Option<DataType>,
}

/// A sync attempt record
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct SyncRun {
    pub id: String,
    pub source_id: String,
    pub mode: String,
    pub started_at: String,
    pub completed_at: Option<String>,
    pub status: String,
    pub failed_stage: Option<String>,
    pub rows_fetched: i64,
    pub days_aggregated: i64,
    pub error: Option<String>,
}

impl SyncRun {
    pub fn new(source_id: String, mode: String) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            source_id,
            mode,
            started_at: Utc::now().to_rfc3339(),
            completed_at: None,
            status: RunStatus::Running.to_string(),
            failed_stage: None,
            rows_fetched: 0,
            days_aggregated: 0,
            error: None,
        }
    }

    pub fn get_status(&self) -> Result<RunStatus> {
        self.status.parse()
    }
}

/// Final outcome written back to a sync run
#[derive(Debug, Clone)]
pub struct RunOutcome<'a> {
    pub status: RunStatus,
    pub failed_stage: Option<&'a str>,
    pub rows_fetched: usize,
    pub days_aggregated: usize,
    pub error: Option<&'a str>,
}

/// What a source deletion removed
#[derive(Debug, Clone, Default, Serialize)]
pub struct DeleteSourceStats {
    pub metrics_deleted: u64,
    pub runs_deleted: u64,
    /// True when another source still feeds the same (platform, data_type)
    pub metrics_kept: bool,
}

/// Global statistics
#[derive(Debug, Clone, Default, Serialize)]
pub struct GlobalStats {
    pub source_count: usize,
    pub active_source_count: usize,
    pub mapping_count: usize,
    pub metric_rows: usize,
    pub first_date: Option<String>,
    pub last_date: Option<String>,
    pub last_synced_at: Option<String>,
}

/// Metrics database handle
#[derive(Clone)]
pub struct MetaDb {
    pool: SqlitePool,
}

impl MetaDb {
    /// Connect to the metrics database
    pub async fn connect(config: &Config) -> Result<Self> {
        Self::open(&config.paths.db_file).await
    }

    /// Create database with path directly and make sure the schema exists
    pub async fn new(db_path: &std::path::Path) -> Result<Self> {
        let db = Self::open(db_path).await?;
        db.init_schema().await?;
        Ok(db)
    }

    async fn open(db_path: &std::path::Path) -> Result<Self> {
        // Create parent directory if needed
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal);

        debug!("Connecting to SQLite database at {:?}", db_path);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        Ok(Self { pool })
    }

    /// Initialize the database schema
    pub async fn init_schema(&self) -> Result<()> {
        info!("Initializing database schema");
        sqlx::query(SCHEMA_SQL).execute(&self.pool).await?;
        Ok(())
    }

    /// Check if database is initialized
    pub async fn is_initialized(&self) -> Result<bool> {
        let result: Option<(i32,)> = sqlx::query_as(
            "SELECT 1 FROM sqlite_master WHERE type='table' AND name='data_sources'",
        )
        .fetch_optional(&self.pool)
        .await?;
        Ok(result.is_some())
    }

    // ===== Data Source Operations =====

    /// Insert a new data source
    pub async fn insert_source(&self, source: &DataSource) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO data_sources (id, name, sheet_id, sheet_url, platform, data_type, tab_name,
                                      tab_gid, is_active, last_synced_at, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&source.id)
        .bind(&source.name)
        .bind(&source.sheet_id)
        .bind(&source.sheet_url)
        .bind(&source.platform)
        .bind(source.data_type)
        .bind(&source.tab_name)
        .bind(&source.tab_gid)
        .bind(source.is_active)
        .bind(&source.last_synced_at)
        .bind(&source.created_at)
        .bind(&source.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Get source by ID
    pub async fn get_source(&self, id: &str) -> Result<Option<DataSource>> {
        let source = sqlx::query_as::<_, DataSource>("SELECT * FROM data_sources WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(source)
    }

    /// List all sources, newest first
    pub async fn list_sources(&self) -> Result<Vec<DataSource>> {
        let sources = sqlx::query_as::<_, DataSource>(
            "SELECT * FROM data_sources ORDER BY created_at DESC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(sources)
    }

    /// List active sources in registration order
    pub async fn list_active_sources(&self) -> Result<Vec<DataSource>> {
        let sources = sqlx::query_as::<_, DataSource>(
            "SELECT * FROM data_sources WHERE is_active = 1 ORDER BY created_at ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(sources)
    }

    /// Overwrite the editable fields of a source
    pub async fn update_source(&self, source: &DataSource) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE data_sources SET
                name = ?, sheet_id = ?, sheet_url = ?, platform = ?, data_type = ?,
                tab_name = ?, tab_gid = ?, is_active = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&source.name)
        .bind(&source.sheet_id)
        .bind(&source.sheet_url)
        .bind(&source.platform)
        .bind(source.data_type)
        .bind(&source.tab_name)
        .bind(&source.tab_gid)
        .bind(source.is_active)
        .bind(Utc::now().to_rfc3339())
        .bind(&source.id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(Error::SourceNotFound(source.id.clone()));
        }
        Ok(())
    }

    /// Enable or disable a source
    pub async fn set_source_active(&self, id: &str, active: bool) -> Result<()> {
        let result =
            sqlx::query("UPDATE data_sources SET is_active = ?, updated_at = ? WHERE id = ?")
                .bind(active)
                .bind(Utc::now().to_rfc3339())
                .bind(id)
                .execute(&self.pool)
                .await?;

        if result.rows_affected() == 0 {
            return Err(Error::SourceNotFound(id.to_string()));
        }
        Ok(())
    }

    /// Record a successful sync
    pub async fn mark_source_synced(&self, id: &str) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        sqlx::query("UPDATE data_sources SET last_synced_at = ?, updated_at = ? WHERE id = ?")
            .bind(&now)
            .bind(&now)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Delete a source and its sync history.
    ///
    /// Daily metrics for the source's (platform, data_type) are removed only
    /// when no other source feeds the same pair.
    pub async fn delete_source(&self, id: &str) -> Result<DeleteSourceStats> {
        let source = self
            .get_source(id)
            .await?
            .ok_or_else(|| Error::SourceNotFound(id.to_string()))?;

        let mut tx = self.pool.begin().await?;

        let siblings: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM data_sources WHERE platform = ? AND data_type = ? AND id != ?",
        )
        .bind(&source.platform)
        .bind(source.data_type)
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;

        let mut stats = DeleteSourceStats {
            metrics_kept: siblings > 0,
            ..Default::default()
        };

        if siblings == 0 {
            stats.metrics_deleted =
                sqlx::query("DELETE FROM daily_metrics WHERE platform = ? AND data_type = ?")
                    .bind(&source.platform)
                    .bind(source.data_type)
                    .execute(&mut *tx)
                    .await?
                    .rows_affected();
        }

        stats.runs_deleted = sqlx::query("DELETE FROM sync_runs WHERE source_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        sqlx::query("DELETE FROM data_sources WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        debug!(
            source = %source.name,
            metrics_deleted = stats.metrics_deleted,
            runs_deleted = stats.runs_deleted,
            "Deleted source"
        );
        Ok(stats)
    }

    // ===== Column Mapping Operations =====

    /// List mappings, optionally for one platform (case-insensitive)
    pub async fn list_column_mappings(
        &self,
        platform: Option<&str>,
        active_only: bool,
    ) -> Result<Vec<ColumnMapping>> {
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT * FROM column_mappings WHERE 1=1");
        if let Some(platform) = platform {
            qb.push(" AND LOWER(platform) = ")
                .push_bind(platform.trim().to_lowercase());
        }
        if active_only {
            qb.push(" AND is_active = 1");
        }
        qb.push(" ORDER BY platform, data_type, created_at");

        let mappings = qb
            .build_query_as::<ColumnMapping>()
            .fetch_all(&self.pool)
            .await?;
        Ok(mappings)
    }

    /// Insert or replace the mapping for (platform, data_type, source_column)
    pub async fn upsert_column_mapping(&self, mapping: &ColumnMapping) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO column_mappings (id, platform, data_type, source_column, target_column, is_active, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(platform, data_type, source_column) DO UPDATE SET
                target_column = excluded.target_column,
                is_active = excluded.is_active
            "#,
        )
        .bind(&mapping.id)
        .bind(&mapping.platform)
        .bind(mapping.data_type)
        .bind(&mapping.source_column)
        .bind(&mapping.target_column)
        .bind(mapping.is_active)
        .bind(&mapping.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn delete_column_mapping(&self, id: &str) -> Result<()> {
        let result = sqlx::query("DELETE FROM column_mappings WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(Error::MappingNotFound(id.to_string()));
        }
        Ok(())
    }

    // ===== Daily Metric Operations =====

    /// Upsert aggregated days in one transaction.
    ///
    /// Totals for an existing (date, platform, data_type) are replaced, not
    /// added to. Invalid records are skipped with a warning; if every record
    /// is invalid the call fails.
    pub async fn upsert_daily_metrics(&self, days: &[AggregatedDay]) -> Result<usize> {
        if days.is_empty() {
            return Ok(0);
        }

        let valid: Vec<&AggregatedDay> = days
            .iter()
            .filter(|day| {
                let ok = is_valid_day(day);
                if !ok {
                    warn!(date = %day.date, platform = %day.platform, "Skipping invalid daily metric");
                }
                ok
            })
            .collect();

        if valid.is_empty() {
            return Err(Error::InvalidInput(format!(
                "All {} daily metric records were invalid",
                days.len()
            )));
        }

        let synced_at = Utc::now().to_rfc3339();
        let mut tx = self.pool.begin().await?;

        for day in &valid {
            sqlx::query(
                r#"
                INSERT INTO daily_metrics (id, date, platform, data_type, total_spend, total_impressions,
                                           total_clicks, total_sales, total_orders, synced_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(date, platform, data_type) DO UPDATE SET
                    total_spend = excluded.total_spend,
                    total_impressions = excluded.total_impressions,
                    total_clicks = excluded.total_clicks,
                    total_sales = excluded.total_sales,
                    total_orders = excluded.total_orders,
                    synced_at = excluded.synced_at
                "#,
            )
            .bind(Uuid::new_v4().to_string())
            .bind(&day.date)
            .bind(&day.platform)
            .bind(day.data_type)
            .bind(day.total_spend)
            .bind(day.total_impressions)
            .bind(day.total_clicks)
            .bind(day.total_sales)
            .bind(day.total_orders)
            .bind(&synced_at)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        debug!(records = valid.len(), "Upserted daily metrics");
        Ok(valid.len())
    }

    /// Read daily metrics, ordered by date then platform
    pub async fn get_daily_metrics(&self, filter: &MetricsFilter) -> Result<Vec<DailyMetric>> {
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT ");
        qb.push(DAILY_METRIC_COLUMNS);
        qb.push(" FROM daily_metrics WHERE 1=1");

        if let Some(from) = &filter.from {
            qb.push(" AND date >= ").push_bind(from.clone());
        }
        if let Some(to) = &filter.to {
            qb.push(" AND date <= ").push_bind(to.clone());
        }
        if let Some(platform) = &filter.platform {
            qb.push(" AND platform = ")
                .push_bind(platform.trim().to_lowercase());
        }
        if let Some(data_type) = filter.data_type {
            qb.push(" AND data_type = ").push_bind(data_type);
        }
        qb.push(" ORDER BY date ASC, platform ASC, data_type ASC");

        let metrics = qb
            .build_query_as::<DailyMetric>()
            .fetch_all(&self.pool)
            .await?;
        Ok(metrics)
    }

    // ===== Sync Run Operations =====

    /// Start a new sync run
    pub async fn start_sync_run(&self, source_id: &str, mode: &str) -> Result<SyncRun> {
        let run = SyncRun::new(source_id.to_string(), mode.to_string());
        sqlx::query(
            r#"
            INSERT INTO sync_runs (id, source_id, mode, started_at, status, rows_fetched, days_aggregated)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&run.id)
        .bind(&run.source_id)
        .bind(&run.mode)
        .bind(&run.started_at)
        .bind(&run.status)
        .bind(run.rows_fetched)
        .bind(run.days_aggregated)
        .execute(&self.pool)
        .await?;
        Ok(run)
    }

    /// Complete a sync run
    pub async fn complete_sync_run(&self, id: &str, outcome: &RunOutcome<'_>) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE sync_runs SET
                completed_at = ?,
                status = ?,
                failed_stage = ?,
                rows_fetched = ?,
                days_aggregated = ?,
                error = ?
            WHERE id = ?
            "#,
        )
        .bind(Utc::now().to_rfc3339())
        .bind(outcome.status.to_string())
        .bind(outcome.failed_stage)
        .bind(outcome.rows_fetched as i64)
        .bind(outcome.days_aggregated as i64)
        .bind(outcome.error)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Most recent runs, optionally for one source
    pub async fn list_sync_runs(&self, source_id: Option<&str>, limit: u32) -> Result<Vec<SyncRun>> {
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT * FROM sync_runs");
        if let Some(source_id) = source_id {
            qb.push(" WHERE source_id = ").push_bind(source_id.to_string());
        }
        qb.push(" ORDER BY started_at DESC LIMIT ")
            .push_bind(i64::from(limit));

        let runs = qb.build_query_as::<SyncRun>().fetch_all(&self.pool).await?;
        Ok(runs)
    }

    /// Get latest sync run for a source
    pub async fn get_latest_run(&self, source_id: &str) -> Result<Option<SyncRun>> {
        let run = sqlx::query_as::<_, SyncRun>(
            "SELECT * FROM sync_runs WHERE source_id = ? ORDER BY started_at DESC LIMIT 1",
        )
        .bind(source_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(run)
    }

    // ===== Statistics =====

    /// Get global statistics
    pub async fn get_global_stats(&self) -> Result<GlobalStats> {
        let source_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM data_sources")
            .fetch_one(&self.pool)
            .await?;

        let active_count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM data_sources WHERE is_active = 1")
                .fetch_one(&self.pool)
                .await?;

        let mapping_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM column_mappings")
            .fetch_one(&self.pool)
            .await?;

        let (metric_rows, first_date, last_date): (i64, Option<String>, Option<String>) =
            sqlx::query_as("SELECT COUNT(*), MIN(date), MAX(date) FROM daily_metrics")
                .fetch_one(&self.pool)
                .await?;

        let last_synced_at: Option<String> =
            sqlx::query_scalar("SELECT MAX(last_synced_at) FROM data_sources")
                .fetch_one(&self.pool)
                .await?;

        Ok(GlobalStats {
            source_count: source_count as usize,
            active_source_count: active_count as usize,
            mapping_count: mapping_count as usize,
            metric_rows: metric_rows as usize,
            first_date,
            last_date,
            last_synced_at,
        })
    }
}

fn is_valid_day(day: &AggregatedDay) -> bool {
    let totals = [
        day.total_spend,
        day.total_impressions,
        day.total_clicks,
        day.total_sales,
        day.total_orders,
    ];
    is_iso_date(&day.date)
        && !day.platform.trim().is_empty()
        && totals.iter().all(|v| v.is_finite() && *v >= 0.0)
}
