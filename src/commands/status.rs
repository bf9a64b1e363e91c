//! Status and sync history commands

use crate::config::Config;
use crate::error::Result;
use crate::meta::{GlobalStats, MetaDb, SyncRun};
use serde::Serialize;
use tracing::info;

/// Status information
#[derive(Debug, Clone, Serialize)]
pub struct StatusInfo {
    pub config_path: String,
    pub db_path: String,
    pub sheets_base_url: String,
    pub sync_mode: String,
    pub default_range: String,
    pub db_stats: GlobalStats,
}

/// Get system status
pub async fn cmd_status(config: &Config, db: &MetaDb) -> Result<StatusInfo> {
    info!("Getting status");

    let db_stats = db.get_global_stats().await?;

    Ok(StatusInfo {
        config_path: config.paths.config_file.display().to_string(),
        db_path: config.paths.db_file.display().to_string(),
        sheets_base_url: config.sheets.base_url.clone(),
        sync_mode: config.sync.mode.to_string(),
        default_range: config.dashboard.default_range.clone(),
        db_stats,
    })
}

/// Most recent sync runs, newest first
pub async fn cmd_list_runs(db: &MetaDb, source_id: Option<&str>, limit: u32) -> Result<Vec<SyncRun>> {
    db.list_sync_runs(source_id, limit).await
}

/// Print status to console
pub fn print_status(status: &StatusInfo) {
    let stats = &status.db_stats;

    println!("\n📊 adpulse Status\n");
    println!("Configuration: {}", status.config_path);
    println!("Database: {}", status.db_path);
    println!("Sheets: {}", status.sheets_base_url);
    println!("Sync mode: {}", status.sync_mode);
    println!("Default range: {}", status.default_range);
    println!("\nDatabase Stats:");
    println!(
        "  Sources: {} ({} active)",
        stats.source_count, stats.active_source_count
    );
    println!("  Custom mappings: {}", stats.mapping_count);
    println!("  Daily metric rows: {}", stats.metric_rows);
    match (&stats.first_date, &stats.last_date) {
        (Some(first), Some(last)) => println!("  Dates: {} to {}", first, last),
        _ => println!("  Dates: none"),
    }
    println!(
        "  Last sync: {}",
        stats.last_synced_at.as_deref().unwrap_or("never")
    );
}

pub fn print_runs(runs: &[SyncRun]) {
    println!("\n🕑 Sync Runs\n");

    if runs.is_empty() {
        println!("No sync runs recorded yet.");
        return;
    }

    for run in runs {
        let marker = match run.status.as_str() {
            "synced" => "✓",
            "failed" => "✗",
            _ => "…",
        };
        println!(
            "{} {} [{}] {} ({} mode)",
            marker, run.started_at, run.status, run.source_id, run.mode
        );
        println!(
            "  Rows: {}, Days: {}",
            run.rows_fetched, run.days_aggregated
        );
        if let Some(error) = &run.error {
            match &run.failed_stage {
                Some(stage) => println!("  Error at {}: {}", stage, error),
                None => println!("  Error: {}", error),
            }
        }
    }
}
