//! SQLite schema definition

/// SQL schema for the metrics database
pub const SCHEMA_SQL: &str = r#"
-- Data sources: one sheet tab per (platform, data_type)
CREATE TABLE IF NOT EXISTS data_sources (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    sheet_id TEXT NOT NULL,
    sheet_url TEXT NOT NULL,
    platform TEXT NOT NULL,
    data_type TEXT NOT NULL CHECK (data_type IN ('ads', 'sales')),
    tab_name TEXT,
    tab_gid TEXT,
    is_active INTEGER NOT NULL DEFAULT 1,
    last_synced_at TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

-- Column mappings: per-platform overrides of the built-in table
CREATE TABLE IF NOT EXISTS column_mappings (
    id TEXT PRIMARY KEY,
    platform TEXT NOT NULL,
    data_type TEXT NOT NULL CHECK (data_type IN ('ads', 'sales')),
    source_column TEXT NOT NULL,
    target_column TEXT NOT NULL,
    is_active INTEGER NOT NULL DEFAULT 1,
    created_at TEXT NOT NULL,
    UNIQUE(platform, data_type, source_column)
);

-- Daily metrics: one row per (date, platform, data_type)
CREATE TABLE IF NOT EXISTS daily_metrics (
    id TEXT PRIMARY KEY,
    date TEXT NOT NULL,
    platform TEXT NOT NULL,
    data_type TEXT NOT NULL CHECK (data_type IN ('ads', 'sales')),
    total_spend REAL NOT NULL DEFAULT 0,
    total_impressions REAL NOT NULL DEFAULT 0,
    total_clicks REAL NOT NULL DEFAULT 0,
    total_sales REAL NOT NULL DEFAULT 0,
    total_orders REAL NOT NULL DEFAULT 0,
    synced_at TEXT NOT NULL,
    UNIQUE(date, platform, data_type)
);

-- Sync runs: one row per sync attempt
CREATE TABLE IF NOT EXISTS sync_runs (
    id TEXT PRIMARY KEY,
    source_id TEXT NOT NULL,
    mode TEXT NOT NULL,
    started_at TEXT NOT NULL,
    completed_at TEXT,
    status TEXT NOT NULL,
    failed_stage TEXT,
    rows_fetched INTEGER NOT NULL DEFAULT 0,
    days_aggregated INTEGER NOT NULL DEFAULT 0,
    error TEXT
);

-- Indexes for performance
CREATE INDEX IF NOT EXISTS idx_sources_pair ON data_sources(platform, data_type);
CREATE INDEX IF NOT EXISTS idx_mappings_platform ON column_mappings(platform);
CREATE INDEX IF NOT EXISTS idx_metrics_date ON daily_metrics(date);
CREATE INDEX IF NOT EXISTS idx_metrics_platform ON daily_metrics(platform);
CREATE INDEX IF NOT EXISTS idx_runs_source ON sync_runs(source_id);
"#;
