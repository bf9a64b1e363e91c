//! Data source management commands

use crate::error::{Error, Result};
use crate::meta::{DataSource, DataType, DeleteSourceStats, MetaDb};
use crate::sheets::parse_sheet_reference;
use clap_complete::Shell;
use tracing::info;

#[derive(Debug, Clone)]
pub struct AddSourceOptions {
    /// Sheet URL or bare sheet id
    pub sheet: String,
    pub platform: String,
    pub data_type: DataType,
    pub name: Option<String>,
    pub tab_name: Option<String>,
    /// Overrides a `gid` found in the URL
    pub gid: Option<String>,
}

/// Fields to change on an existing source; `None` leaves a field as is
#[derive(Debug, Clone, Default)]
pub struct EditSourceOptions {
    pub name: Option<String>,
    pub sheet: Option<String>,
    pub platform: Option<String>,
    pub data_type: Option<DataType>,
    pub tab_name: Option<String>,
    pub gid: Option<String>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Register a new sheet tab
pub async fn cmd_add_source(db: &MetaDb, options: AddSourceOptions) -> Result<DataSource> {
    let platform = options.platform.trim();
    if platform.is_empty() {
        return Err(Error::InvalidInput("Platform must not be empty".to_string()));
    }

    let reference = parse_sheet_reference(&options.sheet)?;
    let name = non_empty(options.name)
        .unwrap_or_else(|| format!("{} {}", platform.to_lowercase(), options.data_type));

    let mut source = DataSource::new(
        name,
        reference.sheet_id,
        reference.sheet_url,
        platform,
        options.data_type,
    );
    source.tab_name = non_empty(options.tab_name);
    source.tab_gid = non_empty(options.gid).or(reference.gid);

    db.insert_source(&source).await?;
    info!(id = %source.id, platform = %source.platform, "Added source '{}'", source.name);
    Ok(source)
}

pub async fn cmd_list_sources(db: &MetaDb) -> Result<Vec<DataSource>> {
    db.list_sources().await
}

/// Change a source's name, sheet, platform, type or tab
pub async fn cmd_edit_source(
    db: &MetaDb,
    source_id: &str,
    options: EditSourceOptions,
) -> Result<DataSource> {
    let mut source = db
        .get_source(source_id)
        .await?
        .ok_or_else(|| Error::SourceNotFound(source_id.to_string()))?;

    if let Some(name) = non_empty(options.name) {
        source.name = name;
    }
    if let Some(sheet) = options.sheet {
        let reference = parse_sheet_reference(&sheet)?;
        source.sheet_id = reference.sheet_id;
        source.sheet_url = reference.sheet_url;
        if reference.gid.is_some() {
            source.tab_gid = reference.gid;
        }
    }
    if let Some(platform) = non_empty(options.platform) {
        source.platform = platform.to_lowercase();
    }
    if let Some(data_type) = options.data_type {
        source.data_type = data_type;
    }
    if options.tab_name.is_some() {
        source.tab_name = non_empty(options.tab_name);
    }
    if options.gid.is_some() {
        source.tab_gid = non_empty(options.gid);
    }

    db.update_source(&source).await?;
    db.get_source(source_id)
        .await?
        .ok_or_else(|| Error::SourceNotFound(source_id.to_string()))
}

/// Enable or disable a source for batch syncs
pub async fn cmd_set_source_active(db: &MetaDb, source_id: &str, active: bool) -> Result<DataSource> {
    db.set_source_active(source_id, active).await?;
    db.get_source(source_id)
        .await?
        .ok_or_else(|| Error::SourceNotFound(source_id.to_string()))
}

/// Remove a source and its sync history
pub async fn cmd_remove_source(db: &MetaDb, source_id: &str) -> Result<DeleteSourceStats> {
    let stats = db.delete_source(source_id).await?;
    info!("Removed source {}", source_id);
    Ok(stats)
}

pub fn print_source(source: &DataSource) {
    let state = if source.is_active { "active" } else { "disabled" };
    println!(
        "• {} [{} {}] ({})",
        source.name, source.platform, source.data_type, state
    );
    println!("  ID: {}", source.id);
    println!("  Sheet: {}", source.sheet_url);
    match (&source.tab_name, &source.tab_gid) {
        (Some(tab), Some(gid)) => println!("  Tab: {} (gid {})", tab, gid),
        (Some(tab), None) => println!("  Tab: {}", tab),
        (None, Some(gid)) => println!("  Tab: gid {}", gid),
        (None, None) => {}
    }
    println!(
        "  Last synced: {}",
        source.last_synced_at.as_deref().unwrap_or("never")
    );
}

pub fn print_sources(sources: &[DataSource]) {
    println!("\n📚 Data Sources\n");

    if sources.is_empty() {
        println!("No sources registered. Use 'adpulse sources add' to add one.");
        return;
    }

    for source in sources {
        print_source(source);
        println!();
    }
}

pub fn print_remove_stats(source_id: &str, stats: &DeleteSourceStats) {
    println!("✓ Source '{}' removed", source_id);
    println!("  Sync runs deleted: {}", stats.runs_deleted);
    if stats.metrics_kept {
        println!("  Daily metrics kept (another source feeds the same platform and type)");
    } else {
        println!("  Daily metrics deleted: {}", stats.metrics_deleted);
    }
}

/// Print source IDs with descriptions for shell completions
pub fn print_source_completions(sources: &[DataSource], shell: Shell) {
    for source in sources {
        let description = format!(
            "{} ({} {})",
            source.name, source.platform, source.data_type
        )
        .replace('\n', " ");

        match shell {
            Shell::Zsh => println!("{}:{}", source.id, description.replace(':', "\\:")),
            Shell::Fish => println!("{}\t{}", source.id, description.replace('\t', " ")),
            _ => println!("{}", source.id),
        }
    }
}
