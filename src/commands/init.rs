//! Init command implementation

use crate::config::Config;
use crate::error::{Error, Result};
use crate::meta::MetaDb;
use serde::Serialize;
use std::path::PathBuf;
use tracing::info;

#[derive(Debug, Clone, Default)]
pub struct InitOptions {
    /// Directory holding `config.toml` and `metrics.db`; `~/.adpulse` when unset
    pub base_dir: Option<PathBuf>,
    pub force: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct InitStats {
    pub base_dir: String,
    pub config_path: String,
    pub db_path: String,
    /// False when an existing config file was kept
    pub config_written: bool,
}

/// Write a default config (unless one exists) and create the metrics database
pub async fn cmd_init(options: InitOptions) -> Result<InitStats> {
    let mut config = Config::load_from(options.base_dir)?;

    if config.is_initialized() && !options.force {
        return Err(Error::AlreadyInitialized(
            config.paths.base_dir.display().to_string(),
        ));
    }

    let config_written = options.force || !config.paths.config_file.exists();
    if options.force {
        let paths = config.paths.clone();
        config = Config::default();
        config.paths = paths;
    }

    if config_written {
        config.save()?;
    }

    let db = MetaDb::connect(&config).await?;
    db.init_schema().await?;
    info!("Created database at {:?}", config.paths.db_file);

    Ok(InitStats {
        base_dir: config.paths.base_dir.display().to_string(),
        config_path: config.paths.config_file.display().to_string(),
        db_path: config.paths.db_file.display().to_string(),
        config_written,
    })
}

pub fn print_init(stats: &InitStats) {
    println!("✓ Initialized adpulse at {}", stats.base_dir);
    if stats.config_written {
        println!("\nConfiguration: {}", stats.config_path);
    } else {
        println!("\nConfiguration: {} (kept existing)", stats.config_path);
    }
    println!("Database: {}", stats.db_path);
    println!("\nNext steps:");
    println!("  adpulse sources add <sheet-url> --platform swiggy --data-type ads");
    println!("  adpulse sync");
    println!("  adpulse summary --range last-7-days");
}
