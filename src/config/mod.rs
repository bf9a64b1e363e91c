//! Configuration management for adpulse
//!
//! Handles loading, saving, and validating configuration from TOML files.

mod defaults;

pub use defaults::*;

use crate::error::{Error, Result};
use crate::metrics::RangePreset;
use crate::sync::SyncMode;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Spreadsheet service settings
    #[serde(default)]
    pub sheets: SheetsConfig,

    /// Sync settings
    #[serde(default)]
    pub sync: SyncConfig,

    /// Reporting settings
    #[serde(default)]
    pub dashboard: DashboardConfig,

    /// Internal paths (not serialized)
    #[serde(skip)]
    pub paths: PathsConfig,
}

/// Spreadsheet service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SheetsConfig {
    /// Service root, e.g. `https://docs.google.com`
    #[serde(default = "default_sheets_base_url")]
    pub base_url: String,

    /// User agent for requests
    #[serde(default = "default_sheets_user_agent")]
    pub user_agent: String,

    /// Request timeout in seconds
    #[serde(default = "default_sheets_timeout")]
    pub timeout_secs: u64,
}

/// Sync configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Path used when `--mode` is not given
    #[serde(default = "default_sync_mode")]
    pub mode: SyncMode,
}

/// Reporting configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardConfig {
    /// Range preset used when no dates are given
    #[serde(default = "default_dashboard_range")]
    pub default_range: String,
}

/// Internal paths configuration
#[derive(Debug, Clone, Default)]
pub struct PathsConfig {
    /// Base directory for adpulse data
    pub base_dir: PathBuf,

    /// Path to config file
    pub config_file: PathBuf,

    /// Path to SQLite database
    pub db_file: PathBuf,
}

impl Default for SheetsConfig {
    fn default() -> Self {
        Self {
            base_url: default_sheets_base_url(),
            user_agent: default_sheets_user_agent(),
            timeout_secs: default_sheets_timeout(),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            mode: default_sync_mode(),
        }
    }
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            default_range: default_dashboard_range(),
        }
    }
}

impl DashboardConfig {
    pub fn range_preset(&self) -> Result<RangePreset> {
        self.default_range.parse()
    }
}

impl Config {
    /// Get the default base directory for adpulse (~/.adpulse)
    pub fn default_base_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".adpulse")
    }

    /// Get the default config file path
    pub fn default_config_path() -> PathBuf {
        Self::default_base_dir().join("config.toml")
    }

    fn paths_for(base: PathBuf) -> PathsConfig {
        PathsConfig {
            config_file: base.join("config.toml"),
            db_file: base.join("metrics.db"),
            base_dir: base,
        }
    }

    /// Initialize paths configuration
    fn init_paths(&mut self, base_dir: Option<PathBuf>) {
        self.paths = Self::paths_for(base_dir.unwrap_or_else(Self::default_base_dir));
    }

    /// Load configuration from a specific file path
    pub fn load(config_path: &Path) -> Result<Self> {
        debug!("Loading config from {:?}", config_path);

        if !config_path.exists() {
            return Err(Error::Config(format!(
                "Config file not found: {}",
                config_path.display()
            )));
        }

        let content = std::fs::read_to_string(config_path)?;
        let mut config: Config = toml::from_str(&content)?;

        // Set up paths based on config file location
        let base = config_path.parent().unwrap_or(Path::new(".")).to_path_buf();
        config.paths = Self::paths_for(base);
        config.paths.config_file = config_path.to_path_buf();

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific base directory
    pub fn load_from(base_dir: Option<PathBuf>) -> Result<Self> {
        let mut config = Config::default();
        config.init_paths(base_dir);

        if config.paths.config_file.exists() {
            debug!("Loading config from {:?}", config.paths.config_file);
            let content = std::fs::read_to_string(&config.paths.config_file)?;
            let mut loaded: Config = toml::from_str(&content)?;
            loaded.paths = config.paths;
            config = loaded;
        } else {
            debug!("No config file found, using defaults");
        }

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<()> {
        // Ensure parent directory exists
        if let Some(parent) = self.paths.config_file.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(&self.paths.config_file, content)?;
        info!("Saved config to {:?}", self.paths.config_file);
        Ok(())
    }

    /// Check if adpulse is initialized (config and DB exist)
    pub fn is_initialized(&self) -> bool {
        self.paths.config_file.exists() && self.paths.db_file.exists()
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.sheets.base_url.trim().is_empty() {
            return Err(Error::Config("sheets.base_url must not be empty".to_string()));
        }

        if self.sheets.timeout_secs == 0 {
            return Err(Error::Config(
                "sheets.timeout_secs must be positive".to_string(),
            ));
        }

        if self.dashboard.range_preset().is_err() {
            return Err(Error::Config(format!(
                "dashboard.default_range is not a known preset: {}",
                self.dashboard.default_range
            )));
        }

        Ok(())
    }
}
