//! Default values for configuration

use crate::sync::SyncMode;

/// Default spreadsheet service root
pub fn default_sheets_base_url() -> String {
    std::env::var("ADPULSE_SHEETS_BASE_URL")
        .unwrap_or_else(|_| "https://docs.google.com".to_string())
}

/// Default user agent for sheet requests
pub fn default_sheets_user_agent() -> String {
    format!("Mozilla/5.0 (compatible; adpulse/{})", env!("CARGO_PKG_VERSION"))
}

/// Default request timeout in seconds
pub fn default_sheets_timeout() -> u64 {
    60
}

/// Default sync path
pub fn default_sync_mode() -> SyncMode {
    SyncMode::Csv
}

/// Default reporting window
pub fn default_dashboard_range() -> String {
    "last-30-days".to_string()
}
