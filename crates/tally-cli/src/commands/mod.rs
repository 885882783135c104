//! CLI command implementations
//!
//! - `analyze` - Answer a query against one CSV file
//! - `profile` - Dataset profile and suggested queries
//! - `serve` - Web server command
//! - `status` - Active configuration and dataset listing

pub mod analyze;
pub mod profile;
pub mod serve;
pub mod status;

// Re-export command functions for main.rs
pub use analyze::*;
pub use profile::*;
pub use serve::*;
pub use status::*;

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use tally_core::AnalyticsConfig;

/// Environment variable naming the dataset directory
pub const DATA_DIR_ENV: &str = "TALLY_DATA_DIR";

/// Environment variable holding comma-separated API keys for the server
pub const API_KEYS_ENV: &str = "TALLY_API_KEYS";

/// Load the analytics config, from an explicit file when one is given
pub fn load_config(path: Option<&Path>) -> Result<AnalyticsConfig> {
    match path {
        Some(path) => {
            if !path.exists() {
                bail!("Config file not found: {}", path.display());
            }
            AnalyticsConfig::load_from(path)
                .with_context(|| format!("Failed to load config from {}", path.display()))
        }
        None => AnalyticsConfig::load().context("Failed to load analytics config"),
    }
}

/// Flag first, then TALLY_DATA_DIR, then ./data
pub fn resolve_data_dir(flag: Option<PathBuf>) -> PathBuf {
    flag.or_else(|| {
        std::env::var(DATA_DIR_ENV)
            .ok()
            .filter(|s| !s.trim().is_empty())
            .map(PathBuf::from)
    })
    .unwrap_or_else(|| PathBuf::from("data"))
}
