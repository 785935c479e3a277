use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use dirs::config_dir;
use serde::{Deserialize, Serialize};

const APP_NAME: &str = "kreisel";
const CONFIG_FILE: &str = "config.json";
/// Overrides the database location from the config file.
pub const DATABASE_ENV: &str = "KREISEL_DATABASE";
pub const DEFAULT_LOG_FILTER: &str = "kreisel=info,kreisel_core=info";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// SQLite file to use. Defaults to `kreisel.db` in the platform data directory.
    pub database_path: Option<PathBuf>,
    /// `tracing` filter used when `RUST_LOG` is not set.
    pub log_filter: Option<String>,
}

impl Config {
    /// Load configuration from the user's config directory.
    /// Returns default config if file doesn't exist or fails to parse.
    pub fn load() -> Self {
        match get_config_path().and_then(|path| Self::load_from(&path)) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Failed to load config, using defaults: {:#}", e);
                Self::default()
            }
        }
    }

    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).context("Failed to read config file")?;
        let config = serde_json::from_str(&content).context("Failed to parse config file")?;

        Ok(config)
    }

    /// Database location: explicit flag, then environment, then config file.
    /// `None` means the platform default.
    pub fn database_path(&self, flag: Option<PathBuf>) -> Option<PathBuf> {
        flag.or_else(|| std::env::var_os(DATABASE_ENV).map(PathBuf::from))
            .or_else(|| self.database_path.clone())
    }

    pub fn log_filter(&self) -> String {
        std::env::var("RUST_LOG")
            .ok()
            .or_else(|| self.log_filter.clone())
            .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string())
    }
}

fn get_config_path() -> Result<PathBuf> {
    let mut path =
        config_dir().ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;
    path.push(APP_NAME);
    path.push(CONFIG_FILE);
    Ok(path)
}
