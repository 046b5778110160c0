//! Settings for the host binary.
//!
//! Read from an optional TOML file (default `settings.toml`), then from
//! `LEDGER_*` environment variables. Nested keys use `__`, e.g.
//! `LEDGER_APP__LEVEL=debug` or `LEDGER_LEDGER__AGGREGATE_CACHE_TTL_SECS=5`.
use config::{Config, ConfigError, Environment, File};
use ledger::LedgerConfig;
use serde::Deserialize;

const DEFAULT_SETTINGS_PATH: &str = "settings";

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct App {
    pub level: String,
}

impl Default for App {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// `database = "memory"` or `database = { sqlite = "ledger.db" }`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Database {
    /// Resident stores, gone when the process exits.
    Memory,
    Sqlite(String),
}

impl Default for Database {
    fn default() -> Self {
        Database::Sqlite("ledger.db".to_string())
    }
}

impl Database {
    /// Connection URL, or `None` for the resident stores.
    pub fn url(&self) -> Option<String> {
        match self {
            Database::Memory => None,
            Database::Sqlite(path) => Some(format!("sqlite:{path}?mode=rwc")),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub app: App,
    pub database: Database,
    pub ledger: LedgerConfig,
}

impl Settings {
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(File::with_name(path.unwrap_or(DEFAULT_SETTINGS_PATH)).required(path.is_some()))
            .add_source(
                Environment::with_prefix("LEDGER")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }
}
