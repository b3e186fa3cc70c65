//! Configuration loading
//!
//! Resolution priority, highest first:
//! 1. Command-line override
//! 2. Environment variable
//! 3. TOML config file
//! 4. Compiled default
//!
//! A missing default config file is not an error; the catalog starts on
//! compiled defaults and logs a warning.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::trigram::DEFAULT_SIMILARITY_THRESHOLD;
use crate::{Error, Result};

/// Environment variable overriding the database path
pub const ENV_DATABASE: &str = "REFCAT_DATABASE";
/// Environment variable overriding the log level
pub const ENV_LOG_LEVEL: &str = "REFCAT_LOG_LEVEL";

/// Catalog configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    /// SQLite database file
    pub database_path: PathBuf,
    pub max_connections: u32,
    pub min_connections: u32,
    /// SQLite busy_timeout applied to every connection
    pub busy_timeout_ms: u64,
    /// Upper bound on retrying a write that hit a locked database
    pub max_lock_wait_ms: u64,
    /// Rows per multi-row statement and ids per IN list
    pub bulk_chunk_size: usize,
    /// Minimum trigram similarity for fuzzy lookup hits
    pub search_similarity_threshold: f32,
    /// Source slug recorded in coverage after a reconciliation
    pub enrichment_source_slug: String,
    pub log_level: String,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            max_connections: 20,
            min_connections: 2,
            busy_timeout_ms: 5000,
            max_lock_wait_ms: 5000,
            bulk_chunk_size: 500,
            search_similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
            enrichment_source_slug: "llm".to_string(),
            log_level: "info".to_string(),
        }
    }
}

/// Values supplied on the command line
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub config_file: Option<PathBuf>,
    pub database_path: Option<PathBuf>,
    pub log_level: Option<String>,
}

impl CatalogConfig {
    /// Resolve configuration from all sources and validate it
    pub fn load(overrides: &ConfigOverrides) -> Result<Self> {
        let mut config = match &overrides.config_file {
            Some(path) => Self::from_file(path)?,
            None => match default_config_file() {
                Some(path) if path.exists() => Self::from_file(&path)?,
                Some(path) => {
                    warn!("No config file at {}, using defaults", path.display());
                    Self::default()
                }
                None => {
                    warn!("Could not determine config directory, using defaults");
                    Self::default()
                }
            },
        };

        if let Ok(path) = std::env::var(ENV_DATABASE) {
            if !path.is_empty() {
                config.database_path = PathBuf::from(path);
            }
        }
        if let Ok(level) = std::env::var(ENV_LOG_LEVEL) {
            if !level.is_empty() {
                config.log_level = level;
            }
        }

        if let Some(path) = &overrides.database_path {
            config.database_path = path.clone();
        }
        if let Some(level) = &overrides.log_level {
            config.log_level = level.clone();
        }

        config.validate()?;
        Ok(config)
    }

    /// Load from a TOML file; absent keys take compiled defaults
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read config file {}: {}", path.display(), e))
        })?;
        let config = Self::from_toml_str(&content)?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(format!("Invalid config TOML: {}", e)))
    }

    pub fn validate(&self) -> Result<()> {
        if self.database_path.as_os_str().is_empty() {
            return Err(Error::Config("database_path must not be empty".to_string()));
        }
        if self.max_connections == 0 {
            return Err(Error::Config("max_connections must be at least 1".to_string()));
        }
        if self.min_connections > self.max_connections {
            return Err(Error::Config(format!(
                "min_connections ({}) exceeds max_connections ({})",
                self.min_connections, self.max_connections
            )));
        }
        if self.bulk_chunk_size == 0 {
            return Err(Error::Config("bulk_chunk_size must be at least 1".to_string()));
        }
        if !(self.search_similarity_threshold > 0.0 && self.search_similarity_threshold <= 1.0) {
            return Err(Error::Config(format!(
                "search_similarity_threshold must be in (0, 1], got {}",
                self.search_similarity_threshold
            )));
        }
        if self.enrichment_source_slug.trim().is_empty() {
            return Err(Error::Config("enrichment_source_slug must not be empty".to_string()));
        }
        Ok(())
    }
}

/// Default config file location (`~/.config/refcat/config.toml` on Linux)
pub fn default_config_file() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("refcat").join("config.toml"))
}

/// OS-dependent default database location
pub fn default_database_path() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("refcat").join("catalog.db"))
        .unwrap_or_else(|| PathBuf::from("./refcat_data/catalog.db"))
}
