//! Configuration management for SMA.
//!
//! Configuration is loaded from multiple sources with the following priority:
//! 1. Environment variables (highest priority)
//! 2. Project-local `sma.toml` file
//! 3. User config `~/.config/sma/config.toml`
//! 4. Built-in defaults (lowest priority)

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

mod defaults;

pub use defaults::*;

use crate::flow::RawFormat;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Graph storage configuration.
    pub storage: StorageConfig,

    /// Batch extraction configuration.
    pub extraction: ExtractionConfig,

    /// Logging configuration.
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from default locations.
    ///
    /// Searches for config in order:
    /// 1. `./sma.toml` (project local)
    /// 2. `~/.config/sma/config.toml` (user config)
    /// 3. Falls back to defaults
    pub fn load() -> Result<Self, ConfigError> {
        if Path::new(PROJECT_CONFIG_FILE).exists() {
            return Self::from_file(PROJECT_CONFIG_FILE);
        }

        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("sma").join("config.toml");
            if user_config.exists() {
                return Self::from_file(&user_config);
            }
        }

        let mut config = Self::default();
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&content)?;

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Check values that serde cannot reject on its own.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.extraction.validate()
    }

    /// Apply environment variable overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(dir) = std::env::var("SMA_DATA_DIR") {
            self.storage.data_dir = dir;
        }
        if let Ok(n) = std::env::var("SMA_PARALLELISM") {
            if let Ok(n) = n.parse() {
                self.extraction.parallelism = n;
            }
        }
        if let Ok(rev) = std::env::var("SMA_MARKUP_MAX_API_REVISION") {
            if let Ok(rev) = rev.parse() {
                self.extraction.markup_max_api_revision = rev;
            }
        }
        if let Ok(filter) = std::env::var("SMA_LOG_FILTER") {
            self.logging.filter = filter;
        }
    }

    /// Create a default config file content as a string.
    pub fn default_config_string() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

/// Storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Base directory for sma data (default: ".sma").
    pub data_dir: String,

    /// Database directory name under `data_dir`.
    pub database_dir: String,

    /// SurrealDB namespace.
    pub namespace: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: DEFAULT_DATA_DIR.to_string(),
            database_dir: DEFAULT_DATABASE_DIR.to_string(),
            namespace: DEFAULT_NAMESPACE.to_string(),
        }
    }
}

impl StorageConfig {
    /// Get the full path to the graph database.
    pub fn database_path(&self) -> PathBuf {
        PathBuf::from(&self.data_dir).join(&self.database_dir)
    }
}

/// Batch extraction configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Maximum number of units in flight at once. Must be at least 1.
    pub parallelism: usize,

    /// Declared API revisions at or below this deliver legacy markup.
    pub markup_max_api_revision: f64,

    /// Ask the schema collaborator when a variable is not declared in the unit.
    pub resolve_with_collaborator: bool,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            parallelism: DEFAULT_PARALLELISM,
            markup_max_api_revision: DEFAULT_MARKUP_MAX_API_REVISION,
            resolve_with_collaborator: true,
        }
    }
}

impl ExtractionConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.parallelism == 0 {
            return Err(ConfigError::Invalid(
                "extraction.parallelism must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Format the transport is expected to deliver for a declared API revision.
    pub fn declared_format(&self, api_revision: f64) -> RawFormat {
        if api_revision <= self.markup_max_api_revision {
            RawFormat::LegacyMarkup
        } else {
            RawFormat::StructuredDocument
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Tracing filter directive used when `RUST_LOG` is unset.
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: DEFAULT_LOG_FILTER.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.storage.data_dir, DEFAULT_DATA_DIR);
        assert_eq!(config.extraction.parallelism, DEFAULT_PARALLELISM);
        assert!(config.extraction.resolve_with_collaborator);
        assert_eq!(config.logging.filter, DEFAULT_LOG_FILTER);
    }

    #[test]
    fn test_config_to_toml() {
        let toml_str = Config::default_config_string();
        assert!(toml_str.contains("[storage]"));
        assert!(toml_str.contains("[extraction]"));
        assert!(toml_str.contains("[logging]"));
    }

    #[test]
    fn test_zero_parallelism_rejected() {
        let config = ExtractionConfig {
            parallelism: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_declared_format_threshold() {
        let config = ExtractionConfig::default();
        assert_eq!(config.declared_format(43.0), RawFormat::LegacyMarkup);
        assert_eq!(config.declared_format(58.0), RawFormat::StructuredDocument);
    }

    #[test]
    fn test_database_path() {
        let storage = StorageConfig {
            data_dir: "/tmp/sma".to_string(),
            ..Default::default()
        };
        assert_eq!(storage.database_path(), PathBuf::from("/tmp/sma/graph.db"));
    }
}
