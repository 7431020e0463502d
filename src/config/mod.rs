//! Configuration management for the harvester
//!
//! This module provides a layered configuration system that loads settings from:
//! 1. Default values (embedded in structs)
//! 2. TOML configuration file
//! 3. Environment variables (highest priority)
//!
//! # Usage
//!
//! ```no_run
//! use harvester::config::Config;
//!
//! let config = Config::load(None).expect("Failed to load configuration");
//! println!("Workers: {}", config.pool.workers);
//! ```
//!
//! # Environment Variables
//!
//! Configuration can be overridden using environment variables with the pattern:
//! `HARVESTER__<section>__<key>`
//!
//! Examples:
//! - `HARVESTER__POOL__WORKERS=8`
//! - `HARVESTER__STORE__PATH=/var/lib/harvester`
//! - `HARVESTER__TELEMETRY__LOG_LEVEL=debug`
//!
//! # Configuration File
//!
//! By default, the configuration is loaded from `config/harvester.toml`.
//! This can be overridden using the `HARVESTER_CONFIG` environment variable
//! or the `--config` flag.

mod models;
mod sources;
mod validation;

pub use models::{Config, JobConfig, JobMode, PoolConfig, StoreConfig, TelemetryConfig};
pub use validation::ValidationError;

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("Configuration validation failed: {0}")]
    ValidationError(#[from] ValidationError),
}

impl Config {
    /// Load configuration from all sources (file + environment)
    ///
    /// Configuration is loaded with the following priority (highest to lowest):
    /// 1. Environment variables (`HARVESTER__*`)
    /// 2. TOML file (`path`, else `$HARVESTER_CONFIG`, else `config/harvester.toml`)
    /// 3. Default values
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Configuration file is malformed
    /// - Validation fails (undeclared tables or columns, incomplete job)
    pub fn load(path: Option<PathBuf>) -> Result<Self, ConfigError> {
        let config = sources::load(path)?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific path
    ///
    /// Useful for testing with custom configuration files.
    pub fn load_from_path(path: PathBuf) -> Result<Self, ConfigError> {
        let config = sources::load_from_sources(path)?;
        validation::validate(&config)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::worker::WriteMode;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_load_minimal_config() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("test.toml");

        let toml_content = r#"
[store.tables.categories]
primary_key = "id"
auto_increment = true
columns = { id = { type = "integer" }, url = { type = "text" } }

[job]
table = "categories"
select = ["url"]
url_field = "url"
        "#;

        fs::write(&config_path, toml_content).unwrap();

        let config = Config::load_from_path(config_path).unwrap();
        assert_eq!(config.store.tables.len(), 1);
        assert_eq!(config.job.target(), "categories");
        assert_eq!(config.pool_spec().unwrap().mode, WriteMode::Insert);
    }

    #[test]
    fn test_validation_catches_missing_table() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("test.toml");

        let toml_content = r#"
[job]
table = "products"
select = ["url"]
url_field = "url"
        "#;

        fs::write(&config_path, toml_content).unwrap();

        let result = Config::load_from_path(config_path);
        assert!(matches!(
            result.unwrap_err(),
            ConfigError::ValidationError(ValidationError::UnknownTable { .. })
        ));
    }

    #[test]
    fn test_full_config_example() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("test.toml");

        let toml_content = r#"
[pool]
workers = 6

[http]
connect_timeout_secs = 5
user_agent = "harvester/0.1"
accept = "json"

[http.headers]
x-requested-with = "XMLHttpRequest"

[store]
path = "data/shop"

[store.tables.categories]
primary_key = "id"
auto_increment = true

[store.tables.categories.columns]
id = { type = "integer" }
url = { type = "text", nullable = false }

[store.tables.products]
primary_key = "id"
auto_increment = true
unique = ["url"]

[store.tables.products.columns]
id = { type = "integer" }
url = { type = "text", max_len = 512, nullable = false }
name = { type = "text", max_len = 128 }
price = { type = "integer" }

[job]
table = "categories"
target = "products"
select = ["id", "url"]
mode = "insert"
url_field = "url"
carry = ["url"]
required = ["name"]

[job.extract]
name = "/product/name"
price = "/product/price"

[telemetry]
log_level = "debug"
        "#;

        fs::write(&config_path, toml_content).unwrap();

        let config = Config::load_from_path(config_path).unwrap();

        assert_eq!(config.pool.workers, 6);
        assert_eq!(config.http.headers["x-requested-with"], "XMLHttpRequest");
        assert_eq!(config.store.tables.len(), 2);
        assert_eq!(config.job.target(), "products");
        assert_eq!(config.telemetry.log_level, "debug");

        let spec = config.pool_spec().unwrap();
        assert_eq!(spec.workers, 6);
        assert_eq!(spec.http.connect_timeout_secs, 5);

        let selector = config.job.selector();
        assert_eq!(selector.table, "categories");
        assert_eq!(selector.fields, vec!["id", "url"]);
        assert!(selector.pending.is_none());

        let extract = config.job.extract_config();
        assert_eq!(extract.url_field, "url");
        assert_eq!(extract.extract.len(), 2);
    }
}
