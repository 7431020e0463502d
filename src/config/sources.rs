use super::models::Config;
use config::{ConfigError, Environment, File, FileFormat};
use std::env;
use std::path::PathBuf;

const CONFIG_ENV_VAR: &str = "HARVESTER_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "config/harvester.toml";
const ENV_PREFIX: &str = "HARVESTER";
const ENV_SEPARATOR: &str = "__";

/// Load configuration from multiple sources with priority:
/// 1. Defaults (embedded in structs)
/// 2. TOML file (if exists)
/// 3. Environment variables from .env file (via dotenvy)
/// 4. System environment variables (highest priority)
///
/// The file is `explicit` when given, else `$HARVESTER_CONFIG`, else
/// `config/harvester.toml`.
pub fn load(explicit: Option<PathBuf>) -> Result<Config, ConfigError> {
    // a missing .env is fine
    let _ = dotenvy::dotenv();

    let config_path = explicit.unwrap_or_else(|| {
        env::var(CONFIG_ENV_VAR)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH))
    });

    load_from_sources(config_path)
}

/// Load configuration from a specific path and environment
pub fn load_from_sources(config_path: PathBuf) -> Result<Config, ConfigError> {
    let mut builder = config::Config::builder();

    if config_path.exists() {
        tracing::info!("Loading configuration from: {}", config_path.display());
        builder = builder.add_source(
            File::from(config_path)
                .format(FileFormat::Toml)
                .required(false),
        );
    } else {
        tracing::warn!(
            "Configuration file not found at {}, using defaults and environment overrides",
            config_path.display()
        );
    }

    // HARVESTER__POOL__WORKERS -> pool.workers
    builder = builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .separator(ENV_SEPARATOR)
            .try_parsing(true),
    );

    builder.build()?.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::JobMode;
    use crate::store::ColumnType;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_load_defaults_only() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("nonexistent.toml");

        let config = load_from_sources(config_path).unwrap();
        assert_eq!(config.pool.workers, 4);
        assert_eq!(config.store.path, PathBuf::from("data/harvest"));
        assert_eq!(config.telemetry.log_level, "info");
        assert!(config.store.tables.is_empty());
    }

    #[test]
    fn test_load_from_toml() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("test.toml");

        let toml_content = r#"
[pool]
workers = 8

[http]
request_timeout_secs = 15
accept = "json"

[store]
path = "/var/lib/harvester"

[store.tables.products]
primary_key = "id"
unique = ["url"]

[store.tables.products.columns]
id = { type = "integer" }
url = { type = "text", max_len = 255, nullable = false }
description = { type = "text" }

[job]
table = "products"
select = ["id", "url"]
pending = "description"
mode = "update"
key_field = "id"
url_field = "url"

[job.extract]
description = "/product/description"
        "#;

        fs::write(&config_path, toml_content).unwrap();

        let config = load_from_sources(config_path).unwrap();
        assert_eq!(config.pool.workers, 8);
        assert_eq!(config.http.request_timeout_secs, 15);
        assert_eq!(config.http.connect_timeout_secs, 10);

        let products = &config.store.tables["products"];
        assert_eq!(products.unique, vec!["url"]);
        assert_eq!(products.columns["url"].column_type, ColumnType::Text);
        assert_eq!(products.columns["url"].max_len, Some(255));
        assert!(!products.columns["url"].nullable);

        assert_eq!(config.job.mode, JobMode::Update);
        assert_eq!(config.job.pending.as_deref(), Some("description"));
        assert_eq!(config.job.extract["description"], "/product/description");
    }
}
