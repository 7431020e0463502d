use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::pool::PoolSpec;
use crate::store::{Selector, TableSchema};
use crate::worker::{ExtractConfig, HttpConfig, WriteMode};

/// Top-level configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub pool: PoolConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub job: JobConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

impl Config {
    /// Worker settings for the pool, `None` when the job's write mode is
    /// incomplete (validation reports why)
    pub fn pool_spec(&self) -> Option<PoolSpec> {
        Some(
            PoolSpec::new(self.pool.workers)
                .mode(self.job.write_mode()?)
                .http(self.http.clone()),
        )
    }
}

/// Pool configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PoolConfig {
    #[serde(default = "default_workers")]
    pub workers: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
        }
    }
}

fn default_workers() -> usize {
    4
}

/// Embedded store configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StoreConfig {
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
    #[serde(default)]
    pub tables: BTreeMap<String, TableSchema>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
            tables: BTreeMap::new(),
        }
    }
}

fn default_store_path() -> PathBuf {
    PathBuf::from("data/harvest")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobMode {
    #[default]
    Insert,
    Update,
}

/// What to load, how to process it and where the records go
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct JobConfig {
    /// Table the task list is loaded from
    #[serde(default)]
    pub table: String,
    /// Table records are written to; defaults to `table`
    #[serde(default)]
    pub target: Option<String>,
    /// Columns projected into every task
    #[serde(default)]
    pub select: Vec<String>,
    /// Only rows where this column is NULL are loaded
    #[serde(default)]
    pub pending: Option<String>,
    #[serde(default)]
    pub mode: JobMode,
    /// Task field holding the row key in update mode
    #[serde(default)]
    pub key_field: Option<String>,
    #[serde(default)]
    pub url_field: String,
    #[serde(default)]
    pub carry: Vec<String>,
    /// Output column -> JSON pointer
    #[serde(default)]
    pub extract: BTreeMap<String, String>,
    #[serde(default)]
    pub required: Vec<String>,
}

impl JobConfig {
    pub fn target(&self) -> &str {
        self.target.as_deref().unwrap_or(&self.table)
    }

    pub fn write_mode(&self) -> Option<WriteMode> {
        match self.mode {
            JobMode::Insert => Some(WriteMode::Insert),
            JobMode::Update => Some(WriteMode::Update {
                key_field: self.key_field.clone()?,
            }),
        }
    }

    pub fn selector(&self) -> Selector {
        let selector = Selector::new(&self.table, &self.select);
        match &self.pending {
            Some(column) => selector.pending(column),
            None => selector,
        }
    }

    pub fn extract_config(&self) -> ExtractConfig {
        ExtractConfig {
            url_field: self.url_field.clone(),
            extract: self.extract.clone(),
            required: self.required.clone(),
            carry: self.carry.clone(),
        }
    }
}

/// Telemetry configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TelemetryConfig {
    /// Default filter when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}
