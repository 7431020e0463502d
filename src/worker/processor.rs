use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

use super::http::{FetchError, HttpSession};
use crate::queue::Task;
use crate::store::{Record, Value};

/// Errors from the process step; the task is dropped
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("task field missing or not text: {0}")]
    MissingTaskField(String),

    #[error("required field not found in response: {0}")]
    MissingField(String),

    #[error("parse failed: {0}")]
    Parse(String),
}

/// Turns one task into one record.
///
/// This is the only site-specific piece of a harvest; the worker loop,
/// queue and persistence are generic over it.
#[async_trait]
pub trait Processor: Send + Sync {
    async fn process(&self, task: &Task, session: &HttpSession) -> Result<Record, ProcessError>;
}

/// Plain functions and closures that need no network are processors too
#[async_trait]
impl<F> Processor for F
where
    F: Fn(&Task) -> Result<Record, ProcessError> + Send + Sync,
{
    async fn process(&self, task: &Task, _session: &HttpSession) -> Result<Record, ProcessError> {
        self(task)
    }
}

/// Settings for [`JsonExtractProcessor`]
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ExtractConfig {
    /// Task field holding the URL to fetch
    pub url_field: String,
    /// Output column -> JSON pointer into the response
    #[serde(default)]
    pub extract: BTreeMap<String, String>,
    /// Extract columns whose pointer must resolve
    #[serde(default)]
    pub required: Vec<String>,
    /// Task fields copied into the record unchanged
    #[serde(default)]
    pub carry: Vec<String>,
}

/// Fetches the task's URL as JSON and maps pointers onto record columns
#[derive(Debug, Clone)]
pub struct JsonExtractProcessor {
    config: ExtractConfig,
}

impl JsonExtractProcessor {
    pub fn new(config: ExtractConfig) -> Self {
        Self { config }
    }

    /// Build the record from an already fetched document
    pub fn extract(&self, task: &Task, doc: &serde_json::Value) -> Result<Record, ProcessError> {
        let mut record = Record::new();

        for field in &self.config.carry {
            let value = task
                .get(field)
                .cloned()
                .ok_or_else(|| ProcessError::MissingTaskField(field.clone()))?;
            record.insert(field.clone(), value);
        }

        for (column, pointer) in &self.config.extract {
            let value = match doc.pointer(pointer) {
                Some(found) => json_to_value(found),
                None if self.config.required.contains(column) => {
                    return Err(ProcessError::MissingField(column.clone()));
                }
                None => Value::Null,
            };
            record.insert(column.clone(), value);
        }

        Ok(record)
    }
}

#[async_trait]
impl Processor for JsonExtractProcessor {
    async fn process(&self, task: &Task, session: &HttpSession) -> Result<Record, ProcessError> {
        let url = task
            .text(&self.config.url_field)
            .ok_or_else(|| ProcessError::MissingTaskField(self.config.url_field.clone()))?;
        let doc = session.get_json(url).await?;
        self.extract(task, &doc)
    }
}

fn json_to_value(json: &serde_json::Value) -> Value {
    use serde_json::Value as Json;
    match json {
        Json::Null => Value::Null,
        Json::Bool(b) => Value::Int(i64::from(*b)),
        Json::Number(n) => match n.as_i64() {
            Some(i) => Value::Int(i),
            None => Value::Text(n.to_string()),
        },
        Json::String(s) => Value::Text(s.trim().to_string()),
        other => Value::Text(other.to_string()),
    }
}
