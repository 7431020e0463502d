//! Table declarations and column coercion rules

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::error::{Result, StoreError};
use super::value::{Record, Value};

/// Declared column type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Text,
    Integer,
}

/// Column declaration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ColumnSpec {
    #[serde(rename = "type")]
    pub column_type: ColumnType,
    /// Maximum length in characters for text columns
    pub max_len: Option<usize>,
    #[serde(default = "default_nullable")]
    pub nullable: bool,
}

fn default_nullable() -> bool {
    true
}

impl ColumnSpec {
    pub fn text() -> Self {
        Self {
            column_type: ColumnType::Text,
            max_len: None,
            nullable: true,
        }
    }

    pub fn integer() -> Self {
        Self {
            column_type: ColumnType::Integer,
            max_len: None,
            nullable: true,
        }
    }

    pub fn max_len(mut self, max_len: usize) -> Self {
        self.max_len = Some(max_len);
        self
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    /// Convert `value` into the column's storage form.
    ///
    /// Returns the reason as `Err` when a strict store would raise a
    /// data warning for this value.
    pub fn coerce(&self, value: &Value) -> std::result::Result<Value, String> {
        match (value, self.column_type) {
            (Value::Null, _) if !self.nullable => Err("column cannot be null".to_string()),
            (Value::Null, _) => Ok(Value::Null),
            (Value::Int(n), ColumnType::Integer) => Ok(Value::Int(*n)),
            (Value::Text(s), ColumnType::Integer) => s
                .trim()
                .parse::<i64>()
                .map(Value::Int)
                .map_err(|_| format!("incorrect integer value '{}'", s)),
            (Value::Int(n), ColumnType::Text) => self.check_len(n.to_string()),
            (Value::Text(s), ColumnType::Text) => self.check_len(s.clone()),
        }
    }

    fn check_len(&self, s: String) -> std::result::Result<Value, String> {
        match self.max_len {
            Some(max) if s.chars().count() > max => {
                Err(format!("data too long ({} > {} chars)", s.chars().count(), max))
            }
            _ => Ok(Value::Text(s)),
        }
    }
}

/// Table declaration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct TableSchema {
    pub primary_key: String,
    #[serde(default)]
    pub auto_increment: bool,
    #[serde(default)]
    pub unique: Vec<String>,
    #[serde(default)]
    pub columns: BTreeMap<String, ColumnSpec>,
}

impl TableSchema {
    pub fn new(primary_key: impl Into<String>) -> Self {
        Self {
            primary_key: primary_key.into(),
            auto_increment: false,
            unique: Vec::new(),
            columns: BTreeMap::new(),
        }
    }

    pub fn auto_increment(mut self) -> Self {
        self.auto_increment = true;
        self
    }

    pub fn column(mut self, name: impl Into<String>, spec: ColumnSpec) -> Self {
        self.columns.insert(name.into(), spec);
        self
    }

    pub fn unique(mut self, column: impl Into<String>) -> Self {
        self.unique.push(column.into());
        self
    }

    /// Coerce every field of `record` against the declared columns
    pub fn coerce_record(&self, table: &str, record: &Record) -> Result<Record> {
        record
            .iter()
            .map(|(column, value)| {
                let spec = self.columns.get(column).ok_or_else(|| StoreError::UnknownColumn {
                    table: table.to_string(),
                    column: column.clone(),
                })?;
                let coerced = spec.coerce(value).map_err(|reason| StoreError::Coercion {
                    table: table.to_string(),
                    column: column.clone(),
                    reason,
                })?;
                Ok((column.clone(), coerced))
            })
            .collect()
    }
}
