use super::models::{Config, JobMode};
use crate::store::{ColumnType, TableSchema};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("pool.workers must be at least 1")]
    ZeroWorkers,

    #[error("Invalid table name '{0}' (must be non-empty and contain no ':')")]
    InvalidTableName(String),

    #[error("{role} references undeclared table '{table}'")]
    UnknownTable { role: &'static str, table: String },

    #[error("{role} '{column}' is not a declared column of table '{table}'")]
    UndeclaredColumn {
        role: &'static str,
        table: String,
        column: String,
    },

    #[error("Table '{table}' is auto_increment but primary key '{column}' is not an integer column")]
    AutoIncrementNotInteger { table: String, column: String },

    #[error("{role} '{field}' must be listed in job.select")]
    NotSelected { role: &'static str, field: String },

    #[error("job.required '{0}' has no job.extract entry")]
    RequiredNotExtracted(String),

    #[error("Update mode requires job.key_field")]
    MissingKeyField,

    #[error("job.key_field '{field}' must be the primary key '{primary_key}' of the target table")]
    KeyFieldNotPrimary { field: String, primary_key: String },

    #[error("{role} '{column}' would overwrite the primary key in update mode")]
    PrimaryKeyWrite { role: &'static str, column: String },
}

/// Validate the entire configuration
pub fn validate(config: &Config) -> Result<(), ValidationError> {
    validate_pool(config)?;
    validate_tables(config)?;
    validate_job(config)?;
    Ok(())
}

fn validate_pool(config: &Config) -> Result<(), ValidationError> {
    if config.pool.workers == 0 {
        return Err(ValidationError::ZeroWorkers);
    }
    Ok(())
}

/// Table names end up in store keys, where ':' separates the parts
fn validate_tables(config: &Config) -> Result<(), ValidationError> {
    for (name, schema) in &config.store.tables {
        if name.is_empty() || name.contains(':') {
            return Err(ValidationError::InvalidTableName(name.clone()));
        }

        require_column(name, schema, &schema.primary_key, "primary_key")?;
        for column in &schema.unique {
            require_column(name, schema, column, "unique")?;
        }

        if schema.auto_increment
            && schema.columns[&schema.primary_key].column_type != ColumnType::Integer
        {
            return Err(ValidationError::AutoIncrementNotInteger {
                table: name.clone(),
                column: schema.primary_key.clone(),
            });
        }
    }
    Ok(())
}

fn validate_job(config: &Config) -> Result<(), ValidationError> {
    let job = &config.job;
    let source = lookup_table(config, &job.table, "job.table")?;
    let target = lookup_table(config, job.target(), "job.target")?;

    for field in &job.select {
        require_column(&job.table, source, field, "job.select")?;
    }
    if let Some(pending) = &job.pending {
        require_column(&job.table, source, pending, "job.pending")?;
    }

    require_selected(job, &job.url_field, "job.url_field")?;
    for field in &job.carry {
        require_selected(job, field, "job.carry")?;
        require_column(job.target(), target, field, "job.carry")?;
    }
    for column in job.extract.keys() {
        require_column(job.target(), target, column, "job.extract")?;
    }
    for column in &job.required {
        if !job.extract.contains_key(column) {
            return Err(ValidationError::RequiredNotExtracted(column.clone()));
        }
    }

    if job.mode == JobMode::Update {
        let key_field = job.key_field.as_ref().ok_or(ValidationError::MissingKeyField)?;
        require_selected(job, key_field, "job.key_field")?;
        if *key_field != target.primary_key {
            return Err(ValidationError::KeyFieldNotPrimary {
                field: key_field.clone(),
                primary_key: target.primary_key.clone(),
            });
        }

        // update_by_key never rewrites the key itself
        if job.carry.contains(&target.primary_key) {
            return Err(ValidationError::PrimaryKeyWrite {
                role: "job.carry",
                column: target.primary_key.clone(),
            });
        }
        if job.extract.contains_key(&target.primary_key) {
            return Err(ValidationError::PrimaryKeyWrite {
                role: "job.extract",
                column: target.primary_key.clone(),
            });
        }
    }

    Ok(())
}

fn lookup_table<'a>(
    config: &'a Config,
    table: &str,
    role: &'static str,
) -> Result<&'a TableSchema, ValidationError> {
    config
        .store
        .tables
        .get(table)
        .ok_or_else(|| ValidationError::UnknownTable {
            role,
            table: table.to_string(),
        })
}

fn require_column(
    table: &str,
    schema: &TableSchema,
    column: &str,
    role: &'static str,
) -> Result<(), ValidationError> {
    if schema.columns.contains_key(column) {
        Ok(())
    } else {
        Err(ValidationError::UndeclaredColumn {
            role,
            table: table.to_string(),
            column: column.to_string(),
        })
    }
}

fn require_selected(
    job: &super::models::JobConfig,
    field: &str,
    role: &'static str,
) -> Result<(), ValidationError> {
    if job.select.iter().any(|s| s == field) {
        Ok(())
    } else {
        Err(ValidationError::NotSelected {
            role,
            field: field.to_string(),
        })
    }
}
