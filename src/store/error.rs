use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Fjall error: {0}")]
    Fjall(#[from] fjall::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Duplicate entry '{value}' for {table}.{column}")]
    UniqueViolation {
        table: String,
        column: String,
        value: String,
    },

    #[error("Value rejected for {table}.{column}: {reason}")]
    Coercion {
        table: String,
        column: String,
        reason: String,
    },

    #[error("Unknown table: {0}")]
    UnknownTable(String),

    #[error("Unknown column {table}.{column}")]
    UnknownColumn { table: String, column: String },

    #[error("Missing primary key value for table {0}")]
    MissingKey(String),

    #[error("Primary key {table}.{column} cannot be updated")]
    KeyUpdate { table: String, column: String },
}

pub type Result<T> = std::result::Result<T, StoreError>;
