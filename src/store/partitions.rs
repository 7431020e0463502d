//! Key layout and encoding utilities for Fjall partitions
//!
//! Partition structure:
//! - `rows`: {table}:{pk} -> Record (JSON)
//! - `unique`: {table}:{column}:{value} -> pk (encoded)
//! - `metadata`: {table}:next_id -> u64 (big-endian)

use super::value::Value;

/// Encode a key value so integers and text never collide: `i:42`, `s:abc`
pub fn encode_value(value: &Value) -> Option<String> {
    match value {
        Value::Int(n) => Some(format!("i:{}", n)),
        Value::Text(s) => Some(format!("s:{}", s)),
        Value::Null => None,
    }
}

/// Encode a row key: {table}:{pk}
pub fn encode_row_key(table: &str, pk: &Value) -> Option<Vec<u8>> {
    encode_value(pk).map(|pk| format!("{}:{}", table, pk).into_bytes())
}

/// Encode a row prefix for table scans: {table}:
pub fn encode_row_prefix(table: &str) -> Vec<u8> {
    format!("{}:", table).into_bytes()
}

/// Encode a unique index key: {table}:{column}:{value}
pub fn encode_unique_key(table: &str, column: &str, value: &Value) -> Option<Vec<u8>> {
    encode_value(value).map(|v| format!("{}:{}:{}", table, column, v).into_bytes())
}

/// Encode the auto-increment counter key: {table}:next_id
pub fn encode_counter_key(table: &str) -> Vec<u8> {
    format!("{}:next_id", table).into_bytes()
}
