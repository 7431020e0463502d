//! Parameterized write statements compiled from a record's field set

use std::fmt;

use super::value::Record;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    Insert,
    Update,
}

/// A compiled write statement.
///
/// Carries the structured parts a connection executes plus the rendered
/// text (named placeholders, one per column).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    kind: StatementKind,
    table: String,
    columns: Vec<String>,
    key_column: Option<String>,
    text: String,
}

impl Statement {
    /// `INSERT INTO {table} ({cols}) VALUES (:{col}, ...)`
    pub fn insert(table: &str, record: &Record) -> Self {
        let columns: Vec<String> = record.keys().cloned().collect();
        let placeholders: Vec<String> = columns.iter().map(|c| format!(":{}", c)).collect();
        let text = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            table,
            columns.join(", "),
            placeholders.join(", ")
        );

        Self {
            kind: StatementKind::Insert,
            table: table.to_string(),
            columns,
            key_column: None,
            text,
        }
    }

    /// `UPDATE {table} SET {col} = :{col}, ... WHERE {key} = :key`
    pub fn update(table: &str, key_column: &str, fields: &Record) -> Self {
        let columns: Vec<String> = fields.keys().cloned().collect();
        let assignments: Vec<String> = columns.iter().map(|c| format!("{} = :{}", c, c)).collect();
        let text = format!(
            "UPDATE {} SET {} WHERE {} = :key",
            table,
            assignments.join(", "),
            key_column
        );

        Self {
            kind: StatementKind::Update,
            table: table.to_string(),
            columns,
            key_column: Some(key_column.to_string()),
            text,
        }
    }

    pub fn kind(&self) -> StatementKind {
        self.kind
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn key_column(&self) -> Option<&str> {
        self.key_column.as_deref()
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// True when `record` has exactly the field set this statement binds
    pub fn binds(&self, record: &Record) -> bool {
        record.len() == self.columns.len() && self.columns.iter().all(|c| record.contains_key(c))
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}
