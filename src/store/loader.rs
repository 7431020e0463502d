//! Task loading from the backing store

use tracing::info;

use super::error::{Result, StoreError};
use super::embedded::FjallStore;
use super::value::{Record, Value};
use crate::queue::{Task, TaskQueue};

/// Which rows become tasks and which fields each task carries
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selector {
    pub table: String,
    pub fields: Vec<String>,
    /// Only rows where this column is NULL (or absent)
    pub pending: Option<String>,
}

impl Selector {
    pub fn new<I, S>(table: impl Into<String>, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            table: table.into(),
            fields: fields.into_iter().map(Into::into).collect(),
            pending: None,
        }
    }

    pub fn pending(mut self, column: impl Into<String>) -> Self {
        self.pending = Some(column.into());
        self
    }

    fn accepts(&self, row: &Record) -> bool {
        match &self.pending {
            Some(column) => row.get(column).is_none_or(Value::is_null),
            None => true,
        }
    }

    fn project(&self, row: &Record) -> Task {
        let fields: Record = self
            .fields
            .iter()
            .map(|f| (f.clone(), row.get(f).cloned().unwrap_or(Value::Null)))
            .collect();
        Task::new(fields)
    }
}

/// Produces the complete task list for a run before any Worker starts
pub trait TaskLoader {
    fn load(&self, selector: &Selector) -> Result<Vec<Task>>;
}

impl TaskLoader for FjallStore {
    fn load(&self, selector: &Selector) -> Result<Vec<Task>> {
        let schema = self.schema(&selector.table)?;
        for field in selector.fields.iter().chain(selector.pending.iter()) {
            if !schema.columns.contains_key(field) {
                return Err(StoreError::UnknownColumn {
                    table: selector.table.clone(),
                    column: field.clone(),
                });
            }
        }

        Ok(self
            .rows(&selector.table)?
            .iter()
            .filter(|row| selector.accepts(row))
            .map(|row| selector.project(row))
            .collect())
    }
}

/// Load every task for `selector` and enqueue it, returning the count
pub fn populate<L: TaskLoader + ?Sized>(
    loader: &L,
    selector: &Selector,
    queue: &TaskQueue,
) -> Result<usize> {
    let tasks = loader.load(selector)?;
    let count = tasks.len();
    queue.extend(tasks);
    info!(table = %selector.table, count, "Task queue populated");
    Ok(count)
}
