use std::sync::Arc;

use crate::store::{Record, Value};

/// One unit of work: an immutable set of identifying fields.
///
/// Cloning shares the fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    fields: Arc<Record>,
}

impl Task {
    pub fn new(fields: Record) -> Self {
        Self {
            fields: Arc::new(fields),
        }
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// Text value of `field`, if it holds text
    pub fn text(&self, field: &str) -> Option<&str> {
        self.get(field).and_then(Value::as_str)
    }

    pub fn fields(&self) -> &Record {
        &self.fields
    }
}

impl From<Record> for Task {
    fn from(fields: Record) -> Self {
        Self::new(fields)
    }
}

/// TaskEnvelope wraps a Task with the sequence number it was enqueued under
#[derive(Clone, Debug)]
pub struct TaskEnvelope {
    pub seq: u64,
    pub task: Task,
}
