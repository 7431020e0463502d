use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::debug;

use super::task::{Task, TaskEnvelope};

/// In-memory FIFO shared by every Worker of a pool
///
/// Architecture:
/// 1. The loader fills the queue completely before workers start
/// 2. Each worker calls `try_dequeue()` at the top of its loop
/// 3. `try_dequeue()` never waits: an empty queue returns `None`, which is
///    how workers notice the backlog is exhausted
/// 4. The mutex is held only for the push/pop itself, so a dequeued task is
///    handed to exactly one caller
///
/// A queue is an explicit value passed to the pool, never a global, so
/// independent pools (and tests) do not share state.
#[derive(Debug, Default)]
pub struct TaskQueue {
    items: Mutex<VecDeque<TaskEnvelope>>,
    next_seq: AtomicU64,
}

impl TaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a queue pre-loaded with `tasks`
    pub fn from_tasks<I: IntoIterator<Item = Task>>(tasks: I) -> Self {
        let queue = Self::new();
        queue.extend(tasks);
        queue
    }

    fn items(&self) -> MutexGuard<'_, VecDeque<TaskEnvelope>> {
        // push/pop cannot leave the deque half-modified, so a poisoned lock is still usable
        self.items.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append a task and return its sequence number
    pub fn enqueue(&self, task: Task) -> u64 {
        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst);
        self.items().push_back(TaskEnvelope { seq, task });
        debug!(seq, "Task enqueued");
        seq
    }

    /// Append every task in order
    pub fn extend<I: IntoIterator<Item = Task>>(&self, tasks: I) {
        let mut items = self.items();
        for task in tasks {
            let seq = self.next_seq.fetch_add(1, Ordering::SeqCst);
            items.push_back(TaskEnvelope { seq, task });
        }
    }

    /// Take the next task without waiting; `None` when the queue is empty
    pub fn try_dequeue(&self) -> Option<TaskEnvelope> {
        self.items().pop_front()
    }

    pub fn len(&self) -> usize {
        self.items().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items().is_empty()
    }
}
