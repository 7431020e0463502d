//! Worker loop - drains the shared queue one task at a time

use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::runtime::{Handle, RuntimeFlavor};
use tracing::{debug, error, info, warn};

use super::http::HttpSession;
use super::processor::Processor;
use super::signal::StopSignal;
use crate::observability::HarvestMetrics;
use crate::queue::{TaskEnvelope, TaskQueue};
use crate::store::PersistenceAdapter;

/// How a processed record reaches storage
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum WriteMode {
    /// Harvest new rows with `insert_if_absent`
    #[default]
    Insert,
    /// Enrich existing rows with `update_by_key`, keyed by a task field
    Update { key_field: String },
}

/// Why a worker left its loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerExit {
    /// The queue was empty
    Exhausted,
    /// The stop signal was seen before pulling another task
    Stopped,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerReport {
    pub worker_id: usize,
    pub exit: WorkerExit,
    pub dequeued: u64,
}

/// One worker: a network session and a storage adapter, both owned for
/// the worker's whole life and released when it finishes.
pub struct Worker {
    id: usize,
    queue: Arc<TaskQueue>,
    session: HttpSession,
    adapter: Box<dyn PersistenceAdapter>,
    processor: Arc<dyn Processor>,
    mode: WriteMode,
    stop: StopSignal,
    metrics: Arc<HarvestMetrics>,
}

impl Worker {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: usize,
        queue: Arc<TaskQueue>,
        session: HttpSession,
        adapter: Box<dyn PersistenceAdapter>,
        processor: Arc<dyn Processor>,
        mode: WriteMode,
        stop: StopSignal,
        metrics: Arc<HarvestMetrics>,
    ) -> Self {
        Self {
            id,
            queue,
            session,
            adapter,
            processor,
            mode,
            stop,
            metrics,
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    /// Run until the queue is empty or the stop signal is raised.
    ///
    /// The signal is checked at the top of every iteration only: a task
    /// already pulled is processed and written before the worker exits.
    pub async fn run(mut self) -> WorkerReport {
        info!(worker_id = self.id, "Worker started");
        let mut dequeued = 0;

        let exit = loop {
            if self.stop.is_raised() {
                break WorkerExit::Stopped;
            }
            let Some(envelope) = self.queue.try_dequeue() else {
                break WorkerExit::Exhausted;
            };
            dequeued += 1;
            self.metrics.task_dequeued();
            self.handle(envelope).await;
        };

        info!(worker_id = self.id, ?exit, dequeued, "Worker finished");
        WorkerReport {
            worker_id: self.id,
            exit,
            dequeued,
        }
    }

    async fn handle(&mut self, envelope: TaskEnvelope) {
        let TaskEnvelope { seq, task } = envelope;
        let worker_id = self.id;

        let key = match &self.mode {
            WriteMode::Insert => None,
            WriteMode::Update { key_field } => match task.get(key_field) {
                Some(key) if !key.is_null() => Some(key.clone()),
                _ => {
                    warn!(worker_id, seq, key_field = %key_field, "Task has no update key, dropped");
                    self.metrics.task_dropped();
                    return;
                }
            },
        };

        let processed = AssertUnwindSafe(self.processor.process(&task, &self.session))
            .catch_unwind()
            .await;
        let record = match processed {
            Ok(Ok(record)) => record,
            // failed tasks are dropped, never retried or requeued
            Ok(Err(e)) => {
                warn!(worker_id, seq, error = %e, "Task processing failed, dropped");
                self.metrics.task_dropped();
                return;
            }
            Err(panic) => {
                error!(
                    worker_id,
                    seq,
                    panic = panic_message(panic.as_ref()),
                    "Task processing panicked, dropped"
                );
                self.metrics.task_dropped();
                return;
            }
        };
        self.metrics.task_processed();

        let adapter = &mut self.adapter;
        let result = blocking(|| match &key {
            None => adapter.insert_if_absent(&record),
            Some(key) => adapter.update_by_key(key, &record),
        });

        match result {
            Ok(()) => {
                self.metrics.record_persisted();
                debug!(worker_id, seq, "Record written");
            }
            Err(e) if e.is_ignorable() => {
                self.metrics.write_skipped();
                debug!(worker_id, seq, error = %e, "Write skipped");
            }
            Err(e) => {
                self.metrics.write_failed();
                warn!(worker_id, seq, error = %e, "Write failed");
            }
        }
    }
}

/// Run a synchronous storage call without stalling the other tasks on a
/// multi-thread runtime. A current-thread runtime has nowhere to move them,
/// so the call runs inline there.
fn blocking<R>(f: impl FnOnce() -> R) -> R {
    match Handle::try_current().map(|handle| handle.runtime_flavor()) {
        Ok(RuntimeFlavor::MultiThread) => tokio::task::block_in_place(f),
        _ => f(),
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> &str {
    panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}

impl Drop for Worker {
    fn drop(&mut self) {
        debug!(worker_id = self.id, "Worker resources released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::Task;
    use crate::store::{PersistError, Record, Value, record};
    use crate::worker::http::HttpConfig;
    use crate::worker::processor::ProcessError;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Shared view of everything a [`RecordingAdapter`] saw
    #[derive(Clone, Default)]
    struct Recorded {
        inserts: Arc<Mutex<Vec<Record>>>,
        updates: Arc<Mutex<Vec<(Value, Record)>>>,
        releases: Arc<AtomicUsize>,
    }

    struct RecordingAdapter {
        log: Recorded,
    }

    impl PersistenceAdapter for RecordingAdapter {
        fn insert_if_absent(&mut self, record: &Record) -> Result<(), PersistError> {
            let mut inserts = self.log.inserts.lock().unwrap();
            if inserts.iter().any(|r| r.get("id") == record.get("id")) {
                return Err(PersistError::Duplicate("id".to_string()));
            }
            inserts.push(record.clone());
            Ok(())
        }

        fn update_by_key(&mut self, key: &Value, fields: &Record) -> Result<(), PersistError> {
            self.log.updates.lock().unwrap().push((key.clone(), fields.clone()));
            Ok(())
        }
    }

    impl Drop for RecordingAdapter {
        fn drop(&mut self) {
            self.log.releases.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn echo(task: &Task) -> Result<Record, ProcessError> {
        match task.get("id") {
            Some(Value::Int(0)) => panic!("id 0 blows up the parser"),
            Some(Value::Int(n)) if *n < 0 => Err(ProcessError::Parse("negative id".to_string())),
            Some(id) => Ok(record([("id", id.clone()), ("val", Value::from("x"))])),
            None => Err(ProcessError::MissingTaskField("id".to_string())),
        }
    }

    fn tasks(ids: &[i64]) -> Arc<TaskQueue> {
        Arc::new(TaskQueue::from_tasks(
            ids.iter().map(|&n| Task::new(record([("id", Value::Int(n))]))),
        ))
    }

    fn worker(
        queue: Arc<TaskQueue>,
        mode: WriteMode,
        stop: StopSignal,
    ) -> (Worker, Recorded, Arc<HarvestMetrics>) {
        let log = Recorded::default();
        let metrics = Arc::new(HarvestMetrics::new());
        let worker = Worker::new(
            0,
            queue,
            HttpSession::new(&HttpConfig::default()).unwrap(),
            Box::new(RecordingAdapter { log: log.clone() }),
            Arc::new(echo),
            mode,
            stop,
            Arc::clone(&metrics),
        );
        (worker, log, metrics)
    }

    #[tokio::test]
    async fn test_drains_queue_then_exits() {
        let queue = tasks(&[1, 2, 3]);
        let (worker, log, metrics) = worker(Arc::clone(&queue), WriteMode::Insert, StopSignal::new());

        let report = worker.run().await;

        assert_eq!(report.exit, WorkerExit::Exhausted);
        assert_eq!(report.dequeued, 3);
        assert!(queue.is_empty());
        assert_eq!(log.inserts.lock().unwrap().len(), 3);
        assert_eq!(metrics.snapshot().persisted, 3);
    }

    #[tokio::test]
    async fn test_failed_task_dropped_and_loop_continues() {
        let (worker, log, metrics) = worker(tasks(&[-1, 2]), WriteMode::Insert, StopSignal::new());

        let report = worker.run().await;

        assert_eq!(report.dequeued, 2);
        let inserts = log.inserts.lock().unwrap();
        assert_eq!(inserts.len(), 1);
        assert_eq!(inserts[0]["id"], Value::Int(2));
        let snap = metrics.snapshot();
        assert_eq!(snap.dropped, 1);
        assert_eq!(snap.writes_attempted(), snap.dequeued - snap.dropped);
    }

    #[tokio::test]
    async fn test_panicking_task_dropped_and_loop_continues() {
        let queue = tasks(&[1, 0, 2, 3]);
        let (worker, log, metrics) = worker(Arc::clone(&queue), WriteMode::Insert, StopSignal::new());

        let report = worker.run().await;

        assert_eq!(report.exit, WorkerExit::Exhausted);
        assert_eq!(report.dequeued, 4);
        assert!(queue.is_empty());
        assert_eq!(log.inserts.lock().unwrap().len(), 3);
        let snap = metrics.snapshot();
        assert_eq!(snap.dropped, 1);
        assert_eq!(snap.persisted, 3);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_writes_on_multi_thread_runtime() {
        let (worker, log, metrics) = worker(tasks(&[1, 2]), WriteMode::Insert, StopSignal::new());

        let report = tokio::spawn(worker.run()).await.unwrap();

        assert_eq!(report.dequeued, 2);
        assert_eq!(log.inserts.lock().unwrap().len(), 2);
        assert_eq!(metrics.snapshot().persisted, 2);
    }

    #[test]
    fn test_panic_message() {
        let text: Box<dyn std::any::Any + Send> = Box::new("boom");
        let owned: Box<dyn std::any::Any + Send> = Box::new(String::from("bang"));
        let other: Box<dyn std::any::Any + Send> = Box::new(7_u8);
        assert_eq!(panic_message(text.as_ref()), "boom");
        assert_eq!(panic_message(owned.as_ref()), "bang");
        assert_eq!(panic_message(other.as_ref()), "unknown panic");
    }

    #[tokio::test]
    async fn test_duplicate_write_skipped() {
        let (worker, log, metrics) = worker(tasks(&[1, 1, 2]), WriteMode::Insert, StopSignal::new());

        worker.run().await;

        assert_eq!(log.inserts.lock().unwrap().len(), 2);
        assert_eq!(metrics.snapshot().write_skipped, 1);
    }

    #[tokio::test]
    async fn test_stop_before_start_pulls_nothing() {
        let queue = tasks(&[1, 2]);
        let stop = StopSignal::new();
        stop.raise();
        let (worker, log, _) = worker(Arc::clone(&queue), WriteMode::Insert, stop);

        let report = worker.run().await;

        assert_eq!(report.exit, WorkerExit::Stopped);
        assert_eq!(report.dequeued, 0);
        assert_eq!(queue.len(), 2);
        assert!(log.inserts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_update_mode_keys_by_task_field() {
        let mode = WriteMode::Update {
            key_field: "id".to_string(),
        };
        let queue = Arc::new(TaskQueue::from_tasks([
            Task::new(record([("id", Value::Int(5))])),
            Task::new(record([("id", Value::Null)])),
        ]));
        let (worker, log, metrics) = worker(queue, mode, StopSignal::new());

        worker.run().await;

        let updates = log.updates.lock().unwrap();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].0, Value::Int(5));
        assert_eq!(metrics.snapshot().dropped, 1);
    }

    #[tokio::test]
    async fn test_resources_released_once() {
        let (worker, log, _) = worker(tasks(&[1]), WriteMode::Insert, StopSignal::new());
        assert_eq!(log.releases.load(Ordering::SeqCst), 0);

        worker.run().await;

        assert_eq!(log.releases.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_write_mode_from_toml() {
        let mode: WriteMode = toml::from_str(
            r#"
mode = "update"
key_field = "id"
"#,
        )
        .unwrap();
        assert_eq!(
            mode,
            WriteMode::Update {
                key_field: "id".to_string()
            }
        );
    }
}
