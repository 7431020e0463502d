//! Fixed-size worker pool
//!
//! A [`Pool`] is single use: [`Pool::start`] builds every worker (each with
//! its own HTTP session and storage adapter) and spawns them, and
//! [`Pool::join`] or [`Pool::join_until`] consumes it. If an interrupt
//! arrives while joining, the stop signal is broadcast and the call returns
//! at once; in-flight iterations finish on their own in the detached tasks.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::observability::{HarvestMetrics, MetricsSnapshot};
use crate::queue::TaskQueue;
use crate::store::{AdapterFactory, PersistError};
use crate::worker::{
    FetchError, HttpConfig, HttpSession, Processor, StopSignal, Worker, WorkerReport, WriteMode,
};

/// Exit status of a run that was interrupted
pub const INTERRUPTED_EXIT_CODE: i32 = 1;

/// Exit status of a run in which a worker task died before draining
pub const WORKER_FAILED_EXIT_CODE: i32 = 1;

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("Pool needs at least one worker")]
    NoWorkers,

    #[error("Worker {worker_id}: failed to open HTTP session: {source}")]
    Session {
        worker_id: usize,
        #[source]
        source: FetchError,
    },

    #[error("Worker {worker_id}: failed to open storage connection: {source}")]
    Connect {
        worker_id: usize,
        #[source]
        source: PersistError,
    },
}

pub type Result<T> = std::result::Result<T, PoolError>;

/// What every worker of a pool is built with
#[derive(Debug, Clone, Default)]
pub struct PoolSpec {
    pub workers: usize,
    pub mode: WriteMode,
    pub http: HttpConfig,
}

impl PoolSpec {
    pub fn new(workers: usize) -> Self {
        Self {
            workers,
            ..Self::default()
        }
    }

    pub fn mode(mut self, mode: WriteMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn http(mut self, http: HttpConfig) -> Self {
        self.http = http;
        self
    }
}

/// How a pool run ended
#[derive(Debug)]
pub enum RunOutcome {
    /// Every worker task ended. `failed_workers` counts the ones that died
    /// instead of reaching the end of their loop.
    Completed {
        reports: Vec<WorkerReport>,
        metrics: MetricsSnapshot,
        failed_workers: usize,
    },
    /// An interrupt arrived first. The stop signal has been raised; workers
    /// that had not finished are still running in `detached`.
    Interrupted {
        metrics: MetricsSnapshot,
        detached: Vec<JoinHandle<WorkerReport>>,
    },
}

impl RunOutcome {
    pub fn exit_code(&self) -> i32 {
        match self {
            RunOutcome::Completed { failed_workers, .. } if *failed_workers > 0 => {
                WORKER_FAILED_EXIT_CODE
            }
            RunOutcome::Completed { .. } => 0,
            RunOutcome::Interrupted { .. } => INTERRUPTED_EXIT_CODE,
        }
    }

    pub fn is_interrupted(&self) -> bool {
        matches!(self, RunOutcome::Interrupted { .. })
    }

    /// Counters as they stood when the outcome was decided
    pub fn metrics(&self) -> MetricsSnapshot {
        match self {
            RunOutcome::Completed { metrics, .. } | RunOutcome::Interrupted { metrics, .. } => {
                *metrics
            }
        }
    }
}

pub struct Pool {
    run_id: Uuid,
    stop: StopSignal,
    metrics: Arc<HarvestMetrics>,
    handles: Vec<JoinHandle<WorkerReport>>,
}

impl Pool {
    /// Build `spec.workers` workers and start them.
    ///
    /// All sessions and connections are opened before anything is spawned,
    /// so a failure leaves no worker running; resources already opened are
    /// released as the partial list is dropped. Must be called from within
    /// a tokio runtime.
    pub fn start(
        spec: PoolSpec,
        queue: Arc<TaskQueue>,
        processor: Arc<dyn Processor>,
        adapters: &dyn AdapterFactory,
        stop: StopSignal,
    ) -> Result<Self> {
        if spec.workers == 0 {
            return Err(PoolError::NoWorkers);
        }

        let run_id = Uuid::now_v7();
        let metrics = Arc::new(HarvestMetrics::new());

        let mut workers = Vec::with_capacity(spec.workers);
        for worker_id in 0..spec.workers {
            let session = HttpSession::new(&spec.http)
                .map_err(|source| PoolError::Session { worker_id, source })?;
            let adapter = adapters
                .connect(worker_id)
                .map_err(|source| PoolError::Connect { worker_id, source })?;

            workers.push(Worker::new(
                worker_id,
                Arc::clone(&queue),
                session,
                adapter,
                Arc::clone(&processor),
                spec.mode.clone(),
                stop.clone(),
                Arc::clone(&metrics),
            ));
        }

        info!(
            %run_id,
            workers = spec.workers,
            backlog = queue.len(),
            mode = ?spec.mode,
            "Pool starting"
        );

        let handles = workers
            .into_iter()
            .map(|worker| tokio::spawn(worker.run()))
            .collect();

        Ok(Self {
            run_id,
            stop,
            metrics,
            handles,
        })
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn worker_count(&self) -> usize {
        self.handles.len()
    }

    /// A handle on the signal the workers check
    pub fn stop_signal(&self) -> StopSignal {
        self.stop.clone()
    }

    /// Ask every worker to stop before its next pull
    pub fn stop_all(&self) {
        info!(run_id = %self.run_id, "Stop requested");
        self.stop.raise();
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Wait for every worker to finish
    pub async fn join(self) -> RunOutcome {
        self.join_until(std::future::pending()).await
    }

    /// Wait for every worker, unless `interrupt` resolves first.
    ///
    /// On interrupt the stop signal is raised and the call returns without
    /// waiting for in-flight tasks.
    pub async fn join_until<F>(mut self, interrupt: F) -> RunOutcome
    where
        F: Future<Output = ()>,
    {
        let mut pending: VecDeque<_> = std::mem::take(&mut self.handles).into();
        let mut reports = Vec::with_capacity(pending.len());
        let mut failed_workers = 0;
        tokio::pin!(interrupt);

        while let Some(handle) = pending.front_mut() {
            let joined = tokio::select! {
                _ = &mut interrupt => None,
                joined = handle => Some(joined),
            };

            let Some(joined) = joined else {
                warn!(
                    run_id = %self.run_id,
                    still_running = pending.len(),
                    "Interrupt received, stopping workers"
                );
                self.stop_all();
                return RunOutcome::Interrupted {
                    metrics: self.metrics.snapshot(),
                    detached: pending.into(),
                };
            };

            pending.pop_front();
            match joined {
                Ok(report) => reports.push(report),
                // its share of the queue may be left undrained
                Err(e) => {
                    error!(run_id = %self.run_id, error = %e, "Worker task failed");
                    failed_workers += 1;
                }
            }
        }

        let metrics = self.metrics.snapshot();
        info!(
            run_id = %self.run_id,
            dequeued = metrics.dequeued,
            persisted = metrics.persisted,
            dropped = metrics.dropped,
            skipped = metrics.write_skipped,
            failed = metrics.write_failed,
            failed_workers,
            "Pool finished"
        );
        RunOutcome::Completed {
            reports,
            metrics,
            failed_workers,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::Task;
    use crate::store::{PersistenceAdapter, Record, StoreError, Value, record};
    use crate::worker::{ProcessError, WorkerExit};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct MemoryFactory {
        rows: Arc<Mutex<Vec<Record>>>,
        connected: AtomicUsize,
        released: Arc<AtomicUsize>,
        fail_at: Option<usize>,
        broken: bool,
    }

    struct MemoryAdapter {
        rows: Arc<Mutex<Vec<Record>>>,
        released: Arc<AtomicUsize>,
        broken: bool,
    }

    impl PersistenceAdapter for MemoryAdapter {
        fn insert_if_absent(&mut self, record: &Record) -> std::result::Result<(), PersistError> {
            if self.broken {
                panic!("storage driver crashed");
            }
            self.rows.lock().unwrap().push(record.clone());
            Ok(())
        }

        fn update_by_key(
            &mut self,
            _key: &Value,
            _fields: &Record,
        ) -> std::result::Result<(), PersistError> {
            Ok(())
        }
    }

    impl Drop for MemoryAdapter {
        fn drop(&mut self) {
            self.released.fetch_add(1, Ordering::SeqCst);
        }
    }

    impl AdapterFactory for MemoryFactory {
        fn connect(
            &self,
            worker_id: usize,
        ) -> std::result::Result<Box<dyn PersistenceAdapter>, PersistError> {
            if self.fail_at == Some(worker_id) {
                return Err(PersistError::Store(StoreError::UnknownTable("products".to_string())));
            }
            self.connected.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(MemoryAdapter {
                rows: Arc::clone(&self.rows),
                released: Arc::clone(&self.released),
                broken: self.broken,
            }))
        }
    }

    fn queue_of(n: i64) -> Arc<TaskQueue> {
        Arc::new(TaskQueue::from_tasks(
            (1..=n).map(|i| Task::new(record([("id", Value::Int(i))]))),
        ))
    }

    fn echo(task: &Task) -> std::result::Result<Record, ProcessError> {
        let id = task.get("id").cloned().unwrap_or(Value::Null);
        Ok(record([("id", id), ("val", Value::from("x"))]))
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_join_completes_with_exit_zero() {
        let factory = MemoryFactory::default();
        let pool = Pool::start(
            PoolSpec::new(2),
            queue_of(3),
            Arc::new(echo),
            &factory,
            StopSignal::new(),
        )
        .unwrap();
        assert_eq!(pool.worker_count(), 2);

        let outcome = pool.join().await;

        assert_eq!(outcome.exit_code(), 0);
        let RunOutcome::Completed {
            reports,
            metrics,
            failed_workers,
        } = outcome
        else {
            panic!("expected a completed run");
        };
        assert_eq!(failed_workers, 0);
        assert_eq!(reports.len(), 2);
        assert!(reports.iter().all(|r| r.exit == WorkerExit::Exhausted));
        assert_eq!(metrics.persisted, 3);
        assert_eq!(factory.rows.lock().unwrap().len(), 3);
        assert_eq!(factory.released.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_panicking_task_does_not_strand_backlog() {
        let factory = MemoryFactory::default();
        let queue = queue_of(5);
        let processor = |task: &Task| -> std::result::Result<Record, ProcessError> {
            if task.get("id") == Some(&Value::Int(1)) {
                panic!("malformed page");
            }
            echo(task)
        };

        let pool = Pool::start(
            PoolSpec::new(1),
            Arc::clone(&queue),
            Arc::new(processor),
            &factory,
            StopSignal::new(),
        )
        .unwrap();
        let outcome = pool.join().await;

        assert_eq!(outcome.exit_code(), 0);
        assert!(queue.is_empty());
        let metrics = outcome.metrics();
        assert_eq!(metrics.dequeued, 5);
        assert_eq!(metrics.dropped, 1);
        assert_eq!(metrics.persisted, 4);
        assert_eq!(factory.rows.lock().unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_dead_worker_fails_the_run() {
        let factory = MemoryFactory {
            broken: true,
            ..MemoryFactory::default()
        };
        let queue = queue_of(3);

        let pool = Pool::start(
            PoolSpec::new(1),
            Arc::clone(&queue),
            Arc::new(echo),
            &factory,
            StopSignal::new(),
        )
        .unwrap();
        let outcome = pool.join().await;

        assert_eq!(outcome.exit_code(), WORKER_FAILED_EXIT_CODE);
        let RunOutcome::Completed {
            reports,
            failed_workers,
            ..
        } = outcome
        else {
            panic!("expected a completed run");
        };
        assert!(reports.is_empty());
        assert_eq!(failed_workers, 1);
        assert_eq!(queue.len(), 2);
        assert_eq!(factory.released.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_zero_workers_rejected() {
        let result = Pool::start(
            PoolSpec::new(0),
            queue_of(1),
            Arc::new(echo),
            &MemoryFactory::default(),
            StopSignal::new(),
        );
        assert!(matches!(result, Err(PoolError::NoWorkers)));
    }

    #[tokio::test]
    async fn test_connect_failure_starts_nothing() {
        let factory = MemoryFactory {
            fail_at: Some(2),
            ..MemoryFactory::default()
        };
        let queue = queue_of(5);

        let result = Pool::start(
            PoolSpec::new(3),
            Arc::clone(&queue),
            Arc::new(echo),
            &factory,
            StopSignal::new(),
        );

        assert!(matches!(result, Err(PoolError::Connect { worker_id: 2, .. })));
        assert_eq!(queue.len(), 5);
        // the two adapters opened before the failure were released
        assert_eq!(factory.connected.load(Ordering::SeqCst), 2);
        assert_eq!(factory.released.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_interrupt_returns_without_waiting() {
        let factory = MemoryFactory::default();
        let pool = Pool::start(
            PoolSpec::new(1),
            queue_of(50),
            Arc::new(echo),
            &factory,
            StopSignal::new(),
        )
        .unwrap();
        let stop = pool.stop_signal();

        let outcome = pool.join_until(async {}).await;

        assert!(outcome.is_interrupted());
        assert_eq!(outcome.exit_code(), INTERRUPTED_EXIT_CODE);
        assert!(stop.is_raised());
    }

    #[test]
    fn test_pool_spec_builder() {
        let spec = PoolSpec::new(3).mode(WriteMode::Update {
            key_field: "id".to_string(),
        });
        assert_eq!(spec.workers, 3);
        assert!(matches!(spec.mode, WriteMode::Update { .. }));
    }
}
