//! One complete harvest run: load, process, persist

use std::future::Future;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

use crate::config::Config;
use crate::pool::{Pool, PoolError, RunOutcome};
use crate::queue::TaskQueue;
use crate::store::{FjallStore, FjallWriterFactory, StoreError, populate};
use crate::worker::{JsonExtractProcessor, StopSignal};

#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Pool error: {0}")]
    Pool(#[from] PoolError),

    #[error("Job has no usable write mode (update mode needs job.key_field)")]
    WriteMode,
}

/// Run the configured job until the queue drains or the process is
/// signalled.
pub async fn run(config: Config) -> Result<RunOutcome, HarvestError> {
    run_until(config, shutdown_signal()).await
}

/// Like [`run`], with the interrupt supplied by the caller
pub async fn run_until<F>(config: Config, interrupt: F) -> Result<RunOutcome, HarvestError>
where
    F: Future<Output = ()>,
{
    let store = FjallStore::open(&config.store.path, config.store.tables.clone())?;
    run_on(&store, &config, interrupt).await
}

/// Harvest into an already open store.
///
/// A completed run is synced to disk before returning; an interrupted one
/// returns as soon as the stop signal is out.
pub async fn run_on<F>(
    store: &FjallStore,
    config: &Config,
    interrupt: F,
) -> Result<RunOutcome, HarvestError>
where
    F: Future<Output = ()>,
{
    let spec = config.pool_spec().ok_or(HarvestError::WriteMode)?;

    let queue = Arc::new(TaskQueue::new());
    let loaded = populate(store, &config.job.selector(), &queue)?;
    if loaded == 0 {
        info!(table = %config.job.table, "No tasks to harvest");
    }

    let processor = Arc::new(JsonExtractProcessor::new(config.job.extract_config()));
    let adapters = FjallWriterFactory::new(store.clone(), config.job.target())?;

    let pool = Pool::start(spec, queue, processor, &adapters, StopSignal::new())?;
    let outcome = pool.join_until(interrupt).await;

    match &outcome {
        RunOutcome::Completed { .. } => store.persist()?,
        RunOutcome::Interrupted { detached, .. } => {
            warn!(
                still_running = detached.len(),
                "Harvest interrupted, exiting without waiting for workers"
            );
        }
    }

    Ok(outcome)
}

/// Resolves on Ctrl+C or SIGTERM.
///
/// If a handler cannot be installed that source is ignored rather than
/// treated as a signal.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    warn!("Interrupt received");
}
