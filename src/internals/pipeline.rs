//! Asynchronous error pipeline
//!
//! Records are pushed onto a bounded queue with a non-blocking enqueue and
//! consumed by a fixed pool of worker tasks. For each record a worker:
//! 1. logs it at a level derived from its severity
//! 2. forwards it to the telemetry sink
//! 3. forwards it to the alert sink when the severity is in the alert set
//! 4. invokes every handler registered for its kind or an ancestor kind
//! 5. marks it handled and drops it
//!
//! Sinks and handlers run before step 5, so they see `handled == false`.
//! No record outlives its processing.
//!
//! A full queue drops the incoming record with a warning: reporting an
//! error must never block or fail the caller.

use crate::config::PipelineSettings;
use crate::core_types::{ErrorRecord, Severity};
use crate::error::{ResilienceError, ResilienceResult};
use crate::internals::sinks::{AlertSink, TelemetrySink};
use crate::logging::{log_by_severity, log_debug, log_error, log_info, log_trace, log_warn};
use crate::registry::Registry;
use futures_util::FutureExt;
use serde::{Deserialize, Serialize};
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Snapshot of pipeline state for metrics export.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineMetrics {
    pub queue_depth: usize,
    pub queue_capacity: usize,
    pub worker_count: usize,
    pub running: bool,
    pub processed: u64,
    pub dropped: u64,
    pub handler_failures: u64,
}

#[derive(Debug, Default)]
struct PipelineStats {
    processed: AtomicU64,
    dropped: AtomicU64,
    handler_failures: AtomicU64,
}

/// Everything a worker needs to process a record.
struct PipelineContext {
    settings: PipelineSettings,
    registry: Arc<Registry>,
    telemetry: Arc<dyn TelemetrySink>,
    alerts: Arc<dyn AlertSink>,
    stats: PipelineStats,
}

struct Workers {
    shutdown: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
}

/// Bounded queue plus worker pool routing recorded errors.
pub struct ErrorPipeline {
    context: Arc<PipelineContext>,
    sender: mpsc::Sender<ErrorRecord>,
    receiver: Arc<AsyncMutex<mpsc::Receiver<ErrorRecord>>>,
    workers: Mutex<Option<Workers>>,
}

impl std::fmt::Debug for ErrorPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ErrorPipeline")
            .field("settings", &self.context.settings)
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}

impl ErrorPipeline {
    /// Create a stopped pipeline. Records enqueued before [`start`] wait in
    /// the queue.
    ///
    /// [`start`]: Self::start
    pub fn new(
        settings: PipelineSettings,
        registry: Arc<Registry>,
        telemetry: Arc<dyn TelemetrySink>,
        alerts: Arc<dyn AlertSink>,
    ) -> ResilienceResult<Self> {
        settings.validate()?;
        let (sender, receiver) = mpsc::channel(settings.queue_capacity);

        Ok(Self {
            context: Arc::new(PipelineContext {
                settings,
                registry,
                telemetry,
                alerts,
                stats: PipelineStats::default(),
            }),
            sender,
            receiver: Arc::new(AsyncMutex::new(receiver)),
            workers: Mutex::new(None),
        })
    }

    /// Spawn the worker pool on the current Tokio runtime. Calling it on a
    /// running pipeline does nothing.
    pub fn start(&self) -> ResilienceResult<()> {
        let mut workers = self.lock_workers();
        if workers.is_some() {
            return Ok(());
        }

        let runtime = tokio::runtime::Handle::try_current().map_err(|_| {
            ResilienceError::configuration_error(
                "error pipeline must be started from within a Tokio runtime",
            )
        })?;

        let (shutdown, shutdown_rx) = watch::channel(false);
        let handles = (0..self.context.settings.worker_count)
            .map(|id| {
                runtime.spawn(run_worker(
                    id,
                    Arc::clone(&self.context),
                    Arc::clone(&self.receiver),
                    shutdown_rx.clone(),
                ))
            })
            .collect();

        *workers = Some(Workers { shutdown, handles });

        log_info!(
            worker_count = self.context.settings.worker_count,
            queue_capacity = self.context.settings.queue_capacity,
            "Error pipeline started"
        );
        Ok(())
    }

    /// Signal workers to exit and wait for them, bounded by the configured
    /// shutdown timeout. Workers still running at the deadline are aborted;
    /// records left in the queue stay there. Stopping a stopped pipeline
    /// does nothing.
    pub async fn stop(&self) {
        let Some(workers) = self.lock_workers().take() else {
            return;
        };

        // Receivers may already be gone if every worker exited
        let _ = workers.shutdown.send(true);

        let deadline = Instant::now() + self.context.settings.shutdown_timeout;
        for mut handle in workers.handles {
            if tokio::time::timeout_at(deadline, &mut handle).await.is_err() {
                log_warn!("Error pipeline worker did not stop in time, aborting");
                handle.abort();
            }
        }

        let abandoned = self.queue_depth();
        if abandoned > 0 {
            log_warn!(
                abandoned = abandoned,
                "Error pipeline stopped with records still queued"
            );
        }
        log_info!("Error pipeline stopped");
    }

    pub fn is_running(&self) -> bool {
        self.lock_workers().is_some()
    }

    /// Queue a record without waiting. Returns `false` when the queue is
    /// full and the record was dropped.
    pub fn enqueue(&self, record: ErrorRecord) -> bool {
        match self.sender.try_send(record) {
            Ok(()) => true,
            Err(TrySendError::Full(record)) => {
                self.context.stats.dropped.fetch_add(1, Ordering::Relaxed);
                log_warn!(
                    record_id = %record.id,
                    operation = %record.context.operation,
                    queue_capacity = self.context.settings.queue_capacity,
                    "Error queue full, dropping record"
                );
                false
            }
            // The receiver lives as long as the pipeline
            Err(TrySendError::Closed(record)) => {
                self.context.stats.dropped.fetch_add(1, Ordering::Relaxed);
                log_error!(record_id = %record.id, "Error queue closed, dropping record");
                false
            }
        }
    }

    pub fn queue_depth(&self) -> usize {
        self.sender.max_capacity() - self.sender.capacity()
    }

    pub fn queue_capacity(&self) -> usize {
        self.sender.max_capacity()
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.context.settings
    }

    pub fn metrics(&self) -> PipelineMetrics {
        let stats = &self.context.stats;
        PipelineMetrics {
            queue_depth: self.queue_depth(),
            queue_capacity: self.queue_capacity(),
            worker_count: self.context.settings.worker_count,
            running: self.is_running(),
            processed: stats.processed.load(Ordering::Relaxed),
            dropped: stats.dropped.load(Ordering::Relaxed),
            handler_failures: stats.handler_failures.load(Ordering::Relaxed),
        }
    }

    fn lock_workers(&self) -> MutexGuard<'_, Option<Workers>> {
        self.workers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

async fn run_worker(
    id: usize,
    context: Arc<PipelineContext>,
    receiver: Arc<AsyncMutex<mpsc::Receiver<ErrorRecord>>>,
    mut shutdown: watch::Receiver<bool>,
) {
    log_debug!(worker = id, "Error pipeline worker started");
    let poll_interval = context.settings.poll_interval;

    loop {
        if *shutdown.borrow() {
            break;
        }

        let next = {
            let mut queue = receiver.lock().await;
            tokio::select! {
                _ = shutdown.changed() => break,
                next = tokio::time::timeout(poll_interval, queue.recv()) => next,
            }
        };

        match next {
            Ok(Some(record)) => context.process(record).await,
            Ok(None) => break,
            Err(_idle) => log_trace!(worker = id, "Error queue idle"),
        }
    }

    log_debug!(worker = id, "Error pipeline worker stopped");
}

impl PipelineContext {
    async fn process(&self, mut record: ErrorRecord) {
        let severity = record.severity;

        if self.settings.log_all_errors || matches!(severity, Severity::Critical | Severity::High) {
            log_by_severity!(
                severity,
                record_id = %record.id,
                component = %record.context.component,
                operation = %record.context.operation,
                severity = %severity,
                category = %record.category,
                error = %record.error,
                "Error recorded"
            );
        }

        if self.settings.telemetry_enabled {
            let sent = AssertUnwindSafe(self.telemetry.emit(&record))
                .catch_unwind()
                .await;
            match sent {
                Ok(Ok(())) => {}
                Ok(Err(e)) => log_warn!(record_id = %record.id, error = %e, "Telemetry sink failed"),
                Err(_) => log_error!(record_id = %record.id, "Telemetry sink panicked"),
            }
        }

        if self.settings.alert_severities.contains(&severity) {
            let sent = AssertUnwindSafe(self.alerts.alert(&record))
                .catch_unwind()
                .await;
            match sent {
                Ok(Ok(())) => {}
                Ok(Err(e)) => log_warn!(record_id = %record.id, error = %e, "Alert sink failed"),
                Err(_) => log_error!(record_id = %record.id, "Alert sink panicked"),
            }
        }

        for handler in self.registry.handlers_for(record.error.kind()) {
            let outcome = std::panic::catch_unwind(AssertUnwindSafe(|| handler(&record)));
            let failure = match outcome {
                Ok(Ok(())) => continue,
                Ok(Err(e)) => e.to_string(),
                Err(_) => "handler panicked".to_string(),
            };
            self.stats.handler_failures.fetch_add(1, Ordering::Relaxed);
            log_error!(
                record_id = %record.id,
                kind = %record.error.kind(),
                error = %failure,
                "Error handler failed"
            );
        }

        record.handled = true;
        self.stats.processed.fetch_add(1, Ordering::Relaxed);
        log_trace!(
            record_id = %record.id,
            handled = record.is_handled(),
            "Error record processed"
        );
    }
}
