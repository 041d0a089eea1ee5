//! Retry scheduler
//!
//! Periodic sweep loop with explicit lifecycle management. Each tick:
//! 1. re-runs sync for every checkpoint whose retry window has passed;
//! 2. re-attempts every due dead-letter entry from its stored payload;
//! 3. purges terminal DLQ rows past the retention window;
//! 4. refreshes the DLQ depth and exhausted gauges.
//!
//! Join handles are tracked, cancellation is explicit, and both sweeps run
//! under a shared semaphore so a large backlog cannot flood the feed API or
//! the local store. Per-item failures are logged and isolated; nothing that
//! happens inside a sweep can kill the loop.

use std::sync::Arc;
use std::time::Duration;

use jobfeed_core::{
    CheckpointRepository, Clock, DeadLetterQueue, SyncMetricsPort, SyncOrchestrator,
};
use jobfeed_domain::SchedulerConfig;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::observability::SyncMetrics;
use crate::scheduling::error::{SchedulerError, SchedulerResult};

/// Configuration for the retry scheduler.
#[derive(Debug, Clone)]
pub struct RetrySchedulerConfig {
    /// Disabled schedulers accept `start` but never spawn the sweep loop
    pub enabled: bool,
    /// Interval between sweep ticks
    pub interval: Duration,
    /// Maximum in-flight retries per sweep
    pub concurrency: usize,
    /// Terminal DLQ rows older than this are purged
    pub dlq_retention: chrono::Duration,
    /// Join timeout when stopping
    pub join_timeout: Duration,
}

impl Default for RetrySchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval: Duration::from_secs(300),
            concurrency: 4,
            dlq_retention: chrono::Duration::days(14),
            join_timeout: Duration::from_secs(5),
        }
    }
}

impl From<&SchedulerConfig> for RetrySchedulerConfig {
    fn from(config: &SchedulerConfig) -> Self {
        Self {
            enabled: config.enabled,
            interval: config.interval(),
            concurrency: config.concurrency.max(1),
            dlq_retention: chrono::Duration::days(config.dlq_retention_days),
            join_timeout: Duration::from_secs(5),
        }
    }
}

/// Shared collaborators for the sweep loop.
struct SweepContext {
    orchestrator: Arc<SyncOrchestrator>,
    checkpoints: Arc<dyn CheckpointRepository>,
    dlq: Arc<dyn DeadLetterQueue>,
    clock: Arc<dyn Clock>,
    metrics: Arc<SyncMetrics>,
}

/// Retry scheduler with explicit lifecycle management.
pub struct RetryScheduler {
    orchestrator: Arc<SyncOrchestrator>,
    checkpoints: Arc<dyn CheckpointRepository>,
    dlq: Arc<dyn DeadLetterQueue>,
    clock: Arc<dyn Clock>,
    metrics: Arc<SyncMetrics>,
    config: RetrySchedulerConfig,
    cancellation: CancellationToken,
    task_handle: Option<JoinHandle<()>>,
}

impl RetryScheduler {
    pub fn new(
        orchestrator: Arc<SyncOrchestrator>,
        checkpoints: Arc<dyn CheckpointRepository>,
        dlq: Arc<dyn DeadLetterQueue>,
        clock: Arc<dyn Clock>,
        metrics: Arc<SyncMetrics>,
        config: RetrySchedulerConfig,
    ) -> Self {
        Self {
            orchestrator,
            checkpoints,
            dlq,
            clock,
            metrics,
            config,
            cancellation: CancellationToken::new(),
            task_handle: None,
        }
    }

    /// Start the scheduler, spawning the background sweep task.
    ///
    /// # Errors
    /// Returns [`SchedulerError::AlreadyRunning`] if already started.
    #[instrument(skip(self))]
    pub fn start(&mut self) -> SchedulerResult<()> {
        if self.is_running() {
            return Err(SchedulerError::AlreadyRunning);
        }

        if !self.config.enabled {
            info!("Retry scheduler disabled by configuration; not starting");
            return Ok(());
        }

        info!(interval_secs = self.config.interval.as_secs(), "Starting retry scheduler");

        // Fresh token so the scheduler can restart after a stop
        self.cancellation = CancellationToken::new();

        let context = self.context();
        let config = self.config.clone();
        let cancel = self.cancellation.clone();

        self.task_handle = Some(tokio::spawn(async move {
            Self::sweep_loop(context, config, cancel).await;
        }));

        Ok(())
    }

    /// Stop the scheduler gracefully, letting in-flight retries finish.
    ///
    /// # Errors
    /// Returns [`SchedulerError::NotRunning`] if the scheduler is stopped,
    /// or [`SchedulerError::Timeout`] if the sweep task does not join in
    /// time.
    #[instrument(skip(self))]
    pub async fn stop(&mut self) -> SchedulerResult<()> {
        if !self.is_running() {
            return Err(SchedulerError::NotRunning);
        }

        info!("Stopping retry scheduler");
        self.cancellation.cancel();

        if let Some(handle) = self.task_handle.take() {
            let join_timeout = self.config.join_timeout;
            tokio::time::timeout(join_timeout, handle)
                .await
                .map_err(|_| SchedulerError::Timeout { seconds: join_timeout.as_secs() })?
                .map_err(|e| SchedulerError::TaskJoinFailed(e.to_string()))?;
        }

        info!("Retry scheduler stopped");
        Ok(())
    }

    /// Check whether the sweep task is alive.
    pub fn is_running(&self) -> bool {
        self.task_handle.as_ref().is_some_and(|handle| !handle.is_finished())
    }

    /// Run one sweep immediately, outside the interval loop. Used by tests
    /// and operator tooling to force a tick.
    pub async fn run_sweep_once(&self) {
        Self::sweep(&self.context(), &self.config).await;
    }

    fn context(&self) -> SweepContext {
        SweepContext {
            orchestrator: Arc::clone(&self.orchestrator),
            checkpoints: Arc::clone(&self.checkpoints),
            dlq: Arc::clone(&self.dlq),
            clock: Arc::clone(&self.clock),
            metrics: Arc::clone(&self.metrics),
        }
    }

    async fn sweep_loop(
        context: SweepContext,
        config: RetrySchedulerConfig,
        cancel: CancellationToken,
    ) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("Sweep loop cancelled");
                    break;
                }
                _ = tokio::time::sleep(config.interval) => {
                    Self::sweep(&context, &config).await;
                }
            }
        }
    }

    async fn sweep(context: &SweepContext, config: &RetrySchedulerConfig) {
        let now = context.clock.now();
        debug!(%now, "Sweep tick");

        Self::sweep_checkpoints(context, config).await;
        Self::sweep_dead_letters(context, config).await;
        Self::purge_dead_letters(context, config).await;
        Self::refresh_gauges(context).await;
    }

    /// Re-run sync for every checkpoint whose retry window has passed.
    async fn sweep_checkpoints(context: &SweepContext, config: &RetrySchedulerConfig) {
        let now = context.clock.now();
        let ready = match context.checkpoints.find_ready_for_retry(now).await {
            Ok(ready) => ready,
            Err(e) => {
                error!(error = %e, "Checkpoint sweep query failed");
                return;
            }
        };

        if ready.is_empty() {
            debug!("No checkpoints ready for retry");
            return;
        }

        info!(count = ready.len(), "Retrying checkpointed sync runs");
        let semaphore = Arc::new(Semaphore::new(config.concurrency.max(1)));
        let mut handles = Vec::with_capacity(ready.len());

        for checkpoint in ready {
            let orchestrator = Arc::clone(&context.orchestrator);
            let semaphore = Arc::clone(&semaphore);

            handles.push(tokio::spawn(async move {
                let Ok(_permit) = semaphore.acquire().await else {
                    return;
                };
                // run_sync records its own failure transition; nothing to
                // do here beyond logging
                if let Err(e) = orchestrator.run_sync(checkpoint.sync_type).await {
                    warn!(sync_type = %checkpoint.sync_type, error = %e, "Retried sync run failed");
                }
            }));
        }

        for handle in handles {
            if let Err(e) = handle.await {
                error!(error = %e, "Checkpoint retry task panicked");
            }
        }
    }

    /// Re-attempt every due dead-letter entry from its stored payload.
    async fn sweep_dead_letters(context: &SweepContext, config: &RetrySchedulerConfig) {
        let now = context.clock.now();
        let ready = match context.dlq.find_ready_for_retry(now).await {
            Ok(ready) => ready,
            Err(e) => {
                error!(error = %e, "DLQ sweep query failed");
                return;
            }
        };

        if ready.is_empty() {
            debug!("No dead-letter entries ready for retry");
            return;
        }

        info!(count = ready.len(), "Retrying dead-letter entries");
        let semaphore = Arc::new(Semaphore::new(config.concurrency.max(1)));
        let mut handles = Vec::with_capacity(ready.len());

        for entry in ready {
            let orchestrator = Arc::clone(&context.orchestrator);
            let semaphore = Arc::clone(&semaphore);

            handles.push(tokio::spawn(async move {
                let Ok(_permit) = semaphore.acquire().await else {
                    return;
                };
                match orchestrator.retry_dead_letter(&entry).await {
                    Ok(true) => {
                        debug!(entry_id = %entry.id, external_id = %entry.external_id,
                               "Dead-letter retry succeeded");
                    }
                    Ok(false) => {
                        debug!(entry_id = %entry.id, external_id = %entry.external_id,
                               "Dead-letter retry failed; outcome recorded");
                    }
                    Err(e) => {
                        warn!(entry_id = %entry.id, error = %e, "Dead-letter retry errored");
                    }
                }
            }));
        }

        for handle in handles {
            if let Err(e) = handle.await {
                error!(error = %e, "Dead-letter retry task panicked");
            }
        }
    }

    /// Purge terminal DLQ rows older than the retention window.
    async fn purge_dead_letters(context: &SweepContext, config: &RetrySchedulerConfig) {
        let cutoff = context.clock.now() - config.dlq_retention;
        match context.dlq.purge_older_than(cutoff).await {
            Ok(0) => {}
            Ok(removed) => info!(removed, "Purged terminal dead-letter entries"),
            Err(e) => error!(error = %e, "DLQ purge failed"),
        }
    }

    /// Refresh DLQ depth and exhausted gauges.
    async fn refresh_gauges(context: &SweepContext) {
        match context.dlq.pending_depth().await {
            Ok(depth) => context.metrics.record_dlq_depth(depth),
            Err(e) => warn!(error = %e, "Failed to read DLQ depth"),
        }
        match context.dlq.find_exhausted().await {
            Ok(exhausted) => context.metrics.record_exhausted_count(exhausted.len() as u64),
            Err(e) => warn!(error = %e, "Failed to read exhausted entries"),
        }
    }
}

/// Ensure the sweep task is cancelled when the scheduler is dropped.
impl Drop for RetryScheduler {
    fn drop(&mut self) {
        if !self.cancellation.is_cancelled() {
            if self.is_running() {
                warn!("RetryScheduler dropped while running; cancelling");
            }
            self.cancellation.cancel();
        }
    }
}
