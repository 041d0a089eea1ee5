//! Sync orchestrator
//!
//! Executes one synchronization pass for a sync type: loads the checkpoint,
//! fetches the next batch at the stored cursor, persists each unit with
//! bounded inline retries, dead-letters units that keep failing, and commits
//! the new cursor only when the batch completes. Run-level failures are
//! translated into checkpoint transitions; nothing here mutates store state
//! directly.

use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use jobfeed_domain::{DeadLetterEntry, JobUnit, Result, SyncReport, SyncType};
use tokio::sync::Mutex;
use tracing::{debug, error, info, instrument, warn};

use crate::backoff::RetryPolicies;
use crate::sync::errors::{ErrorCategory, SyncError};
use crate::sync::ports::{
    CheckpointRepository, DeadLetterQueue, FetchClient, SyncMetricsPort, UnitWriter,
};

/// Configuration for the sync orchestrator.
#[derive(Debug, Clone)]
pub struct SyncOrchestratorConfig {
    /// Total in-run persist attempts per unit before dead-lettering.
    pub inline_retry_attempts: u32,
}

impl Default for SyncOrchestratorConfig {
    fn default() -> Self {
        Self { inline_retry_attempts: 2 }
    }
}

/// Per-key single-flight locks so one sync type never runs concurrently
/// with itself.
type RunLocks = DashMap<SyncType, Arc<Mutex<()>>>;

enum UnitOutcome {
    Persisted,
    DeadLettered,
}

/// Drives checkpointed sync runs and dead-letter retries.
pub struct SyncOrchestrator {
    checkpoints: Arc<dyn CheckpointRepository>,
    dlq: Arc<dyn DeadLetterQueue>,
    fetcher: Arc<dyn FetchClient>,
    writer: Arc<dyn UnitWriter>,
    metrics: Arc<dyn SyncMetricsPort>,
    policies: Arc<RetryPolicies>,
    config: SyncOrchestratorConfig,
    run_locks: RunLocks,
}

impl SyncOrchestrator {
    pub fn new(
        checkpoints: Arc<dyn CheckpointRepository>,
        dlq: Arc<dyn DeadLetterQueue>,
        fetcher: Arc<dyn FetchClient>,
        writer: Arc<dyn UnitWriter>,
        metrics: Arc<dyn SyncMetricsPort>,
        policies: Arc<RetryPolicies>,
        config: SyncOrchestratorConfig,
    ) -> Self {
        Self {
            checkpoints,
            dlq,
            fetcher,
            writer,
            metrics,
            policies,
            config,
            run_locks: DashMap::new(),
        }
    }

    /// Execute one synchronization pass for `sync_type`.
    ///
    /// Success advances the cursor and resets the checkpoint to `Active`.
    /// Retryable failures are charged to the checkpoint under the
    /// appropriate retry class and surfaced as errors; fatal errors
    /// propagate without touching the checkpoint.
    ///
    /// # Errors
    /// Returns the run-level failure after the checkpoint transition has
    /// been recorded.
    #[instrument(skip(self), fields(sync_type = %sync_type))]
    pub async fn run_sync(&self, sync_type: SyncType) -> Result<SyncReport> {
        let lock = self.run_lock(sync_type);
        let _guard = lock.lock().await;

        self.metrics.record_run_started(sync_type);
        info!("Starting sync run");
        let started = Instant::now();

        match self.run_locked(sync_type, started).await {
            Ok(report) => {
                info!(
                    total = report.total_units,
                    persisted = report.persisted,
                    dead_lettered = report.dead_lettered,
                    duration_ms = report.duration.as_millis() as u64,
                    "Sync run completed"
                );
                self.metrics.record_run_success(&report);
                Ok(report)
            }
            Err(err) => {
                self.metrics.record_run_failure(sync_type);
                match err.run_retry_class() {
                    Some(class) => {
                        let checkpoint = self.checkpoints.record_failure(sync_type, class).await?;
                        warn!(
                            error = %err,
                            retry_class = %class,
                            retry_count = checkpoint.retry_count,
                            status = %checkpoint.status,
                            "Sync run failed; checkpoint updated"
                        );
                    }
                    None => {
                        error!(error = %err, "Sync run hit a fatal error");
                    }
                }
                Err(err.into())
            }
        }
    }

    /// Re-attempt one dead-lettered unit from its stored payload and record
    /// the outcome. Returns whether the persist succeeded.
    ///
    /// # Errors
    /// Propagates fatal errors and store failures while recording the
    /// outcome; ordinary persist failures are folded into `Ok(false)`.
    #[instrument(skip(self, entry), fields(entry_id = %entry.id, external_id = %entry.external_id))]
    pub async fn retry_dead_letter(&self, entry: &DeadLetterEntry) -> Result<bool> {
        let unit = match JobUnit::from_dlq_payload(&entry.payload) {
            Ok(unit) => unit,
            Err(err) => {
                // Unreadable payload can never succeed; spend one attempt.
                warn!(error = %err, "Dead-letter payload failed to deserialize");
                self.dlq.record_retry_outcome(&entry.id, false).await?;
                return Ok(false);
            }
        };

        match self.writer.persist(&unit).await {
            Ok(()) => {
                debug!("Dead-letter retry persisted");
                self.dlq.record_retry_outcome(&entry.id, true).await?;
                Ok(true)
            }
            Err(err) if err.is_fatal() => Err(err.into()),
            Err(err) => {
                warn!(error = %err, "Dead-letter retry failed");
                self.dlq.record_retry_outcome(&entry.id, false).await?;
                Ok(false)
            }
        }
    }

    fn run_lock(&self, sync_type: SyncType) -> Arc<Mutex<()>> {
        self.run_locks.entry(sync_type).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
    }

    async fn run_locked(
        &self,
        sync_type: SyncType,
        started: Instant,
    ) -> std::result::Result<SyncReport, SyncError> {
        let checkpoint = self.checkpoints.get_or_create(sync_type).await.map_err(SyncError::from)?;

        let batch = self.fetcher.fetch_batch(sync_type, checkpoint.cursor.as_deref()).await?;
        debug!(units = batch.units.len(), has_more = batch.has_more, "Fetched batch");

        let mut persisted = 0_usize;
        let mut dead_lettered = 0_usize;

        for unit in &batch.units {
            match self.persist_with_inline_retry(unit).await? {
                UnitOutcome::Persisted => persisted += 1,
                UnitOutcome::DeadLettered => dead_lettered += 1,
            }
        }

        self.checkpoints
            .record_success(sync_type, batch.next_cursor.clone())
            .await
            .map_err(SyncError::from)?;

        Ok(SyncReport {
            sync_type,
            total_units: batch.units.len(),
            persisted,
            dead_lettered,
            duration: started.elapsed(),
            has_more: batch.has_more,
        })
    }

    /// Persist one unit with bounded inline retries.
    ///
    /// Transient failures burn inline attempts (Default retry class
    /// delays); permanent failures dead-letter immediately; systemic and
    /// fatal failures abort the run.
    async fn persist_with_inline_retry(
        &self,
        unit: &JobUnit,
    ) -> std::result::Result<UnitOutcome, SyncError> {
        let max_attempts = self.config.inline_retry_attempts.max(1);
        let mut attempt = 0_u32;

        loop {
            attempt += 1;
            let err = match self.writer.persist(unit).await {
                Ok(()) => return Ok(UnitOutcome::Persisted),
                Err(err) => err,
            };

            match err.unit_category() {
                ErrorCategory::Systemic | ErrorCategory::Fatal => return Err(err),
                ErrorCategory::Permanent => {
                    warn!(
                        external_id = %unit.external_id,
                        error = %err,
                        "Unit permanently failed; dead-lettering without inline retry"
                    );
                    self.dead_letter(unit, &err).await?;
                    return Ok(UnitOutcome::DeadLettered);
                }
                ErrorCategory::Transient => {
                    if attempt >= max_attempts {
                        warn!(
                            external_id = %unit.external_id,
                            attempts = attempt,
                            error = %err,
                            "Inline retries exhausted; dead-lettering unit"
                        );
                        self.dead_letter(unit, &err).await?;
                        return Ok(UnitOutcome::DeadLettered);
                    }

                    let delay = self
                        .policies
                        .next_delay(jobfeed_domain::RetryClass::Default, attempt)
                        .map_err(SyncError::from)?;
                    debug!(
                        external_id = %unit.external_id,
                        attempt = attempt,
                        delay_ms = delay.as_millis() as u64,
                        "Transient persist failure; retrying inline"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    async fn dead_letter(
        &self,
        unit: &JobUnit,
        err: &SyncError,
    ) -> std::result::Result<(), SyncError> {
        self.dlq
            .enqueue(unit, err.error_type(), &err.to_string())
            .await
            .map(|_| ())
            .map_err(SyncError::from)
    }
}
