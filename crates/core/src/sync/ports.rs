//! Port interfaces for sync operations
//!
//! Infrastructure adapters implement these traits; the orchestrator and
//! scheduler only ever talk to the ports. State transitions happen inside
//! the stores, never by direct field mutation from outside.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use jobfeed_domain::{
    DeadLetterEntry, FetchedBatch, JobUnit, Result, RetryClass, SyncCheckpoint, SyncReport,
    SyncType,
};

use crate::sync::errors::SyncError;

/// Durable per-stream cursor + health state.
#[async_trait]
pub trait CheckpointRepository: Send + Sync {
    /// Load the checkpoint for a stream, creating a fresh `Active` one with
    /// zeroed counters if none exists (idempotent bootstrap).
    async fn get_or_create(&self, sync_type: SyncType) -> Result<SyncCheckpoint>;

    /// Load the checkpoint for a stream without creating one.
    async fn get(&self, sync_type: SyncType) -> Result<Option<SyncCheckpoint>>;

    /// Mark a run successful: back to `Active`, counters cleared, cursor
    /// advanced, `last_sync_at` stamped. Succeeds from any state.
    async fn record_success(&self, sync_type: SyncType, cursor: Option<String>) -> Result<()>;

    /// Mark a run failed under the given retry class. Increments the retry
    /// count and either schedules the next retry or, once the class policy
    /// is exhausted, parks the checkpoint in `Failed`.
    async fn record_failure(
        &self,
        sync_type: SyncType,
        class: RetryClass,
    ) -> Result<SyncCheckpoint>;

    /// Checkpoints with `status = RetryPending` and `next_retry_at <= now`.
    async fn find_ready_for_retry(&self, now: DateTime<Utc>) -> Result<Vec<SyncCheckpoint>>;

    /// Operator reset: clear status, counters, and cursor so the stream
    /// starts over on the next run.
    async fn reset(&self, sync_type: SyncType) -> Result<()>;
}

/// Durable record of individually-failed units of work.
#[async_trait]
pub trait DeadLetterQueue: Send + Sync {
    /// Record a failed unit. If a non-terminal entry already exists for
    /// `(external_id, sync_type)` it is updated in place; otherwise a new
    /// `Pending` entry is inserted with the next retry scheduled.
    async fn enqueue(
        &self,
        unit: &JobUnit,
        error_type: &str,
        error_message: &str,
    ) -> Result<DeadLetterEntry>;

    /// Apply the outcome of a scheduled retry. Success is terminal; failure
    /// either reschedules or, once `max_retries` is reached, parks the entry
    /// in `Failed`.
    async fn record_retry_outcome(&self, id: &str, success: bool) -> Result<DeadLetterEntry>;

    /// Entries with `status = Pending` and `next_retry_at <= now`.
    async fn find_ready_for_retry(&self, now: DateTime<Utc>) -> Result<Vec<DeadLetterEntry>>;

    /// Entries whose retry budget is spent, for operator alerting.
    async fn find_exhausted(&self) -> Result<Vec<DeadLetterEntry>>;

    /// Delete terminal entries created before `cutoff`. `Pending` rows are
    /// never purged. Returns the number of rows removed.
    async fn purge_older_than(&self, cutoff: DateTime<Utc>) -> Result<usize>;

    /// Current number of `Pending` entries (DLQ depth gauge).
    async fn pending_depth(&self) -> Result<u64>;
}

/// External taxonomy/search API: "fetch next batch" capability.
#[async_trait]
pub trait FetchClient: Send + Sync {
    /// Fetch the next page for a stream, resuming at `cursor`.
    async fn fetch_batch(
        &self,
        sync_type: SyncType,
        cursor: Option<&str>,
    ) -> std::result::Result<FetchedBatch, SyncError>;
}

/// Local store: "persist entity" capability.
#[async_trait]
pub trait UnitWriter: Send + Sync {
    /// Persist one unit. Idempotent per `(external_id, sync_type)`.
    async fn persist(&self, unit: &JobUnit) -> std::result::Result<(), SyncError>;
}

/// Metrics sink consumed by the orchestrator and scheduler.
///
/// Counters and gauges live behind this port; business code never owns
/// shared mutable counters.
pub trait SyncMetricsPort: Send + Sync {
    /// A run started (`sync.total`).
    fn record_run_started(&self, sync_type: SyncType);

    /// A run completed (`sync.successful` + `sync.duration`).
    fn record_run_success(&self, report: &SyncReport);

    /// A run failed (`sync.failed`).
    fn record_run_failure(&self, sync_type: SyncType);

    /// Current DLQ depth gauge.
    fn record_dlq_depth(&self, depth: u64);

    /// Current exhausted-retry count gauge.
    fn record_exhausted_count(&self, count: u64);
}

/// Injectable time source so `next_retry_at` comparisons are deterministic
/// in tests.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}
