//! Sync domain types
//!
//! These types represent the durable sync state (checkpoints and dead-letter
//! entries) plus the units of work that flow through a sync run. They map
//! 1:1 onto the SQLite schema and are used by repository ports.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// Sync streams and retry classes
// ============================================================================

/// A named category of data being synchronized from the feed API.
///
/// Each sync type owns exactly one checkpoint row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncType {
    JobListings,
    Categories,
    Skills,
}

crate::impl_domain_status_conversions!(SyncType {
    JobListings => "job_listings",
    Categories => "categories",
    Skills => "skills",
});

impl SyncType {
    /// All known sync streams, in sweep order.
    pub const ALL: [Self; 3] = [Self::JobListings, Self::Categories, Self::Skills];
}

/// Backoff policy family applied to a category of operation.
///
/// Resolved to a concrete [`crate::BackoffPolicyConfig`] via the retry
/// policy table loaded at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryClass {
    Default,
    Api,
    Sync,
    Database,
}

crate::impl_domain_status_conversions!(RetryClass {
    Default => "default",
    Api => "api",
    Sync => "sync",
    Database => "database",
});

// ============================================================================
// Checkpoint types
// ============================================================================

/// Health state of a sync stream's checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckpointStatus {
    /// Last run succeeded (or stream never failed); ready for the next run.
    Active,
    /// Last run failed; eligible for retry once `next_retry_at` passes.
    RetryPending,
    /// Retries exhausted; requires an operator reset.
    Failed,
}

crate::impl_domain_status_conversions!(CheckpointStatus {
    Active => "active",
    RetryPending => "retry_pending",
    Failed => "failed",
});

/// Durable cursor + health state for one sync stream.
///
/// Invariants (enforced by the checkpoint repository):
/// - `status == RetryPending` implies `next_retry_at` is set and
///   `retry_count >= 1`
/// - `status == Failed` implies `retry_count` reached the sync policy's
///   `max_retries`
/// - exactly one row exists per `sync_type`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncCheckpoint {
    pub sync_type: SyncType,
    pub status: CheckpointStatus,
    pub retry_count: u32,
    pub next_retry_at: Option<DateTime<Utc>>,
    pub last_sync_at: Option<DateTime<Utc>>,
    /// Opaque resume token handed back by the feed API.
    pub cursor: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SyncCheckpoint {
    /// Fresh checkpoint for a stream that has never run.
    pub fn bootstrap(sync_type: SyncType, now: DateTime<Utc>) -> Self {
        Self {
            sync_type,
            status: CheckpointStatus::Active,
            retry_count: 0,
            next_retry_at: None,
            last_sync_at: None,
            cursor: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether this checkpoint is due for a retry at `now`.
    pub fn is_ready_for_retry(&self, now: DateTime<Utc>) -> bool {
        self.status == CheckpointStatus::RetryPending
            && self.next_retry_at.is_some_and(|at| at <= now)
    }
}

// ============================================================================
// Dead-letter queue types
// ============================================================================

/// Lifecycle state of a dead-letter entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DlqStatus {
    /// Waiting for the scheduler to retry it.
    Pending,
    /// A scheduled retry persisted the unit. Terminal.
    Succeeded,
    /// Retries exhausted. Terminal.
    Failed,
    /// Aged out without resolution. Terminal.
    Expired,
}

crate::impl_domain_status_conversions!(DlqStatus {
    Pending => "pending",
    Succeeded => "succeeded",
    Failed => "failed",
    Expired => "expired",
});

impl DlqStatus {
    /// Terminal entries are immutable except for cleanup deletion.
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Expired)
    }
}

/// One individually-failed unit of work, retained for retry without
/// re-fetching from the feed API.
///
/// `(external_id, sync_type)` is logically unique among non-terminal
/// entries; a repeat failure for the same unit updates the existing row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadLetterEntry {
    pub id: String,
    /// Natural key of the failed unit in the external system.
    pub external_id: String,
    pub sync_type: SyncType,
    pub status: DlqStatus,
    pub retry_count: u32,
    /// Snapshot of the governing policy's max retries at creation time.
    pub max_retries: u32,
    pub next_retry_at: Option<DateTime<Utc>>,
    pub error_type: String,
    pub error_message: String,
    /// Serialized unit payload, sufficient to retry the persist.
    pub payload: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DeadLetterEntry {
    /// Whether all automatic retries have been spent.
    pub fn is_exhausted(&self) -> bool {
        self.retry_count >= self.max_retries
    }
}

// ============================================================================
// Units of work
// ============================================================================

/// A single record fetched from the feed API, ready to persist locally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobUnit {
    /// Natural key in the external taxonomy/search API.
    pub external_id: String,
    pub sync_type: SyncType,
    /// Raw record body as returned by the feed.
    pub payload: serde_json::Value,
}

impl JobUnit {
    pub fn new(external_id: impl Into<String>, sync_type: SyncType, payload: serde_json::Value) -> Self {
        Self { external_id: external_id.into(), sync_type, payload }
    }

    /// Serialize the unit for dead-letter storage.
    ///
    /// # Errors
    /// Returns `JobFeedError::Serialization` if the payload cannot be encoded.
    pub fn to_dlq_payload(&self) -> crate::Result<String> {
        serde_json::to_string(self).map_err(Into::into)
    }

    /// Rehydrate a unit from a dead-letter payload.
    ///
    /// # Errors
    /// Returns `JobFeedError::Serialization` if the payload is malformed.
    pub fn from_dlq_payload(payload: &str) -> crate::Result<Self> {
        serde_json::from_str(payload).map_err(Into::into)
    }
}

/// One page of feed data plus the resume position for the next page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchedBatch {
    pub units: Vec<JobUnit>,
    /// Resume token to store on success; `None` means end of stream.
    pub next_cursor: Option<String>,
    pub has_more: bool,
}

/// Outcome statistics for one completed sync run.
#[derive(Debug, Clone)]
pub struct SyncReport {
    pub sync_type: SyncType,
    pub total_units: usize,
    pub persisted: usize,
    pub dead_lettered: usize,
    pub duration: Duration,
    pub has_more: bool,
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    #[test]
    fn sync_type_roundtrip() {
        for sync_type in SyncType::ALL {
            let parsed = SyncType::from_str(&sync_type.to_string()).unwrap();
            assert_eq!(sync_type, parsed);
        }
    }

    #[test]
    fn dlq_status_terminality() {
        assert!(!DlqStatus::Pending.is_terminal());
        assert!(DlqStatus::Succeeded.is_terminal());
        assert!(DlqStatus::Failed.is_terminal());
        assert!(DlqStatus::Expired.is_terminal());
    }

    #[test]
    fn checkpoint_retry_readiness() {
        let now = Utc::now();
        let mut checkpoint = SyncCheckpoint::bootstrap(SyncType::JobListings, now);
        assert!(!checkpoint.is_ready_for_retry(now));

        checkpoint.status = CheckpointStatus::RetryPending;
        checkpoint.next_retry_at = Some(now - chrono::Duration::seconds(1));
        assert!(checkpoint.is_ready_for_retry(now));

        checkpoint.next_retry_at = Some(now + chrono::Duration::seconds(60));
        assert!(!checkpoint.is_ready_for_retry(now));
    }

    #[test]
    fn job_unit_dlq_payload_roundtrip() {
        let unit = JobUnit::new(
            "ext-42",
            SyncType::JobListings,
            serde_json::json!({"title": "Backend Engineer"}),
        );

        let payload = unit.to_dlq_payload().unwrap();
        let restored = JobUnit::from_dlq_payload(&payload).unwrap();
        assert_eq!(unit, restored);
    }
}
