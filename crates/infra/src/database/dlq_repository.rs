//! Dead Letter Queue (DLQ) Repository implementation
//!
//! Durable record of units that failed their inline retries. Entries carry
//! the serialized unit payload so a later retry never needs to re-fetch.
//! Terminal rows (`succeeded`, `failed`, `expired`) are immutable apart
//! from retention purging.

use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use jobfeed_core::{Clock, DeadLetterQueue as DeadLetterQueuePort, RetryPolicies};
use jobfeed_domain::{
    DeadLetterEntry, DlqStatus, JobFeedError, JobUnit, Result as DomainResult, RetryClass,
    SyncType,
};
use rusqlite::{params, Connection, OptionalExtension, Row};
use tokio::task;
use uuid::Uuid;

use super::checkpoint_repository::{column_error, timestamp_to_utc};
use super::manager::{map_sql_error, DbManager};
use crate::errors::map_join_error;

/// SQLite-backed dead letter queue.
pub struct SqliteDlqRepository {
    db: Arc<DbManager>,
    policies: Arc<RetryPolicies>,
    clock: Arc<dyn Clock>,
}

impl SqliteDlqRepository {
    pub fn new(db: Arc<DbManager>, policies: Arc<RetryPolicies>, clock: Arc<dyn Clock>) -> Self {
        Self { db, policies, clock }
    }
}

#[async_trait]
impl DeadLetterQueuePort for SqliteDlqRepository {
    async fn enqueue(
        &self,
        unit: &JobUnit,
        error_type: &str,
        error_message: &str,
    ) -> DomainResult<DeadLetterEntry> {
        let db = Arc::clone(&self.db);
        let policies = Arc::clone(&self.policies);
        let now = self.clock.now();
        let external_id = unit.external_id.clone();
        let sync_type = unit.sync_type;
        let payload = unit.to_dlq_payload()?;
        let error_type = error_type.to_string();
        let error_message = error_message.to_string();

        task::spawn_blocking(move || -> DomainResult<DeadLetterEntry> {
            let conn = db.get_connection()?;

            // Dedupe on the live entry for this unit: newer failure details
            // win, the repeat failure spends a retry. The entry parks in
            // `failed` once the budget is gone.
            if let Some(existing) = query_pending_entry(&conn, &external_id, sync_type)? {
                let spent = existing.retry_count + 1;
                if spent >= existing.max_retries {
                    conn.execute(
                        "UPDATE dead_letter_queue
                         SET status = 'failed', retry_count = ?1, next_retry_at = NULL,
                             error_type = ?2, error_message = ?3, payload = ?4, updated_at = ?5
                         WHERE id = ?6",
                        params![
                            spent,
                            error_type,
                            error_message,
                            payload,
                            now.timestamp(),
                            existing.id
                        ],
                    )
                    .map_err(map_sql_error)?;
                } else {
                    let delay = policies.next_delay(RetryClass::Default, spent + 1)?;
                    let next = now
                        + chrono::Duration::from_std(delay).map_err(|e| {
                            JobFeedError::Internal(format!("backoff delay out of range: {e}"))
                        })?;
                    conn.execute(
                        "UPDATE dead_letter_queue
                         SET retry_count = ?1, next_retry_at = ?2, error_type = ?3,
                             error_message = ?4, payload = ?5, updated_at = ?6
                         WHERE id = ?7",
                        params![
                            spent,
                            next.timestamp(),
                            error_type,
                            error_message,
                            payload,
                            now.timestamp(),
                            existing.id
                        ],
                    )
                    .map_err(map_sql_error)?;
                }
                return query_entry(&conn, &existing.id)?
                    .ok_or_else(|| JobFeedError::NotFound(format!("dlq entry {}", existing.id)));
            }

            let id = Uuid::new_v4().to_string();
            let policy = policies.for_class(RetryClass::Default);
            let first_delay = policies.next_delay(RetryClass::Default, 1)?;
            let next_retry_at = now
                + chrono::Duration::from_std(first_delay).map_err(|e| {
                    JobFeedError::Internal(format!("backoff delay out of range: {e}"))
                })?;

            conn.execute(
                "INSERT INTO dead_letter_queue
                     (id, external_id, sync_type, status, retry_count, max_retries,
                      next_retry_at, error_type, error_message, payload, created_at, updated_at)
                 VALUES (?1, ?2, ?3, 'pending', 0, ?4, ?5, ?6, ?7, ?8, ?9, ?9)",
                params![
                    id,
                    external_id,
                    sync_type.to_string(),
                    policy.max_retries,
                    next_retry_at.timestamp(),
                    error_type,
                    error_message,
                    payload,
                    now.timestamp()
                ],
            )
            .map_err(map_sql_error)?;

            query_entry(&conn, &id)?
                .ok_or_else(|| JobFeedError::NotFound(format!("dlq entry {id}")))
        })
        .await
        .map_err(map_join_error)?
    }

    async fn record_retry_outcome(&self, id: &str, success: bool) -> DomainResult<DeadLetterEntry> {
        let db = Arc::clone(&self.db);
        let policies = Arc::clone(&self.policies);
        let now = self.clock.now();
        let id = id.to_string();

        task::spawn_blocking(move || -> DomainResult<DeadLetterEntry> {
            let conn = db.get_connection()?;
            let entry = query_entry(&conn, &id)?
                .ok_or_else(|| JobFeedError::NotFound(format!("dlq entry {id}")))?;

            if entry.status.is_terminal() {
                return Err(JobFeedError::InvalidInput(format!(
                    "dlq entry {id} is terminal ({}) and cannot record an outcome",
                    entry.status
                )));
            }

            if success {
                conn.execute(
                    "UPDATE dead_letter_queue
                     SET status = 'succeeded', next_retry_at = NULL, updated_at = ?1
                     WHERE id = ?2",
                    params![now.timestamp(), id],
                )
                .map_err(map_sql_error)?;
            } else {
                let spent = entry.retry_count + 1;
                if spent >= entry.max_retries {
                    conn.execute(
                        "UPDATE dead_letter_queue
                         SET status = 'failed', retry_count = ?1, next_retry_at = NULL,
                             updated_at = ?2
                         WHERE id = ?3",
                        params![spent, now.timestamp(), id],
                    )
                    .map_err(map_sql_error)?;
                } else {
                    let delay = policies.next_delay(RetryClass::Default, spent + 1)?;
                    let next = now
                        + chrono::Duration::from_std(delay).map_err(|e| {
                            JobFeedError::Internal(format!("backoff delay out of range: {e}"))
                        })?;
                    conn.execute(
                        "UPDATE dead_letter_queue
                         SET retry_count = ?1, next_retry_at = ?2, updated_at = ?3
                         WHERE id = ?4",
                        params![spent, next.timestamp(), now.timestamp(), id],
                    )
                    .map_err(map_sql_error)?;
                }
            }

            query_entry(&conn, &id)?
                .ok_or_else(|| JobFeedError::NotFound(format!("dlq entry {id}")))
        })
        .await
        .map_err(map_join_error)?
    }

    async fn find_ready_for_retry(&self, now: DateTime<Utc>) -> DomainResult<Vec<DeadLetterEntry>> {
        let db = Arc::clone(&self.db);

        task::spawn_blocking(move || -> DomainResult<Vec<DeadLetterEntry>> {
            let conn = db.get_connection()?;
            let mut stmt = conn
                .prepare(
                    "SELECT id, external_id, sync_type, status, retry_count, max_retries,
                            next_retry_at, error_type, error_message, payload,
                            created_at, updated_at
                     FROM dead_letter_queue
                     WHERE status = 'pending' AND next_retry_at <= ?1
                     ORDER BY next_retry_at ASC",
                )
                .map_err(map_sql_error)?;

            let rows = stmt
                .query_map(params![now.timestamp()], map_entry_row)
                .map_err(map_sql_error)?
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(map_sql_error)?;
            Ok(rows)
        })
        .await
        .map_err(map_join_error)?
    }

    async fn find_exhausted(&self) -> DomainResult<Vec<DeadLetterEntry>> {
        let db = Arc::clone(&self.db);

        task::spawn_blocking(move || -> DomainResult<Vec<DeadLetterEntry>> {
            let conn = db.get_connection()?;
            let mut stmt = conn
                .prepare(
                    "SELECT id, external_id, sync_type, status, retry_count, max_retries,
                            next_retry_at, error_type, error_message, payload,
                            created_at, updated_at
                     FROM dead_letter_queue
                     WHERE status IN ('failed', 'expired')
                     ORDER BY updated_at DESC",
                )
                .map_err(map_sql_error)?;

            let rows = stmt
                .query_map([], map_entry_row)
                .map_err(map_sql_error)?
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(map_sql_error)?;
            Ok(rows)
        })
        .await
        .map_err(map_join_error)?
    }

    async fn purge_older_than(&self, cutoff: DateTime<Utc>) -> DomainResult<usize> {
        let db = Arc::clone(&self.db);

        task::spawn_blocking(move || -> DomainResult<usize> {
            let conn = db.get_connection()?;
            let removed = conn
                .execute(
                    "DELETE FROM dead_letter_queue
                     WHERE status IN ('succeeded', 'failed', 'expired') AND created_at < ?1",
                    params![cutoff.timestamp()],
                )
                .map_err(map_sql_error)?;
            Ok(removed)
        })
        .await
        .map_err(map_join_error)?
    }

    async fn pending_depth(&self) -> DomainResult<u64> {
        let db = Arc::clone(&self.db);

        task::spawn_blocking(move || -> DomainResult<u64> {
            let conn = db.get_connection()?;
            let depth: i64 = conn
                .query_row(
                    "SELECT COUNT(*) FROM dead_letter_queue WHERE status = 'pending'",
                    [],
                    |row| row.get(0),
                )
                .map_err(map_sql_error)?;
            Ok(depth.max(0) as u64)
        })
        .await
        .map_err(map_join_error)?
    }
}

// ============================================================================
// SQL operations (synchronous)
// ============================================================================

fn query_entry(conn: &Connection, id: &str) -> DomainResult<Option<DeadLetterEntry>> {
    conn.query_row(
        "SELECT id, external_id, sync_type, status, retry_count, max_retries,
                next_retry_at, error_type, error_message, payload, created_at, updated_at
         FROM dead_letter_queue
         WHERE id = ?1",
        params![id],
        map_entry_row,
    )
    .optional()
    .map_err(map_sql_error)
}

fn query_pending_entry(
    conn: &Connection,
    external_id: &str,
    sync_type: SyncType,
) -> DomainResult<Option<DeadLetterEntry>> {
    conn.query_row(
        "SELECT id, external_id, sync_type, status, retry_count, max_retries,
                next_retry_at, error_type, error_message, payload, created_at, updated_at
         FROM dead_letter_queue
         WHERE external_id = ?1 AND sync_type = ?2 AND status = 'pending'",
        params![external_id, sync_type.to_string()],
        map_entry_row,
    )
    .optional()
    .map_err(map_sql_error)
}

fn map_entry_row(row: &Row<'_>) -> rusqlite::Result<DeadLetterEntry> {
    let sync_type: String = row.get(2)?;
    let status: String = row.get(3)?;
    let next_retry_at: Option<i64> = row.get(6)?;
    let created_at: i64 = row.get(10)?;
    let updated_at: i64 = row.get(11)?;

    Ok(DeadLetterEntry {
        id: row.get(0)?,
        external_id: row.get(1)?,
        sync_type: SyncType::from_str(&sync_type).map_err(|e| column_error(2, e))?,
        status: DlqStatus::from_str(&status).map_err(|e| column_error(3, e))?,
        retry_count: row.get(4)?,
        max_retries: row.get(5)?,
        next_retry_at: next_retry_at.map(timestamp_to_utc),
        error_type: row.get(7)?,
        error_message: row.get(8)?,
        payload: row.get(9)?,
        created_at: timestamp_to_utc(created_at),
        updated_at: timestamp_to_utc(updated_at),
    })
}
