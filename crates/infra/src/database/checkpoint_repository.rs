//! Checkpoint repository implementation
//!
//! Owns the `sync_checkpoint` table: one row per sync stream holding the
//! resume cursor and the retry state machine. All state transitions happen
//! inside this repository; callers never mutate checkpoint fields directly.

use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use jobfeed_core::{CheckpointRepository as CheckpointRepositoryPort, Clock, RetryPolicies};
use jobfeed_domain::{
    CheckpointStatus, JobFeedError, Result as DomainResult, RetryClass, SyncCheckpoint, SyncType,
};
use rusqlite::{params, Connection, OptionalExtension, Row};
use tokio::task;
use tracing::warn;

use super::manager::{map_sql_error, DbManager};
use crate::errors::map_join_error;

/// SQLite-backed checkpoint repository.
pub struct SqliteCheckpointRepository {
    db: Arc<DbManager>,
    policies: Arc<RetryPolicies>,
    clock: Arc<dyn Clock>,
}

impl SqliteCheckpointRepository {
    pub fn new(db: Arc<DbManager>, policies: Arc<RetryPolicies>, clock: Arc<dyn Clock>) -> Self {
        Self { db, policies, clock }
    }
}

#[async_trait]
impl CheckpointRepositoryPort for SqliteCheckpointRepository {
    async fn get_or_create(&self, sync_type: SyncType) -> DomainResult<SyncCheckpoint> {
        let db = Arc::clone(&self.db);
        let now = self.clock.now();

        task::spawn_blocking(move || -> DomainResult<SyncCheckpoint> {
            let conn = db.get_connection()?;
            if let Some(checkpoint) = query_checkpoint(&conn, sync_type)? {
                return Ok(checkpoint);
            }

            let fresh = SyncCheckpoint::bootstrap(sync_type, now);
            conn.execute(
                "INSERT OR IGNORE INTO sync_checkpoint
                     (sync_type, status, retry_count, created_at, updated_at)
                 VALUES (?1, ?2, 0, ?3, ?3)",
                params![sync_type.to_string(), fresh.status.to_string(), now.timestamp()],
            )
            .map_err(map_sql_error)?;

            // Re-read in case a concurrent bootstrap won the insert
            query_checkpoint(&conn, sync_type)?
                .ok_or_else(|| JobFeedError::Database("checkpoint bootstrap lost its row".into()))
        })
        .await
        .map_err(map_join_error)?
    }

    async fn get(&self, sync_type: SyncType) -> DomainResult<Option<SyncCheckpoint>> {
        let db = Arc::clone(&self.db);

        task::spawn_blocking(move || -> DomainResult<Option<SyncCheckpoint>> {
            let conn = db.get_connection()?;
            query_checkpoint(&conn, sync_type)
        })
        .await
        .map_err(map_join_error)?
    }

    async fn record_success(&self, sync_type: SyncType, cursor: Option<String>) -> DomainResult<()> {
        let db = Arc::clone(&self.db);
        let now = self.clock.now();

        task::spawn_blocking(move || -> DomainResult<()> {
            let conn = db.get_connection()?;
            let updated = conn
                .execute(
                    "UPDATE sync_checkpoint
                     SET status = 'active', retry_count = 0, next_retry_at = NULL,
                         last_sync_at = ?1, cursor = ?2, updated_at = ?1
                     WHERE sync_type = ?3",
                    params![now.timestamp(), cursor, sync_type.to_string()],
                )
                .map_err(map_sql_error)?;

            if updated == 0 {
                return Err(JobFeedError::NotFound(format!("checkpoint for {sync_type}")));
            }
            Ok(())
        })
        .await
        .map_err(map_join_error)?
    }

    async fn record_failure(
        &self,
        sync_type: SyncType,
        class: RetryClass,
    ) -> DomainResult<SyncCheckpoint> {
        let db = Arc::clone(&self.db);
        let policies = Arc::clone(&self.policies);
        let now = self.clock.now();

        task::spawn_blocking(move || -> DomainResult<SyncCheckpoint> {
            let conn = db.get_connection()?;
            let current = query_checkpoint(&conn, sync_type)?
                .ok_or_else(|| JobFeedError::NotFound(format!("checkpoint for {sync_type}")))?;

            let attempt = current.retry_count + 1;
            let policy = policies.for_class(class);

            let (status, next_retry_at) = if attempt >= policy.max_retries {
                (CheckpointStatus::Failed, None)
            } else {
                let delay = policies.next_delay(class, attempt)?;
                let next = now
                    + chrono::Duration::from_std(delay).map_err(|e| {
                        JobFeedError::Internal(format!("backoff delay out of range: {e}"))
                    })?;
                (CheckpointStatus::RetryPending, Some(next))
            };

            conn.execute(
                "UPDATE sync_checkpoint
                 SET status = ?1, retry_count = ?2, next_retry_at = ?3, updated_at = ?4
                 WHERE sync_type = ?5",
                params![
                    status.to_string(),
                    attempt,
                    next_retry_at.map(|at| at.timestamp()),
                    now.timestamp(),
                    sync_type.to_string()
                ],
            )
            .map_err(map_sql_error)?;

            query_checkpoint(&conn, sync_type)?
                .ok_or_else(|| JobFeedError::NotFound(format!("checkpoint for {sync_type}")))
        })
        .await
        .map_err(map_join_error)?
    }

    async fn find_ready_for_retry(&self, now: DateTime<Utc>) -> DomainResult<Vec<SyncCheckpoint>> {
        let db = Arc::clone(&self.db);

        task::spawn_blocking(move || -> DomainResult<Vec<SyncCheckpoint>> {
            let conn = db.get_connection()?;
            let mut stmt = conn
                .prepare(
                    "SELECT sync_type, status, retry_count, next_retry_at, last_sync_at,
                            cursor, created_at, updated_at
                     FROM sync_checkpoint
                     WHERE status = 'retry_pending' AND next_retry_at <= ?1
                     ORDER BY next_retry_at ASC",
                )
                .map_err(map_sql_error)?;

            let rows = stmt
                .query_map(params![now.timestamp()], map_checkpoint_row)
                .map_err(map_sql_error)?
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(map_sql_error)?;
            Ok(rows)
        })
        .await
        .map_err(map_join_error)?
    }

    async fn reset(&self, sync_type: SyncType) -> DomainResult<()> {
        let db = Arc::clone(&self.db);
        let now = self.clock.now();

        task::spawn_blocking(move || -> DomainResult<()> {
            let conn = db.get_connection()?;
            let updated = conn
                .execute(
                    "UPDATE sync_checkpoint
                     SET status = 'active', retry_count = 0, next_retry_at = NULL,
                         cursor = NULL, updated_at = ?1
                     WHERE sync_type = ?2",
                    params![now.timestamp(), sync_type.to_string()],
                )
                .map_err(map_sql_error)?;

            if updated == 0 {
                warn!(sync_type = %sync_type, "Reset requested for unknown checkpoint");
            }
            Ok(())
        })
        .await
        .map_err(map_join_error)?
    }
}

// ============================================================================
// SQL operations (synchronous)
// ============================================================================

fn query_checkpoint(conn: &Connection, sync_type: SyncType) -> DomainResult<Option<SyncCheckpoint>> {
    conn.query_row(
        "SELECT sync_type, status, retry_count, next_retry_at, last_sync_at,
                cursor, created_at, updated_at
         FROM sync_checkpoint
         WHERE sync_type = ?1",
        params![sync_type.to_string()],
        map_checkpoint_row,
    )
    .optional()
    .map_err(map_sql_error)
}

fn map_checkpoint_row(row: &Row<'_>) -> rusqlite::Result<SyncCheckpoint> {
    let sync_type: String = row.get(0)?;
    let status: String = row.get(1)?;
    let next_retry_at: Option<i64> = row.get(3)?;
    let last_sync_at: Option<i64> = row.get(4)?;
    let created_at: i64 = row.get(6)?;
    let updated_at: i64 = row.get(7)?;

    Ok(SyncCheckpoint {
        sync_type: SyncType::from_str(&sync_type).map_err(|e| column_error(0, e))?,
        status: CheckpointStatus::from_str(&status).map_err(|e| column_error(1, e))?,
        retry_count: row.get(2)?,
        next_retry_at: next_retry_at.map(timestamp_to_utc),
        last_sync_at: last_sync_at.map(timestamp_to_utc),
        cursor: row.get(5)?,
        created_at: timestamp_to_utc(created_at),
        updated_at: timestamp_to_utc(updated_at),
    })
}

pub(crate) fn timestamp_to_utc(ts: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(ts, 0).single().unwrap_or_default()
}

pub(crate) fn column_error(
    index: usize,
    err: impl Into<Box<dyn std::error::Error + Send + Sync + 'static>>,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(index, rusqlite::types::Type::Text, err.into())
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;
    use crate::clock::SystemClock;

    async fn setup() -> (SqliteCheckpointRepository, TempDir) {
        let temp_dir = TempDir::new().expect("temp dir created");
        let db_path = temp_dir.path().join("checkpoints.db");

        let manager = Arc::new(DbManager::new(&db_path, 4).expect("db manager created"));
        manager.run_migrations().expect("migrations run");

        let repo = SqliteCheckpointRepository::new(
            manager,
            Arc::new(RetryPolicies::default()),
            Arc::new(SystemClock),
        );
        (repo, temp_dir)
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn bootstrap_creates_active_checkpoint() {
        let (repo, _dir) = setup().await;

        let checkpoint = repo.get_or_create(SyncType::JobListings).await.expect("bootstrap");

        assert_eq!(checkpoint.sync_type, SyncType::JobListings);
        assert_eq!(checkpoint.status, CheckpointStatus::Active);
        assert_eq!(checkpoint.retry_count, 0);
        assert!(checkpoint.cursor.is_none());

        // Idempotent: a second call returns the same row
        let again = repo.get_or_create(SyncType::JobListings).await.expect("second call");
        assert_eq!(again.created_at, checkpoint.created_at);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn get_returns_none_for_unknown_stream() {
        let (repo, _dir) = setup().await;
        assert!(repo.get(SyncType::Skills).await.expect("query").is_none());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn success_advances_cursor_and_clears_counters() {
        let (repo, _dir) = setup().await;
        repo.get_or_create(SyncType::Categories).await.expect("bootstrap");
        repo.record_failure(SyncType::Categories, RetryClass::Api).await.expect("failure");

        repo.record_success(SyncType::Categories, Some("cursor-42".to_string()))
            .await
            .expect("success");

        let checkpoint =
            repo.get(SyncType::Categories).await.expect("query").expect("checkpoint exists");
        assert_eq!(checkpoint.status, CheckpointStatus::Active);
        assert_eq!(checkpoint.retry_count, 0);
        assert!(checkpoint.next_retry_at.is_none());
        assert_eq!(checkpoint.cursor.as_deref(), Some("cursor-42"));
        assert!(checkpoint.last_sync_at.is_some());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn failure_schedules_retry_in_the_future() {
        let (repo, _dir) = setup().await;
        repo.get_or_create(SyncType::JobListings).await.expect("bootstrap");

        let before = Utc::now();
        let checkpoint =
            repo.record_failure(SyncType::JobListings, RetryClass::Api).await.expect("failure");

        assert_eq!(checkpoint.status, CheckpointStatus::RetryPending);
        assert_eq!(checkpoint.retry_count, 1);
        let next = checkpoint.next_retry_at.expect("retry scheduled");
        assert!(next > before);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn exhausted_failures_park_checkpoint_in_failed() {
        let (repo, _dir) = setup().await;
        repo.get_or_create(SyncType::Skills).await.expect("bootstrap");

        // Api class allows 5 attempts
        let mut last = None;
        for _ in 0..5 {
            last = Some(
                repo.record_failure(SyncType::Skills, RetryClass::Api).await.expect("failure"),
            );
        }

        let checkpoint = last.expect("at least one failure recorded");
        assert_eq!(checkpoint.status, CheckpointStatus::Failed);
        assert_eq!(checkpoint.retry_count, 5);
        assert!(checkpoint.next_retry_at.is_none());

        // Failed checkpoints never show up in the ready sweep
        let far_future = Utc::now() + chrono::Duration::days(365);
        let ready = repo.find_ready_for_retry(far_future).await.expect("sweep");
        assert!(ready.is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn ready_sweep_returns_only_due_checkpoints() {
        let (repo, _dir) = setup().await;
        repo.get_or_create(SyncType::JobListings).await.expect("bootstrap");
        repo.get_or_create(SyncType::Categories).await.expect("bootstrap");

        repo.record_failure(SyncType::JobListings, RetryClass::Api).await.expect("failure");

        // Not due yet
        let ready = repo.find_ready_for_retry(Utc::now()).await.expect("sweep");
        assert!(ready.is_empty());

        // Due once the backoff window passes
        let far_future = Utc::now() + chrono::Duration::days(1);
        let ready = repo.find_ready_for_retry(far_future).await.expect("sweep");
        assert_eq!(ready.len(), 1);
        assert_eq!(ready[0].sync_type, SyncType::JobListings);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn unknown_status_value_surfaces_as_database_error() {
        let (repo, _dir) = setup().await;
        repo.get_or_create(SyncType::JobListings).await.expect("bootstrap");

        {
            let conn = repo.db.get_connection().expect("connection");
            conn.execute(
                "UPDATE sync_checkpoint SET status = 'bogus' WHERE sync_type = ?1",
                params![SyncType::JobListings.to_string()],
            )
            .expect("row rewritten");
        }

        let err = repo.get(SyncType::JobListings).await.expect_err("decode fails");
        assert!(matches!(err, JobFeedError::Database(_)));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn reset_clears_state_and_cursor() {
        let (repo, _dir) = setup().await;
        repo.get_or_create(SyncType::JobListings).await.expect("bootstrap");
        repo.record_success(SyncType::JobListings, Some("cursor-7".to_string()))
            .await
            .expect("success");
        repo.record_failure(SyncType::JobListings, RetryClass::Api).await.expect("failure");

        repo.reset(SyncType::JobListings).await.expect("reset");

        let checkpoint =
            repo.get(SyncType::JobListings).await.expect("query").expect("checkpoint exists");
        assert_eq!(checkpoint.status, CheckpointStatus::Active);
        assert_eq!(checkpoint.retry_count, 0);
        assert!(checkpoint.cursor.is_none());
    }
}
