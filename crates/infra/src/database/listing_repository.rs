//! Local listing store
//!
//! Persists fetched units into the `job_listing` table. Upserts are keyed
//! on `(external_id, sync_type)` so replays and dead-letter retries are
//! idempotent.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use jobfeed_core::{Clock, SyncError, UnitWriter};
use jobfeed_domain::{JobUnit, Result as DomainResult, SyncType};
use rusqlite::params;
use tokio::task;

use super::manager::{map_sql_error, DbManager};
use crate::errors::map_join_error;

/// SQLite-backed unit writer.
pub struct SqliteListingWriter {
    db: Arc<DbManager>,
    clock: Arc<dyn Clock>,
}

impl SqliteListingWriter {
    pub fn new(db: Arc<DbManager>, clock: Arc<dyn Clock>) -> Self {
        Self { db, clock }
    }

    /// Number of stored listings for one stream (test/operator helper).
    ///
    /// # Errors
    /// Returns `JobFeedError::Database` on query failure.
    pub async fn count(&self, sync_type: SyncType) -> DomainResult<u64> {
        let db = Arc::clone(&self.db);

        task::spawn_blocking(move || -> DomainResult<u64> {
            let conn = db.get_connection()?;
            let count: i64 = conn
                .query_row(
                    "SELECT COUNT(*) FROM job_listing WHERE sync_type = ?1",
                    params![sync_type.to_string()],
                    |row| row.get(0),
                )
                .map_err(map_sql_error)?;
            Ok(count.max(0) as u64)
        })
        .await
        .map_err(map_join_error)?
    }

    /// Fetch the stored payload for one unit, if present.
    ///
    /// # Errors
    /// Returns `JobFeedError::Database` on query failure.
    pub async fn get_payload(
        &self,
        external_id: &str,
        sync_type: SyncType,
    ) -> DomainResult<Option<String>> {
        let db = Arc::clone(&self.db);
        let external_id = external_id.to_string();

        task::spawn_blocking(move || -> DomainResult<Option<String>> {
            let conn = db.get_connection()?;
            use rusqlite::OptionalExtension;
            conn.query_row(
                "SELECT payload FROM job_listing WHERE external_id = ?1 AND sync_type = ?2",
                params![external_id, sync_type.to_string()],
                |row| row.get(0),
            )
            .optional()
            .map_err(map_sql_error)
        })
        .await
        .map_err(map_join_error)?
    }

    async fn upsert(&self, unit: &JobUnit, now: DateTime<Utc>) -> DomainResult<()> {
        let db = Arc::clone(&self.db);
        let external_id = unit.external_id.clone();
        let sync_type = unit.sync_type;
        let payload = serde_json::to_string(&unit.payload)?;

        task::spawn_blocking(move || -> DomainResult<()> {
            let conn = db.get_connection()?;
            conn.execute(
                "INSERT INTO job_listing (external_id, sync_type, payload, fetched_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?4)
                 ON CONFLICT (external_id, sync_type)
                 DO UPDATE SET payload = excluded.payload, updated_at = excluded.updated_at",
                params![external_id, sync_type.to_string(), payload, now.timestamp()],
            )
            .map_err(map_sql_error)?;
            Ok(())
        })
        .await
        .map_err(map_join_error)?
    }
}

#[async_trait]
impl UnitWriter for SqliteListingWriter {
    async fn persist(&self, unit: &JobUnit) -> std::result::Result<(), SyncError> {
        let now = self.clock.now();
        self.upsert(unit, now).await.map_err(SyncError::from)
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;
    use crate::clock::SystemClock;

    async fn setup() -> (SqliteListingWriter, TempDir) {
        let temp_dir = TempDir::new().expect("temp dir created");
        let db_path = temp_dir.path().join("listings.db");

        let manager = Arc::new(DbManager::new(&db_path, 4).expect("db manager created"));
        manager.run_migrations().expect("migrations run");

        (SqliteListingWriter::new(manager, Arc::new(SystemClock)), temp_dir)
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn persist_inserts_listing() {
        let (writer, _dir) = setup().await;
        let unit = JobUnit::new(
            "job-1",
            SyncType::JobListings,
            serde_json::json!({"title": "data engineer"}),
        );

        writer.persist(&unit).await.expect("persisted");

        assert_eq!(writer.count(SyncType::JobListings).await.expect("count"), 1);
        let payload = writer
            .get_payload("job-1", SyncType::JobListings)
            .await
            .expect("query")
            .expect("payload stored");
        assert!(payload.contains("data engineer"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn persist_is_idempotent_per_unit() {
        let (writer, _dir) = setup().await;
        let first =
            JobUnit::new("job-2", SyncType::Categories, serde_json::json!({"name": "finance"}));
        let second =
            JobUnit::new("job-2", SyncType::Categories, serde_json::json!({"name": "fintech"}));

        writer.persist(&first).await.expect("first persist");
        writer.persist(&second).await.expect("second persist");

        assert_eq!(writer.count(SyncType::Categories).await.expect("count"), 1);
        let payload = writer
            .get_payload("job-2", SyncType::Categories)
            .await
            .expect("query")
            .expect("payload stored");
        assert!(payload.contains("fintech"), "latest payload wins");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn streams_are_isolated() {
        let (writer, _dir) = setup().await;
        let listing = JobUnit::new("x-1", SyncType::JobListings, serde_json::json!({}));
        let skill = JobUnit::new("x-1", SyncType::Skills, serde_json::json!({}));

        writer.persist(&listing).await.expect("listing persisted");
        writer.persist(&skill).await.expect("skill persisted");

        assert_eq!(writer.count(SyncType::JobListings).await.expect("count"), 1);
        assert_eq!(writer.count(SyncType::Skills).await.expect("count"), 1);
    }
}
