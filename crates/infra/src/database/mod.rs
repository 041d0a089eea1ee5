//! Database implementations

pub mod checkpoint_repository;
pub mod dlq_repository;
pub mod listing_repository;
pub mod manager;

pub use checkpoint_repository::SqliteCheckpointRepository;
pub use dlq_repository::SqliteDlqRepository;
pub use listing_repository::SqliteListingWriter;
pub use manager::DbManager;
