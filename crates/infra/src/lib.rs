//! # JobFeed Infrastructure
//!
//! Infrastructure implementations of core domain ports.
//!
//! This crate contains:
//! - SQLite-backed checkpoint, dead-letter, and listing repositories
//! - HTTP feed client (reqwest)
//! - Retry scheduler with explicit lifecycle management
//! - Configuration loading and metrics recording
//!
//! ## Architecture
//! - Implements traits defined in `jobfeed-core`
//! - Depends on `jobfeed-domain` and `jobfeed-core`
//! - Contains all "impure" code (I/O, clocks, network)

pub mod clock;
pub mod config;
pub mod database;
pub mod errors;
pub mod http;
pub mod observability;
pub mod scheduling;

// Re-export commonly used items
pub use clock::SystemClock;
pub use database::{DbManager, SqliteCheckpointRepository, SqliteDlqRepository, SqliteListingWriter};
pub use http::HttpFeedClient;
pub use observability::SyncMetrics;
pub use scheduling::{RetryScheduler, RetrySchedulerConfig};
