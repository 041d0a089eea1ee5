//! # JobFeed Core
//!
//! Pure business logic layer - no infrastructure dependencies.
//!
//! This crate contains:
//! - The backoff policy engine (per-class exponential delays with jitter)
//! - The sync orchestrator (checkpointed incremental runs, failure
//!   classification, dead-letter routing)
//! - Port/adapter interfaces (traits) for every external collaborator
//!
//! ## Architecture Principles
//! - Only depends on `jobfeed-domain`
//! - No database, HTTP, or platform code
//! - All external dependencies via traits
//! - Pure, testable business logic

pub mod backoff;
pub mod sync;

// Re-export specific items to avoid ambiguity
pub use backoff::{BackoffPolicy, RetryPolicies};
pub use sync::errors::{ErrorCategory, SyncError};
pub use sync::orchestrator::{SyncOrchestrator, SyncOrchestratorConfig};
pub use sync::ports::{
    CheckpointRepository, Clock, DeadLetterQueue, FetchClient, SyncMetricsPort, UnitWriter,
};
