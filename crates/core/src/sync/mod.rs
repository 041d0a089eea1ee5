//! Sync orchestration
//!
//! The orchestrator drives one checkpointed synchronization pass per sync
//! type, classifies failures, and routes unrecoverable units to the
//! dead-letter queue. Everything it touches (stores, feed API, local store,
//! metrics, clock) is a port defined in [`ports`].

pub mod errors;
pub mod orchestrator;
pub mod ports;

pub use errors::{ErrorCategory, SyncError};
pub use orchestrator::{SyncOrchestrator, SyncOrchestratorConfig};
