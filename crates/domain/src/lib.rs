//! # JobFeed Domain
//!
//! Business domain types and models for the JobFeed sync service.
//!
//! This crate contains:
//! - Sync domain data types (checkpoints, dead-letter entries, job units)
//! - Domain error types and Result definitions
//! - Configuration structures
//! - Status enum conversion macros
//!
//! ## Architecture
//! - No dependencies on other JobFeed crates
//! - Only external dependencies allowed
//! - Pure domain models and data structures

pub mod config;
pub mod errors;
pub mod macros;
pub mod types;

// Re-export commonly used items
pub use config::*;
pub use errors::*;
pub use types::*;
