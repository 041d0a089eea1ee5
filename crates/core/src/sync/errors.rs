//! Sync-specific error types
//!
//! Provides failure classification for sync operations. Every error carries
//! a category that decides how the orchestrator reacts: inline retry,
//! dead-letter routing, run-level retry via the checkpoint, or propagation.

use std::time::Duration;

use jobfeed_domain::{JobFeedError, RetryClass};
use thiserror::Error;

/// How a failure is handled by the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Retry eligible (network timeout, 5xx, lock contention).
    Transient,
    /// Wrong for this unit only (malformed payload, validation, 4xx on a
    /// record); isolated to the DLQ without inline retry.
    Permanent,
    /// The whole run is compromised (storage unreachable, auth rejection);
    /// the checkpoint takes the failure.
    Systemic,
    /// Programmer or configuration error; propagated, never retried.
    Fatal,
}

/// Sync operation errors
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Rate limit exceeded: {0}")]
    RateLimit(String),

    #[error("Server error: {0}")]
    Server(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Timeout after {0:?}")]
    Timeout(Duration),

    #[error("Client error: {0}")]
    Client(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl SyncError {
    /// Category used for a failure scoped to a single unit of work.
    pub const fn unit_category(&self) -> ErrorCategory {
        match self {
            Self::RateLimit(_) | Self::Server(_) | Self::Network(_) | Self::Timeout(_) => {
                ErrorCategory::Transient
            }
            Self::Client(_) | Self::Validation(_) => ErrorCategory::Permanent,
            Self::Database(_) => ErrorCategory::Systemic,
            Self::Config(_) => ErrorCategory::Fatal,
        }
    }

    /// Retry class charged to the checkpoint when this error fails a whole
    /// run. `None` means the error is fatal and must propagate instead.
    pub const fn run_retry_class(&self) -> Option<RetryClass> {
        match self {
            Self::Config(_) => None,
            Self::Database(_) => Some(RetryClass::Database),
            _ => Some(RetryClass::Api),
        }
    }

    /// Stable tag stored in the DLQ `error_type` column.
    pub const fn error_type(&self) -> &'static str {
        match self {
            Self::RateLimit(_) => "rate_limit",
            Self::Server(_) => "server",
            Self::Network(_) => "network",
            Self::Timeout(_) => "timeout",
            Self::Client(_) => "client",
            Self::Validation(_) => "validation",
            Self::Database(_) => "database",
            Self::Config(_) => "config",
        }
    }

    pub const fn is_fatal(&self) -> bool {
        matches!(self.unit_category(), ErrorCategory::Fatal)
    }
}

impl From<JobFeedError> for SyncError {
    fn from(err: JobFeedError) -> Self {
        match err {
            JobFeedError::Database(message) => Self::Database(message),
            JobFeedError::Config(message) | JobFeedError::InvalidInput(message) => {
                Self::Config(message)
            }
            JobFeedError::Network(message) => Self::Network(message),
            JobFeedError::Api(message) | JobFeedError::Internal(message) => Self::Server(message),
            JobFeedError::Serialization(message) => Self::Validation(message),
            JobFeedError::NotFound(message) => Self::Client(message),
        }
    }
}

impl From<SyncError> for JobFeedError {
    fn from(err: SyncError) -> Self {
        match err {
            SyncError::Database(message) => Self::Database(message),
            SyncError::Config(message) => Self::Config(message),
            SyncError::Network(message) => Self::Network(message),
            SyncError::Timeout(duration) => {
                Self::Network(format!("timeout after {duration:?}"))
            }
            SyncError::Validation(message) => Self::Serialization(message),
            SyncError::RateLimit(message) | SyncError::Server(message)
            | SyncError::Client(message) => Self::Api(message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_errors_retry_inline() {
        assert_eq!(SyncError::Network("reset".into()).unit_category(), ErrorCategory::Transient);
        assert_eq!(SyncError::Server("503".into()).unit_category(), ErrorCategory::Transient);
        assert_eq!(SyncError::RateLimit("429".into()).unit_category(), ErrorCategory::Transient);
        assert_eq!(
            SyncError::Timeout(Duration::from_secs(30)).unit_category(),
            ErrorCategory::Transient
        );
    }

    #[test]
    fn permanent_errors_go_straight_to_dlq() {
        assert_eq!(SyncError::Validation("bad json".into()).unit_category(), ErrorCategory::Permanent);
        assert_eq!(SyncError::Client("422".into()).unit_category(), ErrorCategory::Permanent);
    }

    #[test]
    fn run_retry_class_by_failure_kind() {
        assert_eq!(SyncError::Network("down".into()).run_retry_class(), Some(RetryClass::Api));
        assert_eq!(
            SyncError::Database("locked".into()).run_retry_class(),
            Some(RetryClass::Database)
        );
        assert_eq!(SyncError::Config("missing key".into()).run_retry_class(), None);
    }

    #[test]
    fn domain_error_conversion_preserves_classification() {
        let err = SyncError::from(JobFeedError::Database("disk I/O".into()));
        assert_eq!(err.unit_category(), ErrorCategory::Systemic);

        let err = SyncError::from(JobFeedError::InvalidInput("attempt 0".into()));
        assert!(err.is_fatal());
    }
}
