//! Observability infrastructure
//!
//! Thread-safe metrics recording for sync runs and the dead-letter queue.
//!
//! All record methods return `MetricsResult<()>` for future extensibility
//! (quotas, validation), but currently always succeed (return `Ok(())`).

pub mod metrics;

pub use metrics::{log_metric, SyncMetrics, SyncMetricsSnapshot};

/// Metrics error type
///
/// Recording methods return `MetricsResult<()>` for consistency and future
/// extensibility, but **currently always succeed**.
#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    /// Empty data set, cannot calculate aggregate metric
    #[error("Empty data: cannot calculate {metric}")]
    EmptyData {
        /// Metric name that failed (e.g., "average duration")
        metric: &'static str,
    },
}

/// Result type for metrics operations
pub type MetricsResult<T> = Result<T, MetricsError>;
