//! Background scheduling

pub mod error;
pub mod retry_scheduler;

pub use error::{SchedulerError, SchedulerResult};
pub use retry_scheduler::{RetryScheduler, RetrySchedulerConfig};
