//! Configuration structures
//!
//! Loaded once at startup (see `jobfeed-infra::config::loader`) and shared
//! read-only across the process.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::{JobFeedError, Result};
use crate::types::RetryClass;

/// Top-level application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database: DatabaseConfig,
    pub feed: FeedApiConfig,
    pub scheduler: SchedulerConfig,
    pub sync: SyncConfig,
    pub retry: RetryPoliciesConfig,
}

impl Config {
    /// Validate the whole configuration tree.
    ///
    /// # Errors
    /// Returns `JobFeedError::Config` naming the first invalid field.
    pub fn validate(&self) -> Result<()> {
        self.retry.validate()?;
        if self.database.pool_size == 0 {
            return Err(JobFeedError::Config("database.pool_size must be at least 1".into()));
        }
        if self.scheduler.concurrency == 0 {
            return Err(JobFeedError::Config("scheduler.concurrency must be at least 1".into()));
        }
        Ok(())
    }
}

/// Local SQLite store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: String,
    pub pool_size: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { path: "jobfeed.db".to_string(), pool_size: 4 }
    }
}

/// External taxonomy/search API settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedApiConfig {
    /// Base URL, e.g. "https://api.jobfeed.example/v1"
    pub base_url: String,
    pub timeout_seconds: u64,
    /// Page size requested per batch fetch.
    pub page_size: usize,
}

impl Default for FeedApiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.jobfeed.example/v1".to_string(),
            timeout_seconds: 30,
            page_size: 100,
        }
    }
}

impl FeedApiConfig {
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

/// Retry scheduler settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub enabled: bool,
    /// Seconds between sweep ticks.
    pub interval_seconds: u64,
    /// Bounded worker-pool ceiling for parallel retries within a sweep.
    pub concurrency: usize,
    /// Terminal DLQ rows older than this are purged.
    pub dlq_retention_days: i64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self { enabled: true, interval_seconds: 300, concurrency: 4, dlq_retention_days: 14 }
    }
}

impl SchedulerConfig {
    pub const fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_seconds)
    }
}

/// Per-run sync behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Immediate in-run persist attempts per unit before dead-lettering.
    pub inline_retry_attempts: u32,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self { inline_retry_attempts: 2 }
    }
}

// ============================================================================
// Retry policy configuration
// ============================================================================

/// Backoff tuple for one retry class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffPolicyConfig {
    pub max_retries: u32,
    pub initial_delay_ms: u64,
    pub backoff_multiplier: f64,
    pub max_delay_ms: u64,
    pub jitter_enabled: bool,
    /// Fraction of the base delay used as the jitter band, in `[0, 1]`.
    pub jitter_factor: f64,
}

impl Default for BackoffPolicyConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay_ms: 1_000,
            backoff_multiplier: 2.0,
            max_delay_ms: 30_000,
            jitter_enabled: true,
            jitter_factor: 0.1,
        }
    }
}

impl BackoffPolicyConfig {
    pub const fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    pub const fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }

    /// Validate the tuple against the documented ranges.
    ///
    /// # Errors
    /// Returns `JobFeedError::Config` for out-of-range fields.
    pub fn validate(&self, class: RetryClass) -> Result<()> {
        if self.max_retries == 0 {
            return Err(JobFeedError::Config(format!(
                "retry.{class}.max_retries must be at least 1"
            )));
        }
        if self.backoff_multiplier < 1.0 {
            return Err(JobFeedError::Config(format!(
                "retry.{class}.backoff_multiplier must be >= 1.0"
            )));
        }
        if !(0.0..=1.0).contains(&self.jitter_factor) {
            return Err(JobFeedError::Config(format!(
                "retry.{class}.jitter_factor must be within [0, 1]"
            )));
        }
        Ok(())
    }
}

/// Policy table mapping each [`RetryClass`] to its backoff tuple.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPoliciesConfig {
    pub default: BackoffPolicyConfig,
    pub api: BackoffPolicyConfig,
    pub sync: BackoffPolicyConfig,
    pub database: BackoffPolicyConfig,
}

impl Default for RetryPoliciesConfig {
    fn default() -> Self {
        Self {
            default: BackoffPolicyConfig::default(),
            api: BackoffPolicyConfig {
                max_retries: 5,
                initial_delay_ms: 2_000,
                backoff_multiplier: 2.0,
                max_delay_ms: 300_000,
                jitter_enabled: true,
                jitter_factor: 0.25,
            },
            sync: BackoffPolicyConfig {
                max_retries: 3,
                initial_delay_ms: 30_000,
                backoff_multiplier: 2.0,
                max_delay_ms: 1_800_000,
                jitter_enabled: true,
                jitter_factor: 0.1,
            },
            database: BackoffPolicyConfig {
                max_retries: 5,
                initial_delay_ms: 200,
                backoff_multiplier: 1.5,
                max_delay_ms: 10_000,
                jitter_enabled: false,
                jitter_factor: 0.0,
            },
        }
    }
}

impl RetryPoliciesConfig {
    /// Resolve the backoff tuple for a retry class.
    pub const fn for_class(&self, class: RetryClass) -> &BackoffPolicyConfig {
        match class {
            RetryClass::Default => &self.default,
            RetryClass::Api => &self.api,
            RetryClass::Sync => &self.sync,
            RetryClass::Database => &self.database,
        }
    }

    /// Validate every class tuple.
    ///
    /// # Errors
    /// Returns `JobFeedError::Config` for the first invalid tuple.
    pub fn validate(&self) -> Result<()> {
        self.default.validate(RetryClass::Default)?;
        self.api.validate(RetryClass::Api)?;
        self.sync.validate(RetryClass::Sync)?;
        self.database.validate(RetryClass::Database)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        Config::default().validate().unwrap();
    }

    #[test]
    fn rejects_zero_max_retries() {
        let mut config = Config::default();
        config.retry.api.max_retries = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("retry.api.max_retries"));
    }

    #[test]
    fn rejects_sub_unity_multiplier() {
        let mut config = Config::default();
        config.retry.database.backoff_multiplier = 0.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_out_of_range_jitter() {
        let mut config = Config::default();
        config.retry.sync.jitter_factor = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn policy_lookup_by_class() {
        let policies = RetryPoliciesConfig::default();
        assert_eq!(policies.for_class(RetryClass::Api), &policies.api);
        assert_eq!(policies.for_class(RetryClass::Database), &policies.database);
    }
}
