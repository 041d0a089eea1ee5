//! Backoff policy engine
//!
//! Pure delay computation for retry scheduling. Each [`RetryClass`] resolves
//! to one [`BackoffPolicy`]; the policy table is built once from
//! configuration at startup and shared read-only afterwards.
//!
//! Delays grow exponentially (`initial_delay * multiplier^(attempt-1)`),
//! saturate at `max_delay`, and optionally carry a uniform jitter band of
//! `base +/- base * jitter_factor`. The computation never blocks and is
//! deterministic when driven with a seeded RNG.

use std::time::Duration;

use jobfeed_domain::{
    BackoffPolicyConfig, JobFeedError, Result, RetryClass, RetryPoliciesConfig,
};
use rand::Rng;

/// Immutable backoff tuple for one retry class.
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffPolicy {
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub backoff_multiplier: f64,
    pub max_delay: Duration,
    pub jitter_enabled: bool,
    pub jitter_factor: f64,
}

impl From<&BackoffPolicyConfig> for BackoffPolicy {
    fn from(config: &BackoffPolicyConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            initial_delay: config.initial_delay(),
            backoff_multiplier: config.backoff_multiplier,
            max_delay: config.max_delay(),
            jitter_enabled: config.jitter_enabled,
            jitter_factor: config.jitter_factor,
        }
    }
}

impl BackoffPolicy {
    /// Compute the delay before retry number `attempt` (1-based).
    ///
    /// # Errors
    /// Returns `JobFeedError::InvalidInput` for `attempt == 0`; that is a
    /// programmer error, never retried.
    pub fn delay_for_attempt(&self, attempt: u32) -> Result<Duration> {
        self.delay_for_attempt_with_rng(attempt, &mut rand::thread_rng())
    }

    /// Same as [`Self::delay_for_attempt`] but with a caller-supplied RNG,
    /// so jittered delays are reproducible in tests.
    ///
    /// # Errors
    /// Returns `JobFeedError::InvalidInput` for `attempt == 0`.
    pub fn delay_for_attempt_with_rng<R: Rng>(
        &self,
        attempt: u32,
        rng: &mut R,
    ) -> Result<Duration> {
        if attempt == 0 {
            return Err(JobFeedError::InvalidInput(
                "backoff attempt is 1-based; attempt 0 is a programmer error".into(),
            ));
        }

        let max_ms = self.max_delay.as_millis() as f64;
        let exponent = i32::try_from(attempt - 1).unwrap_or(i32::MAX);
        let base_ms = (self.initial_delay.as_millis() as f64
            * self.backoff_multiplier.powi(exponent))
        .min(max_ms);

        let delay_ms = if self.jitter_enabled && self.jitter_factor > 0.0 {
            let band = base_ms * self.jitter_factor;
            let sampled = rng.gen_range((base_ms - band)..=(base_ms + band));
            sampled.clamp(0.0, max_ms)
        } else {
            base_ms
        };

        Ok(Duration::from_millis(delay_ms as u64))
    }
}

/// Per-class policy table, the runtime form of [`RetryPoliciesConfig`].
#[derive(Debug, Clone)]
pub struct RetryPolicies {
    default: BackoffPolicy,
    api: BackoffPolicy,
    sync: BackoffPolicy,
    database: BackoffPolicy,
}

impl RetryPolicies {
    /// Build the table from validated configuration.
    pub fn from_config(config: &RetryPoliciesConfig) -> Self {
        Self {
            default: BackoffPolicy::from(&config.default),
            api: BackoffPolicy::from(&config.api),
            sync: BackoffPolicy::from(&config.sync),
            database: BackoffPolicy::from(&config.database),
        }
    }

    /// Resolve the policy governing a retry class.
    pub const fn for_class(&self, class: RetryClass) -> &BackoffPolicy {
        match class {
            RetryClass::Default => &self.default,
            RetryClass::Api => &self.api,
            RetryClass::Sync => &self.sync,
            RetryClass::Database => &self.database,
        }
    }

    /// Compute the next delay for a class at the given 1-based attempt.
    ///
    /// # Errors
    /// Returns `JobFeedError::InvalidInput` for `attempt == 0`.
    pub fn next_delay(&self, class: RetryClass, attempt: u32) -> Result<Duration> {
        self.for_class(class).delay_for_attempt(attempt)
    }
}

impl Default for RetryPolicies {
    fn default() -> Self {
        Self::from_config(&RetryPoliciesConfig::default())
    }
}
