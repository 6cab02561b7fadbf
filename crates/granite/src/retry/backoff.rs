use std::time::Duration;

use crate::config::RetryConfig;
use crate::retry::classifier::suggested_wait;

/// Exponential backoff: `base * 2^(attempt - 1)`.
///
/// Attempt 0 is treated as attempt 1. Saturates instead of overflowing.
pub fn backoff(attempt: u32, base: Duration) -> Duration {
    let exponent = attempt.max(1) - 1;
    let factor = 2u32.checked_pow(exponent).unwrap_or(u32::MAX);
    base.saturating_mul(factor)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_wait: Duration,
    pub max_wait: Duration,
    pub hold_progress: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_wait: Duration::from_secs(config.base_wait_secs),
            max_wait: Duration::from_secs(config.max_wait_secs),
            hold_progress: config.hold_progress,
        }
    }
}

impl RetryPolicy {
    /// Whether another attempt may follow attempt number `attempt` (1-based).
    pub fn has_attempts_left(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }

    /// Sleep before the attempt after `attempt`, given the failure text.
    ///
    /// An explicit hint in the error only ever lengthens the exponential
    /// default. The result is clamped to `max_wait`.
    pub fn wait_before_next(&self, attempt: u32, error_text: &str) -> Duration {
        let default = backoff(attempt, self.base_wait);
        suggested_wait(error_text, default).min(self.max_wait)
    }
}
