use crate::config::Config;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How one classification call is retried: attempt budget, per-attempt
/// timeout, and the pause between attempts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub first_timeout: Duration,
    pub retry_timeout: Duration,
    pub initial_backoff: Duration,
    pub backoff_multiplier: f64,
    pub max_backoff: Duration,
}

impl RetryPolicy {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            max_attempts: cfg.retry.max_attempts.max(1),
            first_timeout: cfg.retry.timeout(),
            retry_timeout: cfg.retry.retry_timeout(),
            initial_backoff: Duration::from_millis(cfg.retry.initial_backoff_ms),
            backoff_multiplier: cfg.retry.backoff_multiplier.max(1.0),
            max_backoff: Duration::from_millis(cfg.retry.max_backoff_ms),
        }
    }

    /// No pauses; used where wall-clock waits would only slow things down.
    pub fn immediate(max_attempts: u32, timeout: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            first_timeout: timeout,
            retry_timeout: timeout,
            initial_backoff: Duration::ZERO,
            backoff_multiplier: 1.0,
            max_backoff: Duration::ZERO,
        }
    }

    /// Timeout for a 1-based attempt number.
    pub fn timeout_for(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            self.first_timeout
        } else {
            self.retry_timeout
        }
    }

    /// Pause after a failed 1-based attempt, before the next one.
    pub fn backoff_after(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(30) as i32;
        let millis = self.initial_backoff.as_millis() as f64 * self.backoff_multiplier.powi(exp);
        let capped = millis.min(self.max_backoff.as_millis() as f64);
        Duration::from_millis(capped.max(0.0) as u64)
    }

    pub fn has_attempt_after(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}
