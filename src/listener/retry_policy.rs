//! Reconnection policy for the live subscription.
//!
//! Exponential backoff, applied only to transient failures.

use std::time::Duration;

use crate::config::EngineSettings;
use crate::error::NotificationError;

/// Retry policy implementing exponential backoff.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Reconnections allowed before the listener gives up.
    pub max_retries: u32,
    pub initial_backoff_secs: u64,
    /// Cap for exponential growth.
    pub max_backoff_secs: u64,
    pub backoff_multiplier: f64,
}

impl RetryPolicy {
    pub fn new(settings: &EngineSettings) -> Self {
        Self {
            max_retries: settings.max_retries,
            initial_backoff_secs: settings.initial_backoff_secs,
            max_backoff_secs: settings.max_backoff_secs,
            backoff_multiplier: settings.backoff_multiplier,
        }
    }

    /// Whether a failure after `attempts` reconnections should be retried.
    ///
    /// Only transient errors are retried, and only while the budget lasts.
    pub fn should_retry(&self, error: &NotificationError, attempts: u32) -> bool {
        error.is_transient() && attempts < self.max_retries
    }

    /// Delay before reconnection number `attempt` (0-based):
    /// `initial_backoff * multiplier^attempt`, capped at `max_backoff_secs`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        Duration::from_secs(self.backoff_secs(attempt))
    }

    pub fn backoff_secs(&self, attempt: u32) -> u64 {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let backoff = self.initial_backoff_secs as f64 * self.backoff_multiplier.powi(exponent);
        backoff.min(self.max_backoff_secs as f64) as u64
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(&EngineSettings::default())
    }
}
