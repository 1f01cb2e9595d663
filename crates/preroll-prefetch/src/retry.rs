//! Retry with exponential backoff

use crate::{EntryState, PrefetchEntry, RetryConfig};
use std::time::Duration;

/// Decides whether and when a failed entry goes back in the queue
#[derive(Debug, Clone)]
pub struct RetryManager {
    config: RetryConfig,
}

impl RetryManager {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Whether another automatic attempt is allowed
    pub fn should_retry<R>(&self, entry: &PrefetchEntry<R>) -> bool {
        entry.retry_count() < self.config.max_retries
    }

    /// Failed with no attempts left
    pub fn is_exhausted<R>(&self, entry: &PrefetchEntry<R>) -> bool {
        entry.state() == EntryState::Failed && !self.should_retry(entry)
    }

    /// Wait before re-queueing: `initial * multiplier^retry_count`, capped
    pub fn next_delay<R>(&self, entry: &PrefetchEntry<R>) -> Duration {
        self.delay_for(entry.retry_count())
    }

    pub fn delay_for(&self, retry_count: u32) -> Duration {
        let exponent = retry_count.min(i32::MAX as u32) as i32;
        let scaled_ms = self.config.initial_backoff_ms as f64 * self.config.multiplier.powi(exponent);

        if !scaled_ms.is_finite() || scaled_ms >= self.config.max_backoff_ms as f64 {
            self.config.max_backoff()
        } else {
            Duration::from_millis(scaled_ms.round() as u64)
        }
    }
}

impl Default for RetryManager {
    fn default() -> Self {
        Self::new(RetryConfig::default())
    }
}
