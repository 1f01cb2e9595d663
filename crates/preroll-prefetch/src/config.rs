//! Prefetch cache configuration

use crate::{PolicyTable, PrefetchError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Retry configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Failed transfers allowed before an entry is terminal
    pub max_retries: u32,
    /// Backoff at retry count zero (ms)
    pub initial_backoff_ms: u64,
    /// Maximum backoff (ms)
    pub max_backoff_ms: u64,
    /// Backoff multiplier
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff_ms: 1_000,
            max_backoff_ms: 60_000,
            multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms)
    }

    /// Set initial backoff
    pub fn with_initial_backoff(mut self, backoff: Duration) -> Self {
        self.initial_backoff_ms = backoff.as_millis() as u64;
        self
    }
}

/// Prefetch cache configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PrefetchConfig {
    /// Limits per connection tier
    pub policies: PolicyTable,
    /// Retry behaviour for failed transfers
    pub retry: RetryConfig,
    /// Cleanup pass period (ms)
    pub sweep_interval_ms: u64,
    /// Entries untouched this long are dropped whatever their state (ms)
    pub max_idle_age_ms: u64,
}

impl Default for PrefetchConfig {
    fn default() -> Self {
        Self {
            policies: PolicyTable::default(),
            retry: RetryConfig::default(),
            sweep_interval_ms: 60_000,
            max_idle_age_ms: 5 * 60 * 1000, // 5 minutes
        }
    }
}

impl PrefetchConfig {
    /// Parse from JSON, filling omitted fields with defaults
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        Self::from_json_str(&data)
    }

    /// Serialize to pretty JSON
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Reject limits the scheduler cannot honour
    pub fn validate(&self) -> Result<()> {
        for (tier, policy) in self.policies.iter() {
            if policy.max_tracked_items == 0 {
                return Err(PrefetchError::Config(format!(
                    "{} tier: max_tracked_items must be at least 1",
                    tier
                )));
            }
            if policy.max_concurrent_loads == 0 {
                return Err(PrefetchError::Config(format!(
                    "{} tier: max_concurrent_loads must be at least 1",
                    tier
                )));
            }
        }

        if self.retry.multiplier.is_nan() || self.retry.multiplier < 1.0 {
            return Err(PrefetchError::Config(format!(
                "retry multiplier {} must be >= 1.0",
                self.retry.multiplier
            )));
        }

        if self.sweep_interval_ms == 0 {
            return Err(PrefetchError::Config(
                "sweep_interval_ms must be positive".into(),
            ));
        }

        Ok(())
    }

    /// Set the policy table
    pub fn with_policies(mut self, policies: PolicyTable) -> Self {
        self.policies = policies;
        self
    }

    /// Set retry configuration
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Set sweep period
    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval_ms = interval.as_millis() as u64;
        self
    }

    /// Set idle cutoff
    pub fn with_max_idle_age(mut self, age: Duration) -> Self {
        self.max_idle_age_ms = age.as_millis() as u64;
        self
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }

    pub fn max_idle_age(&self) -> Duration {
        Duration::from_millis(self.max_idle_age_ms)
    }
}
