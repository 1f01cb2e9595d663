//! Network configuration

use crate::{NetworkError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Active probe configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    /// Small, cheap resource on a known-fast endpoint
    pub endpoint: String,
    /// Give up on the probe after this long (ms)
    pub timeout_ms: u64,
    /// Round trips below this are Fast (ms)
    pub fast_below_ms: u64,
    /// Round trips below this are Medium, the rest Slow (ms)
    pub medium_below_ms: u64,
    /// User agent string
    pub user_agent: String,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost/favicon.ico".to_string(),
            timeout_ms: 2_000,
            fast_below_ms: 50,
            medium_below_ms: 150,
            user_agent: format!("preroll-network/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl ProbeConfig {
    /// Set the probe endpoint
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Set the probe timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Set the Fast/Medium latency cutoffs
    pub fn with_thresholds(mut self, fast_below: Duration, medium_below: Duration) -> Self {
        self.fast_below_ms = fast_below.as_millis() as u64;
        self.medium_below_ms = medium_below.as_millis() as u64;
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn fast_below(&self) -> Duration {
        Duration::from_millis(self.fast_below_ms)
    }

    pub fn medium_below(&self) -> Duration {
        Duration::from_millis(self.medium_below_ms)
    }

    /// Check the endpoint parses and the cutoffs are ordered
    pub fn validate(&self) -> Result<()> {
        url::Url::parse(&self.endpoint)?;
        if self.fast_below_ms > self.medium_below_ms {
            return Err(NetworkError::Configuration(format!(
                "fast cutoff {}ms exceeds medium cutoff {}ms",
                self.fast_below_ms, self.medium_below_ms
            )));
        }
        Ok(())
    }
}

/// Connection monitor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Background refresh period (ms)
    pub refresh_interval_ms: u64,
    /// Bandwidth sample window (ms)
    pub bandwidth_window_ms: u64,
    /// Number of bandwidth samples to keep
    pub bandwidth_samples: usize,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            refresh_interval_ms: 30_000,
            bandwidth_window_ms: 30_000,
            bandwidth_samples: 10,
        }
    }
}

impl MonitorConfig {
    /// Set the refresh period
    pub fn with_refresh_interval(mut self, interval: Duration) -> Self {
        self.refresh_interval_ms = interval.as_millis() as u64;
        self
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_interval_ms)
    }

    pub fn bandwidth_window(&self) -> Duration {
        Duration::from_millis(self.bandwidth_window_ms)
    }
}

/// HTTP loader configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpLoaderConfig {
    /// Request timeout (ms)
    pub timeout_ms: u64,
    /// Connect timeout (ms)
    pub connect_timeout_ms: u64,
    /// Leading bytes fetched for metadata-only preloads
    pub metadata_bytes: u64,
    /// User agent string
    pub user_agent: String,
    /// Extra request headers
    pub headers: Vec<(String, String)>,
}

impl Default for HttpLoaderConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 60_000,
            connect_timeout_ms: 10_000,
            metadata_bytes: 256 * 1024, // 256KB
            user_agent: format!("preroll-network/{}", env!("CARGO_PKG_VERSION")),
            headers: Vec::new(),
        }
    }
}

impl HttpLoaderConfig {
    /// Add header
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((key.into(), value.into()));
        self
    }

    /// Set metadata preload size
    pub fn with_metadata_bytes(mut self, bytes: u64) -> Self {
        self.metadata_bytes = bytes;
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}
