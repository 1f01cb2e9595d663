//! Coarse link quality classification

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Relative network quality
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityTier {
    /// Low latency, high throughput
    Fast,
    /// Usable but constrained
    Medium,
    /// High latency or probing failed
    Slow,
    /// Nothing measured yet
    #[default]
    Unknown,
}

impl QualityTier {
    /// Classify a measured round trip against the fast/medium cutoffs
    pub fn from_latency(latency: Duration, fast_below: Duration, medium_below: Duration) -> Self {
        if latency < fast_below {
            QualityTier::Fast
        } else if latency < medium_below {
            QualityTier::Medium
        } else {
            QualityTier::Slow
        }
    }

    /// Whether a measurement backs this tier
    pub fn is_known(&self) -> bool {
        !matches!(self, QualityTier::Unknown)
    }

    /// Stable lowercase name
    pub fn as_str(&self) -> &'static str {
        match self {
            QualityTier::Fast => "fast",
            QualityTier::Medium => "medium",
            QualityTier::Slow => "slow",
            QualityTier::Unknown => "unknown",
        }
    }
}

impl fmt::Display for QualityTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point-in-time view of the link.
///
/// Snapshots are immutable values; a detection update publishes a new one
/// rather than patching fields of the current one.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ConnectionSnapshot {
    /// Quality tier
    pub tier: QualityTier,
    /// Estimated throughput (bytes/sec)
    pub estimated_throughput: Option<f64>,
    /// Estimated round-trip latency
    pub estimated_latency: Option<Duration>,
}

impl ConnectionSnapshot {
    /// Create a snapshot with only a tier
    pub fn new(tier: QualityTier) -> Self {
        Self {
            tier,
            estimated_throughput: None,
            estimated_latency: None,
        }
    }

    /// Snapshot before any detection has run
    pub fn unknown() -> Self {
        Self::new(QualityTier::Unknown)
    }

    /// Snapshot used when detection fails
    pub fn conservative() -> Self {
        Self::new(QualityTier::Slow)
    }

    /// Set throughput estimate
    pub fn with_throughput(mut self, bytes_per_sec: f64) -> Self {
        self.estimated_throughput = Some(bytes_per_sec);
        self
    }

    /// Set latency estimate
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.estimated_latency = Some(latency);
        self
    }
}
