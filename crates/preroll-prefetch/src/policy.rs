//! Cache policy derived from link quality

use preroll_network::{PreloadDepth, QualityTier};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Limits applied while the link sits in one tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachePolicy {
    /// Tracked entries, any state
    pub max_tracked_items: usize,
    /// Entries in Loading at once
    pub max_concurrent_loads: usize,
    /// How much of each item to fetch
    pub preload_depth: PreloadDepth,
    /// Loading longer than this is a stall (ms)
    pub stalled_timeout_ms: u64,
}

impl CachePolicy {
    pub fn stalled_timeout(&self) -> Duration {
        Duration::from_millis(self.stalled_timeout_ms)
    }

    pub fn fast() -> Self {
        Self {
            max_tracked_items: 20,
            max_concurrent_loads: 5,
            preload_depth: PreloadDepth::Full,
            stalled_timeout_ms: 20_000,
        }
    }

    pub fn medium() -> Self {
        Self {
            max_tracked_items: 12,
            max_concurrent_loads: 3,
            preload_depth: PreloadDepth::Full,
            stalled_timeout_ms: 30_000,
        }
    }

    pub fn slow() -> Self {
        Self {
            max_tracked_items: 8,
            max_concurrent_loads: 1,
            preload_depth: PreloadDepth::Metadata,
            stalled_timeout_ms: 60_000,
        }
    }

    /// Set concurrency cap
    pub fn with_max_concurrent_loads(mut self, max: usize) -> Self {
        self.max_concurrent_loads = max;
        self
    }

    /// Set capacity
    pub fn with_max_tracked_items(mut self, max: usize) -> Self {
        self.max_tracked_items = max;
        self
    }

    /// Set stall timeout
    pub fn with_stalled_timeout(mut self, timeout: Duration) -> Self {
        self.stalled_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Set preload depth
    pub fn with_preload_depth(mut self, depth: PreloadDepth) -> Self {
        self.preload_depth = depth;
        self
    }
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self::slow()
    }
}

/// One policy per tier
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyTable {
    pub fast: CachePolicy,
    pub medium: CachePolicy,
    pub slow: CachePolicy,
    /// Nothing measured: no looser than `slow`
    pub unknown: CachePolicy,
}

impl Default for PolicyTable {
    fn default() -> Self {
        Self {
            fast: CachePolicy::fast(),
            medium: CachePolicy::medium(),
            slow: CachePolicy::slow(),
            unknown: CachePolicy::slow(),
        }
    }
}

impl PolicyTable {
    /// Policy for a tier
    pub fn for_tier(&self, tier: QualityTier) -> CachePolicy {
        match tier {
            QualityTier::Fast => self.fast,
            QualityTier::Medium => self.medium,
            QualityTier::Slow => self.slow,
            QualityTier::Unknown => self.unknown,
        }
    }

    /// Replace the policy for one tier
    pub fn with_tier(mut self, tier: QualityTier, policy: CachePolicy) -> Self {
        match tier {
            QualityTier::Fast => self.fast = policy,
            QualityTier::Medium => self.medium = policy,
            QualityTier::Slow => self.slow = policy,
            QualityTier::Unknown => self.unknown = policy,
        }
        self
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = (QualityTier, &CachePolicy)> {
        [
            (QualityTier::Fast, &self.fast),
            (QualityTier::Medium, &self.medium),
            (QualityTier::Slow, &self.slow),
            (QualityTier::Unknown, &self.unknown),
        ]
        .into_iter()
    }
}
