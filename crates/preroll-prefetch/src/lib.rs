//! Adaptive Prefetch Cache
//!
//! Decides ahead of playback which upcoming media items to fetch, how
//! aggressively, in what order, and when to let them go:
//! - Connection-aware limits (capacity, concurrency, preload depth)
//! - Priority ordering with FIFO tie-breaking
//! - Eviction by priority and recency under capacity pressure
//! - Exponential-backoff retries for failed transfers
//! - Periodic sweeps of stalled, exhausted and idle entries
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    PreloadScheduler                          │
//! ├─────────────────────────────────────────────────────────────┤
//! │                                                              │
//! │  request_prefetch ──> CacheStore ──> fill slots ──> loader   │
//! │         │                 ↑                           │      │
//! │         ↓                 │                           ↓      │
//! │   EvictionPolicy    driver task  <── completions ─────┘      │
//! │   (when full)         │      ↑                               │
//! │                       ↓      └── tier changes (watch)        │
//! │                 RetryManager                                 │
//! │                 (backoff timer)                              │
//! │                                                              │
//! │  CleanupSweeper ── every 60s ──> stalled / exhausted / idle  │
//! │                                                              │
//! │  get_ready_resource: O(1) lookup, never waits on I/O         │
//! └─────────────────────────────────────────────────────────────┘
//! ```

mod config;
mod entry;
mod error;
mod eviction;
mod metrics;
mod policy;
mod retry;
mod scheduler;
mod store;
mod sweeper;

// Available when `testing` feature is enabled or during tests
#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use config::{PrefetchConfig, RetryConfig};
pub use entry::{EntryInfo, EntryState, PrefetchEntry, Priority};
pub use error::{PrefetchError, Result};
pub use eviction::EvictionPolicy;
pub use policy::{CachePolicy, PolicyTable};
pub use retry::RetryManager;
pub use scheduler::{PreloadScheduler, PrefetchRequest, SchedulerStats};
pub use store::{CacheStore, UpsertOutcome};
pub use sweeper::{CleanupSweeper, SweepReason, SweepReport};

/// Prelude for common imports
pub mod prelude {
    pub use super::{
        EntryState, PrefetchConfig, PrefetchRequest, PreloadScheduler, Priority, Result,
    };
    pub use preroll_network::prelude::*;
}
