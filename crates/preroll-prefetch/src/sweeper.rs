//! Periodic cleanup of stale entries

use crate::{CachePolicy, CacheStore, EntryState, RetryManager};
use std::fmt;
use std::sync::Weak;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::debug;

/// Why the sweeper dropped an entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SweepReason {
    /// Loading past the policy's stall timeout
    Stalled,
    /// Failed with no retries left
    Exhausted,
    /// Untouched past the idle cutoff
    Expired,
}

impl SweepReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SweepReason::Stalled => "stalled",
            SweepReason::Exhausted => "exhausted",
            SweepReason::Expired => "expired",
        }
    }
}

impl fmt::Display for SweepReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one sweep pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub stalled: usize,
    pub exhausted: usize,
    pub expired: usize,
}

impl SweepReport {
    pub fn total(&self) -> usize {
        self.stalled + self.exhausted + self.expired
    }

    pub(crate) fn record(&mut self, reason: SweepReason) {
        match reason {
            SweepReason::Stalled => self.stalled += 1,
            SweepReason::Exhausted => self.exhausted += 1,
            SweepReason::Expired => self.expired += 1,
        }
    }
}

/// Something the sweeper can drive. Removal goes through the owner's
/// serialized entry point, never straight into the store.
pub(crate) trait SweepTarget: Send + Sync + 'static {
    fn sweep(&self) -> SweepReport;
}

/// Selects entries nobody needs any more and runs passes on a timer
#[derive(Debug, Clone)]
pub struct CleanupSweeper {
    interval: Duration,
    max_idle_age: Duration,
}

impl CleanupSweeper {
    pub fn new(interval: Duration, max_idle_age: Duration) -> Self {
        Self {
            interval,
            max_idle_age,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn max_idle_age(&self) -> Duration {
        self.max_idle_age
    }

    /// Entries to remove at `now`, with the reason for each.
    ///
    /// The pinned item is spared the idle cutoff only; a stalled or
    /// exhausted pinned entry still goes.
    pub fn select<R>(
        &self,
        store: &CacheStore<R>,
        policy: &CachePolicy,
        retry: &RetryManager,
        pinned: Option<&str>,
        now: Instant,
    ) -> Vec<(String, SweepReason)> {
        store
            .all()
            .filter_map(|entry| {
                let stalled = entry.state() == EntryState::Loading
                    && entry
                        .loading_for(now)
                        .map_or(false, |elapsed| elapsed > policy.stalled_timeout());

                let reason = if stalled {
                    SweepReason::Stalled
                } else if retry.is_exhausted(entry) {
                    SweepReason::Exhausted
                } else if entry.idle_for(now) > self.max_idle_age
                    && pinned != Some(entry.item_id())
                {
                    SweepReason::Expired
                } else {
                    return None;
                };

                Some((entry.item_id().to_owned(), reason))
            })
            .collect()
    }

    /// Sweep `target` every interval until it is dropped
    pub(crate) fn spawn<T: SweepTarget>(&self, target: Weak<T>) -> JoinHandle<()> {
        let period = self.interval;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                let Some(target) = target.upgrade() else {
                    debug!("Sweep target dropped, stopping");
                    break;
                };
                target.sweep();
            }
        })
    }
}

impl Default for CleanupSweeper {
    fn default() -> Self {
        Self::new(Duration::from_secs(60), Duration::from_secs(300))
    }
}
