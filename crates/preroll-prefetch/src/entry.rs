//! Prefetch entries

use preroll_network::{Progress, ResourceHandle};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tokio::task::AbortHandle;
use tokio::time::Instant;

/// Prefetch urgency
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    /// Opportunistic
    Low,
    /// Coming up soon
    #[default]
    Medium,
    /// Next to play
    High,
}

impl Priority {
    /// Eviction weight, lowest goes first
    pub fn weight(&self) -> u8 {
        match self {
            Priority::Low => 0,
            Priority::Medium => 1,
            Priority::High => 2,
        }
    }

    /// Priority for an item `position` places after the current one
    pub fn for_position(position: usize) -> Self {
        match position {
            0 => Priority::High,
            1 | 2 => Priority::Medium,
            _ => Priority::Low,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state of an entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryState {
    /// Waiting for a concurrency slot
    Queued,
    /// Transfer in flight
    Loading,
    /// Resource loaded and held
    Ready,
    /// Last transfer failed
    Failed,
}

impl EntryState {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryState::Queued => "queued",
            EntryState::Loading => "loading",
            EntryState::Ready => "ready",
            EntryState::Failed => "failed",
        }
    }
}

impl fmt::Display for EntryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One tracked prefetch candidate
#[derive(Debug)]
pub struct PrefetchEntry<R> {
    pub(crate) item_id: String,
    pub(crate) source: String,
    pub(crate) priority: Priority,
    pub(crate) state: EntryState,
    pub(crate) created_at: Instant,
    pub(crate) last_touched_at: Instant,
    pub(crate) started_at: Option<Instant>,
    pub(crate) retry_count: u32,
    pub(crate) progress: Progress,
    pub(crate) resource: Option<ResourceHandle<R>>,
    /// Arrival order, assigned by the store
    pub(crate) sequence: u64,
    /// Identifies the transfer a completion belongs to
    pub(crate) attempt: u64,
    pub(crate) transfer: Option<AbortHandle>,
}

impl<R> PrefetchEntry<R> {
    /// Create a queued entry
    pub fn new(
        item_id: impl Into<String>,
        source: impl Into<String>,
        priority: Priority,
        now: Instant,
    ) -> Self {
        Self {
            item_id: item_id.into(),
            source: source.into(),
            priority,
            state: EntryState::Queued,
            created_at: now,
            last_touched_at: now,
            started_at: None,
            retry_count: 0,
            progress: Progress::new(),
            resource: None,
            sequence: 0,
            attempt: 0,
            transfer: None,
        }
    }

    pub fn item_id(&self) -> &str {
        &self.item_id
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    pub fn state(&self) -> EntryState {
        self.state
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    pub fn last_touched_at(&self) -> Instant {
        self.last_touched_at
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Bytes received across all attempts
    pub fn bytes_observed(&self) -> u64 {
        self.progress.bytes()
    }

    /// Loaded resource, present only while Ready
    pub fn resource(&self) -> Option<&ResourceHandle<R>> {
        self.resource.as_ref()
    }

    /// Refresh recency
    pub fn touch(&mut self, now: Instant) {
        self.last_touched_at = self.last_touched_at.max(now);
    }

    /// Raise to `priority` if higher; returns whether it changed
    pub fn raise_priority(&mut self, priority: Priority) -> bool {
        if priority > self.priority {
            self.priority = priority;
            true
        } else {
            false
        }
    }

    /// How long the current transfer has been running
    pub fn loading_for(&self, now: Instant) -> Option<Duration> {
        match (self.state, self.started_at) {
            (EntryState::Loading, Some(started)) => Some(now.saturating_duration_since(started)),
            _ => None,
        }
    }

    /// Time since last touch
    pub fn idle_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_touched_at)
    }

    /// Abort an in-flight transfer; returns whether one was running
    pub(crate) fn cancel_transfer(&mut self) -> bool {
        let was_loading = self.state == EntryState::Loading;
        if let Some(transfer) = self.transfer.take() {
            transfer.abort();
        }
        self.started_at = None;
        was_loading
    }

    /// Detached summary without the resource
    pub fn info(&self, now: Instant) -> EntryInfo {
        EntryInfo {
            item_id: self.item_id.clone(),
            priority: self.priority,
            state: self.state,
            retry_count: self.retry_count,
            bytes_observed: self.bytes_observed(),
            age: now.saturating_duration_since(self.created_at),
            idle: self.idle_for(now),
        }
    }
}

/// Point-in-time summary of an entry, for status displays
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryInfo {
    pub item_id: String,
    pub priority: Priority,
    pub state: EntryState,
    pub retry_count: u32,
    pub bytes_observed: u64,
    pub age: Duration,
    pub idle: Duration,
}
