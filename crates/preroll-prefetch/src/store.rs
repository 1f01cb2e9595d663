//! Tracked entries keyed by item id

use crate::{EntryState, PrefetchEntry};
use std::cmp::Reverse;
use std::collections::HashMap;

/// What an upsert did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// New entry stored
    Inserted,
    /// Folded into an existing entry
    Merged {
        /// Priority went up
        raised: bool,
    },
}

/// Map from item id to prefetch entry.
///
/// Pure container: it never starts transfers or decides what to drop.
/// Every mutation happens under the scheduler's state lock.
#[derive(Debug)]
pub struct CacheStore<R> {
    entries: HashMap<String, PrefetchEntry<R>>,
    next_sequence: u64,
}

impl<R> CacheStore<R> {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
            next_sequence: 0,
        }
    }

    pub fn get(&self, item_id: &str) -> Option<&PrefetchEntry<R>> {
        self.entries.get(item_id)
    }

    pub fn get_mut(&mut self, item_id: &str) -> Option<&mut PrefetchEntry<R>> {
        self.entries.get_mut(item_id)
    }

    pub fn contains(&self, item_id: &str) -> bool {
        self.entries.contains_key(item_id)
    }

    /// Insert a new entry, or merge into the tracked one.
    ///
    /// Merging keeps the higher priority and refreshes recency. The source
    /// descriptor is only replaced while no transfer is using it.
    pub fn upsert(&mut self, entry: PrefetchEntry<R>) -> UpsertOutcome {
        if let Some(existing) = self.entries.get_mut(&entry.item_id) {
            let raised = existing.raise_priority(entry.priority);
            existing.touch(entry.last_touched_at);
            if matches!(existing.state, EntryState::Queued | EntryState::Failed) {
                existing.source = entry.source;
            }
            return UpsertOutcome::Merged { raised };
        }

        let mut entry = entry;
        entry.sequence = self.next_sequence;
        self.next_sequence += 1;
        self.entries.insert(entry.item_id.clone(), entry);
        UpsertOutcome::Inserted
    }

    pub fn remove(&mut self, item_id: &str) -> Option<PrefetchEntry<R>> {
        self.entries.remove(item_id)
    }

    pub fn all(&self) -> impl Iterator<Item = &PrefetchEntry<R>> {
        self.entries.values()
    }

    /// Remove every entry
    pub fn drain(&mut self) -> impl Iterator<Item = PrefetchEntry<R>> + '_ {
        self.entries.drain().map(|(_, entry)| entry)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries currently in `state`
    pub fn count(&self, state: EntryState) -> usize {
        self.entries.values().filter(|e| e.state == state).count()
    }

    /// Next entry to start: highest priority, then earliest request
    pub fn next_queued(&self) -> Option<&str> {
        self.entries
            .values()
            .filter(|e| e.state == EntryState::Queued)
            .max_by_key(|e| (e.priority, Reverse(e.sequence)))
            .map(|e| e.item_id.as_str())
    }
}

impl<R> Default for CacheStore<R> {
    fn default() -> Self {
        Self::new()
    }
}
