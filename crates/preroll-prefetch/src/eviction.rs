//! Victim selection under capacity pressure

use crate::{EntryState, PrefetchEntry};

/// Chooses which entries to drop when the store is over capacity.
///
/// Candidates are ranked by eligibility class first (idle entries, then
/// in-flight transfers, then the pinned now-playing item), then by
/// priority weight, then least recently touched. Remaining ties go to the
/// earlier request.
#[derive(Debug, Clone, Copy, Default)]
pub struct EvictionPolicy;

impl EvictionPolicy {
    pub fn new() -> Self {
        Self
    }

    /// Pick at most `count` item ids to evict, best victim first
    pub fn select_victims<'a, R: 'a>(
        &self,
        entries: impl IntoIterator<Item = &'a PrefetchEntry<R>>,
        count: usize,
        pinned: Option<&str>,
    ) -> Vec<String> {
        if count == 0 {
            return Vec::new();
        }

        let mut ranked: Vec<_> = entries
            .into_iter()
            .map(|entry| {
                let class = if pinned == Some(entry.item_id()) {
                    2
                } else if entry.state() == EntryState::Loading {
                    1
                } else {
                    0
                };
                (
                    (
                        class,
                        entry.priority().weight(),
                        entry.last_touched_at(),
                        entry.sequence(),
                    ),
                    entry.item_id(),
                )
            })
            .collect();

        ranked.sort_unstable_by(|a, b| a.0.cmp(&b.0));

        ranked
            .into_iter()
            .take(count)
            .map(|(_, id)| id.to_owned())
            .collect()
    }
}
