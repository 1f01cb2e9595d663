//! Preload scheduling.
//!
//! All bookkeeping lives behind one mutex that is only ever held for
//! in-memory work. Transfers run as spawned tasks and report back through
//! an unbounded channel drained by a single driver task, which also
//! follows connection tier changes.

use crate::metrics;
use crate::sweeper::SweepTarget;
use crate::{
    CachePolicy, CacheStore, CleanupSweeper, EntryInfo, EntryState, EvictionPolicy,
    PrefetchConfig, PrefetchEntry, PrefetchError, Priority, Result, RetryManager, SweepReason,
    SweepReport, UpsertOutcome,
};
use preroll_network::{
    ConnectionMonitor, ConnectionSnapshot, LoadRequest, MediaLoader, QualityTier, ResourceHandle,
};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::{AbortHandle, JoinHandle};
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// One item the playback controller wants ready ahead of time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrefetchRequest {
    pub item_id: String,
    pub source: String,
    pub priority: Priority,
}

impl PrefetchRequest {
    pub fn new(item_id: impl Into<String>, source: impl Into<String>, priority: Priority) -> Self {
        Self {
            item_id: item_id.into(),
            source: source.into(),
            priority,
        }
    }
}

/// Scheduler statistics
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SchedulerStats {
    /// Current connection tier
    pub tier: QualityTier,
    /// Entries tracked, any state
    pub tracked: usize,
    pub queued: usize,
    pub loading: usize,
    pub ready: usize,
    pub failed: usize,
    /// Transfers counted against the concurrency cap
    pub active_loads: usize,
    pub ready_hits: u64,
    pub ready_misses: u64,
    /// Entries dropped for capacity
    pub evictions: u64,
    /// Entries dropped by the sweeper
    pub swept: u64,
    pub completed: u64,
    pub failed_transfers: u64,
}

impl SchedulerStats {
    /// Share of ready lookups that found a resource
    pub fn hit_rate(&self) -> f64 {
        let total = self.ready_hits + self.ready_misses;
        if total == 0 {
            0.0
        } else {
            self.ready_hits as f64 / total as f64
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct Counters {
    ready_hits: u64,
    ready_misses: u64,
    evictions: u64,
    swept: u64,
    completed: u64,
    failed: u64,
}

enum Event<R> {
    /// A transfer finished, successfully or not
    Finished {
        item_id: String,
        attempt: u64,
        outcome: preroll_network::Result<R>,
        elapsed: Duration,
    },
    /// Backoff elapsed for a failed entry
    RetryDue { item_id: String, attempt: u64 },
}

struct State<R> {
    store: CacheStore<R>,
    policy: CachePolicy,
    connection: ConnectionSnapshot,
    /// Entries in Loading
    active_loads: usize,
    now_playing: Option<String>,
    next_attempt: u64,
    counters: Counters,
    /// Set by shutdown; no transfer starts afterwards
    closed: bool,
}

struct Inner<L: MediaLoader> {
    loader: Arc<L>,
    config: PrefetchConfig,
    retry: RetryManager,
    eviction: EvictionPolicy,
    sweeper: CleanupSweeper,
    state: Mutex<State<L::Resource>>,
    events: mpsc::UnboundedSender<Event<L::Resource>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

type Released<R> = Vec<ResourceHandle<R>>;

/// Decides what to prefetch, when, and how many at once.
///
/// Cheap to clone; clones share one cache. Construction spawns the
/// driver and sweeper tasks, so it must happen inside a tokio runtime.
/// None of the operations wait on the network.
pub struct PreloadScheduler<L: MediaLoader> {
    inner: Arc<Inner<L>>,
}

impl<L: MediaLoader> Clone for PreloadScheduler<L> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<L: MediaLoader> PreloadScheduler<L> {
    /// Create a scheduler following the tier published on `connection`
    pub fn new(
        config: PrefetchConfig,
        loader: L,
        mut connection: watch::Receiver<ConnectionSnapshot>,
    ) -> Result<Self> {
        config.validate()?;

        let snapshot = *connection.borrow_and_update();
        let policy = config.policies.for_tier(snapshot.tier);
        let (events, rx) = mpsc::unbounded_channel();

        let inner = Arc::new(Inner {
            loader: Arc::new(loader),
            retry: RetryManager::new(config.retry.clone()),
            eviction: EvictionPolicy::new(),
            sweeper: CleanupSweeper::new(config.sweep_interval(), config.max_idle_age()),
            state: Mutex::new(State {
                store: CacheStore::new(),
                policy,
                connection: snapshot,
                active_loads: 0,
                now_playing: None,
                next_attempt: 0,
                counters: Counters::default(),
                closed: false,
            }),
            events,
            tasks: Mutex::new(Vec::new()),
            config,
        });

        let driver = tokio::spawn(drive(Arc::downgrade(&inner), rx, connection));
        let sweeper = inner.sweeper.spawn(Arc::downgrade(&inner));
        inner.tasks().extend([driver, sweeper]);

        info!(
            tier = %snapshot.tier,
            max_tracked = policy.max_tracked_items,
            max_concurrent = policy.max_concurrent_loads,
            "Prefetch scheduler started"
        );

        Ok(Self { inner })
    }

    /// Create a scheduler subscribed to `monitor`
    pub fn with_monitor(
        config: PrefetchConfig,
        loader: L,
        monitor: &ConnectionMonitor,
    ) -> Result<Self> {
        Self::new(config, loader, monitor.subscribe())
    }

    /// Track `items` and start transfers while slots are free.
    ///
    /// Unknown items are queued with the requested priority. Tracked items
    /// keep the higher of the two priorities and count as touched; one
    /// waiting on backoff keeps its timer. An item whose retries are
    /// exhausted starts over with a fresh retry budget.
    ///
    /// Ignored after [`shutdown`](Self::shutdown).
    pub fn request_prefetch(&self, items: impl IntoIterator<Item = PrefetchRequest>) {
        let now = Instant::now();
        let mut released = Vec::new();
        let mut requested = 0;

        {
            let mut guard = self.inner.state();
            let state = &mut *guard;
            if state.closed {
                debug!("Scheduler shut down, request ignored");
                return;
            }

            for item in items {
                requested += 1;
                self.inner.admit(state, item, now, &mut released);
            }
            self.inner.fill_slots(state);
        }

        metrics::record_request(requested);
        self.inner.dispose(released);
    }

    /// Prefetch the controller's upcoming queue, nearest first.
    ///
    /// Priority follows distance from the current item; items beyond the
    /// current capacity are not requested.
    pub fn request_upcoming<I, S>(&self, upcoming: I)
    where
        I: IntoIterator<Item = (S, S)>,
        S: Into<String>,
    {
        let capacity = self.policy().max_tracked_items;
        let items = upcoming
            .into_iter()
            .take(capacity)
            .enumerate()
            .map(|(position, (item_id, source))| {
                PrefetchRequest::new(item_id, source, Priority::for_position(position))
            });

        self.request_prefetch(items);
    }

    /// Loaded resource for `item_id`, if it is ready to play.
    ///
    /// Refreshes recency on a hit. Never starts anything and never
    /// creates an entry.
    pub fn get_ready_resource(&self, item_id: &str) -> Option<ResourceHandle<L::Resource>> {
        let mut guard = self.inner.state();
        let state = &mut *guard;

        let handle = match state.store.get_mut(item_id) {
            Some(entry) if entry.state == EntryState::Ready => {
                entry.touch(Instant::now());
                entry.resource.clone()
            }
            _ => None,
        };

        if handle.is_some() {
            state.counters.ready_hits += 1;
        } else {
            state.counters.ready_misses += 1;
        }
        metrics::record_lookup(handle.is_some());

        handle
    }

    /// State of `item_id`, `None` when untracked
    pub fn get_status(&self, item_id: &str) -> Option<EntryState> {
        self.inner.state().store.get(item_id).map(|e| e.state)
    }

    /// Cancel every transfer, release every resource and forget everything
    pub fn clear(&self) {
        let released = self.inner.clear_all();
        info!(released = released.len(), "Prefetch cache cleared");
        self.inner.dispose(released);
    }

    /// Stop tracking `item_id`; returns whether it was tracked
    pub fn remove(&self, item_id: &str) -> bool {
        let mut released = Vec::new();

        let removed = {
            let mut guard = self.inner.state();
            let state = &mut *guard;

            match self.inner.detach(state, item_id) {
                Some(mut entry) => {
                    released.extend(entry.resource.take());
                    self.inner.fill_slots(state);
                    true
                }
                None => false,
            }
        };

        if removed {
            debug!(item = %item_id, "Removed");
        }
        self.inner.dispose(released);
        removed
    }

    /// Pin the item that is currently playing, exempting it from the
    /// idle cutoff. Eviction takes it only when nothing else is left.
    pub fn set_now_playing(&self, item_id: Option<&str>) {
        let mut guard = self.inner.state();
        let state = &mut *guard;

        if let Some(entry) = item_id.and_then(|id| state.store.get_mut(id)) {
            entry.touch(Instant::now());
        }
        state.now_playing = item_id.map(str::to_owned);
    }

    /// Run a cleanup pass now
    pub fn sweep(&self) -> SweepReport {
        self.inner.sweep()
    }

    /// Apply a new connection snapshot.
    ///
    /// Normally driven by the subscribed monitor. A lower concurrency cap
    /// only holds back new starts; a lower capacity evicts the excess.
    pub fn apply_connection(&self, snapshot: ConnectionSnapshot) {
        self.inner.apply_connection(snapshot);
    }

    /// Policy in force
    pub fn policy(&self) -> CachePolicy {
        self.inner.state().policy
    }

    /// Last applied connection snapshot
    pub fn connection(&self) -> ConnectionSnapshot {
        self.inner.state().connection
    }

    /// Summaries of tracked entries, in request order
    pub fn entries(&self) -> Vec<EntryInfo> {
        let now = Instant::now();
        let state = self.inner.state();

        let mut entries: Vec<_> = state
            .store
            .all()
            .map(|e| (e.sequence(), e.info(now)))
            .collect();
        entries.sort_unstable_by_key(|(sequence, _)| *sequence);
        entries.into_iter().map(|(_, info)| info).collect()
    }

    pub fn stats(&self) -> SchedulerStats {
        let state = self.inner.state();

        SchedulerStats {
            tier: state.connection.tier,
            tracked: state.store.len(),
            queued: state.store.count(EntryState::Queued),
            loading: state.store.count(EntryState::Loading),
            ready: state.store.count(EntryState::Ready),
            failed: state.store.count(EntryState::Failed),
            active_loads: state.active_loads,
            ready_hits: state.counters.ready_hits,
            ready_misses: state.counters.ready_misses,
            evictions: state.counters.evictions,
            swept: state.counters.swept,
            completed: state.counters.completed,
            failed_transfers: state.counters.failed,
        }
    }

    /// Stop background work and clear the cache.
    ///
    /// Later requests are ignored; lookups and stats keep working.
    pub fn shutdown(&self) {
        self.inner.state().closed = true;
        for task in self.inner.tasks().drain(..) {
            task.abort();
        }
        self.clear();
    }
}

impl<L: MediaLoader> Inner<L> {
    fn state(&self) -> MutexGuard<'_, State<L::Resource>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn tasks(&self) -> MutexGuard<'_, Vec<JoinHandle<()>>> {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn admit(
        &self,
        state: &mut State<L::Resource>,
        item: PrefetchRequest,
        now: Instant,
        released: &mut Released<L::Resource>,
    ) {
        match state.store.get_mut(&item.item_id) {
            // Entries still waiting on backoff keep their timer and budget
            Some(entry) if self.retry.is_exhausted(&*entry) => {
                entry.cancel_transfer();
                entry.retry_count = 0;
                entry.state = EntryState::Queued;
                debug!(item = %item.item_id, "Exhausted entry requeued by request");
            }
            Some(_) => {}
            None => {
                let excess = (state.store.len() + 1).saturating_sub(state.policy.max_tracked_items);
                if excess > 0 {
                    self.evict(state, excess, released);
                }
            }
        }

        let item_id = item.item_id.clone();
        let priority = item.priority;
        match state
            .store
            .upsert(PrefetchEntry::new(item.item_id, item.source, priority, now))
        {
            UpsertOutcome::Inserted => debug!(item = %item_id, %priority, "Queued"),
            UpsertOutcome::Merged { raised: true } => {
                debug!(item = %item_id, %priority, "Priority raised")
            }
            UpsertOutcome::Merged { raised: false } => {}
        }
    }

    /// Start queued entries until the concurrency cap is reached
    fn fill_slots(&self, state: &mut State<L::Resource>) {
        if state.closed {
            return;
        }
        while state.active_loads < state.policy.max_concurrent_loads {
            let Some(item_id) = state.store.next_queued().map(str::to_owned) else {
                break;
            };
            self.start_transfer(state, &item_id);
        }
    }

    fn start_transfer(&self, state: &mut State<L::Resource>, item_id: &str) {
        state.next_attempt += 1;
        let attempt = state.next_attempt;
        let depth = state.policy.preload_depth;

        let Some(entry) = state.store.get_mut(item_id) else {
            return;
        };
        entry.state = EntryState::Loading;
        entry.started_at = Some(Instant::now());
        entry.attempt = attempt;

        let request = LoadRequest::new(entry.item_id.clone(), entry.source.clone()).with_depth(depth);
        let progress = entry.progress.clone();
        let loader = Arc::clone(&self.loader);
        let events = self.events.clone();
        let id = entry.item_id.clone();

        let transfer = tokio::spawn(async move {
            let started = Instant::now();
            let outcome = loader.load(request, progress).await;
            // Driver gone means the scheduler is shutting down
            let _ = events.send(Event::Finished {
                item_id: id,
                attempt,
                outcome,
                elapsed: started.elapsed(),
            });
        });
        entry.transfer = Some(transfer.abort_handle());

        state.active_loads += 1;
        metrics::record_started(state.active_loads);
        debug!(
            item = %item_id,
            attempt,
            active = state.active_loads,
            ?depth,
            "Transfer started"
        );
    }

    fn schedule_retry(&self, item_id: String, attempt: u64, delay: Duration) -> AbortHandle {
        let events = self.events.clone();

        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = events.send(Event::RetryDue { item_id, attempt });
        })
        .abort_handle()
    }

    fn handle_event(&self, event: Event<L::Resource>) {
        match event {
            Event::Finished {
                item_id,
                attempt,
                outcome,
                elapsed,
            } => self.on_finished(&item_id, attempt, outcome, elapsed),
            Event::RetryDue { item_id, attempt } => self.on_retry_due(&item_id, attempt),
        }
    }

    fn on_finished(
        &self,
        item_id: &str,
        attempt: u64,
        outcome: preroll_network::Result<L::Resource>,
        elapsed: Duration,
    ) {
        let mut released = Vec::new();

        {
            let mut guard = self.state();
            let state = &mut *guard;

            let current = state.store.get(item_id).map_or(false, |e| {
                e.state == EntryState::Loading && e.attempt == attempt
            });

            if current {
                self.settle_transfer(state, item_id, outcome, elapsed);
                self.fill_slots(state);
            } else {
                debug!(item = %item_id, attempt, "Discarding completion of cancelled transfer");
                if let Ok(resource) = outcome {
                    released.push(ResourceHandle::new(resource));
                }
            }
        }

        self.dispose(released);
    }

    fn settle_transfer(
        &self,
        state: &mut State<L::Resource>,
        item_id: &str,
        outcome: preroll_network::Result<L::Resource>,
        elapsed: Duration,
    ) {
        state.active_loads = state.active_loads.saturating_sub(1);
        metrics::set_active_loads(state.active_loads);

        let Some(entry) = state.store.get_mut(item_id) else {
            return;
        };
        entry.transfer = None;
        entry.started_at = None;

        match outcome {
            Ok(resource) => {
                entry.state = EntryState::Ready;
                entry.resource = Some(ResourceHandle::new(resource));
                state.counters.completed += 1;
                metrics::record_completed(entry.bytes_observed(), elapsed);
                debug!(
                    item = %item_id,
                    bytes = entry.bytes_observed(),
                    elapsed_ms = elapsed.as_millis() as u64,
                    "Ready"
                );
            }
            Err(error) => {
                entry.state = EntryState::Failed;
                entry.retry_count += 1;
                state.counters.failed += 1;
                metrics::record_failed(error.is_retryable());
                let error = PrefetchError::from(error);

                if self.retry.should_retry(entry) {
                    let delay = self.retry.next_delay(entry);
                    warn!(
                        item = %item_id,
                        retry = entry.retry_count,
                        delay_ms = delay.as_millis() as u64,
                        "Prefetch failed, will retry: {}",
                        error
                    );
                    entry.transfer =
                        Some(self.schedule_retry(item_id.to_owned(), entry.attempt, delay));
                } else {
                    warn!(
                        item = %item_id,
                        retries = entry.retry_count,
                        "Prefetch failed, retries exhausted: {}",
                        error
                    );
                }
            }
        }
    }

    fn on_retry_due(&self, item_id: &str, attempt: u64) {
        let mut guard = self.state();
        let state = &mut *guard;

        let Some(entry) = state.store.get_mut(item_id) else {
            return;
        };
        if entry.state != EntryState::Failed || entry.attempt != attempt {
            return;
        }

        entry.transfer = None;
        entry.state = EntryState::Queued;
        debug!(item = %item_id, retry = entry.retry_count, "Backoff elapsed, requeued");

        self.fill_slots(state);
    }

    /// Remove an entry and stop whatever it has running
    fn detach(
        &self,
        state: &mut State<L::Resource>,
        item_id: &str,
    ) -> Option<PrefetchEntry<L::Resource>> {
        let mut entry = state.store.remove(item_id)?;
        if entry.cancel_transfer() {
            state.active_loads = state.active_loads.saturating_sub(1);
            metrics::set_active_loads(state.active_loads);
        }
        Some(entry)
    }

    fn evict(
        &self,
        state: &mut State<L::Resource>,
        count: usize,
        released: &mut Released<L::Resource>,
    ) {
        let victims =
            self.eviction
                .select_victims(state.store.all(), count, state.now_playing.as_deref());

        for item_id in victims {
            let Some(mut entry) = self.detach(state, &item_id) else {
                continue;
            };
            debug!(item = %item_id, state = %entry.state, priority = %entry.priority, "Evicted");
            released.extend(entry.resource.take());
            state.counters.evictions += 1;
            metrics::record_eviction("capacity");
        }
    }

    fn apply_connection(&self, snapshot: ConnectionSnapshot) {
        let mut released = Vec::new();

        {
            let mut guard = self.state();
            let state = &mut *guard;

            let previous = state.connection.tier;
            state.connection = snapshot;

            let policy = self.config.policies.for_tier(snapshot.tier);
            if policy != state.policy {
                info!(
                    from = %previous,
                    to = %snapshot.tier,
                    max_tracked = policy.max_tracked_items,
                    max_concurrent = policy.max_concurrent_loads,
                    depth = ?policy.preload_depth,
                    "Cache policy changed"
                );
                state.policy = policy;

                let excess = state.store.len().saturating_sub(policy.max_tracked_items);
                if excess > 0 {
                    self.evict(state, excess, &mut released);
                }
            }

            self.fill_slots(state);
        }

        self.dispose(released);
    }

    fn clear_all(&self) -> Released<L::Resource> {
        let mut guard = self.state();
        let state = &mut *guard;

        let mut released = Vec::new();
        for mut entry in state.store.drain() {
            entry.cancel_transfer();
            released.extend(entry.resource.take());
        }
        state.active_loads = 0;
        metrics::set_active_loads(0);

        released
    }

    /// Hand resources back to the loader. Never called with the lock held.
    fn dispose(&self, released: Released<L::Resource>) {
        for resource in released {
            self.loader.release(resource);
        }
    }
}

impl<L: MediaLoader> SweepTarget for Inner<L> {
    fn sweep(&self) -> SweepReport {
        let now = Instant::now();
        let mut report = SweepReport::default();
        let mut released = Vec::new();

        {
            let mut guard = self.state();
            let state = &mut *guard;

            let victims = self.sweeper.select(
                &state.store,
                &state.policy,
                &self.retry,
                state.now_playing.as_deref(),
                now,
            );

            for (item_id, reason) in victims {
                if reason == SweepReason::Stalled {
                    let elapsed = state
                        .store
                        .get(&item_id)
                        .and_then(|e| e.loading_for(now))
                        .unwrap_or_default();
                    let stall = PrefetchError::StallTimeout {
                        elapsed_ms: elapsed.as_millis() as u64,
                    };
                    warn!(item = %item_id, "{}", stall);
                }

                let Some(mut entry) = self.detach(state, &item_id) else {
                    continue;
                };
                debug!(item = %item_id, %reason, "Swept");
                released.extend(entry.resource.take());
                report.record(reason);
                state.counters.swept += 1;
                metrics::record_eviction(reason.as_str());
            }

            self.fill_slots(state);
        }

        metrics::record_sweep(report.total());
        if report.total() > 0 {
            info!(
                stalled = report.stalled,
                exhausted = report.exhausted,
                expired = report.expired,
                "Sweep removed entries"
            );
        }

        self.dispose(released);
        report
    }
}

impl<L: MediaLoader> Drop for Inner<L> {
    fn drop(&mut self) {
        let tasks = self.tasks.get_mut().unwrap_or_else(PoisonError::into_inner);
        for task in tasks.drain(..) {
            task.abort();
        }

        let state = self.state.get_mut().unwrap_or_else(PoisonError::into_inner);
        for mut entry in state.store.drain() {
            entry.cancel_transfer();
            if let Some(resource) = entry.resource.take() {
                self.loader.release(resource);
            }
        }
    }
}

/// Single consumer of transfer completions and tier changes
async fn drive<L: MediaLoader>(
    inner: Weak<Inner<L>>,
    mut events: mpsc::UnboundedReceiver<Event<L::Resource>>,
    mut connection: watch::Receiver<ConnectionSnapshot>,
) {
    let mut watching = true;

    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else { break };
                let Some(inner) = inner.upgrade() else { break };
                inner.handle_event(event);
            }
            changed = connection.changed(), if watching => {
                if changed.is_err() {
                    debug!("Connection monitor dropped, keeping last policy");
                    watching = false;
                    continue;
                }
                let snapshot = *connection.borrow_and_update();
                let Some(inner) = inner.upgrade() else { break };
                inner.apply_connection(snapshot);
            }
        }
    }
}
