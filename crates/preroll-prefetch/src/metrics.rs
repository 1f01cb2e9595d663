//! Prefetch cache metrics.
//!
//! Reported through the `metrics` facade; nothing is recorded unless the
//! host application installs a recorder.

use metrics::{counter, gauge, histogram};
use std::time::Duration;

/// Record items passed to a prefetch request
pub fn record_request(items: usize) {
    counter!("preroll_prefetch_requests_total").increment(1);
    counter!("preroll_prefetch_items_requested_total").increment(items as u64);
}

/// Record a transfer start
pub fn record_started(active_loads: usize) {
    counter!("preroll_transfers_started_total").increment(1);
    gauge!("preroll_active_loads").set(active_loads as f64);
}

/// Record a successful transfer
pub fn record_completed(bytes: u64, elapsed: Duration) {
    counter!("preroll_transfers_completed_total").increment(1);
    counter!("preroll_bytes_prefetched_total").increment(bytes);
    histogram!("preroll_transfer_duration_seconds").record(elapsed.as_secs_f64());
}

/// Record a failed transfer
pub fn record_failed(retryable: bool) {
    let kind = if retryable { "transient" } else { "permanent" };
    counter!("preroll_transfers_failed_total", "kind" => kind).increment(1);
}

/// Record an entry removed to satisfy capacity, or by the sweeper
pub fn record_eviction(reason: &'static str) {
    counter!("preroll_evictions_total", "reason" => reason).increment(1);
}

/// Record a sweep pass
pub fn record_sweep(removed: usize) {
    counter!("preroll_sweeps_total").increment(1);
    counter!("preroll_swept_entries_total").increment(removed as u64);
}

/// Record a ready-resource lookup
pub fn record_lookup(hit: bool) {
    let result = if hit { "hit" } else { "miss" };
    counter!("preroll_ready_lookups_total", "result" => result).increment(1);
}

/// Update the in-flight transfer gauge
pub fn set_active_loads(active_loads: usize) {
    gauge!("preroll_active_loads").set(active_loads as f64);
}
