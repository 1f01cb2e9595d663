//! Throughput estimation from finished transfers

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// One finished transfer, reduced to its rate
#[derive(Debug, Clone, Copy)]
struct Observation {
    at: Instant,
    rate: f64,
}

/// Rolling throughput estimate shared by loaders and the connection monitor.
///
/// Keeps at most `capacity` observations younger than `window`. The estimate
/// is a linearly weighted mean where the newest observation weighs the most.
pub struct BandwidthMonitor {
    window: Duration,
    capacity: usize,
    observations: Mutex<VecDeque<Observation>>,
    transferred: AtomicU64,
}

impl BandwidthMonitor {
    pub fn new(window: Duration, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            window,
            capacity,
            observations: Mutex::new(VecDeque::with_capacity(capacity)),
            transferred: AtomicU64::new(0),
        }
    }

    /// Record a transfer of `bytes` that took `elapsed`.
    ///
    /// A zero elapsed time still counts toward [`total_bytes`](Self::total_bytes)
    /// but contributes a rate of zero.
    pub async fn record(&self, bytes: u64, elapsed: Duration) {
        self.transferred.fetch_add(bytes, Ordering::Relaxed);

        let secs = elapsed.as_secs_f64();
        let rate = if secs > 0.0 { bytes as f64 / secs } else { 0.0 };
        let at = Instant::now();

        let mut observations = self.observations.lock().await;
        Self::expire(&mut observations, at, self.window);
        while observations.len() >= self.capacity {
            observations.pop_front();
        }
        observations.push_back(Observation { at, rate });
    }

    /// Estimated bytes per second, or 0.0 before any transfer finished
    pub async fn current_bandwidth(&self) -> f64 {
        let mut observations = self.observations.lock().await;
        Self::expire(&mut observations, Instant::now(), self.window);

        let (sum, weights) = observations
            .iter()
            .zip(1u32..)
            .fold((0.0, 0.0), |(sum, weights), (obs, w)| {
                (sum + obs.rate * f64::from(w), weights + f64::from(w))
            });

        if weights > 0.0 {
            sum / weights
        } else {
            0.0
        }
    }

    /// Bytes seen across every recorded transfer
    pub fn total_bytes(&self) -> u64 {
        self.transferred.load(Ordering::Relaxed)
    }

    fn expire(observations: &mut VecDeque<Observation>, now: Instant, window: Duration) {
        while observations
            .front()
            .is_some_and(|obs| now.saturating_duration_since(obs.at) > window)
        {
            observations.pop_front();
        }
    }
}

impl Default for BandwidthMonitor {
    fn default() -> Self {
        Self::new(Duration::from_secs(30), 10)
    }
}
