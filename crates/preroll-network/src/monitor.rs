//! Connection monitoring

use crate::{BandwidthMonitor, ConnectionProbe, ConnectionSnapshot, MonitorConfig, QualityTier};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

/// Tracks link quality and publishes snapshots.
///
/// Probes are tried in registration order and the first that answers
/// wins. When none answers the monitor publishes a Slow snapshot, so an
/// uncertain link never yields a more permissive policy.
///
/// Subscribers are woken only when the tier changes; the latest snapshot
/// (including throughput and latency estimates) is always readable.
pub struct ConnectionMonitor {
    config: MonitorConfig,
    probes: Vec<Arc<dyn ConnectionProbe>>,
    bandwidth: Arc<BandwidthMonitor>,
    snapshot: watch::Sender<ConnectionSnapshot>,
}

impl ConnectionMonitor {
    /// Create a monitor with no probes and an Unknown snapshot
    pub fn new(config: MonitorConfig) -> Self {
        let bandwidth = Arc::new(BandwidthMonitor::new(
            config.bandwidth_window(),
            config.bandwidth_samples,
        ));
        let (snapshot, _) = watch::channel(ConnectionSnapshot::unknown());

        Self {
            config,
            probes: Vec::new(),
            bandwidth,
            snapshot,
        }
    }

    /// Append a probe to the detection chain
    pub fn with_probe(mut self, probe: impl ConnectionProbe + 'static) -> Self {
        self.probes.push(Arc::new(probe));
        self
    }

    /// Share a bandwidth monitor with the loader
    pub fn with_bandwidth_monitor(mut self, bandwidth: Arc<BandwidthMonitor>) -> Self {
        self.bandwidth = bandwidth;
        self
    }

    /// Bandwidth monitor transfers should report into
    pub fn bandwidth(&self) -> Arc<BandwidthMonitor> {
        self.bandwidth.clone()
    }

    /// Latest snapshot, never waits on I/O
    pub fn snapshot(&self) -> ConnectionSnapshot {
        *self.snapshot.borrow()
    }

    /// Current tier
    pub fn tier(&self) -> QualityTier {
        self.snapshot.borrow().tier
    }

    /// Receiver woken on tier changes
    pub fn subscribe(&self) -> watch::Receiver<ConnectionSnapshot> {
        self.snapshot.subscribe()
    }

    /// Run the probe chain once and publish the result
    pub async fn refresh(&self) -> ConnectionSnapshot {
        let mut measured = None;

        for probe in &self.probes {
            match probe.sample().await {
                Ok(snapshot) => {
                    measured = Some(snapshot);
                    break;
                }
                Err(e) => debug!(probe = probe.name(), "Probe unavailable: {}", e),
            }
        }

        let mut snapshot = measured.unwrap_or_else(ConnectionSnapshot::conservative);

        if snapshot.estimated_throughput.is_none() {
            let observed = self.bandwidth.current_bandwidth().await;
            if observed > 0.0 {
                snapshot.estimated_throughput = Some(observed);
            }
        }

        self.publish(snapshot);
        snapshot
    }

    /// Replace the current snapshot; returns whether the tier changed
    pub fn publish(&self, snapshot: ConnectionSnapshot) -> bool {
        let mut previous = QualityTier::Unknown;

        let changed = self.snapshot.send_if_modified(|current| {
            previous = current.tier;
            let changed = current.tier != snapshot.tier;
            *current = snapshot;
            changed
        });

        if changed {
            info!(from = %previous, to = %snapshot.tier, "Connection tier changed");
        }

        changed
    }

    /// Refresh periodically in the background
    pub fn spawn(self: Arc<Self>) -> JoinHandle<()> {
        let period = self.config.refresh_interval();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                self.refresh().await;
            }
        })
    }
}

impl Default for ConnectionMonitor {
    fn default() -> Self {
        Self::new(MonitorConfig::default())
    }
}
