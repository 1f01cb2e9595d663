//! Connection probes
//!
//! Two ways to learn the link quality:
//!
//! - [`PassiveSignal`] reads an estimate the host platform publishes
//!   (e.g. an OS or browser network-information API). Cheap, but may be
//!   absent.
//! - [`ActiveProbe`] times a HEAD request to a small resource on a
//!   known-fast endpoint. Always answers; a failed probe answers Slow.

use crate::{ConnectionSnapshot, NetworkError, ProbeConfig, QualityTier, Result};
use reqwest::Client;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{debug, warn};

/// Source of connection snapshots
#[async_trait::async_trait]
pub trait ConnectionProbe: Send + Sync {
    /// Short name for logs
    fn name(&self) -> &'static str;

    /// Take one measurement
    async fn sample(&self) -> Result<ConnectionSnapshot>;
}

/// Estimate published by the host platform
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PlatformEstimate {
    /// Tier the platform reports directly, if any
    pub tier_hint: Option<QualityTier>,
    /// Round-trip estimate
    pub rtt: Option<Duration>,
    /// Downlink estimate (bytes/sec)
    pub downlink: Option<f64>,
}

impl PlatformEstimate {
    /// Estimate carrying a round trip only
    pub fn from_rtt(rtt: Duration) -> Self {
        Self {
            rtt: Some(rtt),
            ..Default::default()
        }
    }

    /// Set downlink estimate
    pub fn with_downlink(mut self, bytes_per_sec: f64) -> Self {
        self.downlink = Some(bytes_per_sec);
        self
    }

    /// Set tier hint
    pub fn with_tier(mut self, tier: QualityTier) -> Self {
        self.tier_hint = Some(tier);
        self
    }
}

/// Probe backed by a platform-provided estimate
pub struct PassiveSignal {
    estimates: watch::Receiver<Option<PlatformEstimate>>,
    fast_below: Duration,
    medium_below: Duration,
}

impl PassiveSignal {
    /// Create a signal and the sender the platform glue publishes through
    pub fn channel(config: &ProbeConfig) -> (watch::Sender<Option<PlatformEstimate>>, Self) {
        let (tx, rx) = watch::channel(None);
        (tx, Self::new(rx, config))
    }

    /// Wrap an existing estimate feed
    pub fn new(estimates: watch::Receiver<Option<PlatformEstimate>>, config: &ProbeConfig) -> Self {
        Self {
            estimates,
            fast_below: config.fast_below(),
            medium_below: config.medium_below(),
        }
    }

    fn classify(&self, estimate: &PlatformEstimate) -> Option<QualityTier> {
        match (estimate.tier_hint, estimate.rtt) {
            (Some(tier), _) if tier.is_known() => Some(tier),
            (_, Some(rtt)) => Some(QualityTier::from_latency(
                rtt,
                self.fast_below,
                self.medium_below,
            )),
            _ => None,
        }
    }
}

#[async_trait::async_trait]
impl ConnectionProbe for PassiveSignal {
    fn name(&self) -> &'static str {
        "passive"
    }

    async fn sample(&self) -> Result<ConnectionSnapshot> {
        let estimate = (*self.estimates.borrow()).ok_or(NetworkError::SignalUnavailable)?;
        let tier = self
            .classify(&estimate)
            .ok_or(NetworkError::SignalUnavailable)?;

        let mut snapshot = ConnectionSnapshot::new(tier);
        snapshot.estimated_latency = estimate.rtt;
        snapshot.estimated_throughput = estimate.downlink;
        Ok(snapshot)
    }
}

/// Probe that measures a round trip directly
pub struct ActiveProbe {
    client: Client,
    endpoint: url::Url,
    fast_below: Duration,
    medium_below: Duration,
}

impl ActiveProbe {
    /// Create a new active probe
    pub fn new(config: &ProbeConfig) -> Result<Self> {
        config.validate()?;

        let client = Client::builder()
            .timeout(config.timeout())
            .connect_timeout(config.timeout())
            .user_agent(&config.user_agent)
            .build()
            .map_err(|e| NetworkError::Configuration(e.to_string()))?;

        Ok(Self {
            client,
            endpoint: url::Url::parse(&config.endpoint)?,
            fast_below: config.fast_below(),
            medium_below: config.medium_below(),
        })
    }

    /// Time one HEAD round trip
    async fn round_trip(&self) -> Result<Duration> {
        let start = Instant::now();
        self.client.head(self.endpoint.clone()).send().await?;
        Ok(start.elapsed())
    }
}

#[async_trait::async_trait]
impl ConnectionProbe for ActiveProbe {
    fn name(&self) -> &'static str {
        "active"
    }

    async fn sample(&self) -> Result<ConnectionSnapshot> {
        match self.round_trip().await {
            Ok(latency) => {
                let tier = QualityTier::from_latency(latency, self.fast_below, self.medium_below);
                debug!(?latency, %tier, "Probe round trip");
                Ok(ConnectionSnapshot::new(tier).with_latency(latency))
            }
            Err(e) => {
                warn!(endpoint = %self.endpoint, "Probe failed, assuming slow link: {}", e);
                Ok(ConnectionSnapshot::conservative())
            }
        }
    }
}
