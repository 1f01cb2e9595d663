//! Link Quality Detection and Media Loading
//!
//! This crate is the network half of the preroll prefetch cache:
//!
//! - **Quality Tiers**: coarse Fast/Medium/Slow/Unknown classification
//! - **Probing**: platform-provided signal first, active latency probe as fallback
//! - **Monitoring**: snapshot on demand, notification on tier change
//! - **Bandwidth Estimate**: weighted moving average over recent transfers
//! - **Loader Contract**: the async capability the cache uses to fetch items
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    ConnectionMonitor                             │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                                                                  │
//! │  ┌──────────────┐    ┌──────────────┐                           │
//! │  │ PassiveSignal│ -> │ ActiveProbe  │ -> Slow (all failed)      │
//! │  │ (platform)   │    │ (HEAD + RTT) │                           │
//! │  └──────────────┘    └──────────────┘                           │
//! │         │                    │                                   │
//! │         └──────────┬─────────┘                                   │
//! │                    ↓                                             │
//! │           ConnectionSnapshot ──watch──> PreloadScheduler         │
//! │                    ↑                                             │
//! │            BandwidthMonitor <── HttpLoader (MediaLoader)         │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

mod bandwidth;
mod config;
mod error;
mod http;
mod loader;
mod monitor;
mod probe;
mod tier;

pub use bandwidth::BandwidthMonitor;
pub use config::{HttpLoaderConfig, MonitorConfig, ProbeConfig};
pub use error::{NetworkError, Result};
pub use http::{HttpLoader, LeadingRange};
pub use loader::{LoadRequest, MediaLoader, PreloadDepth, Progress, ResourceHandle};
pub use monitor::ConnectionMonitor;
pub use probe::{ActiveProbe, ConnectionProbe, PassiveSignal, PlatformEstimate};
pub use tier::{ConnectionSnapshot, QualityTier};

/// Prelude for common imports
pub mod prelude {
    pub use super::{
        ConnectionMonitor, ConnectionSnapshot, LoadRequest, MediaLoader, NetworkError,
        PreloadDepth, Progress, QualityTier, ResourceHandle, Result,
    };
}
