//! Error types for the prefetch cache

use preroll_network::NetworkError;
use thiserror::Error;

/// Result type for prefetch operations
pub type Result<T> = std::result::Result<T, PrefetchError>;

/// Errors raised inside the prefetch cache.
///
/// None of these reach the playback controller through the scheduler API;
/// transfers that end in an error are reflected as `Failed` entries.
#[derive(Error, Debug)]
pub enum PrefetchError {
    /// Transfer failed in the loader
    #[error("Transport error: {0}")]
    Transport(#[from] NetworkError),

    /// Transfer made no progress within the policy's stall timeout
    #[error("Transfer stalled after {elapsed_ms}ms")]
    StallTimeout { elapsed_ms: u64 },

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration file could not be parsed
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
