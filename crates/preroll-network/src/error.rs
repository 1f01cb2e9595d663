//! Failures raised while probing the link or fetching media

use thiserror::Error;

pub type Result<T> = std::result::Result<T, NetworkError>;

#[derive(Error, Debug)]
pub enum NetworkError {
    /// Server answered with a status the loader does not accept
    #[error("server returned {status}: {message}")]
    Http { status: u16, message: String },

    /// The media source does not exist on the server
    #[error("media source not found: {0}")]
    NotFound(String),

    /// Connect, reset or read failure below HTTP
    #[error("connection failed: {0}")]
    Connection(String),

    /// No response within the configured budget (ms)
    #[error("timed out after {0}ms")]
    Timeout(u64),

    #[error("invalid source url: {0}")]
    InvalidUrl(String),

    /// The platform has not published a network-quality estimate
    #[error("platform network signal unavailable")]
    SignalUnavailable,

    #[error("invalid configuration: {0}")]
    Configuration(String),

    /// The transfer was abandoned before it finished
    #[error("transfer cancelled")]
    Cancelled,
}

impl NetworkError {
    /// Whether a later attempt of the same transfer may succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Connection(_) | Self::Timeout(_) => true,
            Self::Http { status, .. } => matches!(status, 408 | 429 | 500..=599),
            Self::NotFound(_)
            | Self::InvalidUrl(_)
            | Self::SignalUnavailable
            | Self::Configuration(_)
            | Self::Cancelled => false,
        }
    }
}

impl From<reqwest::Error> for NetworkError {
    fn from(e: reqwest::Error) -> Self {
        match e.status() {
            Some(status) => Self::Http {
                status: status.as_u16(),
                message: e.to_string(),
            },
            None if e.is_timeout() => Self::Timeout(0),
            None if e.is_builder() => Self::Configuration(e.to_string()),
            None => Self::Connection(e.to_string()),
        }
    }
}

impl From<url::ParseError> for NetworkError {
    fn from(e: url::ParseError) -> Self {
        Self::InvalidUrl(e.to_string())
    }
}
