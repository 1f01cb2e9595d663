//! HTTP media loader

use crate::{
    BandwidthMonitor, HttpLoaderConfig, LoadRequest, MediaLoader, NetworkError, PreloadDepth,
    Progress, Result,
};
use bytes::{Bytes, BytesMut};
use reqwest::{header, Client, Response, StatusCode};
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// Upper bound on the buffer reserved from a Content-Length header
const MAX_PREALLOCATION: u64 = 8 * 1024 * 1024;

/// The first `n` bytes of a resource, sent as `Range: bytes=0-(n-1)`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeadingRange(u64);

impl LeadingRange {
    /// Covers at least one byte
    pub fn new(len: u64) -> Self {
        Self(len.max(1))
    }

    pub fn bytes(self) -> u64 {
        self.0
    }

    pub fn header_value(self) -> String {
        format!("bytes=0-{}", self.0 - 1)
    }
}

/// Loads media over HTTP(S), whole or as a leading range
pub struct HttpLoader {
    client: Client,
    config: HttpLoaderConfig,
    bandwidth: Option<Arc<BandwidthMonitor>>,
}

impl HttpLoader {
    /// Create a new HTTP loader
    pub fn new(config: HttpLoaderConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout())
            .connect_timeout(config.connect_timeout())
            .user_agent(&config.user_agent)
            .build()
            .map_err(|e| NetworkError::Configuration(e.to_string()))?;

        Ok(Self {
            client,
            config,
            bandwidth: None,
        })
    }

    /// Feed completed transfers into a bandwidth monitor
    pub fn with_bandwidth_monitor(mut self, monitor: Arc<BandwidthMonitor>) -> Self {
        self.bandwidth = Some(monitor);
        self
    }

    /// Range to request for a preload depth
    pub fn range_for(&self, depth: PreloadDepth) -> Option<LeadingRange> {
        match depth {
            PreloadDepth::Full => None,
            PreloadDepth::Metadata => Some(LeadingRange::new(self.config.metadata_bytes)),
        }
    }

    /// Fetch an item's bytes
    pub async fn fetch(&self, request: &LoadRequest, progress: &Progress) -> Result<Bytes> {
        let url = url::Url::parse(&request.source)?;
        let range = self.range_for(request.depth);

        let mut builder = self.client.get(url);
        for (key, value) in &self.config.headers {
            builder = builder.header(key, value);
        }
        if let Some(range) = range {
            builder = builder.header(header::RANGE, range.header_value());
        }

        debug!(item = %request.item_id, depth = ?request.depth, "Fetching");
        let start = Instant::now();

        let response = builder.send().await.map_err(|e| self.map_error(e))?;
        let data = self.read_body(response, range, progress).await?;

        if let Some(ref bandwidth) = self.bandwidth {
            bandwidth.record(data.len() as u64, start.elapsed()).await;
        }

        Ok(data)
    }

    /// Handle HTTP response
    async fn read_body(
        &self,
        mut response: Response,
        range: Option<LeadingRange>,
        progress: &Progress,
    ) -> Result<Bytes> {
        let status = response.status();

        match status {
            StatusCode::OK | StatusCode::PARTIAL_CONTENT => {
                let limit = range.map(LeadingRange::bytes);
                let reserve = response
                    .content_length()
                    .unwrap_or(0)
                    .min(limit.unwrap_or(u64::MAX))
                    .min(MAX_PREALLOCATION);
                let mut buf = BytesMut::with_capacity(reserve as usize);

                while let Some(chunk) = response.chunk().await.map_err(|e| self.map_error(e))? {
                    progress.advance(chunk.len() as u64);
                    buf.extend_from_slice(&chunk);

                    // Servers that ignore Range send the whole body
                    if let Some(limit) = limit {
                        if buf.len() as u64 >= limit {
                            buf.truncate(limit as usize);
                            break;
                        }
                    }
                }

                Ok(buf.freeze())
            }

            // Leading range of an empty resource
            StatusCode::RANGE_NOT_SATISFIABLE if range.is_some() => Ok(Bytes::new()),

            StatusCode::NOT_FOUND => Err(NetworkError::NotFound(response.url().to_string())),

            _ => Err(NetworkError::Http {
                status: status.as_u16(),
                message: response.text().await.unwrap_or_default(),
            }),
        }
    }

    fn map_error(&self, e: reqwest::Error) -> NetworkError {
        if e.is_timeout() {
            NetworkError::Timeout(self.config.timeout_ms)
        } else {
            e.into()
        }
    }
}

#[async_trait::async_trait]
impl MediaLoader for HttpLoader {
    type Resource = Bytes;

    async fn load(&self, request: LoadRequest, progress: Progress) -> Result<Bytes> {
        self.fetch(&request, &progress).await
    }
}
