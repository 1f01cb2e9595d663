//! Loader contract between the prefetch cache and the transport

use crate::Result;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Deref;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// How much of an item to fetch ahead of playback
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PreloadDepth {
    /// The whole resource
    #[default]
    Full,
    /// Headers and a leading slice, enough to start playback quickly
    Metadata,
}

/// Request to load one item
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadRequest {
    /// Stable item identifier
    pub item_id: String,
    /// Opaque source descriptor (URL or equivalent)
    pub source: String,
    /// Preload depth
    pub depth: PreloadDepth,
}

impl LoadRequest {
    /// Create a new load request
    pub fn new(item_id: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            item_id: item_id.into(),
            source: source.into(),
            depth: PreloadDepth::Full,
        }
    }

    /// Set depth
    pub fn with_depth(mut self, depth: PreloadDepth) -> Self {
        self.depth = depth;
        self
    }
}

/// Byte counter shared between a running load and its cache entry.
///
/// Only ever advances.
#[derive(Debug, Clone, Default)]
pub struct Progress(Arc<AtomicU64>);

impl Progress {
    pub fn new() -> Self {
        Self::default()
    }

    /// Report newly received bytes
    pub fn advance(&self, bytes: u64) {
        self.0.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Bytes observed so far
    pub fn bytes(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Owned handle to a loaded resource.
///
/// The cache entry holds the primary handle; callers receive clones that
/// keep the resource alive while it plays. When the cache lets go of an
/// entry its handle goes back through [`MediaLoader::release`].
pub struct ResourceHandle<R>(Arc<R>);

impl<R> ResourceHandle<R> {
    pub fn new(resource: R) -> Self {
        Self(Arc::new(resource))
    }

    /// Whether two handles refer to the same loaded resource
    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        Arc::ptr_eq(&a.0, &b.0)
    }

    /// Number of live handles, including the cache's own
    pub fn holders(&self) -> usize {
        Arc::strong_count(&self.0)
    }

    /// Recover the resource if this is the last handle
    pub fn try_unwrap(self) -> std::result::Result<R, Self> {
        Arc::try_unwrap(self.0).map_err(Self)
    }
}

impl<R> Clone for ResourceHandle<R> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<R> Deref for ResourceHandle<R> {
    type Target = R;

    fn deref(&self) -> &R {
        &self.0
    }
}

impl<R: fmt::Debug> fmt::Debug for ResourceHandle<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ResourceHandle").field(&*self.0).finish()
    }
}

/// Capability to turn a source descriptor into a loaded resource
#[async_trait::async_trait]
pub trait MediaLoader: Send + Sync + 'static {
    /// What a successful load produces
    type Resource: Send + Sync + 'static;

    /// Fetch the item, reporting received bytes through `progress`.
    ///
    /// Dropping the returned future must abort the transfer.
    async fn load(&self, request: LoadRequest, progress: Progress) -> Result<Self::Resource>;

    /// Dispose of a resource the cache no longer tracks
    fn release(&self, resource: ResourceHandle<Self::Resource>) {
        drop(resource);
    }
}
