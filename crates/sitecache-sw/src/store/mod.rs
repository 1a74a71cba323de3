//! Cache store adapter.
//!
//! The host exposes an opaque set of named caches, each mapping a
//! [`RequestKey`] to a [`Response`]. Every operation is asynchronous and may
//! fail; the engine decides per call site whether a failure is fatal.

use std::sync::Arc;

use async_trait::async_trait;
use sitecache_net::{RequestKey, Response};

use crate::Result;

pub mod memory;

pub use memory::{MemoryCache, MemoryCacheStore};

/// A single named cache.
#[async_trait]
pub trait NamedCache: Send + Sync {
    fn name(&self) -> &str;

    /// Store `response` under `key`, replacing any previous entry.
    async fn put(&self, key: RequestKey, response: Response) -> Result<()>;

    async fn match_request(&self, key: &RequestKey) -> Result<Option<Response>>;

    async fn delete(&self, key: &RequestKey) -> Result<bool>;

    async fn keys(&self) -> Result<Vec<RequestKey>>;
}

/// The host's collection of named caches.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Open a cache, creating it if it does not exist.
    async fn open(&self, name: &str) -> Result<Arc<dyn NamedCache>>;

    async fn has(&self, name: &str) -> Result<bool>;

    /// Delete a whole cache. Returns whether it existed.
    async fn delete(&self, name: &str) -> Result<bool>;

    /// Cache names in creation order.
    async fn keys(&self) -> Result<Vec<String>>;

    /// Search every cache, in creation order, for `key`.
    async fn match_any(&self, key: &RequestKey) -> Result<Option<Response>>;
}
