//! Offline fallback document.

use http::StatusCode;
use sitecache_net::{RequestKey, Response};
use tracing::{debug, warn};

use crate::config::SiteConfig;
use crate::store::CacheStore;
use crate::versions::Namespace;
use crate::Result;

/// Self-contained page shown when a navigation has neither network nor cache.
pub const OFFLINE_HTML: &str = include_str!("../assets/offline.html");

/// Pins the offline document into the dynamic cache and serves it back.
#[derive(Debug, Clone)]
pub struct OfflinePage {
    key: RequestKey,
    cache_name: String,
}

impl OfflinePage {
    pub fn new(config: &SiteConfig) -> Result<Self> {
        Ok(Self {
            key: RequestKey::get(config.resolve(&config.offline_path)?),
            cache_name: config.versions.name(Namespace::Dynamic).to_string(),
        })
    }

    pub fn key(&self) -> &RequestKey {
        &self.key
    }

    /// A fresh copy of the document.
    pub fn synthesize() -> Response {
        Response::html(StatusCode::OK, OFFLINE_HTML)
    }

    /// Store the document under its key. Called at install.
    pub async fn pin(&self, store: &dyn CacheStore) -> Result<()> {
        let cache = store.open(&self.cache_name).await?;
        cache.put(self.key.clone(), Self::synthesize()).await?;
        debug!(cache = %self.cache_name, key = %self.key, "Pinned offline page");
        Ok(())
    }

    /// The pinned document, or a synthesized copy if it has been cleared.
    pub async fn serve(&self, store: &dyn CacheStore) -> Response {
        match self.lookup(store).await {
            Ok(Some(response)) => response,
            Ok(None) => {
                debug!(key = %self.key, "Offline page not pinned, synthesizing");
                Self::synthesize()
            }
            Err(e) => {
                warn!(key = %self.key, error = %e, "Offline page lookup failed, synthesizing");
                Self::synthesize()
            }
        }
    }

    async fn lookup(&self, store: &dyn CacheStore) -> Result<Option<Response>> {
        // Opening would recreate a cleared namespace.
        if !store.has(&self.cache_name).await? {
            return Ok(None);
        }
        store.open(&self.cache_name).await?.match_request(&self.key).await
    }
}
