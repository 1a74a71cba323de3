//! Retrieval strategies.
//!
//! Each strategy decides the order in which network and cache are consulted
//! for one class of request. Cache writes made on the way are opportunistic:
//! they run as spawned tasks, never delay the response and never fail it.

use std::sync::Arc;

use http::HeaderName;
use sitecache_common::Clock;
use sitecache_net::{Fetcher, Request, RequestKey, Response};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use crate::config::SiteConfig;
use crate::offline::OfflinePage;
use crate::store::CacheStore;
use crate::{Result, SwError};

mod api;
mod cache_first;
mod fallback;
mod network_first;

pub use api::{is_expired, EXPIRED_MESSAGE, NETWORK_FAILED_MESSAGE, OFFLINE_MESSAGE};

/// The four retrieval strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Strategy {
    /// Documents: network, then any cache, then the offline page.
    NetworkFirst,
    /// API: network, then a fresh cached copy, then a synthesized 503.
    NetworkFirstTtl,
    /// Static assets: cache, then network.
    CacheFirst,
    /// Everything else: network, then any cache.
    NetworkWithCacheFallback,
}

/// Where a response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
    Network,
    Cache,
    /// Built by the worker (offline page, JSON error bodies).
    Synthesized,
}

/// Result of handling an intercepted request.
#[derive(Debug)]
pub enum FetchOutcome {
    /// Not intercepted; the host performs the request itself.
    Passthrough,
    Respond {
        response: Response,
        source: ResponseSource,
    },
    /// Intercepted, but neither network nor cache produced anything.
    NoResponse,
}

impl FetchOutcome {
    pub fn response(&self) -> Option<&Response> {
        match self {
            FetchOutcome::Respond { response, .. } => Some(response),
            _ => None,
        }
    }

    pub fn source(&self) -> Option<ResponseSource> {
        match self {
            FetchOutcome::Respond { source, .. } => Some(*source),
            _ => None,
        }
    }

    fn network(response: Response) -> Self {
        FetchOutcome::Respond {
            response,
            source: ResponseSource::Network,
        }
    }

    fn cached(response: Response) -> Self {
        FetchOutcome::Respond {
            response,
            source: ResponseSource::Cache,
        }
    }

    fn synthesized(response: Response) -> Self {
        FetchOutcome::Respond {
            response,
            source: ResponseSource::Synthesized,
        }
    }
}

/// Cache writes still in flight after a response was produced.
#[derive(Debug, Default)]
pub struct PendingWrites(Vec<JoinHandle<()>>);

impl PendingWrites {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Wait for every write to finish. Write failures were already logged.
    pub async fn settle(self) {
        for handle in self.0 {
            if let Err(e) = handle.await {
                warn!(error = %e, "Cache write task did not complete");
            }
        }
    }

    fn push(&mut self, handle: JoinHandle<()>) {
        self.0.push(handle);
    }
}

/// Reply to a fetch event.
#[derive(Debug)]
pub struct FetchReply {
    /// `None` when the request was not intercepted.
    pub strategy: Option<Strategy>,
    pub outcome: FetchOutcome,
    pub writes: PendingWrites,
}

impl FetchReply {
    pub fn passthrough() -> Self {
        Self {
            strategy: None,
            outcome: FetchOutcome::Passthrough,
            writes: PendingWrites::default(),
        }
    }
}

/// Runs strategies against the injected store and network.
#[derive(Clone)]
pub struct StrategyEngine {
    config: Arc<SiteConfig>,
    store: Arc<dyn CacheStore>,
    fetcher: Arc<dyn Fetcher>,
    clock: Arc<dyn Clock>,
    offline: OfflinePage,
    freshness_header: HeaderName,
}

impl StrategyEngine {
    pub fn new(
        config: Arc<SiteConfig>,
        store: Arc<dyn CacheStore>,
        fetcher: Arc<dyn Fetcher>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let offline = OfflinePage::new(&config)?;
        let freshness_header = HeaderName::from_bytes(config.freshness_header.as_bytes())
            .map_err(|e| SwError::Config(format!("freshness header: {e}")))?;
        Ok(Self {
            config,
            store,
            fetcher,
            clock,
            offline,
            freshness_header,
        })
    }

    pub fn offline(&self) -> &OfflinePage {
        &self.offline
    }

    /// Run `strategy` for `request`.
    ///
    /// Only cache-first can fail: a miss followed by a network failure has no
    /// fallback, so the network error is returned to the caller.
    pub async fn respond(&self, strategy: Strategy, request: &Request) -> Result<FetchReply> {
        let mut writes = PendingWrites::default();
        let outcome = match strategy {
            Strategy::NetworkFirst => self.network_first(request, &mut writes).await,
            Strategy::NetworkFirstTtl => self.network_first_ttl(request, &mut writes).await,
            Strategy::CacheFirst => self.cache_first(request, &mut writes).await?,
            Strategy::NetworkWithCacheFallback => self.network_with_cache_fallback(request).await,
        };
        Ok(FetchReply {
            strategy: Some(strategy),
            outcome,
            writes,
        })
    }

    /// Look `key` up in every cache; store failures count as a miss.
    async fn match_any(&self, key: &RequestKey) -> Option<Response> {
        match self.store.match_any(key).await {
            Ok(hit) => hit,
            Err(e) => {
                warn!(key = %key, error = %e, "Cache lookup failed");
                None
            }
        }
    }

    /// Store `response` in `cache_name` in the background.
    fn spawn_put(&self, cache_name: &str, key: RequestKey, response: Response) -> JoinHandle<()> {
        let store = Arc::clone(&self.store);
        let cache_name = cache_name.to_string();
        tokio::spawn(async move {
            let result = match store.open(&cache_name).await {
                Ok(cache) => cache.put(key.clone(), response).await,
                Err(e) => Err(e),
            };
            match result {
                Ok(()) => trace!(cache = %cache_name, key = %key, "Cached response"),
                Err(e) => debug!(cache = %cache_name, key = %key, error = %e, "Cache write dropped"),
            }
        })
    }
}

impl std::fmt::Debug for StrategyEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StrategyEngine")
            .field("origin", &self.config.origin.as_str())
            .field("versions", &self.config.versions)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::store::MemoryCacheStore;
    use crate::testing::ScriptedFetcher;
    use crate::versions::VersionConfig;
    use http::StatusCode;
    use sitecache_common::ManualClock;
    use sitecache_net::Destination;
    use url::Url;

    pub(crate) fn config() -> SiteConfig {
        SiteConfig::new(Url::parse("https://example.com").unwrap())
            .with_versions(VersionConfig::for_release("site", "2"))
    }

    pub(crate) fn engine() -> (
        StrategyEngine,
        MemoryCacheStore,
        Arc<ScriptedFetcher>,
        Arc<ManualClock>,
    ) {
        let config = config();
        let clock = Arc::new(ManualClock::new(0));
        let store = MemoryCacheStore::with_clock(clock.clone());
        let fetcher = Arc::new(ScriptedFetcher::new(config.origin.clone()));
        let engine = StrategyEngine::new(
            Arc::new(config),
            Arc::new(store.clone()),
            fetcher.clone(),
            clock.clone(),
        )
        .unwrap();
        (engine, store, fetcher, clock)
    }

    fn url(path: &str) -> Url {
        Url::parse("https://example.com").unwrap().join(path).unwrap()
    }

    pub(crate) fn navigate(path: &str) -> Request {
        Request::navigate(url(path))
    }

    pub(crate) fn get(path: &str) -> Request {
        Request::get(url(path))
    }

    pub(crate) fn api_get(path: &str) -> Request {
        Request::get(url(path))
    }

    pub(crate) fn asset(path: &str) -> Request {
        Request::get(url(path)).destination(Destination::Script)
    }

    pub(crate) fn page(body: &'static str) -> Response {
        Response::new(StatusCode::OK, body)
    }
}
