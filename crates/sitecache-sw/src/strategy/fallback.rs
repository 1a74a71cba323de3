//! Network with cache fallback, for everything uncategorized.

use sitecache_net::Request;
use tracing::debug;

use super::{FetchOutcome, StrategyEngine};

impl StrategyEngine {
    pub(crate) async fn network_with_cache_fallback(&self, request: &Request) -> FetchOutcome {
        match self.fetcher.fetch(request).await {
            Ok(response) => FetchOutcome::network(response),
            Err(e) => {
                debug!(url = %request.url, error = %e, "Fetch failed, trying cache");
                match self.match_any(&request.key()).await {
                    Some(cached) => FetchOutcome::cached(cached),
                    None => FetchOutcome::NoResponse,
                }
            }
        }
    }
}
