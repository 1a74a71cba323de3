//! Cache-first for static assets.

use http::StatusCode;
use sitecache_net::Request;
use tracing::trace;

use super::{FetchOutcome, PendingWrites, StrategyEngine};
use crate::versions::Namespace;
use crate::Result;

impl StrategyEngine {
    pub(crate) async fn cache_first(
        &self,
        request: &Request,
        writes: &mut PendingWrites,
    ) -> Result<FetchOutcome> {
        let key = request.key();
        if let Some(cached) = self.match_any(&key).await {
            trace!(url = %request.url, "Asset served from cache");
            return Ok(FetchOutcome::cached(cached));
        }

        let response = self.fetcher.fetch(request).await?;
        if response.status == StatusCode::OK {
            writes.push(self.spawn_put(
                self.config.versions.name(Namespace::Static),
                key,
                response.clone(),
            ));
        }
        Ok(FetchOutcome::network(response))
    }
}
