//! Network-first for documents.

use http::{Method, StatusCode};
use sitecache_net::Request;
use tracing::debug;

use super::{FetchOutcome, PendingWrites, StrategyEngine};
use crate::versions::Namespace;

impl StrategyEngine {
    pub(crate) async fn network_first(
        &self,
        request: &Request,
        writes: &mut PendingWrites,
    ) -> FetchOutcome {
        match self.fetcher.fetch(request).await {
            Ok(response) => {
                // Only a plain 200 to a GET is kept; a 404 or a form post is
                // shown, not cached.
                if response.status == StatusCode::OK && request.method == Method::GET {
                    writes.push(self.spawn_put(
                        self.config.versions.name(Namespace::Dynamic),
                        request.key(),
                        response.clone(),
                    ));
                }
                FetchOutcome::network(response)
            }
            Err(e) => {
                debug!(url = %request.url, error = %e, "Document fetch failed, trying cache");
                match self.match_any(&request.key()).await {
                    Some(cached) => FetchOutcome::cached(cached),
                    None => {
                        debug!(url = %request.url, "No cached document, serving offline page");
                        FetchOutcome::synthesized(self.offline.serve(self.store.as_ref()).await)
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::offline::OFFLINE_HTML;
    use crate::strategy::tests::{engine, navigate, page};
    use crate::strategy::{ResponseSource, Strategy};
    use crate::store::CacheStore;
    use crate::testing::Reply;
    use http::{Method, StatusCode};

    #[tokio::test]
    async fn test_success_is_returned_and_cached() {
        let (engine, store, fetcher, _clock) = engine();
        fetcher.respond("/products", Reply::ok("<h1>Products</h1>"));

        let request = navigate("/products");
        let reply = engine.respond(Strategy::NetworkFirst, &request).await.unwrap();
        assert_eq!(reply.outcome.source(), Some(ResponseSource::Network));
        assert_eq!(
            reply.outcome.response().unwrap().text().unwrap(),
            "<h1>Products</h1>"
        );
        reply.writes.settle().await;

        let dynamic = store.get("site-dynamic-v2").await.unwrap();
        assert!(dynamic.entry(&request.key()).await.is_some());
    }

    #[tokio::test]
    async fn test_not_found_is_not_cached() {
        let (engine, store, fetcher, _clock) = engine();
        fetcher.respond("/missing", Reply::status(StatusCode::NOT_FOUND));

        let request = navigate("/missing");
        let reply = engine.respond(Strategy::NetworkFirst, &request).await.unwrap();
        assert_eq!(reply.outcome.response().unwrap().status, StatusCode::NOT_FOUND);
        assert!(reply.writes.is_empty());
        assert!(store.match_any(&request.key()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_post_navigation_is_not_cached() {
        let (engine, store, fetcher, _clock) = engine();
        fetcher.respond("/contact", Reply::ok("<p>Thanks</p>"));

        let request = navigate("/contact").method(Method::POST);
        let reply = engine.respond(Strategy::NetworkFirst, &request).await.unwrap();
        assert_eq!(reply.outcome.response().unwrap().text().unwrap(), "<p>Thanks</p>");
        assert!(reply.writes.is_empty());
        assert!(store.get("site-dynamic-v2").await.is_none());
    }

    #[tokio::test]
    async fn test_offline_uses_cached_copy() {
        let (engine, store, fetcher, _clock) = engine();
        let request = navigate("/pricing");
        store
            .open("site-static-v2")
            .await
            .unwrap()
            .put(request.key(), page("cached pricing"))
            .await
            .unwrap();
        fetcher.set_offline(true);

        let reply = engine.respond(Strategy::NetworkFirst, &request).await.unwrap();
        assert_eq!(reply.outcome.source(), Some(ResponseSource::Cache));
        assert_eq!(
            reply.outcome.response().unwrap().text().unwrap(),
            "cached pricing"
        );
    }

    #[tokio::test]
    async fn test_offline_without_cache_serves_offline_page() {
        let (engine, _store, fetcher, _clock) = engine();
        fetcher.set_offline(true);

        let reply = engine
            .respond(Strategy::NetworkFirst, &navigate("/about"))
            .await
            .unwrap();
        let response = reply.outcome.response().unwrap();
        assert_eq!(reply.outcome.source(), Some(ResponseSource::Synthesized));
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.text().unwrap(), OFFLINE_HTML);
    }

    #[tokio::test]
    async fn test_cache_write_failure_does_not_affect_response() {
        let (engine, store, fetcher, _clock) = engine();
        store.fail_puts(true);
        fetcher.respond("/", Reply::ok("home"));

        let reply = engine.respond(Strategy::NetworkFirst, &navigate("/")).await.unwrap();
        assert_eq!(reply.outcome.response().unwrap().text().unwrap(), "home");
        reply.writes.settle().await;
    }
}
