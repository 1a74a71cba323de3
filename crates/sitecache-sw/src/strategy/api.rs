//! Network-first with a freshness limit, for API requests.

use http::{HeaderName, HeaderValue, Method, StatusCode};
use serde_json::json;
use sitecache_net::{Request, Response};
use tracing::debug;

use super::{FetchOutcome, PendingWrites, StrategyEngine};
use crate::versions::Namespace;

pub const OFFLINE_MESSAGE: &str = "Unable to reach the server. Please check your network connection.";
pub const EXPIRED_MESSAGE: &str =
    "Cached API data has expired. Please reconnect to get the latest information.";
pub const NETWORK_FAILED_MESSAGE: &str = "Network request failed. Please check your network settings.";

/// Whether a cached API response is too old to serve.
///
/// Entries without a parseable freshness marker never expire.
pub fn is_expired(response: &Response, header: &HeaderName, now_millis: u64, ttl_millis: u64) -> bool {
    let cached_at = response
        .headers
        .get(header)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok());
    match cached_at {
        Some(at) => now_millis.saturating_sub(at) >= ttl_millis,
        None => false,
    }
}

impl StrategyEngine {
    pub(crate) async fn network_first_ttl(
        &self,
        request: &Request,
        writes: &mut PendingWrites,
    ) -> FetchOutcome {
        let is_get = request.method == Method::GET;

        match self.fetcher.fetch(request).await {
            Ok(response) => {
                if response.status == StatusCode::OK && is_get {
                    let stamp = HeaderValue::from(self.clock.now_millis());
                    let annotated = response
                        .clone()
                        .with_header(self.freshness_header.clone(), stamp);
                    writes.push(self.spawn_put(
                        self.config.versions.name(Namespace::Dynamic),
                        request.key(),
                        annotated,
                    ));
                }
                FetchOutcome::network(response)
            }
            Err(e) if is_get => {
                debug!(url = %request.url, error = %e, "API fetch failed, trying cache");
                let Some(cached) = self.match_any(&request.key()).await else {
                    return FetchOutcome::synthesized(unavailable(json!({
                        "error": OFFLINE_MESSAGE,
                        "offline": true,
                    })));
                };

                let now = self.clock.now_millis();
                if is_expired(&cached, &self.freshness_header, now, self.config.api_ttl_ms) {
                    debug!(url = %request.url, "Cached API response expired");
                    return FetchOutcome::synthesized(unavailable(json!({
                        "error": EXPIRED_MESSAGE,
                        "cached": true,
                        "expired": true,
                    })));
                }
                FetchOutcome::cached(cached)
            }
            Err(e) => {
                debug!(url = %request.url, method = %request.method, error = %e, "API write failed offline");
                FetchOutcome::synthesized(unavailable(json!({ "error": NETWORK_FAILED_MESSAGE })))
            }
        }
    }
}

fn unavailable(body: serde_json::Value) -> Response {
    Response::json(StatusCode::SERVICE_UNAVAILABLE, &body)
}
