//! Request classification.

use sitecache_net::Request;
use tracing::trace;
use url::Origin;

use crate::config::SiteConfig;
use crate::strategy::Strategy;

/// What to do with an intercepted request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Cross-origin: let the host handle it untouched.
    Passthrough,
    /// Respond using the given strategy.
    Intercept(Strategy),
}

/// Maps requests to strategies. First match wins:
/// navigation, API prefix, static asset destination, everything else.
#[derive(Debug, Clone)]
pub struct Router {
    origin: Origin,
    api_prefix: String,
}

impl Router {
    pub fn new(config: &SiteConfig) -> Self {
        Self {
            origin: config.origin.origin(),
            api_prefix: config.api_prefix.clone(),
        }
    }

    pub fn route(&self, request: &Request) -> Route {
        if request.url.origin() != self.origin {
            trace!(url = %request.url, "Cross-origin request, not intercepting");
            return Route::Passthrough;
        }

        let strategy = if request.is_navigation() {
            Strategy::NetworkFirst
        } else if request.url.path().starts_with(&self.api_prefix) {
            Strategy::NetworkFirstTtl
        } else if request.destination.is_subresource_asset() {
            Strategy::CacheFirst
        } else {
            Strategy::NetworkWithCacheFallback
        };

        trace!(url = %request.url, strategy = ?strategy, "Routed request");
        Route::Intercept(strategy)
    }
}
