//! Best-effort refresh of key pages into the dynamic cache.

use std::sync::Arc;

use sitecache_net::{Fetcher, Request};
use tracing::{debug, info, warn};
use url::Url;

use crate::config::SiteConfig;
use crate::store::CacheStore;
use crate::versions::Namespace;
use crate::{Result, SwError};

/// Deferred-retry tag that runs [`ContentSync`].
pub const SYNC_CONTENT_TAG: &str = "sync-content";

/// Per-page outcome of one sync run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub synced: Vec<Url>,
    /// Pages that failed to load, answered with a non-2xx status, or could
    /// not be stored.
    pub failed: Vec<Url>,
}

impl SyncReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Refreshes the configured sync pages one at a time.
#[derive(Clone)]
pub struct ContentSync {
    config: Arc<SiteConfig>,
    store: Arc<dyn CacheStore>,
    fetcher: Arc<dyn Fetcher>,
}

impl ContentSync {
    pub fn new(
        config: Arc<SiteConfig>,
        store: Arc<dyn CacheStore>,
        fetcher: Arc<dyn Fetcher>,
    ) -> Self {
        Self {
            config,
            store,
            fetcher,
        }
    }

    /// Fetch each sync page and store 2xx responses in the dynamic cache.
    ///
    /// A failing page is logged and skipped. Only errors outside the per-page
    /// loop (an unresolvable page path) fail the run, so the host can retry the
    /// whole batch.
    pub async fn run(&self) -> Result<SyncReport> {
        let urls = self
            .config
            .sync_pages
            .iter()
            .map(|page| self.config.resolve(page))
            .collect::<Result<Vec<_>>>()?;

        let mut report = SyncReport::default();
        for url in urls {
            match self.sync_page(&url).await {
                Ok(()) => report.synced.push(url),
                Err(e) => {
                    warn!(url = %url, error = %e, "Failed to sync page");
                    report.failed.push(url);
                }
            }
        }

        info!(
            synced = report.synced.len(),
            failed = report.failed.len(),
            "Content sync completed"
        );
        Ok(report)
    }

    async fn sync_page(&self, url: &Url) -> Result<()> {
        let request = Request::get(url.clone());
        let response = self.fetcher.fetch(&request).await?;
        if !response.ok() {
            return Err(SwError::UnexpectedStatus {
                url: url.clone(),
                status: response.status,
            });
        }

        let cache = self
            .store
            .open(self.config.versions.name(Namespace::Dynamic))
            .await?;
        cache.put(request.key(), response).await?;
        debug!(url = %url, "Synced page");
        Ok(())
    }
}

impl std::fmt::Debug for ContentSync {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentSync")
            .field("pages", &self.config.sync_pages)
            .finish_non_exhaustive()
    }
}
