//! Site configuration

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use url::Url;

use crate::versions::VersionConfig;
use crate::{Result, SwError};

/// Configuration for one deployment of the caching layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteConfig {
    /// Display name, used as the notification title by default
    #[serde(default = "default_site_name")]
    pub name: String,

    /// The single origin this layer intercepts
    pub origin: Url,

    /// Current cache namespace names
    #[serde(default)]
    pub versions: VersionConfig,

    /// Paths precached at install; every one must load or install fails
    #[serde(default = "default_static_assets")]
    pub static_assets: Vec<String>,

    /// Paths refreshed by content sync
    #[serde(default = "default_sync_pages")]
    pub sync_pages: Vec<String>,

    /// Key path of the pinned offline document
    #[serde(default = "default_offline_path")]
    pub offline_path: String,

    /// Path prefix routed to the API strategy
    #[serde(default = "default_api_prefix")]
    pub api_prefix: String,

    /// Maximum age of a cached API response served while offline
    #[serde(default = "default_api_ttl_ms")]
    pub api_ttl_ms: u64,

    /// Header carrying the epoch-millis time an API response was cached
    #[serde(default = "default_freshness_header")]
    pub freshness_header: String,

    /// Notification defaults
    #[serde(default)]
    pub notifications: NotificationConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    /// Title; falls back to the site name when empty
    pub title: String,

    pub icon: String,

    pub badge: String,

    /// Icon shown on each action button
    pub action_icon: String,

    /// Vibration pattern in milliseconds
    pub vibrate: Vec<u32>,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            title: String::new(),
            icon: "/icons/icon-192x192.png".to_string(),
            badge: "/icons/icon-72x72.png".to_string(),
            action_icon: "/icons/icon-96x96.png".to_string(),
            vibrate: vec![200, 100, 200],
        }
    }
}

impl SiteConfig {
    /// Configuration with defaults for everything but the origin.
    pub fn new(origin: Url) -> Self {
        Self {
            name: default_site_name(),
            origin,
            versions: VersionConfig::default(),
            static_assets: default_static_assets(),
            sync_pages: default_sync_pages(),
            offline_path: default_offline_path(),
            api_prefix: default_api_prefix(),
            api_ttl_ms: default_api_ttl_ms(),
            freshness_header: default_freshness_header(),
            notifications: NotificationConfig::default(),
        }
    }

    /// Parse and validate a JSON document.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        Self::from_json(&raw)
    }

    pub fn with_versions(mut self, versions: VersionConfig) -> Self {
        self.versions = versions;
        self
    }

    pub fn api_ttl(&self) -> Duration {
        Duration::from_millis(self.api_ttl_ms)
    }

    pub fn notification_title(&self) -> &str {
        if self.notifications.title.is_empty() {
            &self.name
        } else {
            &self.notifications.title
        }
    }

    /// Resolve a site path against the origin.
    pub fn resolve(&self, path: &str) -> Result<Url> {
        Ok(self.origin.join(path)?)
    }

    /// Reject configurations the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        if !matches!(self.origin.scheme(), "http" | "https") {
            return Err(SwError::Config(format!(
                "origin must be http or https, got {}",
                self.origin.scheme()
            )));
        }
        if self.origin.cannot_be_a_base() || self.origin.host_str().is_none() {
            return Err(SwError::Config(format!("origin {} has no host", self.origin)));
        }

        let versions = &self.versions;
        if versions.static_cache.is_empty() || versions.dynamic_cache.is_empty() {
            return Err(SwError::Config("cache names must not be empty".to_string()));
        }
        if versions.static_cache == versions.dynamic_cache {
            return Err(SwError::Config(format!(
                "static and dynamic caches share the name {}",
                versions.static_cache
            )));
        }

        for path in self
            .static_assets
            .iter()
            .chain(self.sync_pages.iter())
            .chain(std::iter::once(&self.offline_path))
        {
            if !path.starts_with('/') {
                return Err(SwError::Config(format!("path {path:?} must start with '/'")));
            }
        }

        if !self.api_prefix.starts_with('/') || !self.api_prefix.ends_with('/') {
            return Err(SwError::Config(format!(
                "api prefix {:?} must start and end with '/'",
                self.api_prefix
            )));
        }
        if self.api_ttl_ms == 0 {
            return Err(SwError::Config("api ttl must be positive".to_string()));
        }
        if http::HeaderName::from_bytes(self.freshness_header.as_bytes()).is_err() {
            return Err(SwError::Config(format!(
                "invalid freshness header {:?}",
                self.freshness_header
            )));
        }
        Ok(())
    }
}

fn default_site_name() -> String {
    "Morning Ai".to_string()
}

fn default_static_assets() -> Vec<String> {
    [
        "/",
        "/index.html",
        "/manifest.json",
        "/icons/icon-192x192.png",
        "/icons/icon-512x512.png",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_sync_pages() -> Vec<String> {
    ["/", "/products", "/pricing"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_offline_path() -> String {
    "/offline.html".to_string()
}

fn default_api_prefix() -> String {
    "/api/".to_string()
}

fn default_api_ttl_ms() -> u64 {
    5 * 60 * 1000 // 5 minutes
}

fn default_freshness_header() -> String {
    "sw-cached-at".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_json_uses_defaults() {
        let config = SiteConfig::from_json(r#"{"origin": "https://example.com"}"#).unwrap();
        assert_eq!(config.api_ttl(), Duration::from_secs(300));
        assert_eq!(config.static_assets.len(), 5);
        assert_eq!(config.sync_pages, vec!["/", "/products", "/pricing"]);
        assert_eq!(config.offline_path, "/offline.html");
        assert_eq!(config.notification_title(), "Morning Ai");
        assert_eq!(config.notifications.vibrate, vec![200, 100, 200]);
    }

    #[test]
    fn test_versions_from_json() {
        let config = SiteConfig::from_json(
            r#"{
                "origin": "https://example.com",
                "versions": {"static_cache": "s-v2", "dynamic_cache": "d-v2"}
            }"#,
        )
        .unwrap();
        assert!(config.versions.is_current("s-v2"));
        assert!(!config.versions.is_current("s-v1"));
    }

    #[test]
    fn test_rejects_non_http_origin() {
        let err = SiteConfig::from_json(r#"{"origin": "file:///srv/site"}"#).unwrap_err();
        assert!(matches!(err, SwError::Config(_)));
    }

    #[test]
    fn test_rejects_relative_asset() {
        let mut config = SiteConfig::new(Url::parse("https://example.com").unwrap());
        config.static_assets.push("app.js".to_string());
        assert!(matches!(config.validate(), Err(SwError::Config(_))));
    }

    #[test]
    fn test_rejects_shared_cache_name() {
        let config = SiteConfig::new(Url::parse("https://example.com").unwrap())
            .with_versions(VersionConfig::new("same", "same"));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_bad_api_prefix() {
        let mut config = SiteConfig::new(Url::parse("https://example.com").unwrap());
        config.api_prefix = "/api".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_resolve() {
        let config = SiteConfig::new(Url::parse("https://example.com").unwrap());
        assert_eq!(
            config.resolve("/pricing").unwrap().as_str(),
            "https://example.com/pricing"
        );
    }
}
