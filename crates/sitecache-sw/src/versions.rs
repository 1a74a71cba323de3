//! Version-tagged cache namespace names.

use serde::{Deserialize, Serialize};

/// Logical purpose of a cache namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Namespace {
    /// Precached build assets and cache-first subresources.
    Static,
    /// Documents, API responses, synced pages and the offline page.
    Dynamic,
}

/// The two namespace names that are current for a deployment.
///
/// Any other name found in the store belongs to an older deployment (or to
/// an unrelated cache) and is swept on activation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionConfig {
    pub static_cache: String,
    pub dynamic_cache: String,
}

impl VersionConfig {
    pub fn new(static_cache: impl Into<String>, dynamic_cache: impl Into<String>) -> Self {
        Self {
            static_cache: static_cache.into(),
            dynamic_cache: dynamic_cache.into(),
        }
    }

    /// Names for a release: `{app}-static-v{version}` and `{app}-dynamic-v{version}`.
    pub fn for_release(app: &str, version: &str) -> Self {
        Self::new(
            format!("{app}-static-v{version}"),
            format!("{app}-dynamic-v{version}"),
        )
    }

    pub fn name(&self, namespace: Namespace) -> &str {
        match namespace {
            Namespace::Static => &self.static_cache,
            Namespace::Dynamic => &self.dynamic_cache,
        }
    }

    pub fn is_current(&self, name: &str) -> bool {
        name == self.static_cache || name == self.dynamic_cache
    }

    /// Names from `names` that are not current, in input order.
    pub fn stale<'a, I>(&self, names: I) -> Vec<String>
    where
        I: IntoIterator<Item = &'a String>,
    {
        names
            .into_iter()
            .filter(|name| !self.is_current(name))
            .cloned()
            .collect()
    }
}

impl Default for VersionConfig {
    fn default() -> Self {
        Self::for_release("morning-ai-website", "1.0.0")
    }
}
