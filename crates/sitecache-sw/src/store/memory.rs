//! In-memory cache store.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use hashbrown::HashMap;
use sitecache_common::{Clock, SystemClock};
use sitecache_net::{RequestKey, Response};
use tokio::sync::RwLock;

use super::{CacheStore, NamedCache};
use crate::{Result, SwError};

/// A cached request/response pair.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub response: Response,
    /// Stored at timestamp (ms since epoch).
    pub stored_at: u64,
}

type Entries = Arc<RwLock<HashMap<RequestKey, CacheEntry>>>;

/// A cache instance.
///
/// A handle stays usable after its cache is deleted from the store; writes
/// then land in a detached map that nothing else can see.
#[derive(Debug, Clone)]
pub struct MemoryCache {
    name: String,
    entries: Entries,
    clock: Arc<dyn Clock>,
    fail_puts: Arc<AtomicBool>,
}

impl MemoryCache {
    /// Entry with its storage timestamp.
    pub async fn entry(&self, key: &RequestKey) -> Option<CacheEntry> {
        self.entries.read().await.get(key).cloned()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl NamedCache for MemoryCache {
    fn name(&self) -> &str {
        &self.name
    }

    async fn put(&self, key: RequestKey, response: Response) -> Result<()> {
        if self.fail_puts.load(Ordering::SeqCst) {
            return Err(SwError::CacheError(format!(
                "quota exceeded writing {} to {}",
                key, self.name
            )));
        }
        let entry = CacheEntry {
            response,
            stored_at: self.clock.now_millis(),
        };
        self.entries.write().await.insert(key, entry);
        Ok(())
    }

    async fn match_request(&self, key: &RequestKey) -> Result<Option<Response>> {
        Ok(self
            .entries
            .read()
            .await
            .get(key)
            .map(|e| e.response.clone()))
    }

    async fn delete(&self, key: &RequestKey) -> Result<bool> {
        Ok(self.entries.write().await.remove(key).is_some())
    }

    async fn keys(&self) -> Result<Vec<RequestKey>> {
        Ok(self.entries.read().await.keys().cloned().collect())
    }
}

#[derive(Debug, Default)]
struct StoreInner {
    caches: HashMap<String, Entries>,
    /// Creation order, for `keys()` and `match_any()`.
    order: Vec<String>,
}

/// Cache storage held in process memory.
#[derive(Debug, Clone)]
pub struct MemoryCacheStore {
    inner: Arc<RwLock<StoreInner>>,
    clock: Arc<dyn Clock>,
    fail_puts: Arc<AtomicBool>,
}

impl MemoryCacheStore {
    /// Create new cache storage.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Create storage that timestamps entries with `clock`.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(StoreInner::default())),
            clock,
            fail_puts: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Make every subsequent `put` fail, as a full quota would.
    pub fn fail_puts(&self, fail: bool) {
        self.fail_puts.store(fail, Ordering::SeqCst);
    }

    /// Open a cache and return the concrete handle.
    pub async fn open_memory(&self, name: &str) -> MemoryCache {
        let mut inner = self.inner.write().await;
        let entries = match inner.caches.get(name) {
            Some(entries) => Arc::clone(entries),
            None => {
                let entries: Entries = Arc::default();
                inner.caches.insert(name.to_string(), Arc::clone(&entries));
                inner.order.push(name.to_string());
                entries
            }
        };
        MemoryCache {
            name: name.to_string(),
            entries,
            clock: Arc::clone(&self.clock),
            fail_puts: Arc::clone(&self.fail_puts),
        }
    }

    /// Existing cache by name, without creating it.
    pub async fn get(&self, name: &str) -> Option<MemoryCache> {
        let inner = self.inner.read().await;
        inner.caches.get(name).map(|entries| MemoryCache {
            name: name.to_string(),
            entries: Arc::clone(entries),
            clock: Arc::clone(&self.clock),
            fail_puts: Arc::clone(&self.fail_puts),
        })
    }
}

impl Default for MemoryCacheStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn open(&self, name: &str) -> Result<Arc<dyn NamedCache>> {
        Ok(Arc::new(self.open_memory(name).await))
    }

    async fn has(&self, name: &str) -> Result<bool> {
        Ok(self.inner.read().await.caches.contains_key(name))
    }

    async fn delete(&self, name: &str) -> Result<bool> {
        let mut inner = self.inner.write().await;
        let existed = inner.caches.remove(name).is_some();
        if existed {
            inner.order.retain(|n| n != name);
        }
        Ok(existed)
    }

    async fn keys(&self) -> Result<Vec<String>> {
        Ok(self.inner.read().await.order.clone())
    }

    async fn match_any(&self, key: &RequestKey) -> Result<Option<Response>> {
        let inner = self.inner.read().await;
        for name in &inner.order {
            if let Some(entries) = inner.caches.get(name) {
                if let Some(entry) = entries.read().await.get(key) {
                    return Ok(Some(entry.response.clone()));
                }
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::StatusCode;
    use sitecache_common::ManualClock;
    use url::Url;

    fn key(path: &str) -> RequestKey {
        RequestKey::get(Url::parse("https://example.com").unwrap().join(path).unwrap())
    }

    fn body(text: &'static str) -> Response {
        Response::new(StatusCode::OK, text)
    }

    #[tokio::test]
    async fn test_put_and_match() {
        let store = MemoryCacheStore::new();
        let cache = store.open("v1").await.unwrap();

        cache.put(key("/style.css"), body("a")).await.unwrap();

        assert!(cache.match_request(&key("/style.css")).await.unwrap().is_some());
        assert!(cache.match_request(&key("/other.css")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_entry_delete() {
        let store = MemoryCacheStore::new();
        let cache = store.open("v1").await.unwrap();

        cache.put(key("/style.css"), body("a")).await.unwrap();
        assert!(cache.delete(&key("/style.css")).await.unwrap());
        assert!(!cache.delete(&key("/style.css")).await.unwrap());
        assert!(cache.keys().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_storage_open_delete() {
        let store = MemoryCacheStore::new();
        assert!(!store.has("v1").await.unwrap());

        store.open("v1").await.unwrap();
        assert!(store.has("v1").await.unwrap());

        assert!(store.delete("v1").await.unwrap());
        assert!(!store.has("v1").await.unwrap());
        assert!(!store.delete("v1").await.unwrap());
    }

    #[tokio::test]
    async fn test_keys_in_creation_order() {
        let store = MemoryCacheStore::new();
        for name in ["c", "a", "b"] {
            store.open(name).await.unwrap();
        }
        store.open("a").await.unwrap();
        assert_eq!(store.keys().await.unwrap(), vec!["c", "a", "b"]);
    }

    #[tokio::test]
    async fn test_match_any_prefers_older_cache() {
        let store = MemoryCacheStore::new();
        let first = store.open("first").await.unwrap();
        let second = store.open("second").await.unwrap();
        second.put(key("/x"), body("second")).await.unwrap();
        first.put(key("/x"), body("first")).await.unwrap();

        let hit = store.match_any(&key("/x")).await.unwrap().unwrap();
        assert_eq!(hit.text().unwrap(), "first");
        assert!(store.match_any(&key("/y")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_deleted_cache_handle_is_detached() {
        let store = MemoryCacheStore::new();
        let cache = store.open("v1").await.unwrap();
        store.delete("v1").await.unwrap();

        cache.put(key("/late"), body("late")).await.unwrap();

        assert!(store.match_any(&key("/late")).await.unwrap().is_none());
        assert!(store.keys().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_fail_puts() {
        let store = MemoryCacheStore::new();
        let cache = store.open("v1").await.unwrap();
        store.fail_puts(true);
        assert!(matches!(
            cache.put(key("/a"), body("a")).await,
            Err(SwError::CacheError(_))
        ));
        store.fail_puts(false);
        assert!(cache.put(key("/a"), body("a")).await.is_ok());
    }

    #[tokio::test]
    async fn test_entry_timestamp_from_clock() {
        let clock = Arc::new(ManualClock::new(42));
        let store = MemoryCacheStore::with_clock(clock.clone());
        let cache = store.open_memory("v1").await;
        cache.put(key("/a"), body("a")).await.unwrap();
        assert_eq!(cache.entry(&key("/a")).await.unwrap().stored_at, 42);
        assert_eq!(cache.len().await, 1);
    }
}
