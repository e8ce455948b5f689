//! Best-effort lookup cache
//!
//! The catalog only ever talks to [`CatalogCache`], which turns every backend
//! failure into a miss (reads) or a logged no-op (writes and deletes). The
//! database stays the source of truth; a broken cache costs latency, never
//! correctness.

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{de::DeserializeOwned, Serialize};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

use crate::config::CacheConfig;

/// Fixed key for the facet dropdown payload
pub const FILTER_OPTIONS_KEY: &str = "filters:options";
/// Namespace of every cached book extraction (list pages, reports)
pub const BOOKS_PREFIX: &str = "books:";
const BOOK_LIST_PREFIX: &str = "books:list:";
const BOOK_REPORT_PREFIX: &str = "books:report:";
/// Inserts between sweeps of expired `MemoryCache` entries
pub const SWEEP_INTERVAL: usize = 256;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache backend unavailable: {0}")]
    Unavailable(String),
}

/// Key-value store with per-entry TTL
#[async_trait]
pub trait LookupCache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError>;

    async fn delete(&self, key: &str) -> Result<(), CacheError>;

    /// Remove every key starting with `prefix`, returning how many were removed.
    async fn delete_prefix(&self, prefix: &str) -> Result<usize, CacheError>;
}

struct Entry {
    value: String,
    expires_at: Instant,
}

/// In-process cache. Expired entries are dropped when read, and every
/// `SWEEP_INTERVAL` inserts all expired entries are swept.
#[derive(Default)]
pub struct MemoryCache {
    entries: DashMap<String, Entry>,
    inserts: AtomicUsize,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every expired entry, returning how many were removed.
    pub fn sweep_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.expires_at > now);
        before.saturating_sub(self.entries.len())
    }
}

#[async_trait]
impl LookupCache for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let now = Instant::now();
        if let Some(entry) = self.entries.get(key) {
            if entry.expires_at > now {
                return Ok(Some(entry.value.clone()));
            }
        } else {
            return Ok(None);
        }
        // Guard dropped above; removing while holding it would deadlock the shard.
        self.entries.remove_if(key, |_, entry| entry.expires_at <= now);
        Ok(None)
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError> {
        let expires_at = Instant::now() + ttl;
        self.entries.insert(key.to_string(), Entry { value, expires_at });

        if (self.inserts.fetch_add(1, Ordering::Relaxed) + 1) % SWEEP_INTERVAL == 0 {
            let swept = self.sweep_expired();
            if swept > 0 {
                tracing::debug!("Cache swept {} expired entries", swept);
            }
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.entries.remove(key);
        Ok(())
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<usize, CacheError> {
        let before = self.entries.len();
        self.entries.retain(|key, _| !key.starts_with(prefix));
        Ok(before.saturating_sub(self.entries.len()))
    }
}

/// Fail-open cache facade used by the catalog
///
/// Every invalidation bumps a generation counter. A read takes the generation
/// before querying the database and stores its result only if no invalidation
/// happened in between.
#[derive(Clone)]
pub struct CatalogCache {
    backend: Arc<dyn LookupCache>,
    generation: Arc<AtomicU64>,
    filter_options_ttl: Duration,
    books_ttl: Duration,
}

impl CatalogCache {
    pub fn new(backend: Arc<dyn LookupCache>, config: &CacheConfig) -> Self {
        Self {
            backend,
            generation: Arc::new(AtomicU64::new(0)),
            filter_options_ttl: Duration::from_secs(config.filter_options_ttl_secs),
            books_ttl: Duration::from_secs(config.books_ttl_secs),
        }
    }

    pub fn in_memory(config: &CacheConfig) -> Self {
        Self::new(Arc::new(MemoryCache::new()), config)
    }

    pub fn filter_options_ttl(&self) -> Duration {
        self.filter_options_ttl
    }

    pub fn books_ttl(&self) -> Duration {
        self.books_ttl
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    fn bump_generation(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
    }

    pub fn list_key(canonical_filter: &str) -> String {
        format!("{}{}", BOOK_LIST_PREFIX, canonical_filter)
    }

    pub fn report_key(session: &str, semester: &str) -> String {
        format!("{}{}:{}", BOOK_REPORT_PREFIX, session, semester)
    }

    /// Read and decode a cached value; any failure is a miss.
    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = match self.backend.get(key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!("Cache GET error for key {}: {}", key, e);
                return None;
            }
        };

        match serde_json::from_str(&raw) {
            Ok(value) => {
                tracing::debug!("Cache hit: {}", key);
                Some(value)
            }
            Err(e) => {
                tracing::warn!("Discarding undecodable cache entry {}: {}", key, e);
                self.delete(key).await;
                None
            }
        }
    }

    pub async fn put_json<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) {
        let raw = match serde_json::to_string(value) {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!("Cache SET skipped for key {}: {}", key, e);
                return;
            }
        };

        if let Err(e) = self.backend.set(key, raw, ttl).await {
            tracing::warn!("Cache SET error for key {}: {}", key, e);
        }
    }

    /// `put_json` unless an invalidation ran since `seen` was taken.
    pub async fn put_json_since<T: Serialize>(&self, key: &str, value: &T, ttl: Duration, seen: u64) {
        if self.generation() != seen {
            tracing::debug!("Cache SET skipped for key {}: invalidated during read", key);
            return;
        }
        self.put_json(key, value, ttl).await;
    }

    pub async fn delete(&self, key: &str) {
        if let Err(e) = self.backend.delete(key).await {
            tracing::warn!("Cache DELETE error for key {}: {}", key, e);
        }
    }

    pub async fn delete_prefix(&self, prefix: &str) {
        match self.backend.delete_prefix(prefix).await {
            Ok(removed) => tracing::debug!("Cache cleared {} entries under {}", removed, prefix),
            Err(e) => tracing::warn!("Cache DELETE error for prefix {}: {}", prefix, e),
        }
    }

    /// Run after every book write, before the response is sent.
    pub async fn invalidate_books(&self) {
        self.bump_generation();
        self.delete(FILTER_OPTIONS_KEY).await;
        self.delete_prefix(BOOKS_PREFIX).await;
    }

    pub async fn invalidate_filter_options(&self) {
        self.bump_generation();
        self.delete(FILTER_OPTIONS_KEY).await;
    }

    pub async fn invalidate_reports(&self) {
        self.bump_generation();
        self.delete_prefix(BOOK_REPORT_PREFIX).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct BrokenCache;

    #[async_trait]
    impl LookupCache for BrokenCache {
        async fn get(&self, _key: &str) -> Result<Option<String>, CacheError> {
            Err(CacheError::Unavailable("connection refused".to_string()))
        }

        async fn set(&self, _key: &str, _value: String, _ttl: Duration) -> Result<(), CacheError> {
            Err(CacheError::Unavailable("connection refused".to_string()))
        }

        async fn delete(&self, _key: &str) -> Result<(), CacheError> {
            Err(CacheError::Unavailable("connection refused".to_string()))
        }

        async fn delete_prefix(&self, _prefix: &str) -> Result<usize, CacheError> {
            Err(CacheError::Unavailable("connection refused".to_string()))
        }
    }

    fn catalog_cache() -> (Arc<MemoryCache>, CatalogCache) {
        let backend = Arc::new(MemoryCache::new());
        let cache = CatalogCache::new(backend.clone(), &CacheConfig::default());
        (backend, cache)
    }

    #[tokio::test]
    async fn memory_cache_set_get_delete() {
        let cache = MemoryCache::new();
        assert_eq!(cache.get("k").await.unwrap(), None);

        cache.set("k", "v".to_string(), Duration::from_secs(60)).await.unwrap();
        assert_eq!(cache.get("k").await.unwrap(), Some("v".to_string()));

        cache.delete("k").await.unwrap();
        assert_eq!(cache.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn memory_cache_expired_entry_is_absent_and_dropped() {
        let cache = MemoryCache::new();
        cache.set("k", "v".to_string(), Duration::ZERO).await.unwrap();

        assert_eq!(cache.get("k").await.unwrap(), None);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn unread_expired_entries_are_swept_on_insert() {
        let cache = MemoryCache::new();
        for i in 0..10_000 {
            cache
                .set(&format!("books:list:{}", i), "[]".into(), Duration::ZERO)
                .await
                .unwrap();
        }
        cache.set("books:list:fresh", "[]".into(), Duration::from_secs(60)).await.unwrap();

        assert!(cache.len() <= SWEEP_INTERVAL, "{} entries retained", cache.len());
        assert!(cache.get("books:list:fresh").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn sweep_keeps_live_entries() {
        let cache = MemoryCache::new();
        cache.set("gone", "1".into(), Duration::ZERO).await.unwrap();
        cache.set("kept", "2".into(), Duration::from_secs(60)).await.unwrap();

        assert_eq!(cache.sweep_expired(), 1);
        assert_eq!(cache.len(), 1);
        assert!(cache.get("kept").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn memory_cache_delete_prefix_keeps_other_keys() {
        let cache = MemoryCache::new();
        let ttl = Duration::from_secs(60);
        cache.set("books:list:a", "1".into(), ttl).await.unwrap();
        cache.set("books:report:b", "2".into(), ttl).await.unwrap();
        cache.set("filters:options", "3".into(), ttl).await.unwrap();

        let removed = cache.delete_prefix("books:").await.unwrap();
        assert_eq!(removed, 2);
        assert_eq!(cache.len(), 1);
        assert!(cache.get("filters:options").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn invalidate_books_clears_options_and_book_namespace() {
        let (backend, cache) = catalog_cache();
        let ttl = Duration::from_secs(60);
        cache.put_json(FILTER_OPTIONS_KEY, &vec!["a"], ttl).await;
        cache.put_json(&CatalogCache::list_key("{}"), &1, ttl).await;
        cache.put_json(&CatalogCache::report_key("2024/2025", "First Semester"), &2, ttl).await;
        cache.put_json("session:other", &3, ttl).await;

        cache.invalidate_books().await;

        assert!(cache.get_json::<Vec<String>>(FILTER_OPTIONS_KEY).await.is_none());
        assert!(cache.get_json::<i32>(&CatalogCache::list_key("{}")).await.is_none());
        assert_eq!(cache.get_json::<i32>("session:other").await, Some(3));
        assert_eq!(backend.len(), 1);
    }

    #[tokio::test]
    async fn read_overtaken_by_invalidation_is_not_stored() {
        let (backend, cache) = catalog_cache();
        let ttl = Duration::from_secs(60);

        let seen = cache.generation();
        cache.invalidate_books().await;
        cache.put_json_since(FILTER_OPTIONS_KEY, &vec!["stale"], ttl, seen).await;
        assert!(backend.is_empty());

        let seen = cache.generation();
        cache.put_json_since(FILTER_OPTIONS_KEY, &vec!["fresh"], ttl, seen).await;
        assert_eq!(
            cache.get_json::<Vec<String>>(FILTER_OPTIONS_KEY).await,
            Some(vec!["fresh".to_string()])
        );
    }

    #[tokio::test]
    async fn undecodable_entry_is_a_miss() {
        let (backend, cache) = catalog_cache();
        backend.set("books:list:x", "not json".into(), Duration::from_secs(60)).await.unwrap();

        assert!(cache.get_json::<Vec<i32>>("books:list:x").await.is_none());
        assert!(backend.is_empty());
    }

    #[tokio::test]
    async fn broken_backend_fails_open() {
        let cache = CatalogCache::new(Arc::new(BrokenCache), &CacheConfig::default());

        cache.put_json(FILTER_OPTIONS_KEY, &vec![1, 2], Duration::from_secs(60)).await;
        assert!(cache.get_json::<Vec<i32>>(FILTER_OPTIONS_KEY).await.is_none());
        cache.invalidate_books().await;
    }
}
