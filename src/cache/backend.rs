//! Cache backend implementations.

use super::key::CacheKey;
use crate::{Error, ErrorContext, Result};
use async_trait::async_trait;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

#[derive(Clone)]
struct CacheEntry {
    value: String,
    expires_at: Option<Instant>,
}

impl CacheEntry {
    fn new(value: String, ttl: Option<Duration>) -> Self {
        Self {
            value,
            expires_at: ttl.map(|t| Instant::now() + t),
        }
    }
    fn is_expired(&self) -> bool {
        self.expires_at
            .map(|at| Instant::now() >= at)
            .unwrap_or(false)
    }
}

/// Raw keyed store with optional per-entry TTL.
///
/// Backends report failures as errors; [`super::CacheManager`] is the layer
/// that turns them into misses and no-ops. Expired entries must read as
/// absent from both `get` and `exists`.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    async fn get(&self, key: &CacheKey) -> Result<Option<String>>;
    async fn set(&self, key: &CacheKey, value: &str, ttl: Option<Duration>) -> Result<()>;
    async fn delete(&self, key: &CacheKey) -> Result<bool>;
    async fn exists(&self, key: &CacheKey) -> Result<bool>;
    async fn clear(&self) -> Result<()>;
    async fn len(&self) -> Result<usize>;
    fn name(&self) -> &'static str;
}

/// Process-local backend. Optionally bounded, evicting least recently used entries.
#[derive(Clone)]
pub struct MemoryBackend {
    entries: Arc<Mutex<LruCache<String, CacheEntry>>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self {
            entries: Arc::new(Mutex::new(LruCache::unbounded())),
        }
    }

    /// Bounded backend; `max_entries` of zero means unbounded.
    pub fn with_capacity(max_entries: usize) -> Self {
        let cache = match NonZeroUsize::new(max_entries) {
            Some(cap) => LruCache::new(cap),
            None => LruCache::unbounded(),
        };
        Self {
            entries: Arc::new(Mutex::new(cache)),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, LruCache<String, CacheEntry>>> {
        self.entries.lock().map_err(|_| {
            Error::cache_unavailable_with_context(
                "memory cache lock poisoned",
                ErrorContext::new().with_source("memory_backend"),
            )
        })
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CacheBackend for MemoryBackend {
    async fn get(&self, key: &CacheKey) -> Result<Option<String>> {
        let mut entries = self.lock()?;
        let live = entries
            .get(key.as_str())
            .map(|e| (!e.is_expired()).then(|| e.value.clone()));
        match live {
            Some(Some(value)) => Ok(Some(value)),
            Some(None) => {
                entries.pop(key.as_str());
                Ok(None)
            }
            None => Ok(None),
        }
    }
    async fn set(&self, key: &CacheKey, value: &str, ttl: Option<Duration>) -> Result<()> {
        let mut entries = self.lock()?;
        entries.put(key.hash.clone(), CacheEntry::new(value.to_string(), ttl));
        Ok(())
    }
    async fn delete(&self, key: &CacheKey) -> Result<bool> {
        Ok(self.lock()?.pop(key.as_str()).is_some())
    }
    async fn exists(&self, key: &CacheKey) -> Result<bool> {
        let mut entries = self.lock()?;
        let live = entries
            .peek(key.as_str())
            .map(|e| !e.is_expired());
        match live {
            Some(true) => Ok(true),
            Some(false) => {
                entries.pop(key.as_str());
                Ok(false)
            }
            None => Ok(false),
        }
    }
    async fn clear(&self) -> Result<()> {
        self.lock()?.clear();
        Ok(())
    }
    async fn len(&self) -> Result<usize> {
        Ok(self
            .lock()?
            .iter()
            .filter(|(_, e)| !e.is_expired())
            .count())
    }
    fn name(&self) -> &'static str {
        "memory"
    }
}

/// Backend used when caching is disabled: every read misses, every write is dropped.
pub struct NullBackend;
impl NullBackend {
    pub fn new() -> Self {
        Self
    }
}
impl Default for NullBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CacheBackend for NullBackend {
    async fn get(&self, _: &CacheKey) -> Result<Option<String>> {
        Ok(None)
    }
    async fn set(&self, _: &CacheKey, _: &str, _: Option<Duration>) -> Result<()> {
        Ok(())
    }
    async fn delete(&self, _: &CacheKey) -> Result<bool> {
        Ok(false)
    }
    async fn exists(&self, _: &CacheKey) -> Result<bool> {
        Ok(false)
    }
    async fn clear(&self) -> Result<()> {
        Ok(())
    }
    async fn len(&self) -> Result<usize> {
        Ok(0)
    }
    fn name(&self) -> &'static str {
        "null"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_set_get_without_ttl() {
        let backend = MemoryBackend::new();
        let key = CacheKey::new("k");
        backend.set(&key, "\"v\"", None).await.unwrap();
        assert_eq!(backend.get(&key).await.unwrap().as_deref(), Some("\"v\""));
        assert!(backend.exists(&key).await.unwrap());
    }

    #[tokio::test]
    async fn test_memory_expiry_is_lazy_and_consistent() {
        let backend = MemoryBackend::new();
        let key = CacheKey::new("k");
        backend
            .set(&key, "1", Some(Duration::from_millis(30)))
            .await
            .unwrap();
        assert!(backend.exists(&key).await.unwrap());
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(!backend.exists(&key).await.unwrap());
        assert_eq!(backend.get(&key).await.unwrap(), None);
        assert_eq!(backend.len().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_memory_ttl_is_not_sticky() {
        let backend = MemoryBackend::new();
        let key = CacheKey::new("k");
        backend
            .set(&key, "1", Some(Duration::from_millis(30)))
            .await
            .unwrap();
        backend.set(&key, "2", None).await.unwrap();
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(backend.get(&key).await.unwrap().as_deref(), Some("2"));

        backend
            .set(&key, "3", Some(Duration::from_millis(30)))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(backend.get(&key).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_memory_capacity_evicts_least_recent() {
        let backend = MemoryBackend::with_capacity(2);
        let (a, b, c) = (CacheKey::new("a"), CacheKey::new("b"), CacheKey::new("c"));
        backend.set(&a, "1", None).await.unwrap();
        backend.set(&b, "2", None).await.unwrap();
        // touch `a` so `b` becomes the eviction candidate
        backend.get(&a).await.unwrap();
        backend.set(&c, "3", None).await.unwrap();
        assert!(backend.exists(&a).await.unwrap());
        assert!(!backend.exists(&b).await.unwrap());
        assert!(backend.exists(&c).await.unwrap());
    }

    #[tokio::test]
    async fn test_memory_delete() {
        let backend = MemoryBackend::new();
        let key = CacheKey::new("k");
        backend.set(&key, "1", None).await.unwrap();
        assert!(backend.delete(&key).await.unwrap());
        assert!(!backend.delete(&key).await.unwrap());
        assert!(!backend.exists(&key).await.unwrap());
    }

    #[tokio::test]
    async fn test_null_backend_always_misses() {
        let backend = NullBackend::new();
        let key = CacheKey::new("k");
        backend.set(&key, "1", None).await.unwrap();
        assert_eq!(backend.get(&key).await.unwrap(), None);
        assert!(!backend.exists(&key).await.unwrap());
    }
}
