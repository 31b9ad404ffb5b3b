//! Cache-or-compute wrapper around a single fetch step.
//!
//! Without a cache configured, [`Memoizer`] is a pass-through: every call
//! computes. Concurrent misses for the same key each run their compute step
//! unless single-flight is switched on with [`Memoizer::with_single_flight`].

use crate::adapter::CallArgs;
use crate::cache::{CacheKey, CacheManager};
use crate::Result;
use serde::{de::DeserializeOwned, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::debug;

#[derive(Clone, Default)]
pub struct Memoizer {
    cache: Option<Arc<CacheManager>>,
    key_prefix: String,
    inflight: Option<Arc<InflightLocks>>,
}

impl Memoizer {
    pub fn new(cache: Option<Arc<CacheManager>>) -> Self {
        Self {
            cache,
            key_prefix: String::new(),
            inflight: None,
        }
    }

    /// Memoizer that always computes.
    pub fn disabled() -> Self {
        Self::new(None)
    }

    /// Prefix for keys derived by [`Memoizer::memoize`].
    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    /// Serialize computations per key so concurrent misses compute once.
    pub fn with_single_flight(mut self, enabled: bool) -> Self {
        self.inflight = enabled.then(|| Arc::new(InflightLocks::default()));
        self
    }

    pub fn cache(&self) -> Option<&Arc<CacheManager>> {
        self.cache.as_ref()
    }

    /// Return the cached value for `key`, or run `compute`, store its result
    /// under `ttl` and return it.
    ///
    /// A failed compute stores nothing. A compute that is dropped before it
    /// finishes stores nothing either: the write happens only after it returns.
    pub async fn get_or_compute<T, F, Fut>(
        &self,
        key: &CacheKey,
        ttl: Option<Duration>,
        compute: F,
    ) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let Some(cache) = self.cache.as_ref() else {
            return compute().await;
        };

        if let Some(hit) = cache.get::<T>(key).await {
            return Ok(hit);
        }

        let _guard = match self.inflight.as_ref() {
            Some(locks) => {
                let lock = locks.lock_for(key);
                let guard = lock.lock_owned().await;
                // another caller may have filled it while we waited
                if let Some(hit) = cache.get::<T>(key).await {
                    locks.release(key);
                    return Ok(hit);
                }
                Some(InflightGuard {
                    _guard: guard,
                    locks: locks.clone(),
                    key: key.clone(),
                })
            }
            None => None,
        };

        let value = compute().await?;
        debug!(key = %key, ttl_secs = ttl.map(|t| t.as_secs()), "Storing computed value");
        cache.set(key, &value, ttl).await;
        Ok(value)
    }

    /// Derive the key from `operation` and `args`, then [`get_or_compute`](Self::get_or_compute).
    pub async fn memoize<T, F, Fut>(
        &self,
        operation: &str,
        args: &CallArgs,
        ttl: Option<Duration>,
        compute: F,
    ) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let key = CacheKey::derive(operation, args).with_prefix(&self.key_prefix);
        self.get_or_compute(&key, ttl, compute).await
    }
}

impl std::fmt::Debug for Memoizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Memoizer")
            .field("cache", &self.cache.as_ref().map(|c| c.backend_name()))
            .field("key_prefix", &self.key_prefix)
            .field("single_flight", &self.inflight.is_some())
            .finish()
    }
}

/// Per-key async locks for single-flight computation.
#[derive(Default)]
struct InflightLocks {
    locks: Mutex<HashMap<CacheKey, Arc<tokio::sync::Mutex<()>>>>,
}

impl InflightLocks {
    fn lock_for(&self, key: &CacheKey) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|p| p.into_inner());
        locks.entry(key.clone()).or_default().clone()
    }

    /// Drop the map entry once nobody else holds or waits on it.
    fn release(&self, key: &CacheKey) {
        let mut locks = self.locks.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(lock) = locks.get(key) {
            // the map's own reference plus the caller's
            if Arc::strong_count(lock) <= 2 {
                locks.remove(key);
            }
        }
    }
}

struct InflightGuard {
    _guard: tokio::sync::OwnedMutexGuard<()>,
    locks: Arc<InflightLocks>,
    key: CacheKey,
}

impl Drop for InflightGuard {
    fn drop(&mut self) {
        self.locks.release(&self.key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting(
        calls: &Arc<AtomicUsize>,
        value: &'static str,
    ) -> impl Future<Output = Result<String>> {
        let calls = calls.clone();
        async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(value.to_string())
        }
    }

    #[tokio::test]
    async fn test_warm_cache_skips_compute() {
        let memo = Memoizer::new(Some(Arc::new(CacheManager::in_memory())));
        let calls = Arc::new(AtomicUsize::new(0));
        let key = CacheKey::new("k");
        let first: String = memo
            .get_or_compute(&key, None, || counting(&calls, "v"))
            .await
            .unwrap();
        let second: String = memo
            .get_or_compute(&key, None, || counting(&calls, "other"))
            .await
            .unwrap();
        assert_eq!(first, second);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_without_cache_always_computes() {
        let memo = Memoizer::disabled();
        let calls = Arc::new(AtomicUsize::new(0));
        for _ in 0..3 {
            let _: String = memo
                .memoize("op", &CallArgs::new(), None, || counting(&calls, "v"))
                .await
                .unwrap();
        }
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_failed_compute_is_not_cached() {
        let cache = Arc::new(CacheManager::in_memory());
        let memo = Memoizer::new(Some(cache.clone()));
        let key = CacheKey::new("k");
        let res: Result<String> = memo
            .get_or_compute(&key, None, || async { Err(Error::upstream("op", "boom")) })
            .await;
        assert!(res.is_err());
        assert!(!cache.exists(&key).await);
    }

    #[tokio::test]
    async fn test_cancelled_compute_leaves_no_entry() {
        let cache = Arc::new(CacheManager::in_memory());
        let memo = Memoizer::new(Some(cache.clone()));
        let key = CacheKey::new("slow");
        let fut = memo.get_or_compute(&key, None, || async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok::<_, Error>("late".to_string())
        });
        assert!(tokio::time::timeout(Duration::from_millis(20), fut).await.is_err());
        assert!(!cache.exists(&key).await);
    }

    #[tokio::test]
    async fn test_memoize_prefix_and_ttl() {
        let cache = Arc::new(CacheManager::in_memory());
        let memo = Memoizer::new(Some(cache.clone())).with_key_prefix("tw:");
        let args = CallArgs::new().named("username", "alice");
        let _: String = memo
            .memoize("get_user", &args, Some(Duration::from_millis(30)), || async {
                Ok("id-1".to_string())
            })
            .await
            .unwrap();
        let key = CacheKey::derive("get_user", &args).with_prefix("tw:");
        assert!(key.as_str().starts_with("tw:get_user:"));
        assert!(cache.exists(&key).await);
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(!cache.exists(&key).await);
    }

    #[tokio::test]
    async fn test_single_flight_computes_once() {
        let memo =
            Memoizer::new(Some(Arc::new(CacheManager::in_memory()))).with_single_flight(true);
        let calls = Arc::new(AtomicUsize::new(0));
        let key = CacheKey::new("hot");
        let mut tasks = Vec::new();
        for _ in 0..8 {
            let memo = memo.clone();
            let calls = calls.clone();
            let key = key.clone();
            tasks.push(tokio::spawn(async move {
                memo.get_or_compute(&key, None, || async move {
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, Error>(42u32)
                })
                .await
            }));
        }
        for t in tasks {
            assert_eq!(t.await.unwrap().unwrap(), 42);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
