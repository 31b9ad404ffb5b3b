//! Cache manager.

use super::backend::CacheBackend;
use super::key::CacheKey;
use crate::{Error, ErrorContext};
use serde::de::{DeserializeOwned, IgnoredAny};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub enabled: bool,
    pub max_entry_size: usize,
    /// Prepended verbatim, like [`CacheKey::with_prefix`]; include any separator.
    pub key_prefix: Option<String>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_entry_size: 10 * 1024 * 1024,
            key_prefix: None,
        }
    }
}

impl CacheConfig {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }
    pub fn with_max_entry_size(mut self, bytes: usize) -> Self {
        self.max_entry_size = bytes;
        self
    }
    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = Some(prefix.into());
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub sets: u64,
    pub deletes: u64,
    pub errors: u64,
}

impl CacheStats {
    pub fn hit_ratio(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[derive(Default)]
struct AtomicStats {
    hits: AtomicU64,
    misses: AtomicU64,
    sets: AtomicU64,
    deletes: AtomicU64,
    errors: AtomicU64,
}

impl AtomicStats {
    fn to_stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            sets: self.sets.load(Ordering::Relaxed),
            deletes: self.deletes.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }
}

/// The cache as seen by the rest of the crate.
///
/// All four operations are total. Backend faults and (de)serialization
/// failures are logged, counted in [`CacheStats::errors`] and absorbed:
/// reads degrade to a miss, writes to a no-op. Values are stored as JSON text.
pub struct CacheManager {
    config: CacheConfig,
    backend: Box<dyn CacheBackend>,
    stats: Arc<AtomicStats>,
}

impl CacheManager {
    pub fn new(config: CacheConfig, backend: Box<dyn CacheBackend>) -> Self {
        Self {
            config,
            backend,
            stats: Arc::new(AtomicStats::default()),
        }
    }

    /// Manager over an unbounded in-memory backend with default settings.
    pub fn in_memory() -> Self {
        Self::new(CacheConfig::default(), Box::new(super::MemoryBackend::new()))
    }

    pub async fn get<T: DeserializeOwned>(&self, key: &CacheKey) -> Option<T> {
        if !self.config.enabled {
            return None;
        }
        let prefixed = self.prefix_key(key);
        match self.backend.get(&prefixed).await {
            Ok(Some(data)) => match serde_json::from_str(&data) {
                Ok(val) => {
                    self.stats.hits.fetch_add(1, Ordering::Relaxed);
                    debug!(key = %prefixed, "Cache hit");
                    Some(val)
                }
                Err(e) => {
                    self.absorb("get", &prefixed, Error::from(e));
                    self.stats.misses.fetch_add(1, Ordering::Relaxed);
                    // an undecodable entry must not keep `exists` true
                    self.purge(&prefixed).await;
                    None
                }
            },
            Ok(None) => {
                self.stats.misses.fetch_add(1, Ordering::Relaxed);
                debug!(key = %prefixed, "Cache miss");
                None
            }
            Err(e) => {
                self.absorb("get", &prefixed, e);
                self.stats.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Store `value`; `None` or a zero TTL stores without expiry.
    pub async fn set<T>(&self, key: &CacheKey, value: &T, ttl: Option<Duration>)
    where
        T: Serialize + ?Sized,
    {
        if !self.config.enabled {
            return;
        }
        let prefixed = self.prefix_key(key);
        let data = match serde_json::to_string(value) {
            Ok(d) => d,
            Err(e) => {
                self.absorb("set", &prefixed, Error::from(e));
                self.purge(&prefixed).await;
                return;
            }
        };
        if data.len() > self.config.max_entry_size {
            debug!(key = %prefixed, size = data.len(), "Entry exceeds max size, not cached");
            // the previous value is stale now; never serve it after this write
            self.purge(&prefixed).await;
            return;
        }
        let ttl = ttl.filter(|t| !t.is_zero());
        match self.backend.set(&prefixed, &data, ttl).await {
            Ok(()) => {
                self.stats.sets.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => self.absorb("set", &prefixed, e),
        }
    }

    pub async fn delete(&self, key: &CacheKey) {
        if !self.config.enabled {
            return;
        }
        let prefixed = self.prefix_key(key);
        match self.backend.delete(&prefixed).await {
            Ok(true) => {
                self.stats.deletes.fetch_add(1, Ordering::Relaxed);
            }
            Ok(false) => {}
            Err(e) => self.absorb("delete", &prefixed, e),
        }
    }

    pub async fn exists(&self, key: &CacheKey) -> bool {
        if !self.config.enabled {
            return false;
        }
        let prefixed = self.prefix_key(key);
        // read the payload so `exists` agrees with `get` on undecodable entries
        match self.backend.get(&prefixed).await {
            Ok(Some(data)) => {
                if serde_json::from_str::<IgnoredAny>(&data).is_ok() {
                    true
                } else {
                    let err = Error::cache_unavailable_with_context(
                        "stored entry is not valid JSON",
                        ErrorContext::new().with_source("cache_manager"),
                    );
                    self.absorb("exists", &prefixed, err);
                    self.purge(&prefixed).await;
                    false
                }
            }
            Ok(None) => false,
            Err(e) => {
                self.absorb("exists", &prefixed, e);
                false
            }
        }
    }

    /// Remove every entry this manager's backend holds.
    pub async fn clear(&self) {
        if let Err(e) = self.backend.clear().await {
            self.stats.errors.fetch_add(1, Ordering::Relaxed);
            warn!(backend = self.backend.name(), error = %e, "Cache clear failed, ignoring");
        }
    }

    /// Live entry count, or `None` when the backend cannot tell.
    pub async fn len(&self) -> Option<usize> {
        match self.backend.len().await {
            Ok(n) => Some(n),
            Err(e) => {
                self.stats.errors.fetch_add(1, Ordering::Relaxed);
                warn!(backend = self.backend.name(), error = %e, "Cache len failed");
                None
            }
        }
    }

    pub fn stats(&self) -> CacheStats {
        self.stats.to_stats()
    }
    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }
    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    fn absorb(&self, op: &str, key: &CacheKey, err: Error) {
        self.stats.errors.fetch_add(1, Ordering::Relaxed);
        warn!(
            backend = self.backend.name(),
            op,
            key = %key,
            error = %err,
            "Cache operation failed, continuing without cache"
        );
    }

    /// Best-effort removal of a stale entry.
    async fn purge(&self, key: &CacheKey) {
        if let Err(e) = self.backend.delete(key).await {
            self.absorb("delete", key, e);
        }
    }

    fn prefix_key(&self, key: &CacheKey) -> CacheKey {
        match self.config.key_prefix {
            Some(ref p) => key.with_prefix(p),
            None => key.clone(),
        }
    }
}

impl std::fmt::Debug for CacheManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheManager")
            .field("backend", &self.backend.name())
            .field("config", &self.config)
            .finish()
    }
}
