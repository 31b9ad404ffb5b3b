//! # Cache Module
//!
//! Best-effort keyed storage with TTL, used to avoid repeating upstream calls.
//!
//! ## Key Components
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`CacheManager`] | Total get/set/delete/exists; absorbs faults, keeps statistics |
//! | [`CacheBackend`] | Trait for raw stores that report their own failures |
//! | [`MemoryBackend`] | Process-local store, optionally LRU-bounded |
//! | [`RedisBackend`] | Shared store with native TTLs (feature `redis`) |
//! | [`NullBackend`] | Disabled cache |
//! | [`CacheKey`] | Deterministic key derived from an operation and its arguments |
//!
//! ## Expiry
//!
//! Entries written with a TTL read as absent once it elapses. Expiry is
//! checked when the entry is read (`get` and `exists` agree); there is no
//! background sweeper. Writing a key again replaces both value and expiry.
//!
//! ## Failure policy
//!
//! The cache accelerates, it never decides correctness. A backend that is
//! down or returns undecodable data behaves like an empty cache.
//!
//! ```rust
//! use scout::cache::{CacheConfig, CacheKey, CacheManager, MemoryBackend};
//! use std::time::Duration;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let cache = CacheManager::new(CacheConfig::default(), Box::new(MemoryBackend::new()));
//! let key = CacheKey::new("user:alice");
//! cache.set(&key, &"id-1", Some(Duration::from_secs(60))).await;
//! assert_eq!(cache.get::<String>(&key).await.as_deref(), Some("id-1"));
//! # }
//! ```

mod backend;
mod key;
mod manager;
#[cfg(feature = "redis")]
mod redis_backend;
mod redis_config;

pub use backend::{CacheBackend, MemoryBackend, NullBackend};
pub use key::CacheKey;
pub use manager::{CacheConfig, CacheManager, CacheStats};
#[cfg(feature = "redis")]
pub use redis_backend::RedisBackend;
pub use redis_config::RedisConfig;
