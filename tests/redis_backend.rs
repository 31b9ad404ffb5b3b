//! Integration tests against a live redis server.
//!
//! Requires a reachable server. Set REDIS_URL=redis://127.0.0.1:6379/15
//! and run with: cargo test --test redis_backend -- --ignored --nocapture

#![cfg(feature = "redis")]

use scout::cache::{CacheConfig, CacheKey, CacheManager, RedisBackend, RedisConfig};
use serde_json::{json, Value};
use std::time::Duration;

fn live_cache(prefix: &str) -> Option<CacheManager> {
    let Ok(url) = std::env::var("REDIS_URL") else {
        eprintln!("REDIS_URL not set, skipping redis integration test");
        return None;
    };
    let config = RedisConfig::new().with_url(url).with_key_prefix(prefix);
    let backend = RedisBackend::new(config).expect("valid redis config");
    Some(CacheManager::new(CacheConfig::default(), Box::new(backend)))
}

#[tokio::test]
#[ignore = "requires redis; run with: cargo test --test redis_backend -- --ignored"]
async fn test_set_get_delete() {
    let Some(cache) = live_cache("scout-test-basic:") else {
        return;
    };
    cache.clear().await;
    let key = CacheKey::new("user:alice");

    cache.set(&key, &json!({ "id": "42" }), None).await;
    assert_eq!(cache.get::<Value>(&key).await, Some(json!({ "id": "42" })));
    assert!(cache.exists(&key).await);
    assert_eq!(cache.len().await, Some(1));

    cache.delete(&key).await;
    assert!(!cache.exists(&key).await);
    assert_eq!(cache.stats().errors, 0);
}

#[tokio::test]
#[ignore = "requires redis; run with: cargo test --test redis_backend -- --ignored"]
async fn test_native_ttl() {
    let Some(cache) = live_cache("scout-test-ttl:") else {
        return;
    };
    let key = CacheKey::new("k");
    cache.set(&key, &json!({ "a": 1 }), Some(Duration::from_secs(1))).await;
    assert!(cache.exists(&key).await);

    tokio::time::sleep(Duration::from_millis(1100)).await;
    assert!(!cache.exists(&key).await);
    assert_eq!(cache.get::<Value>(&key).await, None);
}

#[tokio::test]
#[ignore = "requires redis; run with: cargo test --test redis_backend -- --ignored"]
async fn test_clear_only_touches_own_prefix() {
    let mine = live_cache("scout-test-a:");
    let theirs = live_cache("scout-test-b:");
    let (Some(mine), Some(theirs)) = (mine, theirs) else {
        return;
    };
    let key = CacheKey::new("shared-name");
    mine.set(&key, &1, None).await;
    theirs.set(&key, &2, None).await;

    mine.clear().await;
    assert!(!mine.exists(&key).await);
    assert_eq!(theirs.get::<u32>(&key).await, Some(2));
    theirs.clear().await;
}
