//! Redis-backed shared cache.

use super::backend::CacheBackend;
use super::key::CacheKey;
use super::redis_config::{config_error, RedisConfig};
use crate::{Error, ErrorContext, Result};
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::future::Future;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::debug;

const SCAN_BATCH: usize = 200;

/// Shared backend over Redis with native TTLs.
///
/// The connection is opened on first use; if that fails, the next operation
/// tries again. Every connect and command is bounded by a timeout so an
/// unreachable server surfaces as `CacheUnavailable` instead of a hang.
pub struct RedisBackend {
    client: redis::Client,
    conn: OnceCell<ConnectionManager>,
    config: RedisConfig,
}

impl RedisBackend {
    /// Validate settings. Does not connect.
    pub fn new(config: RedisConfig) -> Result<Self> {
        let url = config.connection_url()?;
        let client = redis::Client::open(url.as_str())
            .map_err(|e| config_error("cache.redis.url", e))?;
        Ok(Self {
            client,
            conn: OnceCell::new(),
            config,
        })
    }

    pub fn config(&self) -> &RedisConfig {
        &self.config
    }

    fn namespaced(&self, key: &CacheKey) -> String {
        format!("{}{}", self.config.key_prefix, key.as_str())
    }

    async fn connection(&self) -> Result<ConnectionManager> {
        let conn = self
            .conn
            .get_or_try_init(|| async {
                debug!(host = %self.config.host, port = self.config.port, "Connecting to redis");
                match tokio::time::timeout(
                    self.config.connect_timeout,
                    ConnectionManager::new(self.client.clone()),
                )
                .await
                {
                    Ok(Ok(conn)) => Ok(conn),
                    Ok(Err(e)) => Err(unavailable("connect", None, e)),
                    Err(_) => Err(unavailable("connect", None, "connect timed out")),
                }
            })
            .await?;
        Ok(conn.clone())
    }

    async fn bounded<T, F>(&self, op: &str, key: Option<&str>, fut: F) -> Result<T>
    where
        F: Future<Output = redis::RedisResult<T>>,
    {
        match tokio::time::timeout(self.config.op_timeout, fut).await {
            Ok(Ok(v)) => Ok(v),
            Ok(Err(e)) => Err(unavailable(op, key, e)),
            Err(_) => Err(unavailable(op, key, "operation timed out")),
        }
    }

    async fn scan_prefix(&self, conn: &mut ConnectionManager) -> Result<Vec<String>> {
        let pattern = format!("{}*", glob_escape(&self.config.key_prefix));
        let mut cursor: u64 = 0;
        let mut keys = Vec::new();
        loop {
            let (next, batch): (u64, Vec<String>) = self
                .bounded(
                    "scan",
                    None,
                    redis::cmd("SCAN")
                        .arg(cursor)
                        .arg("MATCH")
                        .arg(&pattern)
                        .arg("COUNT")
                        .arg(SCAN_BATCH)
                        .query_async(conn),
                )
                .await?;
            keys.extend(batch);
            if next == 0 {
                return Ok(keys);
            }
            cursor = next;
        }
    }
}

/// Escape the characters `SCAN MATCH` treats as glob syntax.
fn glob_escape(literal: &str) -> String {
    let mut out = String::with_capacity(literal.len());
    for c in literal.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn unavailable(op: &str, key: Option<&str>, details: impl std::fmt::Display) -> Error {
    let mut ctx = ErrorContext::new()
        .with_details(details.to_string())
        .with_source("redis_backend");
    if let Some(k) = key {
        ctx = ctx.with_field_path(k);
    }
    Error::cache_unavailable_with_context(format!("redis {} failed", op), ctx)
}

#[async_trait]
impl CacheBackend for RedisBackend {
    async fn get(&self, key: &CacheKey) -> Result<Option<String>> {
        let k = self.namespaced(key);
        let mut conn = self.connection().await?;
        self.bounded("get", Some(k.as_str()), conn.get::<_, Option<String>>(&k))
            .await
    }

    async fn set(&self, key: &CacheKey, value: &str, ttl: Option<Duration>) -> Result<()> {
        let k = self.namespaced(key);
        let mut conn = self.connection().await?;
        match ttl {
            Some(ttl) => {
                let ms = (ttl.as_millis() as u64).max(1);
                self.bounded("psetex", Some(k.as_str()), conn.pset_ex::<_, _, ()>(&k, value, ms))
                    .await
            }
            // plain SET also drops any expiry left by an earlier write
            None => {
                self.bounded("set", Some(k.as_str()), conn.set::<_, _, ()>(&k, value))
                    .await
            }
        }
    }

    async fn delete(&self, key: &CacheKey) -> Result<bool> {
        let k = self.namespaced(key);
        let mut conn = self.connection().await?;
        let removed: i64 = self.bounded("del", Some(k.as_str()), conn.del(&k)).await?;
        Ok(removed > 0)
    }

    async fn exists(&self, key: &CacheKey) -> Result<bool> {
        let k = self.namespaced(key);
        let mut conn = self.connection().await?;
        self.bounded("exists", Some(k.as_str()), conn.exists::<_, bool>(&k))
            .await
    }

    async fn clear(&self) -> Result<()> {
        let mut conn = self.connection().await?;
        let keys = self.scan_prefix(&mut conn).await?;
        for chunk in keys.chunks(SCAN_BATCH) {
            let _: i64 = self
                .bounded("del", None, conn.del(chunk.to_vec()))
                .await?;
        }
        Ok(())
    }

    async fn len(&self) -> Result<usize> {
        let mut conn = self.connection().await?;
        Ok(self.scan_prefix(&mut conn).await?.len())
    }

    fn name(&self) -> &'static str {
        "redis"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keys_are_namespaced() {
        let backend = RedisBackend::new(RedisConfig::new().with_key_prefix("scout:")).unwrap();
        assert_eq!(backend.namespaced(&CacheKey::new("get_user:ab")), "scout:get_user:ab");
    }

    #[test]
    fn test_scan_pattern_matches_prefix_literally() {
        assert_eq!(glob_escape("scout:"), "scout:");
        assert_eq!(glob_escape("scout[a]:"), "scout\\[a\\]:");
        assert_eq!(glob_escape("a*b?c\\"), "a\\*b\\?c\\\\");
    }

    #[tokio::test]
    async fn test_unreachable_server_reports_unavailable() {
        let backend = RedisBackend::new(
            RedisConfig::new()
                .with_host("127.0.0.1")
                .with_port(1)
                .with_connect_timeout(Duration::from_millis(300)),
        )
        .unwrap();
        let err = backend.get(&CacheKey::new("k")).await.unwrap_err();
        assert!(matches!(err, Error::CacheUnavailable { .. }));
    }
}
