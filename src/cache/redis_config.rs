//! Connection settings for the Redis cache backend.

use crate::{Error, ErrorContext, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Connection parameters for the Redis backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RedisConfig {
    pub host: String,
    pub port: u16,
    /// Logical database index.
    pub db: i64,
    pub password: Option<String>,
    /// Full `redis://` URL; overrides host/port/db/password when set.
    pub url: Option<String>,
    /// Namespace prepended to every key.
    pub key_prefix: String,
    #[serde(with = "duration_ms")]
    pub connect_timeout: Duration,
    #[serde(with = "duration_ms")]
    pub op_timeout: Duration,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 6379,
            db: 0,
            password: None,
            url: None,
            key_prefix: "scout:".to_string(),
            connect_timeout: Duration::from_secs(2),
            op_timeout: Duration::from_secs(1),
        }
    }
}

impl RedisConfig {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }
    pub fn with_db(mut self, db: i64) -> Self {
        self.db = db;
        self
    }
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }
    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
    pub fn with_op_timeout(mut self, timeout: Duration) -> Self {
        self.op_timeout = timeout;
        self
    }

    /// Connection URL; the password is percent-encoded by `url`.
    pub fn connection_url(&self) -> Result<String> {
        if let Some(ref raw) = self.url {
            return Ok(raw.clone());
        }
        let mut url = url::Url::parse(&format!("redis://{}:{}/{}", self.host, self.port, self.db))
            .map_err(|e| config_error("cache.redis.host", e))?;
        if let Some(ref password) = self.password {
            url.set_password(Some(password))
                .map_err(|_| config_error("cache.redis.password", "cannot carry a password"))?;
        }
        Ok(url.to_string())
    }
}

pub(super) fn config_error(field: &str, details: impl std::fmt::Display) -> Error {
    Error::configuration_with_context(
        "invalid redis connection settings",
        ErrorContext::new()
            .with_field_path(field)
            .with_details(details.to_string())
            .with_source("redis_backend"),
    )
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> std::result::Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_url_from_parts() {
        let cfg = RedisConfig::new().with_host("cache.internal").with_port(6380).with_db(3);
        assert_eq!(cfg.connection_url().unwrap(), "redis://cache.internal:6380/3");
    }

    #[test]
    fn test_connection_url_encodes_password() {
        let mut cfg = RedisConfig::new();
        cfg.password = Some("p@ss word".to_string());
        let url = cfg.connection_url().unwrap();
        assert!(url.starts_with("redis://:p%40ss%20word@localhost:6379"));
    }

    #[test]
    fn test_explicit_url_wins() {
        let cfg = RedisConfig::new().with_url("redis://10.0.0.5:7000/1");
        assert_eq!(cfg.connection_url().unwrap(), "redis://10.0.0.5:7000/1");
    }
}
