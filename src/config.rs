//! Runtime configuration: cache backend selection, connection parameters and TTLs.
//!
//! Values come from a YAML file, environment variables, or both (environment
//! wins). A `.env` file can seed the environment first.
//!
//! ```yaml
//! cache:
//!   backend: redis
//!   redis:
//!     host: cache.internal
//!     port: 6379
//!     db: 2
//!     key_prefix: "scout:"
//! ttl:
//!   identifier_secs: 2592000
//!   collection_secs: 300
//!   per_operation:
//!     get_users_tweets: 60
//! ```

use crate::cache::{CacheConfig, CacheManager, MemoryBackend, RedisConfig};
use crate::{Error, ErrorContext, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Thirty days: identifiers never change once assigned.
pub const DEFAULT_IDENTIFIER_TTL_SECS: u64 = 2_592_000;
/// Five minutes: collections change often.
pub const DEFAULT_COLLECTION_TTL_SECS: u64 = 300;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoutConfig {
    pub cache: CacheSettings,
    pub ttl: TtlPolicy,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    Memory,
    Redis,
    None,
}

impl std::str::FromStr for BackendKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(BackendKind::Memory),
            "redis" => Ok(BackendKind::Redis),
            "none" | "off" | "disabled" => Ok(BackendKind::None),
            other => Err(Error::configuration_with_context(
                format!("unknown cache backend '{}'", other),
                ErrorContext::new()
                    .with_field_path("cache.backend")
                    .with_details("expected one of: memory, redis, none")
                    .with_source("config"),
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    pub backend: BackendKind,
    /// Upper bound for the memory backend; 0 = unbounded.
    pub max_entries: usize,
    pub max_entry_size: usize,
    pub redis: RedisConfig,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            backend: BackendKind::Memory,
            max_entries: 10_000,
            max_entry_size: CacheConfig::default().max_entry_size,
            redis: RedisConfig::default(),
        }
    }
}

impl CacheSettings {
    /// Build the configured cache. `BackendKind::None` yields no cache, which
    /// turns memoization into pass-through.
    pub fn build(&self) -> Result<Option<Arc<CacheManager>>> {
        let config = CacheConfig::new().with_max_entry_size(self.max_entry_size);
        let manager = match self.backend {
            BackendKind::None => return Ok(None),
            BackendKind::Memory => CacheManager::new(
                config,
                Box::new(MemoryBackend::with_capacity(self.max_entries)),
            ),
            BackendKind::Redis => CacheManager::new(config, self.redis_backend()?),
        };
        Ok(Some(Arc::new(manager)))
    }

    #[cfg(feature = "redis")]
    fn redis_backend(&self) -> Result<Box<dyn crate::cache::CacheBackend>> {
        Ok(Box::new(crate::cache::RedisBackend::new(self.redis.clone())?))
    }

    #[cfg(not(feature = "redis"))]
    fn redis_backend(&self) -> Result<Box<dyn crate::cache::CacheBackend>> {
        Err(Error::configuration_with_context(
            "redis backend requested but the crate was built without it",
            ErrorContext::new()
                .with_field_path("cache.backend")
                .with_details("enable cargo feature 'redis'")
                .with_source("config"),
        ))
    }
}

/// How quickly the data behind an operation changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Volatility {
    /// Immutable once assigned (identifiers, handles).
    Stable,
    /// Changes frequently (timelines, listings).
    Volatile,
    /// Explicit TTL for this call.
    Fixed(Duration),
    /// Store without expiry.
    Forever,
}

/// Per-operation TTL policy.
///
/// Durations keep sub-second precision; in YAML they are written in seconds
/// and may be fractional (`collection_secs: 0.5`). A zero TTL means no expiry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TtlPolicy {
    #[serde(rename = "identifier_secs", with = "duration_secs")]
    pub identifier: Duration,
    #[serde(rename = "collection_secs", with = "duration_secs")]
    pub collection: Duration,
    /// Overrides keyed by capability name. Wins over volatility.
    #[serde(with = "duration_secs_map")]
    pub per_operation: HashMap<String, Duration>,
}

impl Default for TtlPolicy {
    fn default() -> Self {
        Self {
            identifier: Duration::from_secs(DEFAULT_IDENTIFIER_TTL_SECS),
            collection: Duration::from_secs(DEFAULT_COLLECTION_TTL_SECS),
            per_operation: HashMap::new(),
        }
    }
}

impl TtlPolicy {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn with_identifier_ttl(mut self, ttl: Duration) -> Self {
        self.identifier = ttl;
        self
    }
    pub fn with_collection_ttl(mut self, ttl: Duration) -> Self {
        self.collection = ttl;
        self
    }
    pub fn with_override(mut self, operation: impl Into<String>, ttl: Duration) -> Self {
        self.per_operation.insert(operation.into(), ttl);
        self
    }

    /// TTL for one call of `operation`; `None` means no expiry.
    pub fn ttl_for(&self, operation: &str, volatility: Volatility) -> Option<Duration> {
        let ttl = match self.per_operation.get(operation) {
            Some(ttl) => *ttl,
            None => match volatility {
                Volatility::Stable => self.identifier,
                Volatility::Volatile => self.collection,
                Volatility::Fixed(ttl) => ttl,
                Volatility::Forever => return None,
            },
        };
        (!ttl.is_zero()).then_some(ttl)
    }

    /// Zero TTLs mean "cache forever"; say so when a config asks for one.
    fn warn_on_zero(&self) {
        if self.identifier.is_zero() {
            tracing::warn!(field = "ttl.identifier_secs", "TTL of 0 disables expiry");
        }
        if self.collection.is_zero() {
            tracing::warn!(field = "ttl.collection_secs", "TTL of 0 disables expiry");
        }
        for (operation, ttl) in &self.per_operation {
            if ttl.is_zero() {
                tracing::warn!(
                    field = "ttl.per_operation",
                    operation = %operation,
                    "TTL of 0 disables expiry"
                );
            }
        }
    }
}

/// Seconds as a (possibly fractional) number.
mod duration_secs {
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(
        d: &Duration,
        s: S,
    ) -> std::result::Result<S::Ok, S::Error> {
        if d.subsec_nanos() == 0 {
            s.serialize_u64(d.as_secs())
        } else {
            s.serialize_f64(d.as_secs_f64())
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        d: D,
    ) -> std::result::Result<Duration, D::Error> {
        let secs = f64::deserialize(d)?;
        Duration::try_from_secs_f64(secs).map_err(|_| {
            D::Error::custom(format!("invalid TTL {}: expected non-negative seconds", secs))
        })
    }
}

mod duration_secs_map {
    use serde::ser::SerializeMap;
    use serde::{Deserialize, Deserializer, Serializer};
    use std::collections::HashMap;
    use std::time::Duration;

    #[derive(serde::Serialize, serde::Deserialize)]
    struct Secs(#[serde(with = "super::duration_secs")] Duration);

    pub fn serialize<S: Serializer>(
        map: &HashMap<String, Duration>,
        s: S,
    ) -> std::result::Result<S::Ok, S::Error> {
        let mut out = s.serialize_map(Some(map.len()))?;
        for (operation, ttl) in map {
            out.serialize_entry(operation, &Secs(*ttl))?;
        }
        out.end()
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        d: D,
    ) -> std::result::Result<HashMap<String, Duration>, D::Error> {
        let raw = HashMap::<String, Secs>::deserialize(d)?;
        Ok(raw.into_iter().map(|(op, Secs(ttl))| (op, ttl)).collect())
    }
}

impl ScoutConfig {
    pub fn from_yaml_str(text: &str) -> Result<Self> {
        let cfg: Self = serde_yaml::from_str(text).map_err(|e| {
            Error::configuration_with_context(
                "invalid configuration document",
                ErrorContext::new()
                    .with_details(e.to_string())
                    .with_source("config"),
            )
        })?;
        cfg.ttl.warn_on_zero();
        Ok(cfg)
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&text).map_err(|e| match e {
            Error::Configuration {
                message,
                context,
            } => Error::Configuration {
                message,
                context: context.with_field_path(path.display().to_string()),
            },
            other => other,
        })
    }

    /// Defaults overlaid with `SCOUT_*` environment variables.
    pub fn from_env() -> Result<Self> {
        let mut cfg = Self::default();
        cfg.apply_env(|k| std::env::var(k).ok())?;
        Ok(cfg)
    }

    /// Load a `.env` file (missing file is fine), then read the environment.
    pub fn from_dotenv_and_env(dotenv_path: Option<&Path>) -> Result<Self> {
        let loaded = match dotenv_path {
            Some(p) => dotenv::from_path(p).map(|_| ()),
            None => dotenv::dotenv().map(|_| ()),
        };
        if let Err(e) = loaded {
            if !e.not_found() {
                return Err(Error::configuration_with_context(
                    "failed to load .env file",
                    ErrorContext::new()
                        .with_details(e.to_string())
                        .with_source("config"),
                ));
            }
        }
        Self::from_env()
    }

    /// YAML file when given, defaults otherwise; then `.env` and the environment on top.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut cfg = match path {
            Some(p) => Self::from_yaml_file(p)?,
            None => Self::default(),
        };
        if let Err(e) = dotenv::dotenv() {
            if !e.not_found() {
                tracing::warn!(error = %e, "Ignoring unreadable .env file");
            }
        }
        cfg.apply_env(|k| std::env::var(k).ok())?;
        Ok(cfg)
    }

    /// Overlay values from `lookup`; unset variables keep their current value.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("SCOUT_CACHE_BACKEND") {
            self.cache.backend = v.parse()?;
        }
        if let Some(v) = lookup("SCOUT_REDIS_URL") {
            self.cache.redis.url = Some(v);
        }
        if let Some(v) = lookup("SCOUT_REDIS_HOST") {
            self.cache.redis.host = v;
        }
        if let Some(v) = lookup("SCOUT_REDIS_PORT") {
            self.cache.redis.port = parse_env("SCOUT_REDIS_PORT", &v)?;
        }
        if let Some(v) = lookup("SCOUT_REDIS_DB") {
            self.cache.redis.db = parse_env("SCOUT_REDIS_DB", &v)?;
        }
        if let Some(v) = lookup("SCOUT_REDIS_PASSWORD") {
            self.cache.redis.password = Some(v);
        }
        if let Some(v) = lookup("SCOUT_REDIS_PREFIX") {
            self.cache.redis.key_prefix = v;
        }
        if let Some(v) = lookup("SCOUT_TTL_IDENTIFIER_SECS") {
            self.ttl.identifier = parse_env_secs("SCOUT_TTL_IDENTIFIER_SECS", &v)?;
        }
        if let Some(v) = lookup("SCOUT_TTL_COLLECTION_SECS") {
            self.ttl.collection = parse_env_secs("SCOUT_TTL_COLLECTION_SECS", &v)?;
        }
        Ok(())
    }
}

fn parse_env_secs(name: &str, raw: &str) -> Result<Duration> {
    let secs: f64 = parse_env(name, raw)?;
    let ttl = Duration::try_from_secs_f64(secs).map_err(|e| {
        Error::configuration_with_context(
            format!("cannot parse {}", name),
            ErrorContext::new()
                .with_field_path(name)
                .with_details(format!("'{}': {}", raw, e))
                .with_source("config"),
        )
    })?;
    if ttl.is_zero() {
        tracing::warn!(field = name, "TTL of 0 disables expiry");
    }
    Ok(ttl)
}

fn parse_env<T: std::str::FromStr>(name: &str, raw: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    raw.trim().parse::<T>().map_err(|e| {
        Error::configuration_with_context(
            format!("cannot parse {}", name),
            ErrorContext::new()
                .with_field_path(name)
                .with_details(format!("'{}': {}", raw, e))
                .with_source("config"),
        )
    })
}
