//! Cache key derivation.

use crate::adapter::CallArgs;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};
use sha2::{Digest, Sha256};

/// Largest integer an `f64` represents exactly.
const MAX_EXACT_FLOAT_INT: f64 = 9_007_199_254_740_992.0;

/// Opaque cache key.
///
/// Derived keys have the form `"{operation}:{sha256-hex}"`; the operation prefix
/// keeps keys readable in a shared store, the digest carries the identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    pub hash: String,
}

impl CacheKey {
    pub fn new(hash: impl Into<String>) -> Self {
        Self { hash: hash.into() }
    }

    /// Derive a key from an operation name and its call arguments.
    ///
    /// Named arguments (and every nested object) are sorted by key before
    /// encoding, and integral floats are folded to integers, so semantically
    /// equal calls always map to the same key.
    pub fn derive(operation: &str, args: &CallArgs) -> Self {
        let canonical = canonical_string(operation, args);
        Self::new(format!("{}:{}", operation, sha256_hex(canonical.as_bytes())))
    }

    pub fn with_prefix(&self, prefix: &str) -> Self {
        if prefix.is_empty() {
            self.clone()
        } else {
            Self::new(format!("{}{}", prefix, self.hash))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.hash
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.hash)
    }
}

impl From<&str> for CacheKey {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for CacheKey {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

/// Canonical text the digest is computed over.
pub(crate) fn canonical_string(operation: &str, args: &CallArgs) -> String {
    let positional: Vec<Value> = args.positional_args().iter().map(canonicalize).collect();
    let mut named = Map::new();
    for (name, value) in args.named_args() {
        named.insert(name.clone(), canonicalize(value));
    }
    let envelope = Value::Array(vec![
        Value::String(operation.to_string()),
        Value::Array(positional),
        Value::Object(named),
    ]);
    envelope.to_string()
}

fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            let mut sorted = Map::new();
            for (k, v) in entries {
                sorted.insert(k.clone(), canonicalize(v));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        Value::Number(n) => Value::Number(canonical_number(n)),
        other => other.clone(),
    }
}

fn canonical_number(n: &Number) -> Number {
    if n.is_f64() {
        if let Some(f) = n.as_f64() {
            if f.fract() == 0.0 && f.abs() < MAX_EXACT_FLOAT_INT {
                return Number::from(f as i64);
            }
        }
    }
    n.clone()
}

fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher
        .finalize()
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}
