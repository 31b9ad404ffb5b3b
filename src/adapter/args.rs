//! Call arguments passed to capabilities.

use crate::{Error, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Positional and named arguments of one capability call.
///
/// Values are plain JSON (null, bool, number, string, array, string-keyed
/// object), so every argument has a canonical form usable for cache keys.
/// Client handles and other opaque objects cannot be passed here; capabilities
/// reach the client through the adapter instead.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CallArgs {
    #[serde(default)]
    positional: Vec<Value>,
    #[serde(default)]
    named: BTreeMap<String, Value>,
}

impl CallArgs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a positional argument.
    pub fn arg(mut self, value: impl Into<Value>) -> Self {
        self.positional.push(value.into());
        self
    }

    /// Set a named argument, replacing any previous value for `name`.
    pub fn named(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.named.insert(name.into(), value.into());
        self
    }

    pub fn positional_args(&self) -> &[Value] {
        &self.positional
    }

    pub fn named_args(&self) -> &BTreeMap<String, Value> {
        &self.named
    }

    pub fn positional(&self, index: usize) -> Option<&Value> {
        self.positional.get(index)
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.named.get(name)
    }

    pub fn is_empty(&self) -> bool {
        self.positional.is_empty() && self.named.is_empty()
    }

    /// Merge `other` into `self`; positional args are appended, named args override.
    pub fn merged(mut self, other: &CallArgs) -> Self {
        self.positional.extend(other.positional.iter().cloned());
        for (k, v) in &other.named {
            self.named.insert(k.clone(), v.clone());
        }
        self
    }

    /// Typed lookup of a named argument, falling back to the positional slot.
    ///
    /// Lets a capability accept either `get_user("alice")` or
    /// `get_user(username="alice")`.
    pub fn require<T: DeserializeOwned>(&self, name: &str, index: usize) -> Result<T> {
        let value = self
            .named
            .get(name)
            .or_else(|| self.positional.get(index))
            .ok_or_else(|| Error::invalid_argument(name, "missing"))?;
        serde_json::from_value(value.clone()).map_err(|e| Error::invalid_argument(name, e))
    }

    /// Typed lookup of an optional named argument.
    pub fn optional<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>> {
        match self.named.get(name) {
            None | Some(Value::Null) => Ok(None),
            Some(v) => serde_json::from_value(v.clone())
                .map(Some)
                .map_err(|e| Error::invalid_argument(name, e)),
        }
    }
}
