//! Capability handles and the per-client registration table.

use super::args::CallArgs;
use crate::Result;
use futures::future::BoxFuture;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

pub type CapabilityFuture = BoxFuture<'static, Result<Value>>;

type Handler<C> = Arc<dyn Fn(Arc<C>, CallArgs) -> CapabilityFuture + Send + Sync>;

/// A named, invocable operation of a client of type `C`.
pub struct Capability<C> {
    name: Arc<str>,
    handler: Handler<C>,
}

impl<C> Clone for Capability<C> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            handler: self.handler.clone(),
        }
    }
}

impl<C> std::fmt::Debug for Capability<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Capability").field("name", &self.name).finish()
    }
}

impl<C> Capability<C> {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Run the operation against `client`.
    pub async fn call(&self, client: Arc<C>, args: CallArgs) -> Result<Value> {
        (self.handler)(client, args).await
    }
}

/// Registration table a client fills once to describe its operations.
pub struct CapabilityTable<C> {
    entries: HashMap<String, Capability<C>>,
}

impl<C: Send + Sync + 'static> CapabilityTable<C> {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Register an async operation. A later registration under the same name wins.
    pub fn register<F, Fut>(&mut self, name: impl Into<String>, f: F) -> &mut Self
    where
        F: Fn(Arc<C>, CallArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        let name = name.into();
        let handler: Handler<C> =
            Arc::new(move |client: Arc<C>, args: CallArgs| -> CapabilityFuture {
                Box::pin(f(client, args))
            });
        self.entries.insert(
            name.clone(),
            Capability {
                name: Arc::from(name.as_str()),
                handler,
            },
        );
        self
    }

    /// Register a synchronous operation.
    pub fn register_fn<F>(&mut self, name: impl Into<String>, f: F) -> &mut Self
    where
        F: Fn(&C, &CallArgs) -> Result<Value> + Send + Sync + 'static,
    {
        let f = Arc::new(f);
        self.register(name, move |client: Arc<C>, args: CallArgs| {
            let f = f.clone();
            async move { (*f)(client.as_ref(), &args) }
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub(crate) fn into_entries(self) -> HashMap<String, Capability<C>> {
        self.entries
    }
}

impl<C: Send + Sync + 'static> Default for CapabilityTable<C> {
    fn default() -> Self {
        Self::new()
    }
}

/// A client that can enumerate its own public operations.
///
/// Implemented by wrappers around concrete upstream clients (REST APIs,
/// databases, file readers). The table is filled exactly once, when a
/// [`super::CapabilityAdapter`] is built around the client.
pub trait CapabilitySource: Send + Sync + 'static {
    fn register_capabilities(table: &mut CapabilityTable<Self>)
    where
        Self: Sized;
}
