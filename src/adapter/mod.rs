//! Capability adapter: a uniform "invoke by name" surface over an external client.
//!
//! # Capability Adapter Module
//!
//! Generic scraping code does not know the concrete shape of the client it
//! drives. The adapter snapshots the client's operations into a name → handle
//! table once, at construction, and dispatches [`CapabilityAdapter::invoke`]
//! through it. Code that does know the client type uses
//! [`CapabilityAdapter::client`] and calls the native API directly; both paths
//! share the same `Arc<C>`, so they always observe the same client state.
//!
//! ## Example
//!
//! ```rust
//! use scout::adapter::{CallArgs, CapabilityAdapter, CapabilitySource, CapabilityTable};
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! struct Directory;
//!
//! impl Directory {
//!     fn lookup(&self, name: &str) -> String {
//!         format!("id-{}", name.len())
//!     }
//! }
//!
//! impl CapabilitySource for Directory {
//!     fn register_capabilities(table: &mut CapabilityTable<Self>) {
//!         table.register_fn("lookup", |dir, args| {
//!             let name: String = args.require("name", 0)?;
//!             Ok(json!(dir.lookup(&name)))
//!         });
//!     }
//! }
//!
//! # #[tokio::main]
//! # async fn main() -> scout::Result<()> {
//! let adapter = CapabilityAdapter::new(Arc::new(Directory));
//! let id = adapter.invoke("lookup", CallArgs::new().arg("alice")).await?;
//! assert_eq!(id, json!("id-5"));
//! assert_eq!(adapter.client().lookup("bob"), "id-3");
//! # Ok(())
//! # }
//! ```

mod args;
mod capability;

pub use args::CallArgs;
pub use capability::{Capability, CapabilityFuture, CapabilitySource, CapabilityTable};

use crate::{Error, Result};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

pub struct CapabilityAdapter<C> {
    client: Arc<C>,
    capabilities: HashMap<String, Capability<C>>,
}

impl<C> Clone for CapabilityAdapter<C> {
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
            capabilities: self.capabilities.clone(),
        }
    }
}

impl<C: CapabilitySource> CapabilityAdapter<C> {
    /// Wrap `client`, discovering its capabilities once.
    pub fn new(client: Arc<C>) -> Self {
        let mut table = CapabilityTable::new();
        C::register_capabilities(&mut table);
        Self::from_table(client, table)
    }
}

impl<C: Send + Sync + 'static> CapabilityAdapter<C> {
    /// Wrap `client` with an explicitly built table, for clients that do not
    /// implement [`CapabilitySource`] or need a narrowed surface.
    pub fn from_table(client: Arc<C>, table: CapabilityTable<C>) -> Self {
        let capabilities = table.into_entries();
        debug!(
            client = std::any::type_name::<C>(),
            count = capabilities.len(),
            "Discovered capabilities"
        );
        Self {
            client,
            capabilities,
        }
    }

    /// Invoke a capability by name and return its value unmodified.
    pub async fn invoke(&self, name: &str, args: CallArgs) -> Result<Value> {
        let capability = self
            .capabilities
            .get(name)
            .ok_or_else(|| Error::capability_not_found(name))?;
        debug!(capability = name, "Invoking capability");
        capability
            .call(self.client.clone(), args)
            .await
            .map_err(|e| match e {
                Error::UpstreamInvocationFailed { .. }
                | Error::InvalidArgument { .. }
                | Error::Cancelled { .. } => e,
                other => Error::upstream(name, other),
            })
    }

    /// Invoke a capability and decode its value into `T`.
    pub async fn invoke_as<T: DeserializeOwned>(&self, name: &str, args: CallArgs) -> Result<T> {
        let value = self.invoke(name, args).await?;
        Ok(serde_json::from_value(value)?)
    }
}

impl<C> CapabilityAdapter<C> {
    /// Copy of the discovered table. Changes to the copy do not reach the adapter.
    pub fn list_capabilities(&self) -> HashMap<String, Capability<C>> {
        self.capabilities.clone()
    }

    /// Sorted capability names.
    pub fn capability_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.capabilities.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn has_capability(&self, name: &str) -> bool {
        self.capabilities.contains_key(name)
    }

    /// The strongly-typed client, for call sites that know its concrete API.
    pub fn client(&self) -> &Arc<C> {
        &self.client
    }
}

impl<C> std::fmt::Display for CapabilityAdapter<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let full = std::any::type_name::<C>();
        let short = full.rsplit("::").next().unwrap_or(full);
        write!(f, "CapabilityAdapter({})", short)
    }
}

impl<C> std::fmt::Debug for CapabilityAdapter<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapabilityAdapter")
            .field("client", &std::any::type_name::<C>())
            .field("capabilities", &self.capability_names())
            .finish()
    }
}
