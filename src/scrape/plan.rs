//! Scrape plans: the operation-specific sequence of fetch steps.

use crate::adapter::{CallArgs, CapabilityAdapter};
use crate::config::{TtlPolicy, Volatility};
use crate::memo::Memoizer;
use crate::{Error, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::marker::PhantomData;
use std::sync::Arc;

/// What a plan sees while it runs: memoized access to the client's capabilities.
pub struct FetchContext<'a, C> {
    adapter: &'a CapabilityAdapter<C>,
    memo: &'a Memoizer,
    ttl: &'a TtlPolicy,
}

impl<'a, C: Send + Sync + 'static> FetchContext<'a, C> {
    pub(crate) fn new(
        adapter: &'a CapabilityAdapter<C>,
        memo: &'a Memoizer,
        ttl: &'a TtlPolicy,
    ) -> Self {
        Self { adapter, memo, ttl }
    }

    /// Invoke `capability` through the cache, with a TTL picked from `volatility`.
    ///
    /// The capability must exist even when a cached value is available, so a
    /// client that lost an operation fails loudly instead of serving stale data.
    /// Values that do not decode into `T` are reported and not cached.
    pub async fn fetch<T>(
        &self,
        capability: &str,
        args: CallArgs,
        volatility: Volatility,
    ) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
    {
        if !self.adapter.has_capability(capability) {
            return Err(Error::capability_not_found(capability));
        }
        let ttl = self.ttl.ttl_for(capability, volatility);
        let adapter = self.adapter;
        let call_args = args.clone();
        self.memo
            .memoize(capability, &args, ttl, || async move {
                let value = adapter.invoke(capability, call_args).await?;
                Ok(serde_json::from_value(value)?)
            })
            .await
    }

    /// Invoke `capability` directly, bypassing the cache.
    pub async fn fetch_uncached<T>(&self, capability: &str, args: CallArgs) -> Result<T>
    where
        T: DeserializeOwned,
    {
        self.adapter.invoke_as(capability, args).await
    }

    pub fn adapter(&self) -> &CapabilityAdapter<C> {
        self.adapter
    }

    /// Typed client, for steps that call the native API.
    pub fn client(&self) -> &Arc<C> {
        self.adapter.client()
    }
}

/// One scrape's worth of fetch steps.
#[async_trait]
pub trait ScrapePlan<C: Send + Sync + 'static>: Send + Sync {
    type Item: Send;

    fn name(&self) -> &str {
        "scrape"
    }

    async fn run(&self, ctx: &FetchContext<'_, C>) -> Result<Vec<Self::Item>>;
}

/// Resolve an identifier, then fetch the collection that belongs to it.
///
/// The identifier is cached as [`Volatility::Stable`], the collection as
/// [`Volatility::Volatile`]. For example: `get_user(username="alice")`
/// yields `{"data": {"id": "42"}}`, then `get_users_tweets(id="42")`
/// yields `{"data": [...]}`.
pub struct ResolveThenFetch<T> {
    resolve: String,
    resolve_args: CallArgs,
    id_pointer: String,
    collect: String,
    collect_args: CallArgs,
    id_param: String,
    items_pointer: String,
    _item: PhantomData<fn() -> T>,
}

impl<T> ResolveThenFetch<T> {
    pub fn new(resolve: impl Into<String>, collect: impl Into<String>) -> Self {
        Self {
            resolve: resolve.into(),
            resolve_args: CallArgs::new(),
            id_pointer: String::new(),
            collect: collect.into(),
            collect_args: CallArgs::new(),
            id_param: "id".to_string(),
            items_pointer: String::new(),
            _item: PhantomData,
        }
    }

    pub fn resolve_args(mut self, args: CallArgs) -> Self {
        self.resolve_args = args;
        self
    }

    /// JSON pointer to the identifier in the resolve response ("" = whole value).
    pub fn id_pointer(mut self, pointer: impl Into<String>) -> Self {
        self.id_pointer = pointer.into();
        self
    }

    pub fn collect_args(mut self, args: CallArgs) -> Self {
        self.collect_args = args;
        self
    }

    /// Named argument that carries the identifier into the collection call.
    pub fn id_param(mut self, name: impl Into<String>) -> Self {
        self.id_param = name.into();
        self
    }

    /// JSON pointer to the item array in the collection response ("" = whole value).
    pub fn items_pointer(mut self, pointer: impl Into<String>) -> Self {
        self.items_pointer = pointer.into();
        self
    }
}

#[async_trait]
impl<C, T> ScrapePlan<C> for ResolveThenFetch<T>
where
    C: Send + Sync + 'static,
    T: DeserializeOwned + Send,
{
    type Item = T;

    fn name(&self) -> &str {
        &self.collect
    }

    async fn run(&self, ctx: &FetchContext<'_, C>) -> Result<Vec<T>> {
        let resolved: Value = ctx
            .fetch(&self.resolve, self.resolve_args.clone(), Volatility::Stable)
            .await?;
        let id = match resolved.pointer(&self.id_pointer) {
            Some(Value::Null) | None => {
                return Err(Error::upstream(
                    &self.resolve,
                    format!("no identifier at '{}'", self.id_pointer),
                ))
            }
            Some(id) => id.clone(),
        };

        let args = self.collect_args.clone().named(self.id_param.clone(), id);
        let collection: Value = ctx.fetch(&self.collect, args, Volatility::Volatile).await?;
        match collection.pointer(&self.items_pointer) {
            // upstream APIs report "nothing yet" as a missing or null list
            None | Some(Value::Null) => Ok(Vec::new()),
            Some(items @ Value::Array(_)) => Ok(serde_json::from_value(items.clone())?),
            Some(_) => Err(Error::upstream(
                &self.collect,
                format!("expected a list at '{}'", self.items_pointer),
            )),
        }
    }
}
