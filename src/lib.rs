//! # scout
//!
//! Fetch-with-cache orchestration for third-party data clients.
//!
//! ## Overview
//!
//! A scrape calls a handful of upstream operations, where some results change
//! rarely (a user's numeric id) and some change constantly (that user's latest
//! posts). This crate wraps an arbitrary client so every operation can be
//! invoked by name, caches each call under a key derived from the operation
//! and its arguments, and runs the steps of a scrape as a small state machine
//! whose outcome is always a [`ScrapeResult`].
//!
//! ## Core Philosophy
//!
//! - **Cache is best-effort**: an unreachable or corrupt cache behaves like an empty one
//! - **Deterministic keys**: named-argument order never changes a [`CacheKey`]
//! - **Explicit surfaces**: clients register their capabilities, nothing is discovered
//! - **Failures are data**: [`ScrapeOrchestrator::scrape`] reports errors inside the envelope
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use scout::{CallArgs, CapabilitySource, CapabilityTable};
//! use scout::{ResolveThenFetch, ScoutConfig, ScrapeOrchestrator};
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! struct Directory;
//!
//! impl CapabilitySource for Directory {
//!     fn register_capabilities(table: &mut CapabilityTable<Self>) {
//!         table
//!             .register_fn("get_user", |_, args| {
//!                 let name: String = args.require("username", 0)?;
//!                 Ok(json!({ "data": { "id": format!("id-{}", name) } }))
//!             })
//!             .register_fn("get_users_tweets", |_, _| Ok(json!({ "data": [] })));
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> scout::Result<()> {
//!     let config = ScoutConfig::load(None)?;
//!     let orchestrator = ScrapeOrchestrator::new(Arc::new(Directory), config.cache.build()?)
//!         .with_ttl_policy(config.ttl);
//!
//!     let plan = ResolveThenFetch::<serde_json::Value>::new("get_user", "get_users_tweets")
//!         .resolve_args(CallArgs::new().named("username", "alice"))
//!         .id_pointer("/data/id")
//!         .items_pointer("/data");
//!
//!     let result = orchestrator.scrape(&plan).await;
//!     println!("{} items, error: {:?}", result.len(), result.error());
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`cache`] | Keys, backends and the fault-absorbing cache manager |
//! | [`adapter`] | Named, uniform invocation of a client's operations |
//! | [`memo`] | Cache-or-compute around a single fetch step |
//! | [`scrape`] | Plans, the orchestrator state machine and result envelopes |
//! | [`config`] | YAML / environment configuration and TTL policy |

pub mod adapter;
pub mod cache;
pub mod config;
pub mod memo;
pub mod scrape;

// Re-export main types for convenience
pub use adapter::{CallArgs, Capability, CapabilityAdapter, CapabilitySource, CapabilityTable};
pub use cache::{CacheBackend, CacheConfig, CacheKey, CacheManager, MemoryBackend};
pub use config::{ScoutConfig, TtlPolicy, Volatility};
pub use memo::Memoizer;
pub use scrape::{
    FetchContext, PlannedScraper, ResolveThenFetch, ScrapeOrchestrator, ScrapePlan,
    ScrapeResult, ScrapeSource, ScrapeState, Scraper,
};

/// Result type alias for the library
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for the library
pub mod error;
pub use error::{Error, ErrorContext};
