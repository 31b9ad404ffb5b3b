//! Stub upstream client shared by the integration tests.

#![allow(dead_code)]

use scout::{CallArgs, CapabilitySource, CapabilityTable, Error, ResolveThenFetch};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tweet {
    pub id: String,
    pub text: String,
}

/// Social-network-shaped client: resolve a username, list that user's posts.
#[derive(Default)]
pub struct StubTwitter {
    pub user_calls: AtomicUsize,
    pub resolve_calls: AtomicUsize,
    pub tweet_calls: AtomicUsize,
    pub fail_users: AtomicBool,
    pub delay: Duration,
}

impl StubTwitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    pub fn user_calls(&self) -> usize {
        self.user_calls.load(Ordering::SeqCst)
    }

    pub fn resolve_calls(&self) -> usize {
        self.resolve_calls.load(Ordering::SeqCst)
    }

    pub fn tweet_calls(&self) -> usize {
        self.tweet_calls.load(Ordering::SeqCst)
    }

    pub fn set_failing(&self, failing: bool) {
        self.fail_users.store(failing, Ordering::SeqCst);
    }
}

impl CapabilitySource for StubTwitter {
    fn register_capabilities(table: &mut CapabilityTable<Self>) {
        table
            .register("get_user", |tw: Arc<StubTwitter>, args: CallArgs| async move {
                tw.user_calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(tw.delay).await;
                if tw.fail_users.load(Ordering::SeqCst) {
                    return Err(Error::upstream("get_user", "503 Service Unavailable"));
                }
                let username: String = args.require("username", 0)?;
                Ok(json!({ "data": { "id": format!("{}-id", username), "username": username } }))
            })
            .register_fn("resolve_id", |tw, args| {
                tw.resolve_calls.fetch_add(1, Ordering::SeqCst);
                let username: String = args.require("username", 0)?;
                Ok(json!(format!("{}-id", username)))
            })
            .register_fn("get_users_tweets", |tw, args| {
                tw.tweet_calls.fetch_add(1, Ordering::SeqCst);
                let id: String = args.require("id", 0)?;
                Ok(json!({ "data": [
                    { "id": "1", "text": format!("hello from {}", id) },
                    { "id": "2", "text": "second" },
                ] }))
            })
            .register_fn("get_quiet_tweets", |_, _| Ok(json!({ "data": null })));
    }
}

pub fn tweets_plan(username: &str) -> ResolveThenFetch<Tweet> {
    ResolveThenFetch::new("get_user", "get_users_tweets")
        .resolve_args(CallArgs::new().named("username", username))
        .id_pointer("/data/id")
        .items_pointer("/data")
}
