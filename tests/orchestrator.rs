//! End-to-end scrapes against a stub client.

mod common;

use common::{tweets_plan, StubTwitter, Tweet};
use scout::cache::CacheManager;
use scout::{
    CallArgs, Error, PlannedScraper, ResolveThenFetch, ScrapeOrchestrator, ScrapeSource,
    ScrapeState, Scraper, TtlPolicy,
};
use std::sync::Arc;
use std::time::Duration;

fn cached(client: &Arc<StubTwitter>) -> ScrapeOrchestrator<StubTwitter> {
    ScrapeOrchestrator::new(client.clone(), Some(Arc::new(CacheManager::in_memory())))
}

#[tokio::test]
async fn test_resolve_then_fetch() {
    let client = Arc::new(StubTwitter::new());
    let orch = cached(&client);

    let result = orch.scrape(&tweets_plan("alice")).await;

    assert!(result.is_success(), "unexpected error: {:?}", result.error());
    assert_eq!(
        result.data(),
        &[
            Tweet { id: "1".into(), text: "hello from alice-id".into() },
            Tweet { id: "2".into(), text: "second".into() },
        ]
    );
    assert_eq!(orch.state(), ScrapeState::Completed);
}

#[tokio::test]
async fn test_repeat_scrape_is_served_from_cache() {
    let client = Arc::new(StubTwitter::new());
    let orch = cached(&client);

    let first = orch.scrape(&tweets_plan("alice")).await;
    let second = orch.scrape(&tweets_plan("alice")).await;

    assert_eq!(first.data(), second.data());
    assert_eq!(client.user_calls(), 1);
    assert_eq!(client.tweet_calls(), 1);
}

#[tokio::test]
async fn test_without_cache_every_scrape_calls_upstream() {
    let client = Arc::new(StubTwitter::new());
    let orch = ScrapeOrchestrator::new(client.clone(), None);

    orch.scrape(&tweets_plan("alice")).await;
    orch.scrape(&tweets_plan("alice")).await;

    assert_eq!(client.user_calls(), 2);
    assert_eq!(client.tweet_calls(), 2);
}

#[tokio::test]
async fn test_collections_expire_before_identifiers() {
    let client = Arc::new(StubTwitter::new());
    let policy = TtlPolicy::new().with_collection_ttl(Duration::from_secs(1));
    let orch = cached(&client).with_ttl_policy(policy);

    orch.scrape(&tweets_plan("alice")).await;
    tokio::time::sleep(Duration::from_millis(1100)).await;
    orch.scrape(&tweets_plan("alice")).await;

    assert_eq!(client.user_calls(), 1);
    assert_eq!(client.tweet_calls(), 2);
}

#[tokio::test]
async fn test_upstream_failure_yields_error_envelope() {
    let client = Arc::new(StubTwitter::new());
    client.set_failing(true);
    let orch = cached(&client);

    let result = orch.scrape(&tweets_plan("alice")).await;

    assert!(result.is_empty());
    let error = result.error().expect("error should be reported");
    assert!(!error.is_empty());
    assert!(error.contains("503"));
    assert_eq!(orch.state(), ScrapeState::Failed);
    assert_eq!(client.tweet_calls(), 0);

    // the failure was not cached: the next scrape reaches upstream again
    client.set_failing(false);
    let result = orch.scrape(&tweets_plan("alice")).await;
    assert_eq!(result.len(), 2);
    assert_eq!(client.user_calls(), 2);
}

#[tokio::test]
async fn test_try_scrape_raises() {
    let client = Arc::new(StubTwitter::new());
    client.set_failing(true);
    let orch = cached(&client);

    let err = orch.try_scrape(&tweets_plan("alice")).await.unwrap_err();
    assert!(matches!(
        err,
        Error::UpstreamInvocationFailed { ref capability, .. } if capability == "get_user"
    ));
}

#[tokio::test]
async fn test_missing_capability_fails_even_with_warm_cache() {
    let client = Arc::new(StubTwitter::new());
    let orch = cached(&client);
    orch.scrape(&tweets_plan("alice")).await;

    let plan = ResolveThenFetch::<Tweet>::new("get_user", "get_liked_tweets")
        .resolve_args(CallArgs::new().named("username", "alice"))
        .id_pointer("/data/id")
        .items_pointer("/data");
    let err = orch.try_scrape(&plan).await.unwrap_err();
    assert!(matches!(err, Error::CapabilityNotFound { ref name } if name == "get_liked_tweets"));
}

#[tokio::test]
async fn test_missing_identifier_is_reported() {
    let client = Arc::new(StubTwitter::new());
    let orch = cached(&client);
    let plan = tweets_plan("alice").id_pointer("/data/user_id");

    let result = orch.scrape(&plan).await;
    assert!(result.error().unwrap().contains("/data/user_id"));
    assert_eq!(client.tweet_calls(), 0);
}

#[tokio::test]
async fn test_null_collection_is_empty_success() {
    let client = Arc::new(StubTwitter::new());
    let orch = cached(&client);
    let plan = ResolveThenFetch::<Tweet>::new("get_user", "get_quiet_tweets")
        .resolve_args(CallArgs::new().named("username", "alice"))
        .id_pointer("/data/id")
        .items_pointer("/data");

    let result = orch.scrape(&plan).await;
    assert!(result.is_success());
    assert!(result.is_empty());
}

#[tokio::test]
async fn test_concurrent_scrape_is_rejected() {
    let client = Arc::new(StubTwitter::with_delay(Duration::from_millis(100)));
    let orch = ScrapeOrchestrator::new(client.clone(), None);
    let plan = tweets_plan("alice");

    let (first, second) = tokio::join!(orch.try_scrape(&plan), async {
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(orch.state(), ScrapeState::Fetching);
        orch.try_scrape(&plan).await
    });

    assert_eq!(first.unwrap().len(), 2);
    assert!(matches!(second, Err(Error::ScrapeInProgress)));
    assert_eq!(orch.state(), ScrapeState::Completed);
    assert_eq!(client.user_calls(), 1);
}

#[tokio::test]
async fn test_planned_scraper_attaches_source() {
    let client = Arc::new(StubTwitter::new());
    let source = ScrapeSource::new("twitter", "https://api.twitter.com/2").unwrap();
    let scraper = PlannedScraper::new(cached(&client), tweets_plan("alice"), source.clone());

    let result = scraper.scrape().await;
    assert_eq!(result.source(), Some(&source));
    assert_eq!(scraper.source().name(), "twitter");
    assert_eq!(result.len(), 2);
}

#[tokio::test]
async fn test_typed_accessor_shares_client() {
    let client = Arc::new(StubTwitter::new());
    let orch = cached(&client);
    orch.scrape(&tweets_plan("alice")).await;

    assert!(Arc::ptr_eq(orch.client(), &client));
    assert_eq!(orch.client().user_calls(), 1);
    assert_eq!(
        orch.adapter().capability_names(),
        vec!["get_quiet_tweets", "get_user", "get_users_tweets"]
    );
}
