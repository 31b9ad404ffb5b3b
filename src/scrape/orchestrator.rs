//! Orchestrator: runs one plan at a time against a cached client.

use super::plan::{FetchContext, ScrapePlan};
use super::result::{ScrapeResult, ScrapeSource};
use crate::adapter::{CapabilityAdapter, CapabilitySource};
use crate::cache::CacheManager;
use crate::config::TtlPolicy;
use crate::memo::Memoizer;
use crate::{Error, Result};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

/// Lifecycle of an orchestrator.
///
/// `Idle -> Fetching -> Completed | Failed`, and back to `Fetching` on the
/// next scrape. A scrape dropped mid-flight counts as `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrapeState {
    Idle,
    Fetching,
    Completed,
    Failed,
}

impl std::fmt::Display for ScrapeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ScrapeState::Idle => "idle",
            ScrapeState::Fetching => "fetching",
            ScrapeState::Completed => "completed",
            ScrapeState::Failed => "failed",
        };
        f.write_str(s)
    }
}

pub struct ScrapeOrchestrator<C> {
    adapter: CapabilityAdapter<C>,
    memo: Memoizer,
    ttl: TtlPolicy,
    timeout: Option<Duration>,
    state: Mutex<ScrapeState>,
}

impl<C: CapabilitySource> ScrapeOrchestrator<C> {
    pub fn new(client: Arc<C>, cache: Option<Arc<CacheManager>>) -> Self {
        Self::from_adapter(CapabilityAdapter::new(client), cache)
    }
}

impl<C: Send + Sync + 'static> ScrapeOrchestrator<C> {
    pub fn from_adapter(adapter: CapabilityAdapter<C>, cache: Option<Arc<CacheManager>>) -> Self {
        Self {
            adapter,
            memo: Memoizer::new(cache),
            ttl: TtlPolicy::default(),
            timeout: None,
            state: Mutex::new(ScrapeState::Idle),
        }
    }

    pub fn with_ttl_policy(mut self, ttl: TtlPolicy) -> Self {
        self.ttl = ttl;
        self
    }

    /// Abort a scrape that runs longer than `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Replace the memoizer, e.g. to set a key prefix or single-flight.
    pub fn with_memoizer(mut self, memo: Memoizer) -> Self {
        self.memo = memo;
        self
    }

    pub fn adapter(&self) -> &CapabilityAdapter<C> {
        &self.adapter
    }

    pub fn client(&self) -> &Arc<C> {
        self.adapter.client()
    }

    pub fn ttl_policy(&self) -> &TtlPolicy {
        &self.ttl
    }

    pub fn state(&self) -> ScrapeState {
        *self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Run `plan`, reporting any failure inside the envelope.
    pub async fn scrape<P>(&self, plan: &P) -> ScrapeResult<P::Item>
    where
        P: ScrapePlan<C>,
    {
        envelope(self.run(plan, None).await)
    }

    /// Like [`scrape`](Self::scrape), aborting when `token` is cancelled.
    pub async fn scrape_with_cancel<P>(
        &self,
        plan: &P,
        token: CancellationToken,
    ) -> ScrapeResult<P::Item>
    where
        P: ScrapePlan<C>,
    {
        envelope(self.run(plan, Some(&token)).await)
    }

    /// Like [`scrape`](Self::scrape), but the error that stopped the plan is returned.
    pub async fn try_scrape<P>(&self, plan: &P) -> Result<ScrapeResult<P::Item>>
    where
        P: ScrapePlan<C>,
    {
        self.run(plan, None).await.map(ScrapeResult::success)
    }

    async fn run<P>(&self, plan: &P, cancel: Option<&CancellationToken>) -> Result<Vec<P::Item>>
    where
        P: ScrapePlan<C>,
    {
        let guard = self.begin()?;
        let run_id = Uuid::new_v4();
        let started = Instant::now();
        info!(run_id = %run_id, plan = plan.name(), "Scrape started");

        let ctx = FetchContext::new(&self.adapter, &self.memo, &self.ttl);
        let work = async {
            match self.timeout {
                Some(limit) => tokio::time::timeout(limit, plan.run(&ctx))
                    .await
                    .unwrap_or_else(|_| {
                        Err(Error::cancelled(format!("timed out after {:?}", limit)))
                    }),
                None => plan.run(&ctx).await,
            }
        };
        let outcome = match cancel {
            Some(token) => tokio::select! {
                biased;
                _ = token.cancelled() => Err(Error::cancelled("cancelled by caller")),
                res = work => res,
            },
            None => work.await,
        };

        let elapsed_ms = started.elapsed().as_millis() as u64;
        match &outcome {
            Ok(items) => {
                guard.finish(ScrapeState::Completed);
                info!(run_id = %run_id, items = items.len(), elapsed_ms, "Scrape completed");
            }
            Err(e) => {
                guard.finish(ScrapeState::Failed);
                warn!(run_id = %run_id, error = %e, elapsed_ms, "Scrape failed");
            }
        }
        outcome
    }

    fn begin(&self) -> Result<StateGuard<'_>> {
        let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        if *state == ScrapeState::Fetching {
            return Err(Error::ScrapeInProgress);
        }
        *state = ScrapeState::Fetching;
        Ok(StateGuard {
            state: &self.state,
            finished: false,
        })
    }
}

impl<C> std::fmt::Debug for ScrapeOrchestrator<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScrapeOrchestrator")
            .field("adapter", &self.adapter.to_string())
            .field("memo", &self.memo)
            .field("timeout", &self.timeout)
            .finish()
    }
}

fn envelope<T>(outcome: Result<Vec<T>>) -> ScrapeResult<T> {
    match outcome {
        Ok(items) => ScrapeResult::success(items),
        Err(e) => ScrapeResult::failure(e),
    }
}

/// Leaves the orchestrator in `Failed` unless the scrape reports back.
struct StateGuard<'a> {
    state: &'a Mutex<ScrapeState>,
    finished: bool,
}

impl StateGuard<'_> {
    fn finish(mut self, next: ScrapeState) {
        *self.state.lock().unwrap_or_else(|p| p.into_inner()) = next;
        self.finished = true;
    }
}

impl Drop for StateGuard<'_> {
    fn drop(&mut self) {
        if !self.finished {
            *self.state.lock().unwrap_or_else(|p| p.into_inner()) = ScrapeState::Failed;
        }
    }
}

/// A source-specific scraper: knows where its data lives and how to fetch it.
#[async_trait]
pub trait Scraper<T>: Send + Sync {
    fn source(&self) -> &ScrapeSource;

    async fn scrape(&self) -> ScrapeResult<T>;
}

/// A [`Scraper`] built from an orchestrator and a fixed plan.
pub struct PlannedScraper<C, P> {
    orchestrator: ScrapeOrchestrator<C>,
    plan: P,
    source: ScrapeSource,
}

impl<C, P> PlannedScraper<C, P>
where
    C: Send + Sync + 'static,
    P: ScrapePlan<C>,
{
    pub fn new(orchestrator: ScrapeOrchestrator<C>, plan: P, source: ScrapeSource) -> Self {
        Self {
            orchestrator,
            plan,
            source,
        }
    }

    pub fn orchestrator(&self) -> &ScrapeOrchestrator<C> {
        &self.orchestrator
    }
}

#[async_trait]
impl<C, P> Scraper<P::Item> for PlannedScraper<C, P>
where
    C: Send + Sync + 'static,
    P: ScrapePlan<C>,
{
    fn source(&self) -> &ScrapeSource {
        &self.source
    }

    async fn scrape(&self) -> ScrapeResult<P::Item> {
        self.orchestrator
            .scrape(&self.plan)
            .await
            .with_source(self.source.clone())
    }
}
