//! # Scrape Module
//!
//! Drives fetch steps against a [`CapabilityAdapter`](crate::adapter::CapabilityAdapter),
//! caching each step, and packages the outcome in a [`ScrapeResult`].
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`ScrapeOrchestrator`] | Runs one plan at a time and tracks [`ScrapeState`] |
//! | [`ScrapePlan`] | The steps of one scrape, run against a [`FetchContext`] |
//! | [`ResolveThenFetch`] | Resolve an identifier, then fetch its collection |
//! | [`Scraper`] | Source-bound scraper returning envelopes |
//! | [`ScrapeResult`] | Items, timestamp and error of one scrape |

mod orchestrator;
mod plan;
mod result;

pub use orchestrator::{PlannedScraper, ScrapeOrchestrator, ScrapeState, Scraper};
pub use plan::{FetchContext, ResolveThenFetch, ScrapePlan};
pub use result::{ScrapeResult, ScrapeSource};
