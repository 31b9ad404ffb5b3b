use crate::{Error, ErrorContext, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Where scraped data comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScrapeSource {
    name: String,
    url: String,
}

impl ScrapeSource {
    /// `url` must be absolute, with a scheme and a host.
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Result<Self> {
        let url = url.into();
        let parsed = url::Url::parse(&url).map_err(|e| invalid_url(&url, e))?;
        if !parsed.has_host() {
            return Err(invalid_url(&url, "missing host"));
        }
        Ok(Self {
            name: name.into(),
            url,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl std::fmt::Display for ScrapeSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.name, self.url)
    }
}

fn invalid_url(url: &str, details: impl std::fmt::Display) -> Error {
    Error::configuration_with_context(
        format!("Invalid URL: {}", url),
        ErrorContext::new()
            .with_field_path("source.url")
            .with_details(details.to_string())
            .with_source("scrape_source"),
    )
}

/// Outcome of one scrape: the fetched items, when they were fetched, and
/// what went wrong if nothing could be fetched.
///
/// Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScrapeResult<T> {
    data: Vec<T>,
    timestamp: DateTime<Utc>,
    error: Option<String>,
    source: Option<ScrapeSource>,
}

impl<T> ScrapeResult<T> {
    pub fn success(data: Vec<T>) -> Self {
        Self {
            data,
            timestamp: Utc::now(),
            error: None,
            source: None,
        }
    }

    pub fn failure(error: impl std::fmt::Display) -> Self {
        Self {
            data: Vec::new(),
            timestamp: Utc::now(),
            error: Some(error.to_string()),
            source: None,
        }
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn with_source(mut self, source: ScrapeSource) -> Self {
        self.source = Some(source);
        self
    }

    pub fn data(&self) -> &[T] {
        &self.data
    }

    pub fn into_data(self) -> Vec<T> {
        self.data
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn source(&self) -> Option<&ScrapeSource> {
        self.source.as_ref()
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
