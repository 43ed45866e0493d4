//! Search backend implementations
//!
//! Every backend is described by a [`BackendDialect`]: how to turn a keyword
//! and task options into a request URL, and how to pull organic hits back out
//! of whatever the backend answers with. Dialects live in a
//! [`DialectRegistry`] keyed by backend identifier, and one
//! [`BackendAdapter`] serves all of them through a shared [`Transport`].

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use url::Url;

use crate::error::{SearchError, SearchResult};
use crate::types::{CanonicalResult, SearchTask, TaskOptions};

pub mod adapter;
pub mod baidu;
pub mod bing;
pub mod dates;
pub mod duckduckgo;
pub mod extract;
pub mod google;
pub mod searxng;
pub mod transport;
pub mod yandex;

pub use adapter::BackendAdapter;
pub use transport::{HttpTransport, Transport};

/// Shape of a backend's response body
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseFormat {
    /// Structured payload with an organic results array
    Json,
    /// Raw HTML search page
    Markup,
}

impl ResponseFormat {
    /// `Accept` header value for a direct request
    pub fn accept_header(self) -> &'static str {
        match self {
            Self::Json => "application/json",
            Self::Markup => "text/html,application/xhtml+xml",
        }
    }
}

/// A fully built outbound request
#[derive(Debug, Clone, PartialEq)]
pub struct BackendRequest {
    pub backend: String,
    pub url: Url,
    pub format: ResponseFormat,
}

/// One organic hit as the backend reported it, before validation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawHit {
    pub title: String,
    pub url: String,
    pub snippet: String,
    /// Rank reported by the backend, if any
    pub rank: Option<u32>,
}

/// Request builder and response parser for one backend
pub trait BackendDialect: Send + Sync {
    /// Identifier this dialect is registered under
    fn name(&self) -> &str;

    fn format(&self) -> ResponseFormat;

    /// Build the request URL for a keyword
    ///
    /// `today` anchors relative date windows.
    fn build_request(
        &self,
        endpoint: &str,
        keyword: &str,
        options: &TaskOptions,
        today: NaiveDate,
    ) -> SearchResult<BackendRequest>;

    /// Extract organic hits from a response body
    fn parse_response(&self, body: &str) -> SearchResult<Vec<RawHit>>;
}

/// Anything that can run a single search task
///
/// The scheduler only sees this trait, which keeps it independent of HTTP
/// and lets tests substitute scripted backends.
#[async_trait]
pub trait SearchAdapter: Send + Sync {
    /// Run one task and return its canonical results
    async fn search(&self, task: &SearchTask) -> SearchResult<Vec<CanonicalResult>>;

    /// Whether a backend identifier can be served
    fn supports(&self, backend: &str) -> bool;
}

/// Backend identifier to dialect lookup
#[derive(Clone, Default)]
pub struct DialectRegistry {
    dialects: HashMap<String, Arc<dyn BackendDialect>>,
}

impl DialectRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in dialect
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(google::GoogleDialect));
        registry.register(Arc::new(bing::BingDialect));
        registry.register(Arc::new(duckduckgo::DuckDuckGoDialect));
        registry.register(Arc::new(yandex::YandexDialect));
        registry.register(Arc::new(baidu::BaiduDialect));
        registry.register(Arc::new(searxng::SearXNGDialect));
        registry
    }

    /// Add or replace a dialect under its own name
    pub fn register(&mut self, dialect: Arc<dyn BackendDialect>) {
        self.dialects.insert(dialect.name().to_string(), dialect);
    }

    pub fn get(&self, backend: &str) -> SearchResult<Arc<dyn BackendDialect>> {
        self.dialects
            .get(backend)
            .cloned()
            .ok_or_else(|| SearchError::UnsupportedBackend(backend.to_string()))
    }

    pub fn contains(&self, backend: &str) -> bool {
        self.dialects.contains_key(backend)
    }

    /// Registered identifiers, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.dialects.keys().cloned().collect();
        names.sort();
        names
    }
}

/// Parse an endpoint and append query parameters
pub(crate) fn request_url(
    backend: &str,
    endpoint: &str,
    params: &[(&str, String)],
) -> SearchResult<Url> {
    let mut url = Url::parse(endpoint).map_err(|e| {
        SearchError::Transport(format!("invalid endpoint for {}: {} ({})", backend, endpoint, e))
    })?;
    {
        let mut pairs = url.query_pairs_mut();
        for (key, value) in params {
            pairs.append_pair(key, value);
        }
    }
    Ok(url)
}
