//! Registry-driven search adapter
//!
//! Looks up the task's dialect, builds the request, sends it through the
//! transport, and turns whatever comes back into canonical results. A body
//! that cannot be parsed is a zero-result page, not a failure.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};

use super::extract::{is_image_search_url, valid_result_url};
use super::{DialectRegistry, RawHit, SearchAdapter, Transport};
use crate::config::{BackendConfig, Config};
use crate::error::{SearchError, SearchResult};
use crate::monitor::CallMonitor;
use crate::types::{CanonicalResult, SearchTask};

fn utc_today() -> NaiveDate {
    Utc::now().date_naive()
}

/// One adapter serving every configured backend
#[derive(Clone)]
pub struct BackendAdapter {
    registry: DialectRegistry,
    transport: Arc<dyn Transport>,
    backends: BTreeMap<String, BackendConfig>,
    monitor: CallMonitor,
    today: fn() -> NaiveDate,
}

impl BackendAdapter {
    pub fn new(
        registry: DialectRegistry,
        transport: Arc<dyn Transport>,
        backends: BTreeMap<String, BackendConfig>,
        monitor: CallMonitor,
    ) -> Self {
        Self {
            registry,
            transport,
            backends,
            monitor,
            today: utc_today,
        }
    }

    /// Built-in dialects with the backend table from `config`
    pub fn from_config(config: &Config, transport: Arc<dyn Transport>, monitor: CallMonitor) -> Self {
        Self::new(
            DialectRegistry::builtin(),
            transport,
            config.backends.clone(),
            monitor,
        )
    }

    /// Replace the clock used for relative date windows
    pub fn with_clock(mut self, today: fn() -> NaiveDate) -> Self {
        self.today = today;
        self
    }

    pub fn monitor(&self) -> &CallMonitor {
        &self.monitor
    }

    fn backend_config(&self, backend: &str) -> SearchResult<&BackendConfig> {
        self.backends
            .get(backend)
            .filter(|b| b.enabled)
            .ok_or_else(|| SearchError::UnsupportedBackend(backend.to_string()))
    }
}

/// Validate, filter, cap and number raw hits for one task
///
/// Positions count the hits that survive filtering, starting at 1, so a
/// dropped image-search or invalid URL does not leave a gap.
pub(crate) fn canonicalize(mut hits: Vec<RawHit>, task: &SearchTask) -> Vec<CanonicalResult> {
    if !hits.is_empty() && hits.iter().all(|h| h.rank.is_some()) {
        hits.sort_by_key(|h| h.rank);
    }

    hits.into_iter()
        .filter_map(|hit| {
            let url = valid_result_url(&hit.url)?;
            if is_image_search_url(url.as_str()) {
                tracing::debug!(url = %url, "Dropping image search result");
                return None;
            }
            Some((hit, url))
        })
        .take(task.options.result_cap as usize)
        .enumerate()
        .map(|(idx, (hit, url))| CanonicalResult {
            title: hit.title,
            url: url.to_string(),
            snippet: hit.snippet,
            position: idx as u32 + 1,
            backend: task.backend.clone(),
            keyword: task.keyword.clone(),
        })
        .collect()
}

#[async_trait]
impl SearchAdapter for BackendAdapter {
    async fn search(&self, task: &SearchTask) -> SearchResult<Vec<CanonicalResult>> {
        let dialect = self.registry.get(&task.backend)?;
        let backend = self.backend_config(&task.backend)?;
        let request = dialect.build_request(
            &backend.endpoint,
            &task.keyword,
            &task.options,
            (self.today)(),
        )?;

        tracing::debug!(
            backend = %task.backend,
            keyword = %task.keyword,
            url = %request.url,
            format = ?request.format,
            "Sending search request"
        );

        let start = Instant::now();
        let body = match self.transport.fetch(&request).await {
            Ok(body) => body,
            Err(e) => {
                self.monitor
                    .record_error(&task.backend, start.elapsed().as_millis() as u64, &e);
                return Err(e);
            }
        };
        let elapsed_ms = start.elapsed().as_millis() as u64;

        let hits = match dialect.parse_response(&body) {
            Ok(hits) => hits,
            Err(e) => {
                tracing::warn!(
                    backend = %task.backend,
                    keyword = %task.keyword,
                    "Unparseable response treated as empty: {}",
                    e
                );
                Vec::new()
            }
        };

        let results = canonicalize(hits, task);
        self.monitor
            .record_success(&task.backend, elapsed_ms, results.len());
        Ok(results)
    }

    fn supports(&self, backend: &str) -> bool {
        self.registry.contains(backend) && self.backend_config(backend).is_ok()
    }
}
