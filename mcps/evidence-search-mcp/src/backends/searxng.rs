//! SearXNG backend
//!
//! Self-hosted meta-search engine with a JSON API.
//! See: https://docs.searxng.org/dev/search_api.html

use chrono::NaiveDate;
use serde::Deserialize;

use super::dates::RelativeWindow;
use super::{request_url, BackendDialect, BackendRequest, RawHit, ResponseFormat};
use crate::error::SearchResult;
use crate::types::TaskOptions;

// SearXNG API response types
#[derive(Debug, Deserialize)]
struct SearXNGResponse {
    #[serde(default)]
    results: Vec<SearXNGResult>,
}

#[derive(Debug, Deserialize)]
struct SearXNGResult {
    #[serde(default)]
    title: String,
    #[serde(default)]
    url: String,
    content: Option<String>,
    img_src: Option<String>,
}

pub struct SearXNGDialect;

impl BackendDialect for SearXNGDialect {
    fn name(&self) -> &str {
        "searxng"
    }

    fn format(&self) -> ResponseFormat {
        ResponseFormat::Json
    }

    fn build_request(
        &self,
        endpoint: &str,
        keyword: &str,
        options: &TaskOptions,
        today: NaiveDate,
    ) -> SearchResult<BackendRequest> {
        let mut params = vec![
            ("q", keyword.to_string()),
            ("format", "json".to_string()),
            ("pageno", "1".to_string()),
        ];
        match (&options.language, &options.country) {
            (Some(lang), Some(country)) => params.push((
                "language",
                format!("{}-{}", lang.to_lowercase(), country.to_uppercase()),
            )),
            (Some(lang), None) => params.push(("language", lang.to_lowercase())),
            _ => {}
        }
        if let Some(window) = options
            .date_range
            .as_ref()
            .and_then(|range| RelativeWindow::covering(range, today))
        {
            params.push(("time_range", window.word().to_string()));
        }

        Ok(BackendRequest {
            backend: self.name().to_string(),
            url: request_url(self.name(), endpoint, &params)?,
            format: self.format(),
        })
    }

    fn parse_response(&self, body: &str) -> SearchResult<Vec<RawHit>> {
        let response: SearXNGResponse = serde_json::from_str(body)?;

        Ok(response
            .results
            .into_iter()
            // Filter out image-only results (those with actual image URLs, not empty strings)
            .filter(|r| r.img_src.as_ref().map_or(true, |s| s.is_empty()))
            .map(|r| RawHit {
                title: r.title,
                url: r.url,
                snippet: r.content.unwrap_or_default(),
                rank: None,
            })
            .collect())
    }
}
