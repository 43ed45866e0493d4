//! Baidu backend
//!
//! Raw results page. Baidu wraps result links in its own `/link?url=` redirect
//! which cannot be resolved offline, so those URLs are kept as-is.

use chrono::NaiveDate;

use super::dates::baidu_gpc;
use super::extract::{markup_hits, MarkupProfile, SelectorSet};
use super::{request_url, BackendDialect, BackendRequest, RawHit, ResponseFormat};
use crate::error::SearchResult;
use crate::types::TaskOptions;

const PROFILE: MarkupProfile = MarkupProfile {
    primary: SelectorSet {
        result: "div.result.c-container, div.result-op.c-container",
        title: "h3",
        link: "h3 a",
        snippet: ".c-abstract, [class*='content-right'], .c-span-last",
    },
    fallback: SelectorSet {
        result: "#content_left > div",
        title: "h3, a",
        link: "a[href]",
        snippet: "span, p",
    },
};

pub struct BaiduDialect;

impl BackendDialect for BaiduDialect {
    fn name(&self) -> &str {
        "baidu"
    }

    fn format(&self) -> ResponseFormat {
        ResponseFormat::Markup
    }

    fn build_request(
        &self,
        endpoint: &str,
        keyword: &str,
        options: &TaskOptions,
        _today: NaiveDate,
    ) -> SearchResult<BackendRequest> {
        let mut params = vec![
            ("wd", keyword.to_string()),
            ("rn", options.result_cap.to_string()),
        ];
        if let Some(ref range) = options.date_range {
            params.push(("gpc", baidu_gpc(range)));
        }

        Ok(BackendRequest {
            backend: self.name().to_string(),
            url: request_url(self.name(), endpoint, &params)?,
            format: self.format(),
        })
    }

    fn parse_response(&self, body: &str) -> SearchResult<Vec<RawHit>> {
        markup_hits(body, &PROFILE)
    }
}
