//! Bing backend
//!
//! Raw results page. Organic hits are `li.b_algo` nodes; when Bing serves its
//! alternate layout the children of `#b_results` are used instead.

use chrono::NaiveDate;

use super::dates::bing_filter;
use super::extract::{markup_hits, MarkupProfile, SelectorSet};
use super::{request_url, BackendDialect, BackendRequest, RawHit, ResponseFormat};
use crate::error::SearchResult;
use crate::types::TaskOptions;

const PROFILE: MarkupProfile = MarkupProfile {
    primary: SelectorSet {
        result: "li.b_algo",
        title: "h2",
        link: "h2 a",
        snippet: ".b_caption p, p.b_lineclamp2, p.b_lineclamp3, .b_algoSlug",
    },
    fallback: SelectorSet {
        result: "#b_results > li",
        title: "h2, h3",
        link: "a[href^='http']",
        snippet: "p",
    },
};

pub struct BingDialect;

impl BackendDialect for BingDialect {
    fn name(&self) -> &str {
        "bing"
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
            ("q", keyword.to_string()),
            ("count", options.result_cap.to_string()),
        ];
        if let Some(ref lang) = options.language {
            params.push(("setlang", lang.to_lowercase()));
        }
        if let Some(ref country) = options.country {
            params.push(("cc", country.to_uppercase()));
        }
        if let Some(ref range) = options.date_range {
            params.push(("filters", bing_filter(range)));
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
