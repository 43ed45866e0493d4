//! DuckDuckGo backend (HTML endpoint)
//!
//! Result anchors usually point at DuckDuckGo's own redirector with the real
//! target in the `uddg` parameter, so hrefs are unwrapped after extraction.

use chrono::NaiveDate;
use url::Url;

use super::dates::RelativeWindow;
use super::extract::{markup_hits, MarkupProfile, SelectorSet};
use super::{request_url, BackendDialect, BackendRequest, RawHit, ResponseFormat};
use crate::error::SearchResult;
use crate::types::TaskOptions;

const PROFILE: MarkupProfile = MarkupProfile {
    primary: SelectorSet {
        result: "div.result:not(.result--ad)",
        title: "a.result__a",
        link: "a.result__a",
        snippet: ".result__snippet",
    },
    fallback: SelectorSet {
        result: "div.web-result, div.links_main",
        title: "h2, a",
        link: "a[href]",
        snippet: ".result__body, p",
    },
};

/// Resolve `//duckduckgo.com/l/?uddg=<target>` to the target URL
fn unwrap_redirect(href: &str) -> String {
    let absolute = if href.starts_with("//") {
        format!("https:{}", href)
    } else {
        href.to_string()
    };
    let target = Url::parse(&absolute).ok().filter(|u| {
        u.host_str().is_some_and(|h| h.ends_with("duckduckgo.com")) && u.path().starts_with("/l/")
    });
    target
        .and_then(|u| {
            u.query_pairs()
                .find(|(k, _)| k == "uddg")
                .map(|(_, v)| v.into_owned())
        })
        .unwrap_or_else(|| href.to_string())
}

/// `kl` region code, e.g. `us-en`; `wt-wt` means no region
fn region_code(options: &TaskOptions) -> Option<String> {
    match (&options.country, &options.language) {
        (Some(country), Some(lang)) => Some(format!("{}-{}", country.to_lowercase(), lang.to_lowercase())),
        (Some(country), None) => Some(format!("{}-en", country.to_lowercase())),
        (None, Some(_)) => Some("wt-wt".to_string()),
        (None, None) => None,
    }
}

pub struct DuckDuckGoDialect;

impl BackendDialect for DuckDuckGoDialect {
    fn name(&self) -> &str {
        "duckduckgo"
    }

    fn format(&self) -> ResponseFormat {
        ResponseFormat::Markup
    }

    fn build_request(
        &self,
        endpoint: &str,
        keyword: &str,
        options: &TaskOptions,
        today: NaiveDate,
    ) -> SearchResult<BackendRequest> {
        let mut params = vec![("q", keyword.to_string())];
        if let Some(kl) = region_code(options) {
            params.push(("kl", kl));
        }
        if let Some(window) = options
            .date_range
            .as_ref()
            .and_then(|range| RelativeWindow::covering(range, today))
        {
            params.push(("df", window.letter().to_string()));
        }

        Ok(BackendRequest {
            backend: self.name().to_string(),
            url: request_url(self.name(), endpoint, &params)?,
            format: self.format(),
        })
    }

    fn parse_response(&self, body: &str) -> SearchResult<Vec<RawHit>> {
        let hits = markup_hits(body, &PROFILE)?;
        Ok(hits
            .into_iter()
            .map(|hit| RawHit {
                url: unwrap_redirect(&hit.url),
                ..hit
            })
            .collect())
    }
}
