//! Response extraction shared by the dialects
//!
//! JSON payloads are probed for the organic results array under several known
//! field names. Markup pages are walked with CSS selectors, with a fallback
//! selector set when the primary one matches nothing.

use std::sync::LazyLock;

use regex::RegexSet;
use scraper::{ElementRef, Html, Selector};
use serde_json::Value;
use url::Url;

use super::RawHit;
use crate::error::{SearchError, SearchResult};

/// Paths probed for the organic array, in priority order
const ORGANIC_PATHS: &[&str] = &["organic", "organic_results", "results", "items", "web.results"];

const TITLE_FIELDS: &[&str] = &["title", "name"];
const URL_FIELDS: &[&str] = &["link", "url", "href"];
const SNIPPET_FIELDS: &[&str] = &["description", "snippet", "content"];
const RANK_FIELDS: &[&str] = &["rank", "position"];

static IMAGE_SEARCH_PATTERNS: LazyLock<RegexSet> = LazyLock::new(|| {
    RegexSet::new([
        r"(?i)^https?://(www\.)?google\.[a-z.]+/(search|imgres)\?.*\btbm=isch\b",
        r"(?i)^https?://(www\.)?google\.[a-z.]+/imgres\b",
        r"(?i)^https?://images\.google\.[a-z.]+/",
        r"(?i)^https?://(www\.)?bing\.com/images/",
        r"(?i)^https?://(www\.)?yandex\.[a-z.]+/images/",
        r"(?i)^https?://image\.baidu\.com/",
        r"(?i)^https?://(www\.)?duckduckgo\.com/.*[?&](iax|ia)=images\b",
    ])
    .expect("image search patterns are valid")
});

/// Whether a URL points at an engine's image-search endpoint
pub fn is_image_search_url(url: &str) -> bool {
    IMAGE_SEARCH_PATTERNS.is_match(url)
}

/// Validate a result URL: absolute http(s) with a host
///
/// Protocol-relative links are upgraded to https.
pub fn valid_result_url(raw: &str) -> Option<Url> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    let candidate = if raw.starts_with("//") {
        format!("https:{}", raw)
    } else {
        raw.to_string()
    };
    let url = Url::parse(&candidate).ok()?;
    let web = matches!(url.scheme(), "http" | "https");
    let has_host = url.host_str().is_some_and(|h| !h.is_empty());
    (web && has_host).then_some(url)
}

/// Collapse runs of whitespace into single spaces
pub fn clean_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn lookup<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(value, |current, key| current.get(key))
}

fn probe_str(item: &Value, fields: &[&str]) -> Option<String> {
    fields
        .iter()
        .filter_map(|f| item.get(*f))
        .filter_map(Value::as_str)
        .map(clean_text)
        .find(|s| !s.is_empty())
}

fn probe_rank(item: &Value) -> Option<u32> {
    RANK_FIELDS
        .iter()
        .filter_map(|f| item.get(*f))
        .find_map(|v| match v {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        })
        .and_then(|n| u32::try_from(n).ok())
        .filter(|n| *n > 0)
}

/// Locate the organic results array in a structured payload
pub fn probe_organic(payload: &Value) -> Option<&Vec<Value>> {
    ORGANIC_PATHS
        .iter()
        .find_map(|path| lookup(payload, path).and_then(Value::as_array))
}

/// Parse a JSON body into hits by probing known field names
pub fn json_hits(body: &str) -> SearchResult<Vec<RawHit>> {
    let payload: Value = serde_json::from_str(body)?;
    let organic = probe_organic(&payload)
        .ok_or_else(|| SearchError::Parse("no organic results field".to_string()))?;

    Ok(organic
        .iter()
        .filter(|item| item.is_object())
        .map(|item| RawHit {
            title: probe_str(item, TITLE_FIELDS).unwrap_or_default(),
            url: probe_str(item, URL_FIELDS).unwrap_or_default(),
            snippet: probe_str(item, SNIPPET_FIELDS).unwrap_or_default(),
            rank: probe_rank(item),
        })
        .collect())
}

/// CSS selectors locating hits on a results page
#[derive(Debug, Clone, Copy)]
pub struct SelectorSet {
    /// One node per organic result
    pub result: &'static str,
    /// Title text, relative to the result node
    pub title: &'static str,
    /// Anchor carrying the target `href`, relative to the result node
    pub link: &'static str,
    /// Snippet text, relative to the result node
    pub snippet: &'static str,
}

/// Primary and fallback selectors for a markup backend
#[derive(Debug, Clone, Copy)]
pub struct MarkupProfile {
    pub primary: SelectorSet,
    pub fallback: SelectorSet,
}

fn parse_selector(css: &str) -> SearchResult<Selector> {
    Selector::parse(css).map_err(|e| SearchError::Parse(format!("bad selector '{}': {:?}", css, e)))
}

fn first_text(node: &ElementRef<'_>, selector: &Selector) -> Option<String> {
    node.select(selector)
        .map(|el| clean_text(&el.text().collect::<String>()))
        .find(|t| !t.is_empty())
}

fn extract_with(document: &Html, set: &SelectorSet) -> SearchResult<Vec<RawHit>> {
    let result = parse_selector(set.result)?;
    let title = parse_selector(set.title)?;
    let link = parse_selector(set.link)?;
    let snippet = parse_selector(set.snippet)?;

    let hits = document
        .select(&result)
        .filter_map(|node| {
            let anchor = node.select(&link).find(|a| a.value().attr("href").is_some())?;
            let href = anchor.value().attr("href")?.to_string();
            let title = first_text(&node, &title)
                .unwrap_or_else(|| clean_text(&anchor.text().collect::<String>()));
            Some(RawHit {
                title,
                url: href,
                snippet: first_text(&node, &snippet).unwrap_or_default(),
                rank: None,
            })
        })
        .collect();
    Ok(hits)
}

/// Extract hits from an HTML page, trying the fallback selectors when the
/// primary set yields no nodes
pub fn markup_hits(body: &str, profile: &MarkupProfile) -> SearchResult<Vec<RawHit>> {
    if body.trim().is_empty() {
        return Err(SearchError::Parse("empty page".to_string()));
    }
    let document = Html::parse_document(body);
    let hits = extract_with(&document, &profile.primary)?;
    if !hits.is_empty() {
        return Ok(hits);
    }
    tracing::debug!(
        selector = profile.primary.result,
        "Primary selectors matched nothing, trying fallback"
    );
    extract_with(&document, &profile.fallback)
}
