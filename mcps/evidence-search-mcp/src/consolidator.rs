//! Result consolidation
//!
//! Raw results from every task go through one pass: URL normalization,
//! duplicate merging, quality filtering, relevance scoring, ranking and
//! truncation. The consolidator is synchronous and never fails; an empty
//! input produces an empty output.

use std::collections::HashMap;
use std::time::Instant;

use url::Url;

use crate::backends::extract::is_image_search_url;
use crate::config::{Config, ConsolidationConfig};
use crate::planner::contains_term;
use crate::types::{CanonicalResult, ConsolidatedResult, ConsolidationReport};

/// Query parameters that only identify the referrer or campaign
const TRACKING_PARAMS: &[&str] = &[
    "gclid", "fbclid", "msclkid", "yclid", "mc_cid", "mc_eid", "ref", "ref_src", "spm",
];

const OFFICIAL_SUFFIXES: &[&str] = &[".gov", ".edu", ".org"];

const DOCUMENT_EXTENSIONS: &[&str] = &[".pdf", ".doc", ".docx", ".ppt", ".pptx", ".xls", ".xlsx"];

const STAGES: &[&str] = &["normalize", "merge", "filter", "score", "rank", "truncate"];

fn is_tracking_param(key: &str) -> bool {
    let key = key.to_ascii_lowercase();
    key.starts_with("utm_") || TRACKING_PARAMS.contains(&key.as_str())
}

/// Canonical form of a result URL, used as the dedup key
///
/// Drops tracking parameters and the fragment, lowercases the host and
/// removes trailing slashes. Applying it twice gives the same string.
pub fn normalize_url(raw: &str) -> String {
    let raw = raw.trim();
    let Ok(mut url) = Url::parse(raw) else {
        let without_fragment = raw.split('#').next().unwrap_or(raw);
        return without_fragment.trim_end_matches('/').to_string();
    };

    url.set_fragment(None);

    if url.query().is_some() {
        let kept: Vec<(String, String)> = url
            .query_pairs()
            .filter(|(k, _)| !is_tracking_param(k))
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        if kept.is_empty() {
            url.set_query(None);
        } else {
            url.query_pairs_mut().clear().extend_pairs(kept);
        }
    }

    let path = url.path().to_string();
    if path.len() > 1 && path.ends_with('/') {
        url.set_path(path.trim_end_matches('/'));
    }

    let mut normalized = url.to_string();
    // The url crate always prints a root path as "/"
    if url.path() == "/" && url.query().is_none() && normalized.ends_with('/') {
        normalized.pop();
    }
    normalized
}

/// Dedups, filters, scores and ranks canonical results
#[derive(Debug, Clone)]
pub struct ResultConsolidator {
    config: ConsolidationConfig,
    engine_weights: HashMap<String, f64>,
}

impl ResultConsolidator {
    pub fn new(config: ConsolidationConfig, engine_weights: HashMap<String, f64>) -> Self {
        Self {
            config,
            engine_weights,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.consolidation.clone(), config.engine_weights())
    }

    /// Run the whole pipeline
    ///
    /// `tokens` are lowercased entity words that make a result more relevant;
    /// `verified_domains` are domains known to belong to the entities.
    pub fn consolidate(
        &self,
        results: Vec<CanonicalResult>,
        tokens: &[String],
        verified_domains: &[String],
    ) -> (Vec<ConsolidatedResult>, ConsolidationReport) {
        let started = Instant::now();
        let original_count = results.len();

        let merged = merge_duplicates(results);
        let deduplicated_count = merged.len();

        let mut kept: Vec<ConsolidatedResult> = merged
            .into_iter()
            .filter(|r| self.passes_filters(r))
            .collect();
        tracing::debug!(
            original = original_count,
            deduplicated = deduplicated_count,
            filtered = kept.len(),
            "Merged and filtered results"
        );

        for result in &mut kept {
            result.score = self.score(result, tokens, verified_domains);
        }

        kept.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.position.cmp(&b.position))
                .then_with(|| a.url.cmp(&b.url))
        });
        kept.truncate(self.config.max_results);

        let final_count = kept.len();
        let report = ConsolidationReport {
            original_count,
            deduplicated_count,
            final_count,
            compression_ratio: if original_count == 0 {
                0.0
            } else {
                final_count as f64 / original_count as f64
            },
            processing_ms: started.elapsed().as_millis() as u64,
            stages: STAGES.iter().map(|s| s.to_string()).collect(),
        };

        tracing::info!(
            original = original_count,
            deduplicated = deduplicated_count,
            final_count,
            "Consolidated search results"
        );
        (kept, report)
    }

    fn passes_filters(&self, result: &ConsolidatedResult) -> bool {
        if result.title.trim().chars().count() < self.config.min_title_chars {
            return false;
        }
        if result.url.chars().count() < self.config.min_url_chars {
            return false;
        }
        !is_image_search_url(&result.url)
    }

    fn engine_weight(&self, result: &ConsolidatedResult) -> f64 {
        result
            .backends
            .iter()
            .filter_map(|b| self.engine_weights.get(b).copied())
            .fold(None, |best: Option<f64>, w| Some(best.map_or(w, |b| b.max(w))))
            .unwrap_or(1.0)
    }

    /// Relevance score for one merged result
    pub fn score(&self, result: &ConsolidatedResult, tokens: &[String], verified_domains: &[String]) -> f64 {
        let w = &self.config.weights;

        let mut score = (w.position_ceiling - result.position as f64).max(0.0) * self.engine_weight(result);

        let title = result.title.to_lowercase();
        let snippet = result.snippet.to_lowercase();
        for token in tokens.iter().filter(|t| !t.is_empty()) {
            if contains_term(&title, token) {
                score += w.title_match;
            }
            if contains_term(&snippet, token) {
                score += w.snippet_match;
            }
        }
        score += w.corroboration * result.keywords.len().saturating_sub(1) as f64;

        let snippet_chars = result.snippet.trim().chars().count();
        if snippet_chars == 0 {
            score *= w.empty_snippet_penalty;
        } else if snippet_chars < w.short_snippet_chars {
            score *= w.short_snippet_penalty;
        }

        let Ok(url) = Url::parse(&result.url) else {
            return score;
        };
        if url.scheme() == "https" {
            score *= w.https_bonus;
        }

        let host = url.host_str().unwrap_or_default().to_lowercase();
        if OFFICIAL_SUFFIXES.iter().any(|s| host.ends_with(s)) {
            score *= w.official_domain_bonus;
        }
        if verified_domains
            .iter()
            .any(|d| host == *d || host.ends_with(&format!(".{}", d)))
        {
            score *= w.verified_domain_bonus;
        }

        let path = url.path().to_lowercase();
        if DOCUMENT_EXTENSIONS.iter().any(|ext| path.ends_with(ext)) {
            if snippet_chars >= w.substantive_snippet_chars {
                score *= w.document_with_snippet_bonus;
            } else {
                score *= w.document_without_snippet_penalty;
            }
        }

        score
    }
}

/// Fold results sharing a normalized URL into one record, first-seen order
fn merge_duplicates(results: Vec<CanonicalResult>) -> Vec<ConsolidatedResult> {
    let mut merged: Vec<ConsolidatedResult> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for result in results {
        let key = normalize_url(&result.url);
        match index.get(&key) {
            Some(&i) => {
                let existing = &mut merged[i];
                existing.position = existing.position.min(result.position);
                if existing.snippet.trim().is_empty() && !result.snippet.trim().is_empty() {
                    existing.snippet = result.snippet;
                }
                if !existing.keywords.contains(&result.keyword) {
                    existing.keywords.push(result.keyword);
                }
                if !existing.backends.contains(&result.backend) {
                    existing.backends.push(result.backend);
                }
            }
            None => {
                index.insert(key.clone(), merged.len());
                merged.push(ConsolidatedResult {
                    title: result.title,
                    url: result.url,
                    normalized_url: key,
                    snippet: result.snippet,
                    position: result.position,
                    backends: vec![result.backend],
                    keywords: vec![result.keyword],
                    score: 0.0,
                });
            }
        }
    }
    merged
}
