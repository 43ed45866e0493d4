//! Task planning
//!
//! Expands a [`SearchStrategy`] into one [`SearchTask`] per (keyword, backend)
//! pair and orders them so the most valuable queries run (and retry) first.

use std::collections::HashMap;

use crate::config::Config;
use crate::error::{SearchError, SearchResult};
use crate::types::{EntityProfile, SearchStrategy, SearchTask, TaskOptions};

const BASE_PRIORITY: i32 = 5;
const FULL_NAME_BONUS: i32 = 4;
const NAME_WORD_BONUS: i32 = 3;
const RELATIONSHIP_BONUS: i32 = 2;
const SECTOR_BONUS: i32 = 1;

const FALLBACK_RESULT_CAP: u32 = 10;

/// Terms suggesting a documented relationship between two organisations
const RELATIONSHIP_TERMS: &[&str] = &[
    "partnership",
    "partner",
    "collaboration",
    "collaborate",
    "agreement",
    "cooperation",
    "joint",
    "memorandum",
    "alliance",
    "contract",
    "funding",
    "sponsor",
    "sponsorship",
    "partners",
    "合作",
    "伙伴",
    "协议",
    "partenariat",
    "accord",
    "colaboración",
    "acuerdo",
    "partnerschaft",
    "zusammenarbeit",
];

/// Whether `term` occurs in `haystack` as a whole word or phrase
///
/// Terms in scripts written without spaces (kana, CJK, hangul) match anywhere.
pub(crate) fn contains_term(haystack: &str, term: &str) -> bool {
    if term.is_empty() {
        return false;
    }
    if term.chars().any(is_unspaced_script) {
        return haystack.contains(term);
    }
    haystack.match_indices(term).any(|(start, _)| {
        let before = haystack[..start].chars().next_back();
        let after = haystack[start + term.len()..].chars().next();
        !before.is_some_and(char::is_alphanumeric) && !after.is_some_and(char::is_alphanumeric)
    })
}

fn is_unspaced_script(c: char) -> bool {
    matches!(c, '\u{3040}'..='\u{9FFF}' | '\u{AC00}'..='\u{D7AF}' | '\u{F900}'..='\u{FAFF}')
}

/// Priority of one keyword given the entities under investigation
pub fn keyword_priority(keyword: &str, entities: &[EntityProfile]) -> i32 {
    let keyword = keyword.to_lowercase();
    let mut priority = BASE_PRIORITY;

    if entities
        .iter()
        .map(EntityProfile::full_name)
        .any(|name| contains_term(&keyword, &name))
    {
        priority += FULL_NAME_BONUS;
    }

    if entities
        .iter()
        .flat_map(EntityProfile::significant_words)
        .any(|word| contains_term(&keyword, &word))
    {
        priority += NAME_WORD_BONUS;
    }

    if RELATIONSHIP_TERMS.iter().any(|term| contains_term(&keyword, term)) {
        priority += RELATIONSHIP_BONUS;
    }

    if entities
        .iter()
        .flat_map(|e| e.sectors.iter())
        .map(|s| s.trim().to_lowercase())
        .any(|sector| contains_term(&keyword, &sector))
    {
        priority += SECTOR_BONUS;
    }

    priority
}

fn dedup_preserving_order<'a>(
    items: impl Iterator<Item = &'a String>,
    key: impl Fn(&str) -> String,
) -> Vec<String> {
    let mut seen = Vec::new();
    let mut out = Vec::new();
    for item in items {
        let trimmed = item.trim();
        if trimmed.is_empty() {
            continue;
        }
        let k = key(trimmed);
        if !seen.contains(&k) {
            seen.push(k);
            out.push(trimmed.to_string());
        }
    }
    out
}

/// Turns strategies into ordered task lists
#[derive(Debug, Clone)]
pub struct TaskPlanner {
    baseline_backend: String,
    default_counts: HashMap<String, u32>,
}

impl TaskPlanner {
    pub fn new(baseline_backend: impl Into<String>) -> Self {
        Self {
            baseline_backend: baseline_backend.into(),
            default_counts: HashMap::new(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self {
            baseline_backend: config.search.baseline_backend.clone(),
            default_counts: config
                .backends
                .iter()
                .map(|(id, b)| (id.clone(), b.default_count))
                .collect(),
        }
    }

    fn result_cap(&self, strategy: &SearchStrategy, backend: &str) -> u32 {
        strategy
            .result_cap
            .or_else(|| self.default_counts.get(backend).copied())
            .unwrap_or(FALLBACK_RESULT_CAP)
    }

    /// Expand a strategy into tasks sorted by descending priority
    ///
    /// Ties keep keyword order, then backend order. Fails with
    /// [`SearchError::EmptyStrategy`] when there is nothing to search.
    pub fn plan(&self, strategy: &SearchStrategy) -> SearchResult<Vec<SearchTask>> {
        let keywords = dedup_preserving_order(strategy.keywords.iter(), str::to_lowercase);
        if keywords.is_empty() {
            return Err(SearchError::EmptyStrategy("no keywords".to_string()));
        }

        let mut backends = dedup_preserving_order(strategy.backends.iter(), str::to_lowercase)
            .into_iter()
            .map(|b| b.to_lowercase())
            .collect::<Vec<_>>();
        if backends.is_empty() {
            let baseline = self.baseline_backend.trim();
            if baseline.is_empty() {
                return Err(SearchError::EmptyStrategy("no backends".to_string()));
            }
            tracing::debug!(backend = baseline, "No backends selected, using baseline");
            backends.push(baseline.to_string());
        }

        let mut tasks = Vec::with_capacity(keywords.len() * backends.len());
        for keyword in &keywords {
            let priority = keyword_priority(keyword, &strategy.entities);
            for backend in &backends {
                tasks.push(SearchTask {
                    keyword: keyword.clone(),
                    backend: backend.clone(),
                    priority,
                    options: TaskOptions {
                        result_cap: self.result_cap(strategy, backend),
                        language: strategy.language.clone(),
                        country: strategy.country.clone(),
                        date_range: strategy.date_range,
                    },
                });
            }
        }

        // Stable: equal priorities keep generation order
        tasks.sort_by(|a, b| b.priority.cmp(&a.priority));

        tracing::info!(
            keywords = keywords.len(),
            backends = backends.len(),
            tasks = tasks.len(),
            "Planned search tasks"
        );
        Ok(tasks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entities() -> Vec<EntityProfile> {
        vec![
            EntityProfile::new("Acme Corp")
                .with_verified_name("Acme Corporation")
                .with_sectors(["robotics"]),
            EntityProfile::new("Northern Institute of Technology").with_sectors(["aerospace"]),
        ]
    }

    #[test]
    fn test_priority_components() {
        let e = entities();
        assert_eq!(keyword_priority("weather today", &e), 5);
        // significant word only
        assert_eq!(keyword_priority("acme news", &e), 8);
        // verified full name plus its words
        assert_eq!(keyword_priority("Acme Corporation annual report", &e), 12);
        // word + relationship + sector
        assert_eq!(keyword_priority("northern robotics partnership", &e), 11);
        // localized relationship term
        assert_eq!(keyword_priority("acme 合作", &e), 10);
        // short words do not count as name matches
        assert_eq!(keyword_priority("of the", &[EntityProfile::new("Bank of the West")]), 5);
    }

    #[test]
    fn test_terms_match_whole_words() {
        let e = entities();
        // "accord" and "partner" are relationship terms, "according" and "partnering" are not
        assert_eq!(keyword_priority("according to filings", &[]), 5);
        assert_eq!(keyword_priority("partnering firms", &[]), 5);
        assert_eq!(keyword_priority("acme sponsorship", &e), 10);
        assert_eq!(keyword_priority("acme's partners", &e), 10);
        // "acme" inside another word is not a name match
        assert_eq!(keyword_priority("acmeville robotics", &e), 6);
    }

    #[test]
    fn test_contains_term() {
        assert!(contains_term("acme corp partnership", "acme corp"));
        assert!(contains_term("(acme)", "acme"));
        assert!(!contains_term("corporate filings", "corp"));
        assert!(contains_term("corporate corp", "corp"));
        assert!(contains_term("北京合作协议", "合作"));
        assert!(!contains_term("anything", ""));
    }

    #[test]
    fn test_task_count_and_order() {
        let strategy = SearchStrategy::new([
            "weather today",
            "Acme Corporation partnership",
            "acme news",
        ])
        .with_backends(["google", "bing"])
        .with_entity(entities().remove(0));

        let tasks = TaskPlanner::new("google").plan(&strategy).unwrap();
        assert_eq!(tasks.len(), 6);
        assert!(tasks.windows(2).all(|w| w[0].priority >= w[1].priority));

        // stable within equal priority: keyword order, then backend order
        assert_eq!(tasks[0].keyword, "Acme Corporation partnership");
        assert_eq!(tasks[0].backend, "google");
        assert_eq!(tasks[1].backend, "bing");
        assert_eq!(tasks[2].keyword, "acme news");
        assert_eq!(tasks[5].keyword, "weather today");
        assert_eq!(tasks[5].backend, "bing");
    }

    #[test]
    fn test_defaults_to_baseline_backend() {
        let strategy = SearchStrategy::new(["acme"]);
        let tasks = TaskPlanner::new("google").plan(&strategy).unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].backend, "google");
    }

    #[test]
    fn test_empty_strategy() {
        let planner = TaskPlanner::new("google");
        let err = planner.plan(&SearchStrategy::new(["  ", ""])).unwrap_err();
        assert!(matches!(err, SearchError::EmptyStrategy(_)));

        let no_baseline = TaskPlanner::new("");
        let err = no_baseline.plan(&SearchStrategy::new(["acme"])).unwrap_err();
        assert!(matches!(err, SearchError::EmptyStrategy(_)));
    }

    #[test]
    fn test_dedups_keywords_and_backends() {
        let strategy = SearchStrategy::new(["Acme", "acme ", "ACME deal"])
            .with_backends(["Bing", "bing", "google"]);
        let tasks = TaskPlanner::new("google").plan(&strategy).unwrap();
        assert_eq!(tasks.len(), 4);
        assert!(tasks.iter().all(|t| t.backend == "bing" || t.backend == "google"));
    }

    #[test]
    fn test_result_cap_and_options() {
        let config = Config::from_toml(
            r#"
            [backends.bing]
            default_count = 30
            "#,
        )
        .unwrap();
        let planner = TaskPlanner::from_config(&config);
        let strategy = SearchStrategy::new(["acme"])
            .with_backends(["bing", "google"])
            .with_locale(Some("en".into()), Some("us".into()));
        let tasks = planner.plan(&strategy).unwrap();
        assert_eq!(tasks[0].options.result_cap, 30);
        assert_eq!(tasks[1].options.result_cap, 10);
        assert_eq!(tasks[0].options.country.as_deref(), Some("us"));

        let capped = planner.plan(&strategy.clone().with_result_cap(5)).unwrap();
        assert!(capped.iter().all(|t| t.options.result_cap == 5));
    }
}
