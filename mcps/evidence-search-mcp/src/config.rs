//! Configuration loading for evidence-search-mcp
//!
//! Configuration is loaded from:
//! 1. Environment variables (EVIDENCE_SEARCH_PROXY_URL, EVIDENCE_SEARCH_API_KEY,
//!    EVIDENCE_SEARCH_ZONE, SEARXNG_URL)
//! 2. Environment variable EVIDENCE_SEARCH_CONFIG_PATH
//! 3. ~/.binks/evidence-search.toml
//! 4. Default values

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Deserializer, Serialize};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub consolidation: ConsolidationConfig,
    #[serde(default)]
    pub transport: TransportConfig,
    #[serde(default)]
    pub batch: BatchConfig,
    /// Per-backend settings keyed by backend identifier
    ///
    /// Fields left out of a `[backends.<id>]` table keep the built-in value.
    #[serde(default = "default_backends", deserialize_with = "merge_backends")]
    pub backends: BTreeMap<String, BackendConfig>,
}

/// General search configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Backend used when a strategy names none
    #[serde(default = "default_baseline_backend")]
    pub baseline_backend: String,
}

/// Task execution limits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Tasks run concurrently per backend batch
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_task_timeout")]
    pub task_timeout_secs: u64,
    /// Pause between batches and between backends
    #[serde(default = "default_backpressure_delay")]
    pub backpressure_delay_ms: u64,
    /// Upper bound on failed tasks retried against a fallback backend
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,
    #[serde(default = "default_retry_timeout")]
    pub retry_timeout_secs: u64,
    /// Candidates for retries, tried in order
    #[serde(default = "default_fallback_backends")]
    pub fallback_backends: Vec<String>,
}

/// Result consolidation limits and scoring
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsolidationConfig {
    /// Cap on the consolidated output list
    #[serde(default = "default_max_results")]
    pub max_results: usize,
    #[serde(default = "default_min_title_chars")]
    pub min_title_chars: usize,
    #[serde(default = "default_min_url_chars")]
    pub min_url_chars: usize,
    #[serde(default)]
    pub weights: ScoringWeights,
}

/// Relevance scoring coefficients
///
/// These are tuning knobs. Keep position decay dominant over entity matches,
/// entity matches over domain authority, and domain authority over format
/// adjustments.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringWeights {
    /// Base score is `max(0, position_ceiling - position)`
    pub position_ceiling: f64,
    pub title_match: f64,
    pub snippet_match: f64,
    /// Bonus per originating keyword beyond the first
    pub corroboration: f64,
    pub empty_snippet_penalty: f64,
    pub short_snippet_penalty: f64,
    pub short_snippet_chars: usize,
    pub https_bonus: f64,
    pub official_domain_bonus: f64,
    pub verified_domain_bonus: f64,
    pub document_with_snippet_bonus: f64,
    pub document_without_snippet_penalty: f64,
    /// Snippet length that makes a document link worth reading
    pub substantive_snippet_chars: usize,
}

/// Outbound HTTP settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    /// SERP proxy API endpoint; requests go direct when unset
    #[serde(default)]
    pub proxy_url: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    /// Proxy zone name
    #[serde(default)]
    pub zone: Option<String>,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Hard client-side timeout, above the scheduler's task timeout
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

/// Settings for batch runs spread across several API keys
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    #[serde(default)]
    pub api_keys: Vec<String>,
    /// Token bucket refill rate per key
    #[serde(default = "default_requests_per_minute")]
    pub requests_per_minute: u32,
}

/// Settings for one backend
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BackendConfig {
    pub enabled: bool,
    /// Search endpoint
    pub endpoint: String,
    /// Result count requested when the strategy sets none
    pub default_count: u32,
    /// Engine quality multiplier used in scoring
    pub weight: f64,
}

impl BackendConfig {
    /// Settings for a backend with no built-in entry
    fn custom() -> Self {
        Self {
            enabled: true,
            endpoint: String::new(),
            default_count: default_result_count(),
            weight: 1.0,
        }
    }
}

/// A `[backends.<id>]` table as written; missing fields are `None`
#[derive(Debug, Default, Deserialize)]
struct BackendOverride {
    enabled: Option<bool>,
    endpoint: Option<String>,
    default_count: Option<u32>,
    weight: Option<f64>,
}

impl BackendOverride {
    fn apply(self, mut base: BackendConfig) -> BackendConfig {
        if let Some(enabled) = self.enabled {
            base.enabled = enabled;
        }
        if let Some(endpoint) = self.endpoint.filter(|e| !e.trim().is_empty()) {
            base.endpoint = endpoint;
        }
        if let Some(count) = self.default_count {
            base.default_count = count;
        }
        if let Some(weight) = self.weight {
            base.weight = weight;
        }
        base
    }
}

/// Layer configured backend tables over the built-in backend table
fn merge_backends<'de, D>(deserializer: D) -> std::result::Result<BTreeMap<String, BackendConfig>, D::Error>
where
    D: Deserializer<'de>,
{
    let overrides = BTreeMap::<String, BackendOverride>::deserialize(deserializer)?;
    let mut backends = default_backends();
    for (id, over) in overrides {
        let base = backends.remove(&id).unwrap_or_else(BackendConfig::custom);
        backends.insert(id, over.apply(base));
    }
    Ok(backends)
}

// Default value functions
fn default_baseline_backend() -> String {
    "google".to_string()
}

fn default_batch_size() -> usize {
    3
}

fn default_task_timeout() -> u64 {
    25
}

fn default_backpressure_delay() -> u64 {
    1500
}

fn default_max_retries() -> usize {
    5
}

fn default_retry_timeout() -> u64 {
    15
}

fn default_fallback_backends() -> Vec<String> {
    vec![
        "google".to_string(),
        "bing".to_string(),
        "duckduckgo".to_string(),
    ]
}

fn default_max_results() -> usize {
    20
}

fn default_min_title_chars() -> usize {
    3
}

fn default_min_url_chars() -> usize {
    10
}

fn default_user_agent() -> String {
    "evidence-search-mcp/0.1".to_string()
}

fn default_request_timeout() -> u64 {
    60
}

fn default_requests_per_minute() -> u32 {
    30
}

fn default_result_count() -> u32 {
    10
}

/// Built-in endpoint and weight for each known backend
fn builtin_backend(id: &str) -> Option<BackendConfig> {
    let (endpoint, weight) = match id {
        "google" => ("https://www.google.com/search", 1.2),
        "bing" => ("https://www.bing.com/search", 1.0),
        "duckduckgo" => ("https://html.duckduckgo.com/html/", 1.0),
        "yandex" => ("https://yandex.com/search/", 1.0),
        "baidu" => ("https://www.baidu.com/s", 1.0),
        "searxng" => ("http://localhost:8080/search", 1.0),
        _ => return None,
    };
    Some(BackendConfig {
        enabled: true,
        endpoint: endpoint.to_string(),
        default_count: default_result_count(),
        weight,
    })
}

/// Identifiers of every backend with a built-in dialect
pub const BUILTIN_BACKENDS: &[&str] = &["google", "bing", "duckduckgo", "yandex", "baidu", "searxng"];

fn default_backends() -> BTreeMap<String, BackendConfig> {
    BUILTIN_BACKENDS
        .iter()
        .filter_map(|id| builtin_backend(id).map(|cfg| (id.to_string(), cfg)))
        .collect()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            search: SearchConfig::default(),
            scheduler: SchedulerConfig::default(),
            consolidation: ConsolidationConfig::default(),
            transport: TransportConfig::default(),
            batch: BatchConfig::default(),
            backends: default_backends(),
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            baseline_backend: default_baseline_backend(),
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            task_timeout_secs: default_task_timeout(),
            backpressure_delay_ms: default_backpressure_delay(),
            max_retries: default_max_retries(),
            retry_timeout_secs: default_retry_timeout(),
            fallback_backends: default_fallback_backends(),
        }
    }
}

impl SchedulerConfig {
    pub fn task_timeout(&self) -> Duration {
        Duration::from_secs(self.task_timeout_secs)
    }

    pub fn retry_timeout(&self) -> Duration {
        Duration::from_secs(self.retry_timeout_secs)
    }

    pub fn backpressure_delay(&self) -> Duration {
        Duration::from_millis(self.backpressure_delay_ms)
    }
}

impl Default for ConsolidationConfig {
    fn default() -> Self {
        Self {
            max_results: default_max_results(),
            min_title_chars: default_min_title_chars(),
            min_url_chars: default_min_url_chars(),
            weights: ScoringWeights::default(),
        }
    }
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            position_ceiling: 20.0,
            title_match: 10.0,
            snippet_match: 5.0,
            corroboration: 3.0,
            empty_snippet_penalty: 0.6,
            short_snippet_penalty: 0.8,
            short_snippet_chars: 50,
            https_bonus: 1.05,
            official_domain_bonus: 1.3,
            verified_domain_bonus: 1.4,
            document_with_snippet_bonus: 1.1,
            document_without_snippet_penalty: 0.7,
            substantive_snippet_chars: 100,
        }
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            proxy_url: None,
            api_key: None,
            zone: None,
            user_agent: default_user_agent(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            api_keys: Vec::new(),
            requests_per_minute: default_requests_per_minute(),
        }
    }
}

impl Config {
    /// Load configuration from file or use defaults
    pub fn load() -> Result<Self> {
        let config_path = Self::find_config_path();

        let mut config = if let Some(path) = config_path {
            if path.exists() {
                tracing::info!("Loading config from: {}", path.display());
                let content = std::fs::read_to_string(&path)?;
                Self::from_toml(&content)?
            } else {
                tracing::info!("Config file not found, using defaults");
                Self::default()
            }
        } else {
            tracing::info!("No config path specified, using defaults");
            Self::default()
        };

        if let Ok(url) = std::env::var("EVIDENCE_SEARCH_PROXY_URL") {
            config.transport.proxy_url = Some(url);
        }
        if let Ok(key) = std::env::var("EVIDENCE_SEARCH_API_KEY") {
            config.transport.api_key = Some(key);
        }
        if let Ok(zone) = std::env::var("EVIDENCE_SEARCH_ZONE") {
            config.transport.zone = Some(zone);
        }
        if let Ok(url) = std::env::var("SEARXNG_URL") {
            if let Some(searxng) = config.backends.get_mut("searxng") {
                searxng.endpoint = format!("{}/search", url.trim_end_matches('/'));
            }
        }

        Ok(config)
    }

    /// Parse a TOML document over the built-in defaults
    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Backend settings for an identifier, if known and enabled
    pub fn backend(&self, id: &str) -> Option<&BackendConfig> {
        self.backends.get(id).filter(|b| b.enabled)
    }

    /// Scoring multiplier per enabled backend
    pub fn engine_weights(&self) -> HashMap<String, f64> {
        self.backends
            .iter()
            .filter(|(_, b)| b.enabled)
            .map(|(id, b)| (id.clone(), b.weight))
            .collect()
    }

    /// Find the configuration file path
    fn find_config_path() -> Option<PathBuf> {
        // 1. Check environment variable
        if let Ok(path) = std::env::var("EVIDENCE_SEARCH_CONFIG_PATH") {
            return Some(PathBuf::from(path));
        }

        // 2. Check ~/.binks/evidence-search.toml
        if let Ok(home) = std::env::var("HOME") {
            let path = PathBuf::from(home).join(".binks").join("evidence-search.toml");
            return Some(path);
        }

        None
    }
}
