//! MCP Server implementation for evidence search
//!
//! Exposes the investigation pipeline and its call accounting as MCP tools.

use std::sync::Arc;

use anyhow::Result;
use mcp_common::{invalid_params, json_success, text_success, IntoMcpError, ResultExt};
use rmcp::{
    handler::server::{router::tool::ToolRouter, wrapper::Parameters},
    model::{CallToolResult, ServerCapabilities, ServerInfo},
    tool, tool_handler, tool_router, ErrorData as McpError,
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::backends::{BackendAdapter, HttpTransport, SearchAdapter};
use crate::config::{Config, ConsolidationConfig, SchedulerConfig};
use crate::error::{SearchError, SearchResult};
use crate::monitor::CallMonitor;
use crate::orchestrator::{InvestigationOutcome, SearchOrchestrator};
use crate::types::{DateRange, EntityProfile, SearchStrategy};

/// The main Evidence Search MCP Server
#[derive(Clone)]
pub struct EvidenceSearchMcpServer {
    orchestrator: SearchOrchestrator,
    /// One orchestrator per batch API key
    batch: Vec<SearchOrchestrator>,
    monitor: CallMonitor,
    config: Config,
    tool_router: ToolRouter<Self>,
}

// ============================================================================
// Parameter Types
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct EntityParams {
    #[schemars(description = "Entity name as commonly written")]
    pub name: String,
    #[schemars(description = "Official or registered name, if known")]
    pub verified_name: Option<String>,
    #[schemars(description = "Official website domain, e.g. acme.com")]
    pub domain: Option<String>,
    #[schemars(description = "Sectors the entity works in")]
    pub sectors: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct InvestigateParams {
    #[schemars(description = "Search keywords; one task is run per keyword and backend")]
    pub keywords: Vec<String>,
    #[schemars(
        description = "Backends to query: google, bing, duckduckgo, yandex, baidu, searxng (default: the baseline backend)"
    )]
    pub backends: Option<Vec<String>>,
    #[schemars(description = "Result language code, e.g. en")]
    pub language: Option<String>,
    #[schemars(description = "Result country code, e.g. us")]
    pub country: Option<String>,
    #[schemars(description = "First month of the date window, YYYY-MM")]
    pub start_month: Option<String>,
    #[schemars(description = "Last month of the date window, YYYY-MM")]
    pub end_month: Option<String>,
    #[schemars(description = "Entities under investigation, used for prioritising and scoring")]
    pub entities: Option<Vec<EntityParams>>,
    #[schemars(description = "Results requested per task (default: per-backend setting)")]
    pub result_cap: Option<u32>,
}

impl InvestigateParams {
    /// Build a strategy, validating the date window
    pub fn into_strategy(self) -> SearchResult<SearchStrategy> {
        let mut strategy = SearchStrategy::new(self.keywords)
            .with_backends(self.backends.unwrap_or_default())
            .with_locale(self.language, self.country);

        match (self.start_month, self.end_month) {
            (Some(start), Some(end)) => {
                strategy = strategy.with_date_range(DateRange::parse(&start, &end)?);
            }
            (None, None) => {}
            _ => {
                return Err(SearchError::InvalidDateRange(
                    "start_month and end_month must be given together".to_string(),
                ))
            }
        }

        for entity in self.entities.unwrap_or_default() {
            let mut profile = EntityProfile::new(entity.name).with_sectors(entity.sectors.unwrap_or_default());
            if let Some(verified) = entity.verified_name {
                profile = profile.with_verified_name(verified);
            }
            if let Some(domain) = entity.domain {
                profile = profile.with_domain(domain);
            }
            strategy = strategy.with_entity(profile);
        }

        if let Some(cap) = self.result_cap {
            strategy = strategy.with_result_cap(cap);
        }
        Ok(strategy)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct BatchParams {
    #[schemars(description = "Strategies to investigate, spread round-robin over the configured batch API keys")]
    pub strategies: Vec<InvestigateParams>,
}

/// One strategy's result in a batch, in request order
#[derive(Debug, Serialize)]
struct BatchEntry {
    index: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    outcome: Option<InvestigationOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

/// Caller mistakes become `invalid_params`, everything else `internal_error`
impl IntoMcpError for SearchError {
    fn into_mcp_error(self) -> McpError {
        match self {
            SearchError::EmptyStrategy(_)
            | SearchError::InvalidDateRange(_)
            | SearchError::UnsupportedBackend(_) => invalid_params(self.to_string()),
            _ => mcp_common::internal_error(self.to_string()),
        }
    }
}

#[derive(Debug, Serialize)]
struct BackendStatus {
    id: String,
    enabled: bool,
    endpoint: String,
    default_count: u32,
    weight: f64,
}

/// Configuration view without credentials
#[derive(Debug, Serialize)]
struct ConfigStatus {
    baseline_backend: String,
    backends: Vec<BackendStatus>,
    scheduler: SchedulerConfig,
    consolidation: ConsolidationConfig,
    proxy_enabled: bool,
    batch_credentials: usize,
}

impl ConfigStatus {
    fn from_config(config: &Config) -> Self {
        Self {
            baseline_backend: config.search.baseline_backend.clone(),
            backends: config
                .backends
                .iter()
                .map(|(id, b)| BackendStatus {
                    id: id.clone(),
                    enabled: b.enabled,
                    endpoint: b.endpoint.clone(),
                    default_count: b.default_count,
                    weight: b.weight,
                })
                .collect(),
            scheduler: config.scheduler.clone(),
            consolidation: config.consolidation.clone(),
            proxy_enabled: config.transport.proxy_url.as_deref().is_some_and(|u| !u.is_empty()),
            batch_credentials: config.batch.api_keys.len(),
        }
    }
}

// ============================================================================
// Tool Router Implementation
// ============================================================================

#[tool_router]
impl EvidenceSearchMcpServer {
    pub fn new(config: Config) -> Result<Self> {
        let transport = HttpTransport::new(&config.transport)?;
        if transport.uses_proxy() {
            tracing::info!("Routing backend requests through the SERP proxy");
        } else {
            tracing::info!("Sending backend requests directly");
        }

        let monitor = CallMonitor::new();
        let batch = SearchOrchestrator::per_api_key(&config, &transport, &monitor, &config.batch.api_keys);
        tracing::info!(credentials = batch.len(), "Batch orchestrators ready");

        let adapter = BackendAdapter::from_config(&config, Arc::new(transport), monitor.clone());
        Ok(Self::with_adapter(config, Arc::new(adapter), monitor).with_batch(batch))
    }

    /// Server over a custom adapter; `monitor` is what the stats tools read
    pub fn with_adapter(config: Config, adapter: Arc<dyn SearchAdapter>, monitor: CallMonitor) -> Self {
        Self {
            orchestrator: SearchOrchestrator::from_config(&config, adapter),
            batch: Vec::new(),
            monitor,
            config,
            tool_router: Self::tool_router(),
        }
    }

    /// Replace the orchestrators `investigate_batch` spreads strategies over
    pub fn with_batch(mut self, batch: Vec<SearchOrchestrator>) -> Self {
        self.batch = batch;
        self
    }

    #[tool(
        description = "Search several backends for evidence about entities. Runs every keyword on every backend with throttling and fallback retries, then returns deduplicated, relevance-ranked results with an execution summary."
    )]
    async fn investigate(
        &self,
        Parameters(params): Parameters<InvestigateParams>,
    ) -> Result<CallToolResult, McpError> {
        let strategy = params.into_strategy().to_mcp_err()?;

        tracing::info!(
            keywords = strategy.keywords.len(),
            backends = strategy.backends.len(),
            "Investigating"
        );

        let outcome = self
            .orchestrator
            .investigate(&strategy)
            .await
            .to_mcp_err()?;

        json_success(&outcome)
    }

    #[tool(
        description = "Run several investigations at once, spread over the configured batch API keys. Each key runs its strategies one at a time under a requests-per-minute limit. Returns one entry per strategy, in request order, with either an outcome or an error."
    )]
    async fn investigate_batch(
        &self,
        Parameters(params): Parameters<BatchParams>,
    ) -> Result<CallToolResult, McpError> {
        if params.strategies.is_empty() {
            return Err(invalid_params("strategies must not be empty"));
        }
        let strategies = params
            .strategies
            .into_iter()
            .enumerate()
            .map(|(i, p)| {
                p.into_strategy()
                    .map_err(|e| invalid_params(format!("strategy {}: {}", i, e)))
            })
            .collect::<Result<Vec<_>, _>>()?;

        tracing::info!(
            strategies = strategies.len(),
            credentials = self.batch.len(),
            "Investigating batch"
        );

        let outcomes = SearchOrchestrator::investigate_batch(
            self.batch.clone(),
            strategies,
            self.config.batch.requests_per_minute,
            None,
        )
        .await
        .to_mcp_err()?;

        let entries: Vec<BatchEntry> = outcomes
            .into_iter()
            .enumerate()
            .map(|(index, outcome)| match outcome {
                Ok(outcome) => BatchEntry { index, outcome: Some(outcome), error: None },
                Err(e) => BatchEntry { index, outcome: None, error: Some(e.to_string()) },
            })
            .collect();
        json_success(&entries)
    }

    #[tool(description = "Show the search tasks an investigation would run, in execution order, without running them.")]
    async fn plan_tasks(
        &self,
        Parameters(params): Parameters<InvestigateParams>,
    ) -> Result<CallToolResult, McpError> {
        let strategy = params.into_strategy().to_mcp_err()?;
        let tasks = self.orchestrator.plan(&strategy).to_mcp_err()?;
        json_success(&tasks)
    }

    #[tool(description = "Get the backend table, scheduler limits and scoring settings.")]
    async fn get_config(&self) -> Result<CallToolResult, McpError> {
        json_success(&ConfigStatus::from_config(&self.config))
    }

    #[tool(description = "Get per-backend call counts, errors, durations and calls in the last minute.")]
    async fn get_call_stats(&self) -> Result<CallToolResult, McpError> {
        json_success(&self.monitor.snapshot())
    }

    #[tool(description = "Reset the per-backend call counters.")]
    async fn reset_call_stats(&self) -> Result<CallToolResult, McpError> {
        self.monitor.reset();
        Ok(text_success("Call statistics reset"))
    }
}

// ============================================================================
// Server Handler Implementation
// ============================================================================

#[tool_handler]
impl rmcp::ServerHandler for EvidenceSearchMcpServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(
                "Evidence Search MCP Server - runs keyword investigations across several \
                 web search backends (Google, Bing, DuckDuckGo, Yandex, Baidu, SearXNG), \
                 throttled per backend with fallback retries, and returns deduplicated, \
                 relevance-ranked results."
                    .into(),
            ),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CanonicalResult, SearchTask};
    use async_trait::async_trait;

    struct OneHitAdapter;

    #[async_trait]
    impl SearchAdapter for OneHitAdapter {
        async fn search(&self, task: &SearchTask) -> SearchResult<Vec<CanonicalResult>> {
            Ok(vec![CanonicalResult {
                title: format!("{} result", task.keyword),
                url: format!("https://{}.example/hit", task.backend),
                snippet: String::new(),
                position: 1,
                backend: task.backend.clone(),
                keyword: task.keyword.clone(),
            }])
        }

        fn supports(&self, _backend: &str) -> bool {
            true
        }
    }

    fn server() -> EvidenceSearchMcpServer {
        EvidenceSearchMcpServer::with_adapter(Config::default(), Arc::new(OneHitAdapter), CallMonitor::new())
    }

    fn params(keywords: &[&str]) -> InvestigateParams {
        InvestigateParams {
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
            backends: None,
            language: None,
            country: None,
            start_month: None,
            end_month: None,
            entities: None,
            result_cap: None,
        }
    }

    #[test]
    fn test_list_tools() {
        let tools = server().tool_router.list_all();
        assert_eq!(tools.len(), 6);

        let names: Vec<&str> = tools.iter().map(|t| t.name.as_ref()).collect();
        for expected in [
            "investigate",
            "investigate_batch",
            "plan_tasks",
            "get_config",
            "get_call_stats",
            "reset_call_stats",
        ] {
            assert!(names.contains(&expected), "missing tool {}", expected);
        }
    }

    #[test]
    fn test_into_strategy() {
        let mut p = params(&["acme funding"]);
        p.backends = Some(vec!["bing".into()]);
        p.start_month = Some("2020-01".into());
        p.end_month = Some("2020-02".into());
        p.entities = Some(vec![EntityParams {
            name: "Acme Corp".into(),
            verified_name: None,
            domain: Some("www.acme.com".into()),
            sectors: None,
        }]);

        let strategy = p.into_strategy().unwrap();
        let range = strategy.date_range.unwrap();
        assert_eq!(range.end_date().to_string(), "2020-02-29");
        assert_eq!(strategy.verified_domains(), vec!["acme.com"]);
        assert_eq!(strategy.backends, vec!["bing"]);
    }

    #[test]
    fn test_half_open_date_window_is_rejected() {
        let mut p = params(&["acme"]);
        p.start_month = Some("2020-01".into());
        let err = p.into_strategy().unwrap_err();
        assert!(matches!(err, SearchError::InvalidDateRange(_)));
    }

    #[test]
    fn test_error_mapping() {
        let caller = SearchError::EmptyStrategy("no keywords".into()).into_mcp_error();
        assert_eq!(caller.code, rmcp::model::ErrorCode::INVALID_PARAMS);

        let internal = SearchError::Transport("reset".into()).into_mcp_error();
        assert_eq!(internal.code, rmcp::model::ErrorCode::INTERNAL_ERROR);
    }

    #[tokio::test(start_paused = true)]
    async fn test_investigate_tool() {
        let result = server()
            .investigate(Parameters(params(&["acme"])))
            .await
            .unwrap();
        assert!(result.is_error.is_none() || !result.is_error.unwrap());
    }

    #[tokio::test]
    async fn test_plan_tasks_rejects_empty_keywords() {
        let err = server().plan_tasks(Parameters(params(&[]))).await.unwrap_err();
        assert_eq!(err.code, rmcp::model::ErrorCode::INVALID_PARAMS);
    }

    fn tool_json(result: &CallToolResult) -> serde_json::Value {
        let item = serde_json::to_value(&result.content[0]).unwrap();
        serde_json::from_str(item["text"].as_str().unwrap()).unwrap()
    }

    fn batch_server(keys: usize) -> EvidenceSearchMcpServer {
        let config = Config::default();
        let batch = (0..keys)
            .map(|_| SearchOrchestrator::from_config(&config, Arc::new(OneHitAdapter)))
            .collect();
        server().with_batch(batch)
    }

    #[tokio::test(start_paused = true)]
    async fn test_investigate_batch_tool() {
        let result = batch_server(2)
            .investigate_batch(Parameters(BatchParams {
                strategies: vec![params(&["acme"]), params(&[" "]), params(&["globex"])],
            }))
            .await
            .unwrap();

        let entries = tool_json(&result);
        let entries = entries.as_array().unwrap();
        assert_eq!(entries.len(), 3);
        for (i, entry) in entries.iter().enumerate() {
            assert_eq!(entry["index"], i);
        }
        assert_eq!(entries[0]["outcome"]["results"][0]["url"], "https://google.example/hit");
        assert!(entries[1]["outcome"].is_null());
        assert!(entries[1]["error"].as_str().unwrap().contains("empty search strategy"));
        assert_eq!(entries[2]["outcome"]["summary"]["total_tasks"], 1);
    }

    #[tokio::test]
    async fn test_investigate_batch_without_keys() {
        let err = server()
            .investigate_batch(Parameters(BatchParams {
                strategies: vec![params(&["acme"])],
            }))
            .await
            .unwrap_err();
        assert_eq!(err.code, rmcp::model::ErrorCode::INTERNAL_ERROR);
        assert!(err.message.contains("no credentials"));
    }

    #[tokio::test]
    async fn test_investigate_batch_rejects_bad_strategy() {
        let mut bad = params(&["acme"]);
        bad.start_month = Some("2020-13".into());
        bad.end_month = Some("2021-01".into());

        let err = batch_server(1)
            .investigate_batch(Parameters(BatchParams {
                strategies: vec![params(&["acme"]), bad],
            }))
            .await
            .unwrap_err();
        assert_eq!(err.code, rmcp::model::ErrorCode::INVALID_PARAMS);
        assert!(err.message.starts_with("strategy 1:"));
    }

    #[test]
    fn test_config_status_hides_credentials() {
        let mut config = Config::default();
        config.transport.api_key = Some("secret-key".into());
        config.batch.api_keys = vec!["k1".into(), "k2".into()];

        let json = serde_json::to_string(&ConfigStatus::from_config(&config)).unwrap();
        assert!(!json.contains("secret-key"));
        assert!(!json.contains("\"k1\""));
        assert!(json.contains("\"batch_credentials\":2"));
        assert!(json.contains("\"baseline_backend\":\"google\""));
    }
}
