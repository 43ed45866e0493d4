//! End-to-end investigation pipeline
//!
//! strategy -> planner -> scheduler -> consolidator

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::mpsc::UnboundedSender;

use crate::backends::{BackendAdapter, HttpTransport, SearchAdapter};
use crate::config::Config;
use crate::consolidator::ResultConsolidator;
use crate::credentials::{BatchProgress, CredentialQueues};
use crate::error::SearchResult;
use crate::monitor::CallMonitor;
use crate::planner::TaskPlanner;
use crate::scheduler::Scheduler;
use crate::types::{ConsolidatedResult, ConsolidationReport, ExecutionSummary, SearchStrategy, SearchTask};

/// What one investigation hands to the analysis stage
#[derive(Debug, Clone, Serialize)]
pub struct InvestigationOutcome {
    pub results: Vec<ConsolidatedResult>,
    pub summary: ExecutionSummary,
    pub report: ConsolidationReport,
}

/// Runs strategies through planning, execution and consolidation
#[derive(Clone)]
pub struct SearchOrchestrator {
    planner: TaskPlanner,
    scheduler: Scheduler,
    consolidator: ResultConsolidator,
}

impl SearchOrchestrator {
    pub fn new(planner: TaskPlanner, scheduler: Scheduler, consolidator: ResultConsolidator) -> Self {
        Self {
            planner,
            scheduler,
            consolidator,
        }
    }

    /// Pipeline over any adapter, configured from `config`
    pub fn from_config(config: &Config, adapter: Arc<dyn SearchAdapter>) -> Self {
        Self::new(
            TaskPlanner::from_config(config),
            Scheduler::new(adapter, config.scheduler.clone()),
            ResultConsolidator::from_config(config),
        )
    }

    /// Pipeline over the built-in backends and a live HTTP transport
    pub fn with_transport(config: &Config, transport: HttpTransport, monitor: CallMonitor) -> Self {
        let adapter = BackendAdapter::from_config(config, Arc::new(transport), monitor);
        Self::from_config(config, Arc::new(adapter))
    }

    /// Tasks a strategy would run, without running them
    pub fn plan(&self, strategy: &SearchStrategy) -> SearchResult<Vec<SearchTask>> {
        self.planner.plan(strategy)
    }

    /// Run one strategy end to end
    ///
    /// Task failures are reported in the summary. Only a strategy with
    /// nothing to search is an error.
    pub async fn investigate(&self, strategy: &SearchStrategy) -> SearchResult<InvestigationOutcome> {
        let tasks = self.planner.plan(strategy)?;
        let execution = self.scheduler.run(tasks).await?;

        let tokens = strategy.priority_tokens();
        let domains = strategy.verified_domains();
        let (results, report) = self
            .consolidator
            .consolidate(execution.results, &tokens, &domains);

        tracing::info!(
            tasks = execution.summary.total_tasks,
            failed = execution.summary.permanently_failed,
            results = results.len(),
            "Investigation complete"
        );

        Ok(InvestigationOutcome {
            results,
            summary: execution.summary,
            report,
        })
    }

    /// Run many strategies spread over several credentials
    ///
    /// Each orchestrator in `orchestrators` is bound to one credential and
    /// works through its share of `strategies` one at a time, at most
    /// `requests_per_minute` investigations per minute. Outcomes are returned
    /// in the order of `strategies`.
    pub async fn investigate_batch(
        orchestrators: Vec<SearchOrchestrator>,
        strategies: Vec<SearchStrategy>,
        requests_per_minute: u32,
        progress: Option<UnboundedSender<BatchProgress>>,
    ) -> SearchResult<Vec<SearchResult<InvestigationOutcome>>> {
        let mut queues = CredentialQueues::new(orchestrators, requests_per_minute)?;
        if let Some(sender) = progress {
            queues = queues.with_progress(sender);
        }

        let outcomes = queues
            .run(strategies, |orchestrator, strategy| async move {
                orchestrator.investigate(&strategy).await
            })
            .await;
        Ok(outcomes)
    }

    /// One orchestrator per proxy API key, all sharing `monitor`
    pub fn per_api_key(
        config: &Config,
        transport: &HttpTransport,
        monitor: &CallMonitor,
        api_keys: &[String],
    ) -> Vec<SearchOrchestrator> {
        api_keys
            .iter()
            .map(|key| Self::with_transport(config, transport.with_api_key(key.clone()), monitor.clone()))
            .collect()
    }
}
