//! Throttled task execution
//!
//! Tasks are partitioned by backend and run in small concurrent batches with a
//! pause between batches, so scraping-sensitive backends never see a burst.
//! Every attempt has its own deadline. When it passes, the scheduler stops
//! waiting and moves on; the spawned call is left to finish in the background
//! and whatever it returns is dropped.
//!
//! After the primary pass, a bounded number of failed tasks get exactly one
//! more attempt on a fallback backend.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use serde::Serialize;
use tokio::time::Instant;

use crate::backends::SearchAdapter;
use crate::config::SchedulerConfig;
use crate::error::{SearchError, SearchResult};
use crate::types::{BackendStats, CanonicalResult, ExecutionSummary, SearchTask};

// ============================================================================
// Task lifecycle
// ============================================================================

/// Which attempt a record belongs to
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum Attempt {
    Primary,
    /// Second and last attempt, on a different backend
    Retry { original_backend: String },
}

/// Lifecycle of a single attempt
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case", tag = "state")]
pub enum TaskState {
    Pending,
    Executing,
    Succeeded { results: usize },
    TimedOut,
    Failed { error: String, retryable: bool },
}

impl TaskState {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded { .. })
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Self::TimedOut | Self::Failed { .. })
    }

    fn is_retryable(&self) -> bool {
        matches!(self, Self::TimedOut | Self::Failed { retryable: true, .. })
    }
}

/// One attempt at one task
#[derive(Debug, Clone, Serialize)]
pub struct TaskRun {
    pub task: SearchTask,
    pub attempt: Attempt,
    pub state: TaskState,
    pub elapsed_ms: u64,
}

impl TaskRun {
    fn pending(task: SearchTask, attempt: Attempt) -> Self {
        Self {
            task,
            attempt,
            state: TaskState::Pending,
            elapsed_ms: 0,
        }
    }

    fn start(&mut self) {
        debug_assert_eq!(self.state, TaskState::Pending);
        self.state = TaskState::Executing;
    }

    fn finish(&mut self, state: TaskState, elapsed: Duration) {
        debug_assert_eq!(self.state, TaskState::Executing);
        self.state = state;
        self.elapsed_ms = elapsed.as_millis() as u64;
    }

    /// New pending attempt on `backend`, if this one may be retried
    ///
    /// Only a failed or timed-out primary attempt qualifies.
    fn retry_on(&self, backend: &str) -> Option<TaskRun> {
        if self.attempt != Attempt::Primary || !self.state.is_retryable() {
            return None;
        }
        Some(TaskRun::pending(
            self.task.with_backend(backend),
            Attempt::Retry {
                original_backend: self.task.backend.clone(),
            },
        ))
    }
}

/// Everything a scheduler run produced
#[derive(Debug, Clone, Default)]
pub struct ExecutionReport {
    /// Results from successful attempts, in completion order per batch
    pub results: Vec<CanonicalResult>,
    /// One entry per attempt, primary then retries
    pub runs: Vec<TaskRun>,
    pub summary: ExecutionSummary,
}

// ============================================================================
// Scheduler
// ============================================================================

/// Runs task lists against a [`SearchAdapter`] within per-backend limits
#[derive(Clone)]
pub struct Scheduler {
    adapter: Arc<dyn SearchAdapter>,
    config: SchedulerConfig,
}

impl Scheduler {
    pub fn new(adapter: Arc<dyn SearchAdapter>, config: SchedulerConfig) -> Self {
        Self { adapter, config }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Run every task to success or recorded failure
    ///
    /// Only an empty task list is an error.
    pub async fn run(&self, tasks: Vec<SearchTask>) -> SearchResult<ExecutionReport> {
        if tasks.is_empty() {
            return Err(SearchError::EmptyStrategy("no tasks to run".to_string()));
        }

        let started = Instant::now();
        let total_tasks = tasks.len();
        let batch_size = self.config.batch_size.max(1);
        let partitions = partition_by_backend(tasks);

        tracing::info!(
            tasks = total_tasks,
            backends = partitions.len(),
            batch_size,
            "Starting search execution"
        );

        let mut report = ExecutionReport::default();
        let mut first_batch = true;

        for (backend, backend_tasks) in partitions {
            tracing::debug!(backend = %backend, tasks = backend_tasks.len(), "Running backend partition");
            for batch in backend_tasks.chunks(batch_size) {
                if !first_batch {
                    tokio::time::sleep(self.config.backpressure_delay()).await;
                }
                first_batch = false;

                let runs = batch
                    .iter()
                    .cloned()
                    .map(|task| TaskRun::pending(task, Attempt::Primary));
                self.run_batch(runs, self.config.task_timeout(), &mut report)
                    .await;
            }
        }

        let retries = self.plan_retries(&report.runs);
        if !retries.is_empty() {
            tracing::info!(retries = retries.len(), "Retrying failed tasks on fallback backends");
        }
        for batch in retries.chunks(batch_size) {
            tokio::time::sleep(self.config.backpressure_delay()).await;
            self.run_batch(batch.iter().cloned(), self.config.retry_timeout(), &mut report)
                .await;
        }

        report.summary = summarize(&report.runs, total_tasks, started.elapsed());
        tracing::info!(
            succeeded = report.summary.succeeded,
            failed = report.summary.failed,
            retried = report.summary.retried,
            results = report.summary.total_results,
            elapsed_ms = report.summary.wall_clock_ms,
            "Search execution finished"
        );
        Ok(report)
    }

    async fn run_batch(
        &self,
        runs: impl Iterator<Item = TaskRun>,
        limit: Duration,
        report: &mut ExecutionReport,
    ) {
        let outcomes = join_all(runs.map(|run| self.execute(run, limit))).await;
        for (run, results) in outcomes {
            report.results.extend(results);
            report.runs.push(run);
        }
    }

    /// Execute one attempt under a deadline
    async fn execute(&self, mut run: TaskRun, limit: Duration) -> (TaskRun, Vec<CanonicalResult>) {
        run.start();
        let started = Instant::now();

        let adapter = Arc::clone(&self.adapter);
        let task = run.task.clone();
        let handle = tokio::spawn(async move { adapter.search(&task).await });

        let (state, results) = match tokio::time::timeout(limit, handle).await {
            Ok(Ok(Ok(results))) => (
                TaskState::Succeeded {
                    results: results.len(),
                },
                results,
            ),
            Ok(Ok(Err(error))) => {
                tracing::warn!(
                    backend = %run.task.backend,
                    keyword = %run.task.keyword,
                    error_type = error.label(),
                    "Search task failed: {}",
                    error
                );
                (
                    TaskState::Failed {
                        retryable: error.is_retryable(),
                        error: error.to_string(),
                    },
                    Vec::new(),
                )
            }
            Ok(Err(join_error)) => {
                tracing::warn!(
                    backend = %run.task.backend,
                    keyword = %run.task.keyword,
                    "Search task aborted: {}",
                    join_error
                );
                (
                    TaskState::Failed {
                        error: format!("search task aborted: {}", join_error),
                        retryable: true,
                    },
                    Vec::new(),
                )
            }
            // The handle is dropped here; the call keeps running detached.
            Err(_) => {
                let timeout = SearchError::Timeout {
                    backend: run.task.backend.clone(),
                    after_ms: limit.as_millis() as u64,
                };
                tracing::warn!(keyword = %run.task.keyword, "{}", timeout);
                (TaskState::TimedOut, Vec::new())
            }
        };

        run.finish(state, started.elapsed());
        tracing::debug!(
            backend = %run.task.backend,
            keyword = %run.task.keyword,
            priority = run.task.priority,
            elapsed_ms = run.elapsed_ms,
            results = results.len(),
            "Search task finished"
        );
        (run, results)
    }

    /// First fallback backend that differs from `backend` and can be served
    fn fallback_for(&self, backend: &str) -> Option<&str> {
        self.config
            .fallback_backends
            .iter()
            .map(String::as_str)
            .find(|fb| *fb != backend && self.adapter.supports(fb))
    }

    /// Retry attempts for the highest-priority retryable failures
    fn plan_retries(&self, runs: &[TaskRun]) -> Vec<TaskRun> {
        let mut failed: Vec<&TaskRun> = runs
            .iter()
            .filter(|r| r.attempt == Attempt::Primary && r.state.is_retryable())
            .collect();
        failed.sort_by(|a, b| b.task.priority.cmp(&a.task.priority));

        failed
            .into_iter()
            .take(self.config.max_retries)
            .filter_map(|run| {
                let fallback = self.fallback_for(&run.task.backend);
                if fallback.is_none() {
                    tracing::debug!(backend = %run.task.backend, "No fallback backend available");
                }
                fallback.and_then(|fb| run.retry_on(fb))
            })
            .collect()
    }
}

/// Group tasks by backend, keeping first-appearance order of backends and
/// generation order within each group
fn partition_by_backend(tasks: Vec<SearchTask>) -> Vec<(String, Vec<SearchTask>)> {
    let mut partitions: Vec<(String, Vec<SearchTask>)> = Vec::new();
    for task in tasks {
        match partitions.iter_mut().find(|(backend, _)| *backend == task.backend) {
            Some((_, group)) => group.push(task),
            None => partitions.push((task.backend.clone(), vec![task])),
        }
    }
    partitions
}

/// Fold attempt records into an [`ExecutionSummary`]
pub fn summarize(runs: &[TaskRun], total_tasks: usize, elapsed: Duration) -> ExecutionSummary {
    let mut per_backend: BTreeMap<String, BackendStats> = BTreeMap::new();
    let mut backends_used = BTreeSet::new();
    let mut summary = ExecutionSummary {
        total_tasks: total_tasks as u32,
        wall_clock_ms: elapsed.as_millis() as u64,
        ..Default::default()
    };
    let mut primary_failed = 0u32;
    let mut retry_succeeded = 0u32;

    for run in runs {
        backends_used.insert(run.task.backend.clone());
        let stats = per_backend.entry(run.task.backend.clone()).or_default();
        stats.attempts += 1;

        let is_retry = matches!(run.attempt, Attempt::Retry { .. });
        if is_retry {
            summary.retried += 1;
        }

        match &run.state {
            TaskState::Succeeded { results } => {
                stats.succeeded += 1;
                stats.results += *results as u32;
                summary.succeeded += 1;
                summary.total_results += *results as u32;
                if is_retry {
                    retry_succeeded += 1;
                }
            }
            state if state.is_failure() => {
                stats.failed += 1;
                if *state == TaskState::TimedOut {
                    stats.timed_out += 1;
                }
                summary.failed += 1;
                if !is_retry {
                    primary_failed += 1;
                }
            }
            _ => {}
        }
    }

    for stats in per_backend.values_mut() {
        stats.success_rate = if stats.attempts == 0 {
            0.0
        } else {
            stats.succeeded as f64 / stats.attempts as f64
        };
    }

    summary.permanently_failed = primary_failed.saturating_sub(retry_succeeded);
    summary.backends_used = backends_used.into_iter().collect();
    summary.per_backend = per_backend;
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TaskOptions;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Clone)]
    enum Behavior {
        Results(usize),
        Fail,
        Hang(Duration),
    }

    /// Adapter with a fixed behavior per backend
    struct ScriptedAdapter {
        behaviors: HashMap<String, Behavior>,
        calls: Mutex<Vec<(String, String)>>,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    impl ScriptedAdapter {
        fn new(behaviors: &[(&str, Behavior)]) -> Arc<Self> {
            Arc::new(Self {
                behaviors: behaviors
                    .iter()
                    .map(|(b, behavior)| (b.to_string(), behavior.clone()))
                    .collect(),
                calls: Mutex::new(Vec::new()),
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> Vec<(String, String)> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl SearchAdapter for ScriptedAdapter {
        async fn search(&self, task: &SearchTask) -> SearchResult<Vec<CanonicalResult>> {
            self.calls
                .lock()
                .unwrap()
                .push((task.backend.clone(), task.keyword.clone()));
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);

            let behavior = self
                .behaviors
                .get(&task.backend)
                .cloned()
                .ok_or_else(|| SearchError::UnsupportedBackend(task.backend.clone()));
            let outcome = match behavior {
                Err(e) => Err(e),
                Ok(Behavior::Fail) => Err(SearchError::Transport("503".into())),
                Ok(Behavior::Hang(d)) => {
                    tokio::time::sleep(d).await;
                    Ok(Vec::new())
                }
                Ok(Behavior::Results(n)) => {
                    tokio::time::sleep(Duration::from_millis(200)).await;
                    Ok((1..=n)
                        .map(|i| CanonicalResult {
                            title: format!("{} {}", task.keyword, i),
                            url: format!("https://{}.example/{}/{}", task.backend, task.keyword, i),
                            snippet: String::new(),
                            position: i as u32,
                            backend: task.backend.clone(),
                            keyword: task.keyword.clone(),
                        })
                        .collect())
                }
            };
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            outcome
        }

        fn supports(&self, backend: &str) -> bool {
            self.behaviors.contains_key(backend)
        }
    }

    fn task(keyword: &str, backend: &str, priority: i32) -> SearchTask {
        SearchTask {
            keyword: keyword.into(),
            backend: backend.into(),
            priority,
            options: TaskOptions {
                result_cap: 10,
                language: None,
                country: None,
                date_range: None,
            },
        }
    }

    fn config() -> SchedulerConfig {
        SchedulerConfig {
            fallback_backends: vec!["google".into(), "bing".into()],
            ..Default::default()
        }
    }

    #[test]
    fn test_partition_keeps_order() {
        let parts = partition_by_backend(vec![
            task("a", "bing", 9),
            task("b", "google", 8),
            task("c", "bing", 7),
        ]);
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0].0, "bing");
        assert_eq!(parts[0].1[1].keyword, "c");
        assert_eq!(parts[1].0, "google");
    }

    #[test]
    fn test_retry_transition_rules() {
        let mut run = TaskRun::pending(task("a", "bing", 5), Attempt::Primary);
        run.start();
        run.finish(TaskState::TimedOut, Duration::from_secs(25));
        let retry = run.retry_on("google").unwrap();
        assert_eq!(retry.state, TaskState::Pending);
        assert_eq!(retry.task.backend, "google");
        assert_eq!(
            retry.attempt,
            Attempt::Retry {
                original_backend: "bing".into()
            }
        );

        let mut again = retry.clone();
        again.start();
        again.finish(TaskState::TimedOut, Duration::from_secs(15));
        assert!(again.retry_on("bing").is_none());

        let mut unsupported = TaskRun::pending(task("a", "x", 5), Attempt::Primary);
        unsupported.start();
        unsupported.finish(
            TaskState::Failed {
                error: "unsupported backend: x".into(),
                retryable: false,
            },
            Duration::ZERO,
        );
        assert!(unsupported.retry_on("google").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_all_tasks_succeed() {
        let adapter = ScriptedAdapter::new(&[
            ("google", Behavior::Results(3)),
            ("bing", Behavior::Results(2)),
        ]);
        let scheduler = Scheduler::new(adapter.clone(), config());
        let tasks = ["a", "b", "c", "d"]
            .iter()
            .flat_map(|k| [task(k, "google", 5), task(k, "bing", 5)])
            .collect();

        let report = scheduler.run(tasks).await.unwrap();
        let summary = &report.summary;
        assert_eq!(summary.total_tasks, 8);
        assert_eq!(summary.succeeded, 8);
        assert_eq!(summary.failed, 0);
        assert_eq!(summary.retried, 0);
        assert_eq!(summary.total_results, 20);
        assert_eq!(report.results.len(), 20);
        assert_eq!(summary.backends_used, vec!["bing", "google"]);
        assert_eq!(summary.per_backend["google"].success_rate, 1.0);
        assert!(adapter.max_in_flight.load(Ordering::SeqCst) <= 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_batches_are_bounded_and_spaced() {
        let adapter = ScriptedAdapter::new(&[("google", Behavior::Results(1))]);
        let scheduler = Scheduler::new(adapter.clone(), config());
        let tasks: Vec<SearchTask> = (0..7).map(|i| task(&format!("k{}", i), "google", 5)).collect();

        let started = Instant::now();
        let report = scheduler.run(tasks).await.unwrap();
        let elapsed = started.elapsed();

        // three batches (3 + 3 + 1), two pauses between them
        assert_eq!(adapter.max_in_flight.load(Ordering::SeqCst), 3);
        assert!(elapsed >= Duration::from_millis(2 * 1500 + 3 * 200));
        assert_eq!(report.summary.succeeded, 7);

        // batches run in generation order
        let keywords: Vec<String> = adapter.calls().into_iter().map(|(_, k)| k).collect();
        assert_eq!(&keywords[..3], &["k0", "k1", "k2"]);
        assert_eq!(keywords[6], "k6");
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_resolves_to_failure_and_retries() {
        let adapter = ScriptedAdapter::new(&[
            ("google", Behavior::Results(2)),
            ("slow", Behavior::Hang(Duration::from_secs(120))),
        ]);
        let scheduler = Scheduler::new(adapter.clone(), config());
        let tasks = vec![task("acme", "google", 5), task("acme", "slow", 5)];

        let report = scheduler.run(tasks).await.unwrap();
        let summary = &report.summary;

        let slow = &summary.per_backend["slow"];
        assert_eq!(slow.attempts, 1);
        assert_eq!(slow.failed, 1);
        assert_eq!(slow.timed_out, 1);
        assert_eq!(slow.results, 0);

        // retried once on google, which succeeded
        assert_eq!(summary.retried, 1);
        assert_eq!(summary.per_backend["google"].attempts, 2);
        assert_eq!(summary.permanently_failed, 0);
        assert_eq!(summary.succeeded + summary.failed, summary.total_tasks + summary.retried);
        assert_eq!(report.results.len(), 4);

        let retry = report.runs.last().unwrap();
        assert_eq!(
            retry.attempt,
            Attempt::Retry {
                original_backend: "slow".into()
            }
        );
        assert!(retry.state.is_success());
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_cap_and_permanent_failures() {
        let adapter = ScriptedAdapter::new(&[
            ("flaky", Behavior::Fail),
            ("google", Behavior::Fail),
            ("bing", Behavior::Fail),
        ]);
        let scheduler = Scheduler::new(adapter.clone(), config());
        let tasks: Vec<SearchTask> = (0..7)
            .map(|i| task(&format!("k{}", i), "flaky", 10 - i))
            .collect();

        let report = scheduler.run(tasks).await.unwrap();
        let summary = &report.summary;
        assert_eq!(summary.total_tasks, 7);
        assert_eq!(summary.retried, 5);
        assert_eq!(summary.succeeded, 0);
        assert_eq!(summary.failed, 12);
        assert_eq!(summary.permanently_failed, 7);
        assert_eq!(summary.succeeded + summary.failed, summary.total_tasks + summary.retried);

        // highest-priority failures were the ones retried
        let retried: Vec<&str> = report
            .runs
            .iter()
            .filter(|r| matches!(r.attempt, Attempt::Retry { .. }))
            .map(|r| r.task.keyword.as_str())
            .collect();
        assert_eq!(retried, vec!["k0", "k1", "k2", "k3", "k4"]);
        assert!(report
            .runs
            .iter()
            .filter(|r| matches!(r.attempt, Attempt::Retry { .. }))
            .all(|r| r.task.backend == "google"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unsupported_backend_is_not_retried() {
        let adapter = ScriptedAdapter::new(&[("google", Behavior::Results(1))]);
        let scheduler = Scheduler::new(adapter.clone(), config());
        let report = scheduler
            .run(vec![task("acme", "altavista", 5), task("acme", "google", 5)])
            .await
            .unwrap();

        assert_eq!(report.summary.retried, 0);
        assert_eq!(report.summary.failed, 1);
        assert_eq!(report.summary.permanently_failed, 1);
        assert_eq!(report.summary.per_backend["altavista"].failed, 1);
        assert_eq!(report.results.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_google_falls_back_to_bing() {
        let adapter = ScriptedAdapter::new(&[
            ("google", Behavior::Fail),
            ("bing", Behavior::Results(1)),
        ]);
        let scheduler = Scheduler::new(adapter.clone(), config());
        let report = scheduler.run(vec![task("acme", "google", 5)]).await.unwrap();

        assert_eq!(report.summary.retried, 1);
        assert_eq!(report.summary.per_backend["bing"].succeeded, 1);
        assert_eq!(report.summary.permanently_failed, 0);
    }

    #[tokio::test]
    async fn test_empty_task_list() {
        let adapter = ScriptedAdapter::new(&[]);
        let scheduler = Scheduler::new(adapter, config());
        let err = scheduler.run(Vec::new()).await.unwrap_err();
        assert!(matches!(err, SearchError::EmptyStrategy(_)));
    }
}
