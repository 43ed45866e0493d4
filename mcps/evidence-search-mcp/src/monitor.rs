//! Backend call accounting
//!
//! Counts outbound calls per backend (successes, failures, durations) and
//! keeps a rolling one-minute window of call times for credit and rate
//! tracking. A [`CallMonitor`] is a cheap handle; clones share state. It is
//! created per process and injected where calls are made, so tests can use
//! their own.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::error::SearchError;

const RATE_WINDOW: Duration = Duration::from_secs(60);

/// Counters for a single backend
#[derive(Debug, Clone, Default, Serialize)]
pub struct BackendCallStats {
    pub backend: String,
    pub total_calls: u64,
    pub success_count: u64,
    pub error_count: u64,
    pub results_returned: u64,
    pub total_duration_ms: u64,
    /// Average duration in milliseconds (computed)
    pub avg_duration_ms: u64,
    pub last_error: Option<String>,
    /// Calls started within the last minute
    pub calls_last_minute: usize,
}

#[derive(Debug, Default)]
struct BackendCounters {
    stats: BackendCallStats,
    recent: VecDeque<Instant>,
}

impl BackendCounters {
    fn new(backend: &str) -> Self {
        Self {
            stats: BackendCallStats {
                backend: backend.to_string(),
                ..Default::default()
            },
            recent: VecDeque::new(),
        }
    }

    fn record(&mut self, duration_ms: u64, now: Instant) {
        self.stats.total_calls += 1;
        self.stats.total_duration_ms += duration_ms;
        self.stats.avg_duration_ms = self.stats.total_duration_ms / self.stats.total_calls;
        self.recent.push_back(now);
        self.prune(now);
    }

    fn prune(&mut self, now: Instant) {
        while let Some(front) = self.recent.front() {
            if now.duration_since(*front) > RATE_WINDOW {
                self.recent.pop_front();
            } else {
                break;
            }
        }
    }

    fn snapshot(&mut self, now: Instant) -> BackendCallStats {
        self.prune(now);
        BackendCallStats {
            calls_last_minute: self.recent.len(),
            ..self.stats.clone()
        }
    }
}

/// Aggregate view returned by [`CallMonitor::snapshot`]
#[derive(Debug, Clone, Default, Serialize)]
pub struct MonitorSnapshot {
    pub total_calls: u64,
    pub total_errors: u64,
    /// Per-backend stats, sorted by backend name
    pub backends: Vec<BackendCallStats>,
}

/// Shared, resettable call counters
#[derive(Debug, Clone, Default)]
pub struct CallMonitor {
    inner: Arc<Mutex<HashMap<String, BackendCounters>>>,
}

impl CallMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, BackendCounters>> {
        // Counters stay usable even if a recording thread panicked
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Record a call that returned a parsed response
    pub fn record_success(&self, backend: &str, duration_ms: u64, results: usize) {
        tracing::debug!(
            search.backend = backend,
            search.duration_ms = duration_ms,
            search.results = results,
            "Backend call succeeded"
        );
        let mut map = self.lock();
        let counters = map
            .entry(backend.to_string())
            .or_insert_with(|| BackendCounters::new(backend));
        counters.record(duration_ms, Instant::now());
        counters.stats.success_count += 1;
        counters.stats.results_returned += results as u64;
    }

    /// Record a call that failed
    pub fn record_error(&self, backend: &str, duration_ms: u64, error: &SearchError) {
        tracing::warn!(
            search.backend = backend,
            search.duration_ms = duration_ms,
            search.error_type = error.label(),
            "Backend call failed: {}",
            error
        );
        let mut map = self.lock();
        let counters = map
            .entry(backend.to_string())
            .or_insert_with(|| BackendCounters::new(backend));
        counters.record(duration_ms, Instant::now());
        counters.stats.error_count += 1;
        counters.stats.last_error = Some(error.to_string());
    }

    /// Stats for one backend
    pub fn get(&self, backend: &str) -> Option<BackendCallStats> {
        let now = Instant::now();
        self.lock().get_mut(backend).map(|c| c.snapshot(now))
    }

    /// Copy of every counter
    pub fn snapshot(&self) -> MonitorSnapshot {
        let now = Instant::now();
        let mut map = self.lock();
        let mut backends: Vec<BackendCallStats> =
            map.values_mut().map(|c| c.snapshot(now)).collect();
        backends.sort_by(|a, b| a.backend.cmp(&b.backend));

        MonitorSnapshot {
            total_calls: backends.iter().map(|b| b.total_calls).sum(),
            total_errors: backends.iter().map(|b| b.error_count).sum(),
            backends,
        }
    }

    /// Total calls across all backends
    pub fn total_calls(&self) -> u64 {
        self.lock().values().map(|c| c.stats.total_calls).sum()
    }

    /// Clear every counter
    pub fn reset(&self) {
        tracing::info!("Resetting backend call counters");
        self.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tracking() {
        let monitor = CallMonitor::new();
        monitor.record_success("google", 100, 10);
        monitor.record_success("google", 300, 8);
        monitor.record_error("google", 50, &SearchError::Transport("502".into()));
        monitor.record_error("bing", 20, &SearchError::UnsupportedBackend("bing".into()));

        let google = monitor.get("google").unwrap();
        assert_eq!(google.total_calls, 3);
        assert_eq!(google.success_count, 2);
        assert_eq!(google.error_count, 1);
        assert_eq!(google.results_returned, 18);
        assert_eq!(google.total_duration_ms, 450);
        assert_eq!(google.avg_duration_ms, 150);
        assert_eq!(google.calls_last_minute, 3);
        assert!(google.last_error.unwrap().contains("502"));

        let snapshot = monitor.snapshot();
        assert_eq!(snapshot.total_calls, 4);
        assert_eq!(snapshot.total_errors, 2);
        assert_eq!(snapshot.backends[0].backend, "bing");
    }

    #[test]
    fn test_clones_share_and_reset() {
        let monitor = CallMonitor::new();
        let handle = monitor.clone();
        handle.record_success("yandex", 10, 1);
        assert_eq!(monitor.total_calls(), 1);

        monitor.reset();
        assert_eq!(handle.total_calls(), 0);
        assert!(handle.get("yandex").is_none());
    }

    #[test]
    fn test_snapshot_serializes() {
        let monitor = CallMonitor::new();
        monitor.record_success("baidu", 5, 0);
        let json = serde_json::to_string(&monitor.snapshot()).unwrap();
        assert!(json.contains("\"backend\":\"baidu\""));
        assert!(json.contains("\"total_calls\":1"));
    }
}
