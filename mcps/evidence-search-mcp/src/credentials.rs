//! Rate-limited work queues, one per credential
//!
//! Items are dealt round-robin over the credentials. Each credential drains
//! its share sequentially behind its own token bucket, and all credentials run
//! side by side. Results come back in input order.

use std::future::Future;
use std::num::NonZeroU32;
use std::sync::atomic::{AtomicUsize, Ordering};

use futures_util::future::join_all;
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use serde::Serialize;
use tokio::sync::mpsc::UnboundedSender;

use crate::error::{SearchError, SearchResult};

type DirectLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Emitted after every completed item
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchProgress {
    /// Items finished across all queues
    pub completed: usize,
    pub total: usize,
    /// Index of the credential that finished the item
    pub queue: usize,
}

/// Parallel queues sharing a workload across credentials
pub struct CredentialQueues<C> {
    credentials: Vec<C>,
    quota: Quota,
    progress: Option<UnboundedSender<BatchProgress>>,
}

impl<C: Clone> CredentialQueues<C> {
    /// `requests_per_minute` is the refill rate of each credential's bucket
    pub fn new(credentials: Vec<C>, requests_per_minute: u32) -> SearchResult<Self> {
        if credentials.is_empty() {
            return Err(SearchError::Config("no credentials configured".to_string()));
        }
        let rate = NonZeroU32::new(requests_per_minute).ok_or_else(|| {
            SearchError::Config("requests_per_minute must be greater than zero".to_string())
        })?;

        Ok(Self {
            credentials,
            quota: Quota::per_minute(rate),
            progress: None,
        })
    }

    /// Send a [`BatchProgress`] event after each item
    pub fn with_progress(mut self, sender: UnboundedSender<BatchProgress>) -> Self {
        self.progress = Some(sender);
        self
    }

    pub fn len(&self) -> usize {
        self.credentials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.credentials.is_empty()
    }

    /// Process every item exactly once, returning outputs in input order
    pub async fn run<I, O, F, Fut>(&self, items: Vec<I>, work: F) -> Vec<O>
    where
        F: Fn(C, I) -> Fut,
        Fut: Future<Output = O>,
    {
        let total = items.len();
        let queue_count = self.credentials.len();
        let mut queues: Vec<Vec<(usize, I)>> = (0..queue_count).map(|_| Vec::new()).collect();
        for (idx, item) in items.into_iter().enumerate() {
            queues[idx % queue_count].push((idx, item));
        }

        tracing::info!(items = total, queues = queue_count, "Starting credential queues");

        let completed = AtomicUsize::new(0);
        let drains = queues.into_iter().enumerate().map(|(queue, entries)| {
            let credential = self.credentials[queue].clone();
            let limiter: DirectLimiter = RateLimiter::direct(self.quota);
            let work = &work;
            let completed = &completed;
            async move {
                let mut outputs = Vec::with_capacity(entries.len());
                for (idx, item) in entries {
                    limiter.until_ready().await;
                    outputs.push((idx, work(credential.clone(), item).await));

                    let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
                    tracing::debug!(queue, completed = done, total, "Credential queue item finished");
                    if let Some(ref sender) = self.progress {
                        let _ = sender.send(BatchProgress {
                            completed: done,
                            total,
                            queue,
                        });
                    }
                }
                outputs
            }
        });

        let mut slots: Vec<Option<O>> = (0..total).map(|_| None).collect();
        for (idx, output) in join_all(drains).await.into_iter().flatten() {
            slots[idx] = Some(output);
        }
        slots.into_iter().flatten().collect()
    }
}
