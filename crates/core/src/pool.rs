//! Bounded work pool shared by the fetch and transcode stages.
//!
//! A [`WorkPool`] runs a batch of independent units with at most `limit` of
//! them executing at once. Every unit receives a clone of the run's
//! [`CancellationToken`]. The pool never stops early because a unit failed;
//! units report failure through their own return value. Results come back in
//! input order regardless of completion order.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Errors raised when building a pool.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PoolError {
    /// The concurrency limit must be at least one.
    #[error("Concurrency limit for pool '{name}' must be at least 1")]
    ZeroLimit { name: String },
}

/// Result of a single unit submitted to the pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnitResult<T> {
    /// The unit ran to completion and returned a value.
    Completed(T),
    /// The cancellation signal fired before the unit started.
    Cancelled,
    /// The unit panicked. The message is kept for reporting.
    Panicked(String),
}

impl<T> UnitResult<T> {
    /// Returns the completed value, if any.
    pub fn completed(self) -> Option<T> {
        match self {
            Self::Completed(value) => Some(value),
            _ => None,
        }
    }
}

/// Snapshot of a pool's counters.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct PoolStatus {
    pub name: String,
    pub max_concurrent: usize,
    pub active_units: usize,
    pub peak_active: usize,
    pub total_completed: u64,
    pub total_cancelled: u64,
}

#[derive(Default)]
struct PoolStats {
    active: AtomicUsize,
    peak: AtomicUsize,
    completed: AtomicU64,
    cancelled: AtomicU64,
}

impl PoolStats {
    fn enter(&self) {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
    }

    fn leave(&self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
        self.completed.fetch_add(1, Ordering::Relaxed);
    }

    fn to_status(&self, name: &str, max_concurrent: usize) -> PoolStatus {
        PoolStatus {
            name: name.to_string(),
            max_concurrent,
            active_units: self.active.load(Ordering::SeqCst),
            peak_active: self.peak.load(Ordering::SeqCst),
            total_completed: self.completed.load(Ordering::Relaxed),
            total_cancelled: self.cancelled.load(Ordering::Relaxed),
        }
    }
}

/// Fixed-capacity concurrency limiter.
pub struct WorkPool {
    name: String,
    limit: usize,
    stats: Arc<PoolStats>,
}

impl WorkPool {
    /// Creates a pool that runs at most `limit` units at once.
    pub fn new(name: impl Into<String>, limit: usize) -> Result<Self, PoolError> {
        let name = name.into();
        if limit == 0 {
            return Err(PoolError::ZeroLimit { name });
        }
        Ok(Self {
            name,
            limit,
            stats: Arc::new(PoolStats::default()),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Returns the pool's counters. `peak_active` covers every run so far.
    pub fn status(&self) -> PoolStatus {
        self.stats.to_status(&self.name, self.limit)
    }

    /// Runs every unit and returns one result per unit, in input order.
    ///
    /// Units that have not acquired a slot when `cancel` fires are reported as
    /// [`UnitResult::Cancelled`] without being started. Units already running
    /// are expected to watch the token themselves.
    pub async fn run<I, F, Fut, T>(&self, units: I, cancel: &CancellationToken) -> Vec<UnitResult<T>>
    where
        I: IntoIterator<Item = F>,
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let semaphore = Arc::new(Semaphore::new(self.limit));
        let mut tasks = JoinSet::new();
        let mut task_index = HashMap::new();
        let mut total = 0;

        for (index, unit) in units.into_iter().enumerate() {
            total += 1;
            let semaphore = Arc::clone(&semaphore);
            let stats = Arc::clone(&self.stats);
            let token = cancel.clone();

            let handle = tasks.spawn(async move {
                let permit = tokio::select! {
                    biased;
                    _ = token.cancelled() => None,
                    permit = semaphore.acquire_owned() => permit.ok(),
                };

                let Some(_permit) = permit else {
                    stats.cancelled.fetch_add(1, Ordering::Relaxed);
                    return (index, UnitResult::Cancelled);
                };
                if token.is_cancelled() {
                    stats.cancelled.fetch_add(1, Ordering::Relaxed);
                    return (index, UnitResult::Cancelled);
                }

                stats.enter();
                let value = unit(token).await;
                stats.leave();
                (index, UnitResult::Completed(value))
            });
            task_index.insert(handle.id(), index);
        }

        debug!(pool = %self.name, units = total, limit = self.limit, "Pool run started");

        let mut slots: Vec<Option<UnitResult<T>>> = (0..total).map(|_| None).collect();
        while let Some(joined) = tasks.join_next_with_id().await {
            match joined {
                Ok((_, (index, result))) => slots[index] = Some(result),
                Err(e) => {
                    let Some(&index) = task_index.get(&e.id()) else {
                        continue;
                    };
                    warn!(pool = %self.name, index, error = %e, "Pool unit panicked");
                    // The permit and active counter were held by the panicking task.
                    self.stats.active.fetch_sub(1, Ordering::SeqCst);
                    slots[index] = Some(UnitResult::Panicked(e.to_string()));
                }
            }
        }

        slots
            .into_iter()
            .map(|slot| slot.unwrap_or(UnitResult::Cancelled))
            .collect()
    }
}
