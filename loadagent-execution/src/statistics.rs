//! Per-queue execution statistics
//!
//! Workers of a queue update its counters concurrently; counters are atomics
//! and latency samples sit behind a short-lived lock.

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Statistics of every queue, keyed by queue name
#[derive(Debug)]
pub struct ExecutionStatistics {
    queues: RwLock<HashMap<String, Arc<QueueStatistics>>>,
    latency_samples_limit: usize,
}

impl ExecutionStatistics {
    pub fn new(latency_samples_limit: usize) -> Self {
        Self {
            queues: RwLock::new(HashMap::new()),
            latency_samples_limit,
        }
    }

    /// Start fresh counters for `queue_name`, replacing those of an earlier
    /// queue with the same name
    pub fn init_queue(&self, queue_name: &str, pass_rate: f32) -> Arc<QueueStatistics> {
        let statistics = Arc::new(QueueStatistics::new(
            queue_name,
            pass_rate,
            self.latency_samples_limit,
        ));
        self.queues
            .write()
            .insert(queue_name.to_string(), statistics.clone());
        statistics
    }

    pub fn queue(&self, queue_name: &str) -> Option<Arc<QueueStatistics>> {
        self.queues.read().get(queue_name).cloned()
    }

    pub fn snapshot(&self, queue_name: &str) -> Option<QueueStatisticsSnapshot> {
        self.queue(queue_name).map(|statistics| statistics.snapshot())
    }

    /// Snapshots of all queues, sorted by name
    pub fn snapshots(&self) -> Vec<QueueStatisticsSnapshot> {
        let mut snapshots: Vec<QueueStatisticsSnapshot> = self
            .queues
            .read()
            .values()
            .map(|statistics| statistics.snapshot())
            .collect();
        snapshots.sort_by(|a, b| a.queue.cmp(&b.queue));
        snapshots
    }

    pub fn remove(&self, queue_name: &str) -> Option<Arc<QueueStatistics>> {
        self.queues.write().remove(queue_name)
    }
}

impl Default for ExecutionStatistics {
    fn default() -> Self {
        Self::new(100_000)
    }
}

#[derive(Debug, Default)]
struct ActionCounters {
    started: u64,
    succeeded: u64,
    failed: u64,
}

/// Counters of a single queue
#[derive(Debug)]
pub struct QueueStatistics {
    queue: String,
    pass_rate: f32,
    created_at: DateTime<Utc>,
    invocations_started: AtomicU64,
    invocations_succeeded: AtomicU64,
    invocations_failed: AtomicU64,
    iterations_passed: AtomicU64,
    iterations_failed: AtomicU64,
    iterations_timed_out: AtomicU64,
    latencies: Mutex<Vec<Duration>>,
    latency_samples_limit: usize,
    actions: Mutex<HashMap<String, ActionCounters>>,
}

impl QueueStatistics {
    fn new(queue: &str, pass_rate: f32, latency_samples_limit: usize) -> Self {
        Self {
            queue: queue.to_string(),
            pass_rate,
            created_at: Utc::now(),
            invocations_started: AtomicU64::new(0),
            invocations_succeeded: AtomicU64::new(0),
            invocations_failed: AtomicU64::new(0),
            iterations_passed: AtomicU64::new(0),
            iterations_failed: AtomicU64::new(0),
            iterations_timed_out: AtomicU64::new(0),
            latencies: Mutex::new(Vec::new()),
            latency_samples_limit,
            actions: Mutex::new(HashMap::new()),
        }
    }

    pub fn invocation_started(&self, action: &str) {
        self.invocations_started.fetch_add(1, Ordering::Relaxed);
        self.actions
            .lock()
            .entry(action.to_string())
            .or_default()
            .started += 1;
    }

    pub fn invocation_succeeded(&self, action: &str, latency: Duration) {
        self.invocations_succeeded.fetch_add(1, Ordering::Relaxed);
        self.actions
            .lock()
            .entry(action.to_string())
            .or_default()
            .succeeded += 1;

        let mut latencies = self.latencies.lock();
        if latencies.len() < self.latency_samples_limit {
            latencies.push(latency);
        }
    }

    pub fn invocation_failed(&self, action: &str) {
        self.invocations_failed.fetch_add(1, Ordering::Relaxed);
        self.actions
            .lock()
            .entry(action.to_string())
            .or_default()
            .failed += 1;
    }

    /// An iteration passes when every action request in it succeeded
    pub fn iteration_finished(&self, passed: bool) {
        if passed {
            self.iterations_passed.fetch_add(1, Ordering::Relaxed);
        } else {
            self.iterations_failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// An iteration abandoned at its timeout; it also counts as failed
    pub fn iteration_timed_out(&self) {
        self.iterations_timed_out.fetch_add(1, Ordering::Relaxed);
    }

    pub fn invocations_started(&self) -> u64 {
        self.invocations_started.load(Ordering::Relaxed)
    }

    pub fn invocations_succeeded(&self) -> u64 {
        self.invocations_succeeded.load(Ordering::Relaxed)
    }

    pub fn invocations_failed(&self) -> u64 {
        self.invocations_failed.load(Ordering::Relaxed)
    }

    /// Finished invocations, successful or not
    pub fn invocations_completed(&self) -> u64 {
        self.invocations_succeeded() + self.invocations_failed()
    }

    pub fn snapshot(&self) -> QueueStatisticsSnapshot {
        let iterations_passed = self.iterations_passed.load(Ordering::Relaxed);
        let iterations_failed = self.iterations_failed.load(Ordering::Relaxed);
        let iterations = iterations_passed + iterations_failed;
        let passed_percent = if iterations == 0 {
            100.0
        } else {
            iterations_passed as f64 * 100.0 / iterations as f64
        };

        let actions = self
            .actions
            .lock()
            .iter()
            .map(|(name, counters)| {
                (
                    name.clone(),
                    ActionStatisticsSnapshot {
                        started: counters.started,
                        succeeded: counters.succeeded,
                        failed: counters.failed,
                    },
                )
            })
            .collect();

        QueueStatisticsSnapshot {
            queue: self.queue.clone(),
            created_at: self.created_at,
            invocations_started: self.invocations_started(),
            invocations_succeeded: self.invocations_succeeded(),
            invocations_failed: self.invocations_failed(),
            iterations_passed,
            iterations_failed,
            iterations_timed_out: self.iterations_timed_out.load(Ordering::Relaxed),
            pass_rate: self.pass_rate,
            passed: passed_percent >= f64::from(self.pass_rate),
            latency: LatencySummary::from_samples(&self.latencies.lock()),
            actions,
        }
    }
}

/// Point-in-time copy of a queue's statistics
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueueStatisticsSnapshot {
    pub queue: String,
    pub created_at: DateTime<Utc>,
    pub invocations_started: u64,
    pub invocations_succeeded: u64,
    pub invocations_failed: u64,
    pub iterations_passed: u64,
    pub iterations_failed: u64,
    /// Subset of `iterations_failed` cut short by the iteration timeout
    pub iterations_timed_out: u64,
    /// Required percentage of passed iterations
    pub pass_rate: f32,
    pub passed: bool,
    pub latency: Option<LatencySummary>,
    pub actions: BTreeMap<String, ActionStatisticsSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActionStatisticsSnapshot {
    pub started: u64,
    pub succeeded: u64,
    pub failed: u64,
}

/// Latency of successful invocations, in milliseconds
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LatencySummary {
    pub samples: usize,
    pub min_ms: f64,
    pub max_ms: f64,
    pub mean_ms: f64,
    pub p50_ms: f64,
    pub p95_ms: f64,
    pub p99_ms: f64,
}

impl LatencySummary {
    pub fn from_samples(samples: &[Duration]) -> Option<Self> {
        if samples.is_empty() {
            return None;
        }
        let mut sorted = samples.to_vec();
        sorted.sort_unstable();

        let millis = |d: Duration| d.as_nanos() as f64 / 1_000_000.0;
        // nearest-rank percentile
        let percentile = |p: f64| {
            let rank = (p * sorted.len() as f64 / 100.0).ceil() as usize;
            millis(sorted[rank.clamp(1, sorted.len()) - 1])
        };
        let total: Duration = sorted.iter().sum();

        Some(Self {
            samples: sorted.len(),
            min_ms: millis(sorted[0]),
            max_ms: millis(sorted[sorted.len() - 1]),
            mean_ms: millis(total) / sorted.len() as f64,
            p50_ms: percentile(50.0),
            p95_ms: percentile(95.0),
            p99_ms: percentile(99.0),
        })
    }
}
