//! Queue registry: the entry point for scheduling, starting, cancelling and
//! waiting on load queues

use futures::future::join_all;
use loadagent_config::{QueueConfig, Validatable};
use loadagent_core::{ActionInvoker, ActionRequest, QueueState};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::data::{LoaderDataConfig, ParameterSupplier};
use crate::error::{PatternError, QueueError, QueueResult};
use crate::queue::{LoadQueue, QueueSetup};
use crate::statistics::ExecutionStatistics;
use crate::pattern::ExecutionPattern;

/// Everything needed to schedule one load queue
#[derive(Debug, Clone)]
pub struct QueueSubmission {
    /// Who asked for the queue; the configured default when `None`
    pub caller: Option<String>,
    pub queue_name: String,
    pub requests: Vec<ActionRequest>,
    pub pattern: ExecutionPattern,
    pub data_config: LoaderDataConfig,
}

impl QueueSubmission {
    pub fn new(
        queue_name: impl Into<String>,
        requests: Vec<ActionRequest>,
        pattern: ExecutionPattern,
    ) -> Self {
        Self {
            caller: None,
            queue_name: queue_name.into(),
            requests,
            pattern,
            data_config: LoaderDataConfig::default(),
        }
    }

    pub fn with_caller(mut self, caller: impl Into<String>) -> Self {
        self.caller = Some(caller.into());
        self
    }

    pub fn with_data_config(mut self, data_config: LoaderDataConfig) -> Self {
        self.data_config = data_config;
        self
    }
}

/// Caller-owned map of load queues by name.
///
/// Queue names are unique among queues that have not stopped yet. Stopped
/// queues stay queryable until they are replaced by a new queue with the
/// same name or removed with [`clear_stopped_queues`](Self::clear_stopped_queues).
pub struct QueueRegistry {
    invoker: Arc<dyn ActionInvoker>,
    statistics: Arc<ExecutionStatistics>,
    queues: Mutex<HashMap<String, Arc<LoadQueue>>>,
    config: QueueConfig,
}

impl QueueRegistry {
    pub fn new(invoker: Arc<dyn ActionInvoker>, config: QueueConfig) -> Self {
        Self {
            invoker,
            statistics: Arc::new(ExecutionStatistics::new(config.latency_samples_limit)),
            queues: Mutex::new(HashMap::new()),
            config,
        }
    }

    /// Build a registry after validating `config`
    pub fn from_config(invoker: Arc<dyn ActionInvoker>, config: QueueConfig) -> QueueResult<Self> {
        config.validate()?;
        Ok(Self::new(invoker, config))
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    pub fn statistics(&self) -> Arc<ExecutionStatistics> {
        self.statistics.clone()
    }

    /// Validate a submission and register its queue in the `Scheduled` state.
    ///
    /// Fails without creating anything if the pattern or parameter providers
    /// are malformed, an action request cannot be resolved, or a queue with
    /// the same name has not stopped yet.
    pub fn schedule_actions(&self, submission: QueueSubmission) -> QueueResult<Arc<LoadQueue>> {
        let QueueSubmission {
            caller,
            queue_name,
            requests,
            mut pattern,
            data_config,
        } = submission;

        pattern.interval = pattern.interval.normalized();
        pattern.validate()?;
        if pattern.thread_count > self.config.max_threads_per_queue {
            return Err(PatternError::TooManyThreads {
                requested: pattern.thread_count,
                limit: self.config.max_threads_per_queue,
            }
            .into());
        }

        for request in &requests {
            self.invoker.resolve(request)?;
        }

        let supplier = ParameterSupplier::new(&data_config)?;
        data_config.verify_usernames(pattern.thread_count)?;
        for name in data_config.unused_parameters(&requests) {
            warn!(
                queue = %queue_name,
                parameter = %name,
                "Parameter provider is not used by any action request"
            );
        }

        let mut queues = self.queues.lock();
        Self::evict_stopped(&mut queues);
        if let Some(existing) = queues.get(&queue_name) {
            return Err(QueueError::AlreadyExists {
                name: queue_name,
                state: existing.state(),
            });
        }

        let statistics = self
            .statistics
            .init_queue(&queue_name, pattern.queue_pass_rate);
        let queue = Arc::new(LoadQueue::new(QueueSetup {
            name: queue_name.clone(),
            caller: caller.unwrap_or_else(|| self.config.default_caller.clone()),
            requests,
            pattern,
            supplier,
            invoker: self.invoker.clone(),
            statistics,
        }));
        queues.insert(queue_name, queue.clone());

        info!(
            queue = %queue.name(),
            id = %queue.id(),
            pattern = %queue.description(),
            "Scheduled load queue"
        );
        Ok(queue)
    }

    /// Start a scheduled queue. Blocks until it stops when the pattern asks
    /// for it.
    pub async fn start_queue(&self, queue_name: &str) -> QueueResult<()> {
        let queue = {
            let mut queues = self.queues.lock();
            Self::evict_stopped(&mut queues);
            queues.get(queue_name).cloned()
        }
        .ok_or_else(|| QueueError::NoSuchQueue(queue_name.to_string()))?;

        queue.start()?;
        if queue.pattern().block_until_completion {
            queue.wait_until_finished().await;
        }
        Ok(())
    }

    /// Schedule and immediately start a queue
    pub async fn execute_actions(&self, submission: QueueSubmission) -> QueueResult<Arc<LoadQueue>> {
        let queue = self.schedule_actions(submission)?;
        queue.start()?;
        if queue.pattern().block_until_completion {
            queue.wait_until_finished().await;
        }
        Ok(queue)
    }

    /// Cancel one queue and wait for its workers to exit. Unknown names are
    /// ignored.
    pub async fn cancel_queue(&self, queue_name: &str) {
        match self.queue(queue_name) {
            Some(queue) => self.cancel_and_wait(vec![queue]).await,
            None => info!(queue = %queue_name, "No load queue to cancel"),
        }
    }

    /// Cancel every tracked queue, scheduled or running, and wait for all
    /// of their workers to exit
    pub async fn cancel_all_queues(&self) {
        let queues: Vec<Arc<LoadQueue>> = self.queues.lock().values().cloned().collect();
        if queues.is_empty() {
            return;
        }
        info!(count = queues.len(), "Cancelling all load queues");
        self.cancel_and_wait(queues).await;
    }

    async fn cancel_and_wait(&self, queues: Vec<Arc<LoadQueue>>) {
        for queue in &queues {
            queue.cancel();
        }

        let timeout = self.config.cancel_timeout;
        let stopped = join_all(queues.iter().map(|queue| queue.wait_until_stopped(timeout))).await;
        for (queue, stopped) in queues.iter().zip(stopped) {
            if !stopped {
                warn!(
                    queue = %queue.name(),
                    timeout_secs = timeout.as_secs(),
                    "Load queue workers did not stop in time, an action may still be running"
                );
            }
        }
    }

    /// Wait until the named queue stops running. Returns at once for a
    /// queue that was never started.
    pub async fn wait_until_queue_finish(&self, queue_name: &str) {
        match self.queue(queue_name) {
            Some(queue) => {
                debug!(queue = %queue_name, "Waiting for load queue to finish");
                queue.wait_until_finished().await;
            }
            None => warn!(queue = %queue_name, "Cannot wait for unknown load queue"),
        }
    }

    pub async fn wait_until_all_queues_finish(&self) {
        let queues: Vec<Arc<LoadQueue>> = self.queues.lock().values().cloned().collect();
        join_all(queues.iter().map(|queue| queue.wait_until_finished())).await;
    }

    pub fn running_queues_count(&self) -> usize {
        self.queues
            .lock()
            .values()
            .filter(|queue| queue.is_running())
            .count()
    }

    pub fn is_queue_running(&self, queue_name: &str) -> bool {
        self.queue(queue_name)
            .map(|queue| queue.is_running())
            .unwrap_or(false)
    }

    pub fn queue_state(&self, queue_name: &str) -> Option<QueueState> {
        self.queue(queue_name).map(|queue| queue.state())
    }

    pub fn queue(&self, queue_name: &str) -> Option<Arc<LoadQueue>> {
        self.queues.lock().get(queue_name).cloned()
    }

    /// Names of all tracked queues, sorted
    pub fn queue_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.queues.lock().keys().cloned().collect();
        names.sort();
        names
    }

    /// Forget finished and canceled queues; returns how many were removed
    pub fn clear_stopped_queues(&self) -> usize {
        Self::evict_stopped(&mut self.queues.lock())
    }

    fn evict_stopped(queues: &mut HashMap<String, Arc<LoadQueue>>) -> usize {
        let before = queues.len();
        queues.retain(|name, queue| {
            let keep = !queue.state().is_terminal();
            if !keep {
                debug!(queue = %name, state = %queue.state(), "Removing stopped load queue");
            }
            keep
        });
        before - queues.len()
    }
}
