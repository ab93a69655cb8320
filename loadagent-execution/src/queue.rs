//! Load queues: one pattern, one set of action requests, many workers

use chrono::{DateTime, Utc};
use loadagent_core::{ActionInvoker, ActionRequest, QueueId, QueueState};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::barrier::IterationBarrier;
use crate::data::ParameterSupplier;
use crate::error::{QueueError, QueueResult};
use crate::pattern::ExecutionPattern;
use crate::statistics::QueueStatistics;
use crate::throttle::ExecutionThrottle;
use crate::worker::{Worker, WorkerContext, WorkerOutcome, WorkerSnapshot, WorkerStatus};

/// Inputs for building a queue; validated by the registry beforehand
pub(crate) struct QueueSetup {
    pub name: String,
    pub caller: String,
    pub requests: Vec<ActionRequest>,
    pub pattern: ExecutionPattern,
    pub supplier: ParameterSupplier,
    pub invoker: Arc<dyn ActionInvoker>,
    pub statistics: Arc<QueueStatistics>,
}

/// A named group of workers running the same action requests under one
/// execution pattern.
///
/// Workers are built when the queue is scheduled and launched by
/// [`start`](Self::start) along the pattern's start schedule. The state only
/// ever moves forward: `Scheduled -> Running -> Finished | Canceled`, or
/// straight from `Scheduled` to `Canceled`.
pub struct LoadQueue {
    id: QueueId,
    name: String,
    caller: String,
    pattern: ExecutionPattern,
    description: String,
    state: watch::Sender<QueueState>,
    context: Arc<WorkerContext>,
    pending: Mutex<Option<Vec<Worker>>>,
    workers: Vec<Arc<WorkerStatus>>,
    started_at: Mutex<Option<DateTime<Utc>>>,
    finished_at: Mutex<Option<DateTime<Utc>>>,
}

impl LoadQueue {
    pub(crate) fn new(setup: QueueSetup) -> Self {
        let pattern = setup.pattern;
        let thread_count = pattern.thread_count;

        let context = Arc::new(WorkerContext {
            queue_name: setup.name.clone(),
            action_names: setup
                .requests
                .iter()
                .map(ActionRequest::qualified_name)
                .collect(),
            requests: setup.requests,
            invoker: setup.invoker,
            supplier: setup.supplier,
            statistics: setup.statistics,
            throttle: pattern.execution_speed.as_ref().map(ExecutionThrottle::from_speed),
            barrier: pattern
                .synchronized_iterations
                .then(|| IterationBarrier::new(thread_count)),
            iterations: pattern.iterations,
            interval: pattern.interval,
            iteration_timeout: pattern.iteration_timeout(),
            cancel: CancellationToken::new(),
        });

        // Static parameter values follow creation order
        let mut workers = Vec::with_capacity(thread_count);
        let mut pending = Vec::with_capacity(thread_count);
        for index in 0..thread_count {
            let bindings = context.supplier.bind_static(index);
            let status = Arc::new(WorkerStatus::new(
                index,
                bindings.worker_name().map(str::to_string),
            ));
            pending.push(Worker::new(bindings, status.clone()));
            workers.push(status);
        }

        let (state, _) = watch::channel(QueueState::Scheduled);

        Self {
            id: QueueId::new(),
            name: setup.name,
            caller: setup.caller,
            description: pattern.description(),
            pattern,
            state,
            context,
            pending: Mutex::new(Some(pending)),
            workers,
            started_at: Mutex::new(None),
            finished_at: Mutex::new(None),
        }
    }

    pub fn id(&self) -> QueueId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn caller(&self) -> &str {
        &self.caller
    }

    pub fn pattern(&self) -> &ExecutionPattern {
        &self.pattern
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn state(&self) -> QueueState {
        *self.state.borrow()
    }

    pub fn is_running(&self) -> bool {
        self.state().is_running()
    }

    /// Receiver notified on every state change
    pub fn subscribe(&self) -> watch::Receiver<QueueState> {
        self.state.subscribe()
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        *self.started_at.lock()
    }

    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        *self.finished_at.lock()
    }

    pub fn statistics(&self) -> Arc<QueueStatistics> {
        self.context.statistics.clone()
    }

    pub fn worker_snapshots(&self) -> Vec<WorkerSnapshot> {
        self.workers.iter().map(|status| status.snapshot()).collect()
    }

    fn transition(&self, next: QueueState) -> bool {
        self.state.send_if_modified(|current| {
            if current.can_transition_to(next) {
                *current = next;
                true
            } else {
                false
            }
        })
    }

    /// Begin the start schedule. Returns once the launcher is running; use
    /// [`wait_until_finished`](Self::wait_until_finished) to block.
    pub fn start(self: &Arc<Self>) -> QueueResult<()> {
        // Win the transition before taking the workers, so a concurrent
        // cancel either finds them pending or sees a running queue
        if !self.transition(QueueState::Running) {
            return Err(QueueError::InvalidState(format!(
                "load queue '{}' cannot be started, it is {}",
                self.name,
                self.state()
            )));
        }
        let Some(workers) = self.pending.lock().take() else {
            return Err(QueueError::InvalidState(format!(
                "load queue '{}' has no workers left to start",
                self.name
            )));
        };
        *self.started_at.lock() = Some(Utc::now());

        info!(
            queue = %self.name,
            id = %self.id,
            caller = %self.caller,
            pattern = %self.description,
            "Starting load queue"
        );

        let queue = Arc::clone(self);
        tokio::spawn(async move { queue.launch(workers).await });
        Ok(())
    }

    async fn launch(self: Arc<Self>, workers: Vec<Worker>) {
        let origin = Instant::now();
        let mut workers = workers.into_iter();
        let mut tasks = JoinSet::new();
        let mut interrupted = false;

        for step in self.pattern.start_schedule() {
            let due = match origin.checked_add(step.offset) {
                Some(at) => tokio::select! {
                    _ = self.context.cancel.cancelled() => false,
                    _ = sleep_until(at) => true,
                },
                // beyond the clock's range, only cancellation ends the wait
                None => {
                    self.context.cancel.cancelled().await;
                    false
                }
            };
            if !due {
                interrupted = true;
                break;
            }
            for worker in workers.by_ref().take(step.worker_count) {
                tasks.spawn(worker.run(self.context.clone()));
            }
        }

        for worker in workers {
            worker.abandon(&self.context);
        }

        let mut completed = !interrupted;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(WorkerOutcome::Completed) => {}
                Ok(WorkerOutcome::Canceled) => completed = false,
                Err(e) => {
                    error!(queue = %self.name, error = %e, "Worker task failed");
                    completed = false;
                }
            }
        }

        *self.finished_at.lock() = Some(Utc::now());
        let final_state = if completed {
            QueueState::Finished
        } else {
            QueueState::Canceled
        };
        self.transition(final_state);

        let statistics = self.context.statistics.snapshot();
        info!(
            queue = %self.name,
            state = %final_state,
            succeeded = statistics.invocations_succeeded,
            failed = statistics.invocations_failed,
            "Load queue stopped"
        );
    }

    /// Signal cancellation. A scheduled queue is canceled on the spot; a
    /// running one becomes `Canceled` once all of its workers have exited.
    pub fn cancel(&self) {
        self.context.cancel.cancel();

        let was_scheduled = self.state.send_if_modified(|current| {
            if *current == QueueState::Scheduled {
                *current = QueueState::Canceled;
                true
            } else {
                false
            }
        });
        if was_scheduled {
            if let Some(workers) = self.pending.lock().take() {
                for worker in workers {
                    worker.abandon(&self.context);
                }
            }
            *self.finished_at.lock() = Some(Utc::now());
            info!(queue = %self.name, "Canceled scheduled load queue");
        }
    }

    pub fn is_cancel_requested(&self) -> bool {
        self.context.cancel.is_cancelled()
    }

    /// Wait while the queue is running. Returns at once for queues that are
    /// only scheduled or already stopped.
    pub async fn wait_until_finished(&self) {
        let mut state = self.state.subscribe();
        let _ = state.wait_for(|current| !current.is_running()).await;
    }

    /// Wait for a terminal state, giving up after `timeout`. Returns whether
    /// the queue stopped in time.
    pub async fn wait_until_stopped(&self, timeout: Duration) -> bool {
        let mut state = self.state.subscribe();
        let stopped = tokio::time::timeout(timeout, state.wait_for(|current| current.is_terminal()))
            .await
            .is_ok();
        stopped
    }
}

impl std::fmt::Debug for LoadQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadQueue")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("caller", &self.caller)
            .field("state", &self.state())
            .field("pattern", &self.description)
            .finish()
    }
}
