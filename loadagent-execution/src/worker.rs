//! Load queue workers
//!
//! A worker runs its iterations strictly in order. Each iteration draws one
//! set of parameter values, then invokes the queue's action requests one
//! after another. Cancellation is observed between iterations, while parked
//! by the throttle, at the barrier and during the pause; an invocation that
//! is already running is never interrupted by it. Only an iteration timeout,
//! when the pattern sets one, abandons a running invocation.

use loadagent_core::{ActionInvoker, ActionRequest, WorkerState};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{timeout_at, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::barrier::IterationBarrier;
use crate::data::{ParameterSupplier, StaticBindings};
use crate::pattern::{IterationInterval, IterationLimit};
use crate::statistics::QueueStatistics;
use crate::throttle::ExecutionThrottle;

/// Everything the workers of one queue share
pub(crate) struct WorkerContext {
    pub queue_name: String,
    pub requests: Vec<ActionRequest>,
    /// `component.action` of each request, used as statistics keys
    pub action_names: Vec<String>,
    pub invoker: Arc<dyn ActionInvoker>,
    pub supplier: ParameterSupplier,
    pub statistics: Arc<QueueStatistics>,
    pub throttle: Option<ExecutionThrottle>,
    pub barrier: Option<IterationBarrier>,
    pub iterations: IterationLimit,
    pub interval: IterationInterval,
    pub iteration_timeout: Option<Duration>,
    pub cancel: CancellationToken,
}

/// Observable part of a worker, shared with its queue
#[derive(Debug)]
pub(crate) struct WorkerStatus {
    index: usize,
    name: Option<String>,
    state: Mutex<WorkerState>,
    completed_iterations: AtomicU64,
}

impl WorkerStatus {
    pub fn new(index: usize, name: Option<String>) -> Self {
        Self {
            index,
            name,
            state: Mutex::new(WorkerState::WaitingToStart),
            completed_iterations: AtomicU64::new(0),
        }
    }

    pub fn set_state(&self, state: WorkerState) {
        *self.state.lock() = state;
    }

    pub fn snapshot(&self) -> WorkerSnapshot {
        WorkerSnapshot {
            index: self.index,
            name: self.name.clone(),
            state: *self.state.lock(),
            completed_iterations: self.completed_iterations.load(Ordering::Acquire),
        }
    }
}

/// Point-in-time view of one worker
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkerSnapshot {
    /// Creation order within the queue, starting at 0
    pub index: usize,
    /// User name bound by a user name provider
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub state: WorkerState,
    pub completed_iterations: u64,
}

/// How a worker ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WorkerOutcome {
    Completed,
    Canceled,
}

pub(crate) struct Worker {
    bindings: StaticBindings,
    status: Arc<WorkerStatus>,
}

impl Worker {
    pub fn new(bindings: StaticBindings, status: Arc<WorkerStatus>) -> Self {
        Self { bindings, status }
    }

    /// Give up a worker that was never launched
    pub fn abandon(self, context: &WorkerContext) {
        if let Some(barrier) = &context.barrier {
            barrier.leave();
        }
        self.status.set_state(WorkerState::Canceled);
    }

    pub async fn run(self, context: Arc<WorkerContext>) -> WorkerOutcome {
        let index = self.status.index;
        debug!(
            queue = %context.queue_name,
            worker = index,
            user = self.status.name.as_deref().unwrap_or("-"),
            "Worker started"
        );
        self.status.set_state(WorkerState::Running);

        let outcome = self.iterate(&context).await;

        if let Some(barrier) = &context.barrier {
            barrier.leave();
        }
        self.status.set_state(match outcome {
            WorkerOutcome::Completed => WorkerState::Done,
            WorkerOutcome::Canceled => WorkerState::Canceled,
        });
        debug!(
            queue = %context.queue_name,
            worker = index,
            ?outcome,
            iterations = self.status.completed_iterations.load(Ordering::Acquire),
            "Worker stopped"
        );
        outcome
    }

    async fn iterate(&self, context: &WorkerContext) -> WorkerOutcome {
        // a deadline past the clock's range never arrives
        let deadline = match context.iterations {
            IterationLimit::DurationSecs(secs) => {
                Instant::now().checked_add(Duration::from_secs(secs))
            }
            _ => None,
        };
        let mut completed: u64 = 0;

        loop {
            let more = match (context.iterations, deadline) {
                (IterationLimit::Count(count), _) => completed < count,
                (_, Some(deadline)) => Instant::now() < deadline,
                _ => true,
            };
            if !more {
                return WorkerOutcome::Completed;
            }
            if context.cancel.is_cancelled() {
                return WorkerOutcome::Canceled;
            }

            if let Some(throttle) = &context.throttle {
                self.status.set_state(WorkerState::Throttled);
                if !throttle.acquire(&context.cancel).await {
                    return WorkerOutcome::Canceled;
                }
                self.status.set_state(WorkerState::Running);
            }

            self.run_iteration(context).await;
            completed += 1;
            self.status
                .completed_iterations
                .store(completed, Ordering::Release);

            let last = matches!(context.iterations, IterationLimit::Count(count) if completed >= count);
            if last {
                return WorkerOutcome::Completed;
            }

            if let Some(barrier) = &context.barrier {
                self.status.set_state(WorkerState::WaitingAtBarrier);
                if !barrier.wait(&context.cancel).await {
                    return WorkerOutcome::Canceled;
                }
                self.status.set_state(WorkerState::Running);
            }

            if context.interval.is_zero() {
                // keep a busy worker from starving its runtime thread
                tokio::task::yield_now().await;
                continue;
            }

            let pause = context.interval.next_pause();
            if let Some(deadline) = deadline {
                let resume = Instant::now().checked_add(pause);
                if resume.map_or(true, |resume| resume >= deadline) {
                    return WorkerOutcome::Completed;
                }
            }
            self.status.set_state(WorkerState::PausedBetweenIterations);
            tokio::select! {
                _ = context.cancel.cancelled() => return WorkerOutcome::Canceled,
                _ = tokio::time::sleep(pause) => {}
            }
            self.status.set_state(WorkerState::Running);
        }
    }

    /// Invoke every request once. A failed or timed-out invocation ends the
    /// iteration.
    async fn run_iteration(&self, context: &WorkerContext) {
        let started = Instant::now();
        let expires = context
            .iteration_timeout
            .and_then(|limit| started.checked_add(limit));
        let mut values = context.supplier.draw(&self.bindings);
        let mut passed = true;

        for (request, action) in context.requests.iter().zip(&context.action_names) {
            let arguments = values.substitute(request);
            context.statistics.invocation_started(action);
            let invoked = Instant::now();

            let invocation = context
                .invoker
                .invoke(&request.component, &request.action, arguments);
            let result = match expires {
                Some(expires) => match timeout_at(expires, invocation).await {
                    Ok(result) => result,
                    Err(_) => {
                        context.statistics.invocation_failed(action);
                        context.statistics.iteration_timed_out();
                        error!(
                            queue = %context.queue_name,
                            worker = self.status.index,
                            action = %action,
                            elapsed_ms = started.elapsed().as_millis() as u64,
                            "Iteration timed out, skipping to the next iteration"
                        );
                        passed = false;
                        break;
                    }
                },
                None => invocation.await,
            };

            match result {
                Ok(_) => context
                    .statistics
                    .invocation_succeeded(action, invoked.elapsed()),
                Err(e) => {
                    context.statistics.invocation_failed(action);
                    warn!(
                        queue = %context.queue_name,
                        worker = self.status.index,
                        action = %action,
                        error = %e,
                        "Action invocation failed"
                    );
                    passed = false;
                    break;
                }
            }
        }

        context.statistics.iteration_finished(passed);
    }
}
