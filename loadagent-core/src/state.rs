//! Queue and worker lifecycle states

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique identifier for a load queue instance (newtype pattern for type safety).
///
/// Queue names may be reused once a queue has finished, the id never is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QueueId(pub Uuid);

impl QueueId {
    pub fn new() -> Self {
        QueueId(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for QueueId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for QueueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Load queue state. Transitions only move forward:
/// `Scheduled -> Running -> {Finished, Canceled}` or `Scheduled -> Canceled`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueState {
    /// Workers are built but not started
    Scheduled,
    /// The start schedule is emitting workers
    Running,
    /// Every worker completed its iterations
    Finished,
    /// Cancelled before completing
    Canceled,
}

impl QueueState {
    /// Check if the queue can no longer change state
    pub fn is_terminal(&self) -> bool {
        matches!(self, QueueState::Finished | QueueState::Canceled)
    }

    pub fn is_running(&self) -> bool {
        matches!(self, QueueState::Running)
    }

    /// Whether moving to `next` is a legal forward transition
    pub fn can_transition_to(&self, next: QueueState) -> bool {
        matches!(
            (self, next),
            (QueueState::Scheduled, QueueState::Running)
                | (QueueState::Scheduled, QueueState::Canceled)
                | (QueueState::Running, QueueState::Finished)
                | (QueueState::Running, QueueState::Canceled)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            QueueState::Scheduled => "scheduled",
            QueueState::Running => "running",
            QueueState::Finished => "finished",
            QueueState::Canceled => "canceled",
        }
    }
}

impl fmt::Display for QueueState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// State of a single worker inside a load queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerState {
    WaitingToStart,
    Running,
    PausedBetweenIterations,
    WaitingAtBarrier,
    /// Parked by the execution speed limit
    Throttled,
    Canceled,
    Done,
}

impl WorkerState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, WorkerState::Canceled | WorkerState::Done)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            WorkerState::WaitingToStart => "waiting_to_start",
            WorkerState::Running => "running",
            WorkerState::PausedBetweenIterations => "paused_between_iterations",
            WorkerState::WaitingAtBarrier => "waiting_at_barrier",
            WorkerState::Throttled => "throttled",
            WorkerState::Canceled => "canceled",
            WorkerState::Done => "done",
        }
    }
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_state_transitions() {
        assert!(QueueState::Scheduled.can_transition_to(QueueState::Running));
        assert!(QueueState::Scheduled.can_transition_to(QueueState::Canceled));
        assert!(QueueState::Running.can_transition_to(QueueState::Finished));
        assert!(!QueueState::Scheduled.can_transition_to(QueueState::Finished));
        assert!(!QueueState::Finished.can_transition_to(QueueState::Running));
        assert!(!QueueState::Canceled.can_transition_to(QueueState::Scheduled));
    }

    #[test]
    fn test_terminal_states() {
        assert!(QueueState::Finished.is_terminal());
        assert!(QueueState::Canceled.is_terminal());
        assert!(!QueueState::Running.is_terminal());
        assert!(WorkerState::Done.is_terminal());
        assert!(!WorkerState::WaitingAtBarrier.is_terminal());
    }

    #[test]
    fn test_state_serialization() {
        assert_eq!(
            serde_json::to_string(&QueueState::Canceled).unwrap(),
            "\"canceled\""
        );
        assert_eq!(
            serde_json::to_string(&WorkerState::PausedBetweenIterations).unwrap(),
            "\"paused_between_iterations\""
        );
        assert_eq!(QueueState::Running.to_string(), "running");
    }
}
