//! Error types for load queue execution

use loadagent_config::ConfigError;
use loadagent_core::{InvokeError, QueueState};
use thiserror::Error;

/// Errors surfaced synchronously by the queue registry.
///
/// Failures of individual action invocations never appear here; they are
/// counted in [`ExecutionStatistics`](crate::ExecutionStatistics).
#[derive(Error, Debug)]
pub enum QueueError {
    #[error("Load queue '{name}' already exists and is {state}")]
    AlreadyExists { name: String, state: QueueState },

    #[error("No such load queue: {0}")]
    NoSuchQueue(String),

    #[error("Invalid queue state: {0}")]
    InvalidState(String),

    #[error("Invalid execution pattern: {0}")]
    InvalidPattern(#[from] PatternError),

    #[error("Invalid parameter data configuration: {0}")]
    InvalidDataConfig(#[from] DataConfigError),

    #[error("Action resolution failed: {0}")]
    Resolution(#[from] InvokeError),

    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),
}

pub type QueueResult<T> = std::result::Result<T, QueueError>;

/// Malformed execution patterns
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PatternError {
    #[error("thread count must be greater than 0")]
    ZeroThreads,

    #[error("threads per ramp-up step must be greater than 0")]
    ZeroThreadsPerStep,

    #[error("iteration count must be greater than 0")]
    ZeroIterations,

    #[error("fixed duration must be greater than 0 seconds")]
    ZeroDuration,

    #[error("execution speed needs a positive count and time frame, got {count} per {per_secs} s")]
    InvalidExecutionSpeed { count: u32, per_secs: u64 },

    #[error("queue pass rate must be between 0 and 100, got {0}")]
    InvalidPassRate(f32),

    #[error("iteration timeout must be greater than 0 seconds")]
    ZeroIterationTimeout,

    #[error("thread count {requested} exceeds the limit of {limit}")]
    TooManyThreads { requested: usize, limit: usize },
}

/// Malformed parameter provider declarations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DataConfigError {
    #[error("parameter name cannot be empty")]
    EmptyName,

    #[error("list provider '{0}' has no values")]
    EmptyList(String),

    #[error("range provider '{name}' starts at {start}, after its end {end}")]
    InvertedRange { name: String, start: i32, end: i32 },

    #[error("user name provider '{0}' must be per-thread-static")]
    UsernamesNotStatic(String),

    #[error("only {provided} user names for {required} threads")]
    NotEnoughUsernames { provided: u64, required: usize },
}
