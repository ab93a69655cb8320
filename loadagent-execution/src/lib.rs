//! Load queue execution engine
//!
//! A load queue repeatedly invokes an ordered list of action requests from a
//! pool of concurrent workers. The [`ExecutionPattern`] decides when workers
//! start, how many iterations each runs and how fast; a [`LoaderDataConfig`]
//! feeds parameter values into the requests. Queues are owned by a
//! [`QueueRegistry`], which is the usual entry point:
//!
//! ```no_run
//! # use std::sync::Arc;
//! # use loadagent_config::QueueConfig;
//! # use loadagent_core::{ActionRequest, ComponentRepository};
//! # use loadagent_execution::{ExecutionPattern, QueueRegistry, QueueSubmission};
//! # async fn demo(repository: ComponentRepository) -> loadagent_execution::QueueResult<()> {
//! let registry = QueueRegistry::new(Arc::new(repository), QueueConfig::default());
//! let submission = QueueSubmission::new(
//!     "checkout",
//!     vec![ActionRequest::new("shop", "checkout")],
//!     ExecutionPattern::ramp_up(20, 5, 1000, 10).blocking(true),
//! );
//! registry.execute_actions(submission).await?;
//! # Ok(())
//! # }
//! ```

pub mod barrier;
pub mod data;
pub mod error;
pub mod pattern;
pub mod queue;
pub mod registry;
pub mod statistics;
pub mod throttle;
mod worker;

// Re-export main types
pub use barrier::IterationBarrier;
pub use data::{
    DataSource, LoaderDataConfig, ParameterDataConfig, ParameterLevel, ParameterSupplier,
    ParameterValues, StaticBindings, RANGE_PLACEHOLDER, USERNAME_PARAMETER,
};
pub use error::{DataConfigError, PatternError, QueueError, QueueResult};
pub use pattern::{
    ExecutionPattern, ExecutionSpeed, IterationInterval, IterationLimit, StartPattern, StartStep,
};
pub use queue::LoadQueue;
pub use registry::{QueueRegistry, QueueSubmission};
pub use statistics::{
    ActionStatisticsSnapshot, ExecutionStatistics, LatencySummary, QueueStatistics,
    QueueStatisticsSnapshot,
};
pub use throttle::ExecutionThrottle;
pub use worker::WorkerSnapshot;
