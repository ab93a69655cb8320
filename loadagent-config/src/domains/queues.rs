//! Load queue engine configuration

use crate::error::ConfigResult;
use crate::validation::{
    validate_at_most, validate_positive, validate_required_string, Validatable,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Hard ceiling for `max_threads_per_queue`
pub const THREADS_PER_QUEUE_CEILING: usize = 100_000;

/// Limits and defaults applied by the queue registry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Largest thread count a single queue may request
    #[serde(default = "default_max_threads_per_queue")]
    pub max_threads_per_queue: usize,

    /// How long cancellation waits for workers to exit before giving up
    #[serde(
        with = "crate::domains::utils::serde_duration",
        default = "default_cancel_timeout"
    )]
    pub cancel_timeout: Duration,

    /// Latency samples retained per queue for percentile reporting
    #[serde(default = "default_latency_samples_limit")]
    pub latency_samples_limit: usize,

    /// Caller id recorded when a submission does not name one
    #[serde(default = "default_caller")]
    pub default_caller: String,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_threads_per_queue: default_max_threads_per_queue(),
            cancel_timeout: default_cancel_timeout(),
            latency_samples_limit: default_latency_samples_limit(),
            default_caller: default_caller(),
        }
    }
}

impl Validatable for QueueConfig {
    fn validate(&self) -> ConfigResult<()> {
        validate_positive(
            self.max_threads_per_queue,
            "max_threads_per_queue",
            self.domain_name(),
        )?;
        validate_at_most(
            self.max_threads_per_queue,
            THREADS_PER_QUEUE_CEILING,
            "max_threads_per_queue",
            self.domain_name(),
        )?;

        validate_positive(
            self.cancel_timeout.as_secs(),
            "cancel_timeout",
            self.domain_name(),
        )?;
        validate_required_string(&self.default_caller, "default_caller", self.domain_name())?;

        if self.latency_samples_limit == 0 {
            log::warn!("latency_samples_limit is 0, latency percentiles will not be reported");
        }

        Ok(())
    }

    fn domain_name(&self) -> &'static str {
        "queues"
    }
}

fn default_max_threads_per_queue() -> usize {
    10_000
}

fn default_cancel_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_latency_samples_limit() -> usize {
    100_000
}

fn default_caller() -> String {
    "local".to_string()
}
