//! Execution patterns: how many workers a queue starts, when, and how each
//! of them paces its iterations

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::warn;

use crate::error::PatternError;

/// How workers are started
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StartPattern {
    /// Every worker starts at once
    AllAtOnce,
    /// Workers start in batches of `threads_per_step`, the first batch after
    /// `initial_delay_ms`, then one batch every `step_interval_ms`
    RampUp {
        threads_per_step: usize,
        #[serde(default)]
        initial_delay_ms: u64,
        step_interval_ms: u64,
    },
}

/// How long each worker keeps iterating
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IterationLimit {
    Count(u64),
    Infinite,
    /// Iterate until the wall-clock duration since the worker started elapses
    DurationSecs(u64),
}

/// Pause between two iterations of the same worker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IterationInterval {
    FixedMs(u64),
    /// Each pause is drawn uniformly from `[min_ms, max_ms)`
    VaryingMs { min_ms: u64, max_ms: u64 },
}

impl Default for IterationInterval {
    fn default() -> Self {
        IterationInterval::FixedMs(0)
    }
}

impl IterationInterval {
    /// Build a varying interval, swapping reversed bounds and collapsing
    /// equal bounds into a fixed interval
    pub fn varying(min_ms: u64, max_ms: u64) -> Self {
        if min_ms == max_ms {
            warn!(interval_ms = min_ms, "Equal min and max intervals, using a fixed interval");
            IterationInterval::FixedMs(min_ms)
        } else if min_ms > max_ms {
            warn!(
                min_ms,
                max_ms, "Minimum interval is above the maximum, switching them"
            );
            IterationInterval::VaryingMs {
                min_ms: max_ms,
                max_ms: min_ms,
            }
        } else {
            IterationInterval::VaryingMs { min_ms, max_ms }
        }
    }

    /// Normalised copy, for intervals that did not go through [`varying`](Self::varying)
    pub fn normalized(self) -> Self {
        match self {
            IterationInterval::VaryingMs { min_ms, max_ms } => Self::varying(min_ms, max_ms),
            fixed => fixed,
        }
    }

    /// Next pause
    pub fn next_pause(&self) -> Duration {
        match *self {
            IterationInterval::FixedMs(ms) => Duration::from_millis(ms),
            IterationInterval::VaryingMs { min_ms, max_ms } if min_ms < max_ms => {
                Duration::from_millis(rand::thread_rng().gen_range(min_ms..max_ms))
            }
            IterationInterval::VaryingMs { min_ms, .. } => Duration::from_millis(min_ms),
        }
    }

    pub fn is_zero(&self) -> bool {
        matches!(self, IterationInterval::FixedMs(0))
    }
}

/// At most `count` iterations start per rolling window of `per_secs`,
/// across all workers of a queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionSpeed {
    pub count: u32,
    pub per_secs: u64,
}

impl ExecutionSpeed {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.per_secs)
    }
}

/// One event of the start schedule
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StartStep {
    /// Delay from the moment the queue starts
    pub offset: Duration,
    pub worker_count: usize,
}

/// Declarative description of a queue's load
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionPattern {
    pub start: StartPattern,
    pub thread_count: usize,
    /// `start_queue`/`execute_actions` wait for completion when set
    #[serde(default)]
    pub block_until_completion: bool,
    #[serde(default = "default_iterations")]
    pub iterations: IterationLimit,
    #[serde(default)]
    pub interval: IterationInterval,
    /// Workers wait for each other at the end of every iteration
    #[serde(default)]
    pub synchronized_iterations: bool,
    #[serde(default)]
    pub execution_speed: Option<ExecutionSpeed>,
    /// Percentage of iterations that must pass for the queue to pass,
    /// 0 passes always
    #[serde(default)]
    pub queue_pass_rate: f32,
    /// Upper bound for one iteration. An iteration still running when it
    /// expires is abandoned, counted as timed out, and the worker moves on.
    #[serde(default)]
    pub iteration_timeout_secs: Option<u64>,
}

fn default_iterations() -> IterationLimit {
    IterationLimit::Count(1)
}

impl ExecutionPattern {
    pub fn all_at_once(thread_count: usize, iterations: u64) -> Self {
        Self {
            start: StartPattern::AllAtOnce,
            thread_count,
            block_until_completion: false,
            iterations: IterationLimit::Count(iterations),
            interval: IterationInterval::default(),
            synchronized_iterations: false,
            execution_speed: None,
            queue_pass_rate: 0.0,
            iteration_timeout_secs: None,
        }
    }

    pub fn ramp_up(
        thread_count: usize,
        threads_per_step: usize,
        step_interval_ms: u64,
        iterations: u64,
    ) -> Self {
        Self {
            start: StartPattern::RampUp {
                threads_per_step,
                initial_delay_ms: 0,
                step_interval_ms,
            },
            ..Self::all_at_once(thread_count, iterations)
        }
    }

    /// Delay before the first ramp-up batch; ignored for all-at-once
    pub fn with_initial_delay(mut self, delay_ms: u64) -> Self {
        if let StartPattern::RampUp {
            initial_delay_ms, ..
        } = &mut self.start
        {
            *initial_delay_ms = delay_ms;
        }
        self
    }

    pub fn blocking(mut self, block_until_completion: bool) -> Self {
        self.block_until_completion = block_until_completion;
        self
    }

    pub fn with_interval(mut self, interval_ms: u64) -> Self {
        self.interval = IterationInterval::FixedMs(interval_ms);
        self
    }

    pub fn with_varying_interval(mut self, min_ms: u64, max_ms: u64) -> Self {
        self.interval = IterationInterval::varying(min_ms, max_ms);
        self
    }

    pub fn infinite(mut self) -> Self {
        self.iterations = IterationLimit::Infinite;
        self
    }

    pub fn for_duration(mut self, seconds: u64) -> Self {
        self.iterations = IterationLimit::DurationSecs(seconds);
        self
    }

    pub fn synchronized(mut self) -> Self {
        self.synchronized_iterations = true;
        self
    }

    pub fn with_execution_speed(mut self, count: u32, per_secs: u64) -> Self {
        self.execution_speed = Some(ExecutionSpeed { count, per_secs });
        self
    }

    pub fn with_pass_rate(mut self, percent: f32) -> Self {
        self.queue_pass_rate = percent;
        self
    }

    pub fn with_iteration_timeout(mut self, seconds: u64) -> Self {
        self.iteration_timeout_secs = Some(seconds);
        self
    }

    pub fn iteration_timeout(&self) -> Option<Duration> {
        self.iteration_timeout_secs.map(Duration::from_secs)
    }

    pub fn validate(&self) -> Result<(), PatternError> {
        if self.thread_count == 0 {
            return Err(PatternError::ZeroThreads);
        }
        if let StartPattern::RampUp {
            threads_per_step: 0,
            ..
        } = self.start
        {
            return Err(PatternError::ZeroThreadsPerStep);
        }
        match self.iterations {
            IterationLimit::Count(0) => return Err(PatternError::ZeroIterations),
            IterationLimit::DurationSecs(0) => return Err(PatternError::ZeroDuration),
            _ => {}
        }
        if let Some(speed) = self.execution_speed {
            if speed.count == 0 || speed.per_secs == 0 {
                return Err(PatternError::InvalidExecutionSpeed {
                    count: speed.count,
                    per_secs: speed.per_secs,
                });
            }
        }
        if !(0.0..=100.0).contains(&self.queue_pass_rate) {
            return Err(PatternError::InvalidPassRate(self.queue_pass_rate));
        }
        if self.iteration_timeout_secs == Some(0) {
            return Err(PatternError::ZeroIterationTimeout);
        }
        Ok(())
    }

    /// Worker start events, ordered by offset. Worker counts add up to
    /// `thread_count`; the last ramp-up batch takes the remainder. Offsets
    /// saturate instead of overflowing.
    pub fn start_schedule(&self) -> Vec<StartStep> {
        match self.start {
            StartPattern::AllAtOnce => vec![StartStep {
                offset: Duration::ZERO,
                worker_count: self.thread_count,
            }],
            StartPattern::RampUp {
                threads_per_step,
                initial_delay_ms,
                step_interval_ms,
            } => {
                let per_step = threads_per_step.max(1);
                let steps = self.thread_count.div_ceil(per_step);
                (0..steps)
                    .map(|step| StartStep {
                        offset: Duration::from_millis(
                            initial_delay_ms
                                .saturating_add((step as u64).saturating_mul(step_interval_ms)),
                        ),
                        worker_count: per_step.min(self.thread_count - step * per_step),
                    })
                    .collect()
            }
        }
    }

    pub fn description(&self) -> String {
        let mut description = match self.start {
            StartPattern::AllAtOnce => format!("All at once - {} threads", self.thread_count),
            StartPattern::RampUp {
                threads_per_step,
                step_interval_ms,
                ..
            } => format!(
                "Ramp up - {} total threads, {} threads every {} ms",
                self.thread_count, threads_per_step, step_interval_ms
            ),
        };

        let interval = match self.interval {
            IterationInterval::FixedMs(ms) => format!("{} ms interval", ms),
            IterationInterval::VaryingMs { min_ms, max_ms } => {
                format!("{} to {} ms varying interval", min_ms, max_ms)
            }
        };
        match self.iterations {
            IterationLimit::Count(count) => {
                description.push_str(&format!(", {} iterations with {}", count, interval))
            }
            IterationLimit::Infinite => {
                description.push_str(&format!(", continuous iterations with {}", interval))
            }
            IterationLimit::DurationSecs(secs) => {
                description.push_str(&format!(", for {} seconds with {}", secs, interval))
            }
        }

        if self.synchronized_iterations {
            description.push_str(", running synchronized iterations");
        }
        if let Some(speed) = self.execution_speed {
            description.push_str(&format!(
                ", max {} total iterations per {} secs",
                speed.count, speed.per_secs
            ));
        }
        if self.queue_pass_rate > 0.0 {
            description.push_str(&format!(
                ", pass if {}% of the iterations pass",
                self.queue_pass_rate
            ));
        }
        if let Some(secs) = self.iteration_timeout_secs {
            description.push_str(&format!(", iteration timeout {} secs", secs));
        }
        description
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_all_at_once_schedule() {
        let schedule = ExecutionPattern::all_at_once(5, 3).start_schedule();
        assert_eq!(
            schedule,
            vec![StartStep {
                offset: Duration::ZERO,
                worker_count: 5
            }]
        );
    }

    #[test]
    fn test_ramp_up_schedule_with_remainder() {
        let pattern = ExecutionPattern::ramp_up(10, 3, 1000, 1).with_initial_delay(500);
        let schedule = pattern.start_schedule();

        let counts: Vec<usize> = schedule.iter().map(|s| s.worker_count).collect();
        let offsets: Vec<u64> = schedule.iter().map(|s| s.offset.as_millis() as u64).collect();
        assert_eq!(counts, vec![3, 3, 3, 1]);
        assert_eq!(offsets, vec![500, 1500, 2500, 3500]);
    }

    #[test]
    fn test_ramp_up_larger_step_than_threads() {
        let schedule = ExecutionPattern::ramp_up(2, 5, 1000, 1).start_schedule();
        assert_eq!(schedule.len(), 1);
        assert_eq!(schedule[0].worker_count, 2);
    }

    #[test]
    fn test_validation() {
        assert_eq!(
            ExecutionPattern::all_at_once(0, 1).validate(),
            Err(PatternError::ZeroThreads)
        );
        assert_eq!(
            ExecutionPattern::ramp_up(4, 0, 10, 1).validate(),
            Err(PatternError::ZeroThreadsPerStep)
        );
        assert_eq!(
            ExecutionPattern::all_at_once(1, 0).validate(),
            Err(PatternError::ZeroIterations)
        );
        assert_eq!(
            ExecutionPattern::all_at_once(1, 1).for_duration(0).validate(),
            Err(PatternError::ZeroDuration)
        );
        assert!(matches!(
            ExecutionPattern::all_at_once(1, 1)
                .with_execution_speed(0, 1)
                .validate(),
            Err(PatternError::InvalidExecutionSpeed { .. })
        ));
        assert!(matches!(
            ExecutionPattern::all_at_once(1, 1).with_pass_rate(101.0).validate(),
            Err(PatternError::InvalidPassRate(_))
        ));
        assert_eq!(
            ExecutionPattern::all_at_once(1, 1)
                .with_iteration_timeout(0)
                .validate(),
            Err(PatternError::ZeroIterationTimeout)
        );
        assert!(ExecutionPattern::all_at_once(1, 1).infinite().validate().is_ok());
    }

    #[test]
    fn test_extreme_values_are_valid_and_do_not_overflow() {
        let pattern = ExecutionPattern::ramp_up(3, 1, u64::MAX, 1)
            .with_initial_delay(u64::MAX - 1)
            .for_duration(u64::MAX)
            .with_execution_speed(u32::MAX, u64::MAX)
            .with_iteration_timeout(u64::MAX);
        assert!(pattern.validate().is_ok());

        let offsets: Vec<Duration> = pattern.start_schedule().iter().map(|s| s.offset).collect();
        assert_eq!(
            offsets,
            vec![
                Duration::from_millis(u64::MAX - 1),
                Duration::from_millis(u64::MAX),
                Duration::from_millis(u64::MAX),
            ]
        );
    }

    #[test]
    fn test_varying_interval_normalization() {
        assert_eq!(
            IterationInterval::varying(300, 100),
            IterationInterval::VaryingMs {
                min_ms: 100,
                max_ms: 300
            }
        );
        assert_eq!(IterationInterval::varying(50, 50), IterationInterval::FixedMs(50));

        let interval = IterationInterval::varying(10, 20);
        for _ in 0..100 {
            let pause = interval.next_pause();
            assert!(pause >= Duration::from_millis(10) && pause < Duration::from_millis(20));
        }
    }

    #[test]
    fn test_descriptions() {
        let ramp = ExecutionPattern::ramp_up(10, 2, 1000, 5);
        assert_eq!(
            ramp.description(),
            "Ramp up - 10 total threads, 2 threads every 1000 ms, 5 iterations with 0 ms interval"
        );

        let all = ExecutionPattern::all_at_once(4, 1)
            .infinite()
            .with_varying_interval(100, 200)
            .synchronized()
            .with_execution_speed(10, 2)
            .with_pass_rate(90.0)
            .with_iteration_timeout(30);
        assert_eq!(
            all.description(),
            "All at once - 4 threads, continuous iterations with 100 to 200 ms varying interval, \
             running synchronized iterations, max 10 total iterations per 2 secs, \
             pass if 90% of the iterations pass, iteration timeout 30 secs"
        );
    }

    #[test]
    fn test_pattern_deserialization() {
        let pattern: ExecutionPattern = serde_json::from_value(json!({
            "start": {"type": "ramp_up", "threads_per_step": 2, "step_interval_ms": 250},
            "thread_count": 6,
            "iterations": {"count": 4},
            "interval": {"varying_ms": {"min_ms": 20, "max_ms": 10}},
            "execution_speed": {"count": 5, "per_secs": 1}
        }))
        .unwrap();

        assert_eq!(pattern.thread_count, 6);
        assert_eq!(pattern.iterations, IterationLimit::Count(4));
        assert!(!pattern.block_until_completion);
        assert_eq!(
            pattern.interval.normalized(),
            IterationInterval::VaryingMs {
                min_ms: 10,
                max_ms: 20
            }
        );
        assert_eq!(pattern.start_schedule().len(), 3);

        let minimal: ExecutionPattern = serde_json::from_value(json!({
            "start": {"type": "all_at_once"},
            "thread_count": 1
        }))
        .unwrap();
        assert_eq!(minimal.iterations, IterationLimit::Count(1));
        assert!(minimal.interval.is_zero());
        assert_eq!(minimal.queue_pass_rate, 0.0);
        assert!(minimal.iteration_timeout().is_none());
    }
}
