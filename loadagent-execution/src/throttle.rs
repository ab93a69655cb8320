//! Queue-wide execution speed limit

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::pattern::ExecutionSpeed;

/// Sliding-window limiter admitting at most `limit` iteration starts per
/// `window`, shared by all workers of one queue.
///
/// A worker that finds the window full parks until the oldest admission
/// leaves the window. There is no upper bound on how long that takes; only
/// cancellation ends the wait early.
#[derive(Debug)]
pub struct ExecutionThrottle {
    limit: usize,
    window: Duration,
    admitted: Mutex<VecDeque<Instant>>,
}

impl ExecutionThrottle {
    pub fn new(limit: usize, window: Duration) -> Self {
        Self {
            limit: limit.max(1),
            window,
            // grows with actual admissions, never with the configured limit
            admitted: Mutex::new(VecDeque::new()),
        }
    }

    pub fn from_speed(speed: &ExecutionSpeed) -> Self {
        Self::new(speed.count as usize, speed.window())
    }

    /// Admit one iteration start now, or tell when the next slot frees up.
    /// `Err(None)` means no slot frees up within the clock's range.
    fn try_admit(&self) -> Result<(), Option<Instant>> {
        let now = Instant::now();
        let mut admitted = self.admitted.lock();
        while let Some(&oldest) = admitted.front() {
            if now.duration_since(oldest) >= self.window {
                admitted.pop_front();
            } else {
                break;
            }
        }

        if admitted.len() < self.limit {
            admitted.push_back(now);
            return Ok(());
        }

        match admitted.front() {
            Some(&oldest) => Err(oldest.checked_add(self.window)),
            None => Ok(()),
        }
    }

    /// Wait for a slot. Returns `false` if `cancel` fired first.
    pub async fn acquire(&self, cancel: &CancellationToken) -> bool {
        loop {
            let retry_at = match self.try_admit() {
                Ok(()) => return true,
                Err(retry_at) => retry_at,
            };

            debug!(
                limit = self.limit,
                window_ms = self.window.as_millis() as u64,
                "Execution speed limit reached, waiting for capacity"
            );

            match retry_at {
                Some(retry_at) => tokio::select! {
                    _ = cancel.cancelled() => return false,
                    _ = sleep_until(retry_at) => {}
                },
                None => {
                    cancel.cancelled().await;
                    return false;
                }
            }
        }
    }

    /// Admissions still inside the window
    pub fn in_window(&self) -> usize {
        let now = Instant::now();
        self.admitted
            .lock()
            .iter()
            .filter(|&&at| now.duration_since(at) < self.window)
            .count()
    }
}
