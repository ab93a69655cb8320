//! Iteration barrier for synchronized queues

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

#[derive(Debug)]
struct BarrierState {
    parties: usize,
    arrived: usize,
    generation: u64,
}

/// Reusable barrier whose party count shrinks as workers exit.
///
/// Every generation releases once all remaining parties have arrived. A
/// worker cancelled while waiting withdraws its arrival and returns without
/// waiting for the others.
#[derive(Debug)]
pub struct IterationBarrier {
    state: Mutex<BarrierState>,
    generation: watch::Sender<u64>,
}

impl IterationBarrier {
    pub fn new(parties: usize) -> Self {
        let (generation, _) = watch::channel(0);
        Self {
            state: Mutex::new(BarrierState {
                parties,
                arrived: 0,
                generation: 0,
            }),
            generation,
        }
    }

    pub fn parties(&self) -> usize {
        self.state.lock().parties
    }

    /// Workers currently waiting
    pub fn waiting(&self) -> usize {
        self.state.lock().arrived
    }

    fn release(&self, state: &mut BarrierState) {
        state.arrived = 0;
        state.generation += 1;
        self.generation.send_replace(state.generation);
    }

    /// Arrive and wait for the rest of the parties. Returns `false` when
    /// cancelled before the barrier opened.
    pub async fn wait(&self, cancel: &CancellationToken) -> bool {
        let mut released = self.generation.subscribe();
        let arrived_in = {
            let mut state = self.state.lock();
            state.arrived += 1;
            if state.arrived >= state.parties {
                self.release(&mut state);
                return true;
            }
            state.generation
        };

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    let mut state = self.state.lock();
                    if state.generation != arrived_in {
                        // opened while we were being cancelled
                        return true;
                    }
                    state.arrived = state.arrived.saturating_sub(1);
                    return false;
                }
                changed = released.changed() => {
                    if changed.is_err() {
                        return false;
                    }
                    if *released.borrow_and_update() != arrived_in {
                        return true;
                    }
                }
            }
        }
    }

    /// Permanently remove one party, opening the barrier if everybody left
    /// is already waiting
    pub fn leave(&self) {
        let mut state = self.state.lock();
        state.parties = state.parties.saturating_sub(1);
        if state.arrived > 0 && state.arrived >= state.parties {
            self.release(&mut state);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_single_party_never_blocks() {
        let barrier = IterationBarrier::new(1);
        let cancel = CancellationToken::new();
        assert!(barrier.wait(&cancel).await);
        assert!(barrier.wait(&cancel).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_releases_when_all_arrive() {
        let barrier = Arc::new(IterationBarrier::new(3));
        let cancel = CancellationToken::new();

        let mut handles = Vec::new();
        for delay in [0u64, 100, 200] {
            let barrier = barrier.clone();
            let cancel = cancel.clone();
            handles.push(tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(delay)).await;
                let opened = barrier.wait(&cancel).await;
                (opened, tokio::time::Instant::now())
            }));
        }

        let mut release_times = Vec::new();
        for handle in handles {
            let (opened, at) = handle.await.unwrap();
            assert!(opened);
            release_times.push(at);
        }
        assert!(release_times.windows(2).all(|w| w[0] == w[1]));
        assert_eq!(barrier.waiting(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_leave_opens_barrier_for_remaining_parties() {
        let barrier = Arc::new(IterationBarrier::new(2));
        let cancel = CancellationToken::new();

        let waiter = {
            let barrier = barrier.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { barrier.wait(&cancel).await })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(barrier.waiting(), 1);

        barrier.leave();
        assert!(waiter.await.unwrap());
        assert_eq!(barrier.parties(), 1);

        // the remaining party now passes straight through
        assert!(barrier.wait(&cancel).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_withdraws_arrival() {
        let barrier = Arc::new(IterationBarrier::new(2));
        let cancel = CancellationToken::new();

        let waiter = {
            let barrier = barrier.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { barrier.wait(&cancel).await })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        cancel.cancel();
        assert!(!waiter.await.unwrap());
        assert_eq!(barrier.waiting(), 0);
    }
}
