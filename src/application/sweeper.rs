//! Periodic background cleanup.
//!
//! A sweeper ticks every `period` and calls a sweep function on its target. It
//! only holds a [`Weak`] reference, so it never keeps its owner alive: once the
//! owner is dropped the next tick ends the task.

use std::sync::Weak;
use std::time::Duration;

use thiserror::Error;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Error returned when a sweeper does not stop cleanly.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ShutdownError {
    #[error("sweeper task panicked")]
    Panicked,
}

/// Handle to a running sweeper task.
#[derive(Debug)]
pub struct SweeperHandle {
    token: CancellationToken,
    task: JoinHandle<()>,
}

impl SweeperHandle {
    /// Spawn a sweeper on `runtime`. The first sweep happens one `period` after
    /// spawning.
    pub(crate) fn spawn<T, F>(runtime: &Handle, target: Weak<T>, period: Duration, sweep: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(&T) -> usize + Send + 'static,
    {
        let token = CancellationToken::new();
        let cancelled = token.clone();

        let task = runtime.spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = cancelled.cancelled() => break,
                    _ = ticker.tick() => {
                        let Some(target) = target.upgrade() else {
                            break;
                        };
                        sweep(target.as_ref());
                    }
                }
            }
        });

        Self { token, task }
    }

    /// Stop the task without waiting for it.
    ///
    /// No sweep starts after this returns. A sweep already running on another
    /// worker thread is allowed to finish.
    pub fn cancel(&self) {
        self.token.cancel();
        self.task.abort();
    }

    /// Stop the task and wait for it to exit.
    ///
    /// # Errors
    /// [`ShutdownError::Panicked`] if a sweep panicked.
    pub async fn shutdown(self) -> Result<(), ShutdownError> {
        self.token.cancel();
        match self.task.await {
            Ok(()) => Ok(()),
            Err(err) if err.is_cancelled() => Ok(()),
            Err(_) => Err(ShutdownError::Panicked),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    const PERIOD: Duration = Duration::from_secs(10);

    fn spawn_counter(target: &Arc<AtomicUsize>) -> SweeperHandle {
        SweeperHandle::spawn(
            &Handle::current(),
            Arc::downgrade(target),
            PERIOD,
            |calls: &AtomicUsize| calls.fetch_add(1, Ordering::SeqCst),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeps_every_period() {
        let calls = Arc::new(AtomicUsize::new(0));
        let handle = spawn_counter(&calls);

        tokio::time::sleep(PERIOD / 2).await;
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        tokio::time::sleep(PERIOD * 3).await;
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        handle.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_stops_sweeping() {
        let calls = Arc::new(AtomicUsize::new(0));
        let handle = spawn_counter(&calls);

        tokio::time::sleep(PERIOD + Duration::from_secs(1)).await;
        assert_eq!(handle.shutdown().await, Ok(()));

        let seen = calls.load(Ordering::SeqCst);
        tokio::time::sleep(PERIOD * 5).await;
        assert_eq!(calls.load(Ordering::SeqCst), seen);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_stops_sweeping() {
        let calls = Arc::new(AtomicUsize::new(0));
        let handle = spawn_counter(&calls);

        handle.cancel();
        tokio::time::sleep(PERIOD * 5).await;
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(handle.is_finished());
    }

    #[tokio::test(start_paused = true)]
    async fn test_exits_when_target_dropped() {
        let calls = Arc::new(AtomicUsize::new(0));
        let handle = spawn_counter(&calls);
        drop(calls);

        tokio::time::sleep(PERIOD * 2).await;
        assert!(handle.is_finished());
    }
}
