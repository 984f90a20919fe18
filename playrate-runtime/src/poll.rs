// Bounded polling with an explicit cancellation handle.
//
// Both injection loops in the system (coordinator-side and agent-side) are
// "try every interval, give up after N attempts". The loop stops itself on
// the first successful tick; the handle lets a racing path stop it sooner.

use std::future::Future;
use std::ops::ControlFlow;
use std::time::Duration;

use tokio::task::JoinHandle;

/// Cancellation handle for a running bounded poll.
pub struct PollHandle {
    task: JoinHandle<()>,
}

impl PollHandle {
    /// Stop the loop immediately. Safe to call after it finished on its own.
    pub fn abort(&self) {
        self.task.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for PollHandle {
    fn drop(&mut self) {
        // Context teardown cancels in-flight work scoped to it.
        self.task.abort();
    }
}

/// Run `tick` every `interval`, at most `max_attempts` times, starting one
/// interval from now. A tick returning `ControlFlow::Break` ends the loop;
/// exhaustion abandons it silently (the caller logs if it cares).
pub fn spawn_bounded<F, Fut>(interval: Duration, max_attempts: u32, mut tick: F) -> PollHandle
where
    F: FnMut(u32) -> Fut + Send + 'static,
    Fut: Future<Output = ControlFlow<()>> + Send + 'static,
{
    let task = tokio::spawn(async move {
        for attempt in 1..=max_attempts {
            tokio::time::sleep(interval).await;
            if tick(attempt).await.is_break() {
                return;
            }
        }
    });
    PollHandle { task }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn terminates_after_max_attempts() {
        let ticks = Arc::new(AtomicU32::new(0));
        let counter = ticks.clone();
        let handle = spawn_bounded(Duration::from_millis(1), 15, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            async { ControlFlow::Continue(()) }
        });

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(handle.is_finished());
        assert_eq!(ticks.load(Ordering::SeqCst), 15);
    }

    #[tokio::test]
    async fn break_stops_early() {
        let ticks = Arc::new(AtomicU32::new(0));
        let counter = ticks.clone();
        let handle = spawn_bounded(Duration::from_millis(1), 15, move |attempt| {
            counter.fetch_add(1, Ordering::SeqCst);
            async move {
                if attempt == 3 {
                    ControlFlow::Break(())
                } else {
                    ControlFlow::Continue(())
                }
            }
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(handle.is_finished());
        assert_eq!(ticks.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn abort_cancels_between_ticks() {
        let ticks = Arc::new(AtomicU32::new(0));
        let counter = ticks.clone();
        let handle = spawn_bounded(Duration::from_millis(20), 15, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            async { ControlFlow::Continue(()) }
        });

        tokio::time::sleep(Duration::from_millis(5)).await;
        handle.abort();
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 0);
    }
}
