//! Trailing-edge debounce built on cancellable scheduled tasks.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

/// Handle to one armed timer. Dropping it cancels the timer.
#[derive(Debug)]
pub struct DebounceHandle {
    token: CancellationToken,
}

impl DebounceHandle {
    /// Stop the timer if it has not fired yet. Safe to call repeatedly.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// True while the timer is waiting to fire.
    pub fn is_pending(&self) -> bool {
        !self.token.is_cancelled()
    }
}

impl Drop for DebounceHandle {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

/// Runs a task once a quiet period has passed since the latest `arm`.
///
/// Every `arm` cancels the previous timer before starting a new one, so at
/// most one timer is pending. Cancellation only takes effect while the timer
/// is waiting; once the task has started it runs to completion.
#[derive(Debug)]
pub struct Debouncer {
    delay: Duration,
    pending: Option<DebounceHandle>,
}

impl Debouncer {
    pub const fn new(delay: Duration) -> Self {
        Self {
            delay,
            pending: None,
        }
    }

    /// (Re)start the timer; `task` runs after the quiet period unless cancelled.
    pub fn arm<F>(&mut self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.cancel();

        let token = CancellationToken::new();
        let timer = token.clone();
        let delay = self.delay;

        tokio::spawn(async move {
            tokio::select! {
                () = timer.cancelled() => {}
                () = tokio::time::sleep(delay) => {
                    // Mark the handle as no longer pending before running.
                    timer.cancel();
                    task.await;
                }
            }
        });

        self.pending = Some(DebounceHandle { token });
    }

    /// Cancel the pending timer. Returns whether one was still waiting.
    pub fn cancel(&mut self) -> bool {
        self.pending.take().is_some_and(|handle| {
            let was_pending = handle.is_pending();
            handle.cancel();
            was_pending
        })
    }

    pub fn is_pending(&self) -> bool {
        self.pending.as_ref().is_some_and(DebounceHandle::is_pending)
    }
}
