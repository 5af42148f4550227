use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::Instant;

/// Level-triggered cancellation flag shared by a pipeline run.
///
/// Once [`cancel`](Self::cancel) is called the token stays cancelled; every
/// current and future [`cancelled`](Self::cancelled) future resolves.
#[derive(Clone, Default, Debug)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Resolves once the token is cancelled.
    ///
    /// Cancel safe: dropping the future before it resolves has no effect.
    pub async fn cancelled(&self) {
        let notified = self.notify.notified();
        tokio::pin!(notified);
        // Register before reading the flag so a concurrent `cancel` can't
        // slip between the check and the wait.
        notified.as_mut().enable();
        if self.is_cancelled() {
            return;
        }
        notified.await;
    }

    /// Cancels the token `timeout` after this call, unless it was cancelled
    /// earlier. Must be called from within a Tokio runtime.
    pub fn cancel_after(&self, timeout: Duration) {
        // Fixed now: the timer task may not be polled for a while.
        let deadline = Instant::now() + timeout;
        let token = self.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep_until(deadline) => token.cancel(),
            }
        });
    }
}
