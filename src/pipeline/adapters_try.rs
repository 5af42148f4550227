use std::future::Future;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::pipeline::adapters::{spawn_ordered, Step};
use crate::pipeline::cancel::CancelToken;
use crate::pipeline::retry::{ErrorAction, RetryPolicy};
use crate::pipeline::stage::{Sequence, Stage, StageContext};

/// Fallible async map.
///
/// Emits `Ok(value)` for every item that succeeds. Failures are reported
/// in-band: once an item fails for good the stage emits a single `Err` and
/// closes its output.
pub struct TryMapStage<F> {
    stage: &'static str,
    f: F,
    policy: RetryPolicy,
}

enum Outcome<O> {
    Value(O),
    Skipped,
    Cancelled,
    Failed(Error),
}

impl<F> TryMapStage<F> {
    pub fn new(stage: &'static str, f: F) -> Self {
        Self {
            stage,
            f,
            policy: RetryPolicy::default(),
        }
    }

    /// Replaces the stage's policy. See [`RetryPolicy`].
    pub fn with_retry(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Shorthand for `policy.on_error(handler)` on the current policy.
    pub fn on_error<H>(mut self, handler: H) -> Self
    where
        H: Fn(&Error) -> ErrorAction + Send + Sync + 'static,
    {
        self.policy = self.policy.on_error(handler);
        self
    }
}

impl<I, O, F, Fut> Stage<I, Result<O>> for TryMapStage<F>
where
    I: Send + Clone + 'static,
    O: Send + 'static,
    F: Fn(I) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<O>> + Send + 'static,
{
    fn stage_name(&self) -> &'static str {
        self.stage
    }

    fn apply(self: Box<Self>, input: Sequence<I>, cx: &StageContext) -> Sequence<Result<O>> {
        let stage = self.stage;
        let this = Arc::new(*self);
        let cancel = cx.cancel().clone();

        spawn_ordered(cx, stage, input, move |item| {
            let this = this.clone();
            let cancel = cancel.clone();
            async move {
                match this.attempt(item, &cancel).await {
                    Outcome::Value(v) => Step::Emit(Ok(v)),
                    Outcome::Skipped => Step::Skip,
                    Outcome::Cancelled => Step::Finish(None),
                    Outcome::Failed(err) => Step::Finish(Some(Err(err))),
                }
            }
        })
    }
}

impl<F> TryMapStage<F> {
    /// Calls `f` on `item` until it succeeds or the policy gives up.
    async fn attempt<I, O, Fut>(&self, item: I, cancel: &CancelToken) -> Outcome<O>
    where
        I: Clone,
        F: Fn(I) -> Fut,
        Fut: Future<Output = Result<O>>,
    {
        let max_attempts = self.policy.max_attempts();

        for attempt in 1..=max_attempts {
            let error = match (self.f)(item.clone()).await {
                Ok(value) => return Outcome::Value(value),
                Err(error) => error,
            };

            let action = self.policy.decide(&error);

            #[cfg(feature = "tracing")]
            tracing::event!(
                tracing::Level::WARN,
                event = "stagepipe.retry.attempt_failed",
                stage = self.stage,
                attempt = attempt,
                max_attempts = max_attempts,
                action = action.as_str(),
                error = %error,
                "stagepipe.retry.attempt_failed"
            );

            match action {
                ErrorAction::Skip => return Outcome::Skipped,
                ErrorAction::Fail => return Outcome::Failed(Error::stage_source(self.stage, error)),
                ErrorAction::Retry if attempt == max_attempts => {
                    #[cfg(feature = "tracing")]
                    tracing::event!(
                        tracing::Level::ERROR,
                        event = "stagepipe.retry.exhausted",
                        stage = self.stage,
                        attempts = max_attempts,
                        error = %error,
                        "stagepipe.retry.exhausted"
                    );
                    return Outcome::Failed(Error::retry_exhausted(self.stage, max_attempts, error));
                }
                ErrorAction::Retry => {}
            }

            let delay = self.policy.delay(attempt);
            if delay.is_zero() {
                if cancel.is_cancelled() {
                    return Outcome::Cancelled;
                }
                continue;
            }

            #[cfg(feature = "tracing")]
            tracing::event!(
                tracing::Level::DEBUG,
                event = "stagepipe.retry.sleep",
                stage = self.stage,
                attempt = attempt,
                delay_ms = delay.as_millis() as u64,
                "stagepipe.retry.sleep"
            );

            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    #[cfg(feature = "tracing")]
                    tracing::event!(
                        tracing::Level::DEBUG,
                        event = "stagepipe.cancelled",
                        stage = self.stage,
                        where_ = "backoff",
                        "stagepipe.cancelled"
                    );
                    return Outcome::Cancelled;
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }

        // Only reached with `max_attempts == 0`, which `RetryPolicy` rules out.
        Outcome::Cancelled
    }
}

pub fn try_map<I, O, F, Fut>(stage: &'static str, f: F) -> TryMapStage<F>
where
    F: Fn(I) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<O>> + Send + 'static,
{
    TryMapStage::new(stage, f)
}
