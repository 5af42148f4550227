use std::sync::Arc;
use std::time::Duration;

use crate::error::Error;

type Decide = Arc<dyn Fn(&Error) -> ErrorAction + Send + Sync>;

/// What [`try_map`](crate::pipeline::adapters_try::try_map) does with an item
/// whose call failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorAction {
    /// Call again after the backoff, while attempts remain.
    Retry,
    /// Drop the item and keep going.
    Skip,
    /// Emit the error in-band and close the stage.
    Fail,
}

impl ErrorAction {
    #[cfg_attr(not(feature = "tracing"), allow(dead_code))]
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::Retry => "retry",
            Self::Skip => "skip",
            Self::Fail => "fail",
        }
    }
}

/// Wait between two attempts on the same item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    Immediate,
    Fixed(Duration),
    /// `base`, `2 * base`, `4 * base`, ... never above `max`.
    Exponential { base: Duration, max: Duration },
}

impl Backoff {
    /// Delay before retry number `retry`, counting from 1.
    pub fn delay(&self, retry: u32) -> Duration {
        match *self {
            Self::Immediate => Duration::ZERO,
            Self::Fixed(delay) => delay,
            Self::Exponential { base, max } => {
                let factor = 1u32.checked_shl(retry.saturating_sub(1)).unwrap_or(u32::MAX);
                base.saturating_mul(factor).min(max)
            }
        }
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::Exponential {
            base: Duration::from_millis(10),
            max: Duration::from_secs(1),
        }
    }
}

/// How a fallible stage treats failed items.
///
/// `RetryPolicy::new(n)` allows `n` calls per item but fails on the first
/// error until told otherwise with [`retry_if`](Self::retry_if) or
/// [`on_error`](Self::on_error).
#[derive(Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    backoff: Backoff,
    decide: Decide,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff: Backoff::default(),
            decide: Arc::new(|_| ErrorAction::Fail),
        }
    }

    pub fn backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Retry errors matching `predicate`, fail on the rest.
    pub fn retry_if<P>(self, predicate: P) -> Self
    where
        P: Fn(&Error) -> bool + Send + Sync + 'static,
    {
        self.on_error(move |err| {
            if predicate(err) {
                ErrorAction::Retry
            } else {
                ErrorAction::Fail
            }
        })
    }

    /// Decide per error. Replaces any earlier `retry_if`.
    pub fn on_error<H>(mut self, handler: H) -> Self
    where
        H: Fn(&Error) -> ErrorAction + Send + Sync + 'static,
    {
        self.decide = Arc::new(handler);
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub(crate) fn decide(&self, error: &Error) -> ErrorAction {
        (self.decide)(error)
    }

    pub(crate) fn delay(&self, retry: u32) -> Duration {
        self.backoff.delay(retry)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(1)
    }
}

impl std::fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_attempts", &self.max_attempts)
            .field("backoff", &self.backoff)
            .finish_non_exhaustive()
    }
}
