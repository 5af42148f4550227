//! # stagepipe
//!
//! **Cancellable staged pipelines over bounded Tokio channels.**
//!
//! `stagepipe` takes a lazy input sequence and an ordered list of stages,
//! wires each stage's output into the next stage's input, and hands back one
//! lazy output sequence. It is built for the unpleasant parts:
//!
//! - one task per stage, never one task per item
//! - cancellation that unblocks tasks parked on a full or empty channel
//! - no leaked tasks once a run is cancelled or its reader goes away
//! - output closes exactly once, after the last item, or promptly on cancel
//!
//! ---
//!
//! ## Core Model
//!
//! ```text
//! input → stage[0] → stage[1] → … → stage[n-1] → drainer → output
//! ```
//!
//! A [`Sequence`] is a bounded `tokio::sync::mpsc::Receiver`. A [`Stage`]
//! turns one sequence into another and is applied exactly once per run; it
//! spawns whatever tasks it needs. The [`Executor`] spawns exactly one task of
//! its own, the drainer, which races every read and every write against the
//! [`CancelToken`].
//!
//! ---
//!
//! ## Example
//!
//! ```no_run
//! use stagepipe::prelude::*;
//!
//! #[tokio::main]
//! async fn main() {
//!     let cancel = CancelToken::new();
//!     let input = stagepipe::source::from_iter(vec![1u32, 2, 3], 16, &cancel);
//!
//!     let stages: Vec<BoxStage<u32, u32>> = vec![
//!         map("double", |x: u32| x * 2).boxed(),
//!         filter("big", |x: &u32| *x > 2).boxed(),
//!     ];
//!
//!     let mut out = execute(&cancel, input, stages);
//!     while let Some(v) = out.recv().await {
//!         println!("{v}");
//!     }
//! }
//! ```
//!
//! When the item type changes between stages, compose them with
//! [`StageExt`] and run the chain with [`Executor::run`]:
//!
//! ```no_run
//! use stagepipe::prelude::*;
//!
//! # async fn demo() {
//! let cancel = CancelToken::new();
//! let input = stagepipe::source::from_iter(vec![1u32, 2, 3], 16, &cancel);
//!
//! let pipeline = map("increment", |x: u32| x + 1)
//!     .map("square", |x: u32| x * x)
//!     .map("stringify", |x: u32| x.to_string());
//!
//! let mut out = Executor::new().buffer(32).run(&cancel, input, pipeline);
//! while let Some(s) = out.recv().await {
//!     println!("{s}");
//! }
//! # }
//! ```
//!
//! ---
//!
//! ## Fallible stages
//!
//! The executor has no error channel. [`try_map`] reports failures in-band
//! by emitting `Result` items; after the first permanent failure it emits the
//! `Err` and closes its output.
//!
//! ```no_run
//! use std::time::Duration;
//! use stagepipe::error::Error;
//! use stagepipe::prelude::*;
//!
//! # fn example() {
//! let retry = RetryPolicy::new(3)
//!     .backoff(Backoff::Exponential {
//!         base: Duration::from_millis(10),
//!         max: Duration::from_millis(200),
//!     })
//!     .retry_if(|err| matches!(err, Error::Pipeline { .. }));
//!
//! let stage = try_map("parse", |s: String| async move {
//!     s.parse::<u32>().map_err(|_| Error::pipeline("not a number"))
//! })
//! .with_retry(retry);
//! # let _ = stage;
//! # }
//! ```
//!
//! `RetryPolicy::new(max_attempts)` fails on the first error until
//! `.retry_if(...)` is configured. `.on_error(...)` decides per error with
//! `ErrorAction::Retry`, `ErrorAction::Skip` or `ErrorAction::Fail`.
//!
//! ---
//!
//! ## Cancellation
//!
//! - Raising the token before `execute` yields an output that closes with
//!   zero items.
//! - Raising it mid-run stops the drainer within one scheduling step, even
//!   while it waits on a reader that never reads.
//! - An item already accepted into the output channel counts as delivered and
//!   stays readable after cancellation.
//! - Built-in stages observe the same token and stop their own tasks.
//! - Timeouts: [`CancelToken::cancel_after`].
//!
//! ---
//!
//! ## Configuration
//!
//! ```no_run
//! use stagepipe::prelude::*;
//!
//! let executor = Executor::new()
//!     .buffer(64)                       // every channel
//!     .buffer_stage("embed", 8)         // one stage's output channel
//!     .output_buffer(16)                // the returned sequence
//!     .concurrency_stage("embed", 4);   // items in flight, order kept
//! # let _ = executor;
//! ```
//!
//! ---
//!
//! ## Observability
//!
//! With the default `tracing` feature, every stage task runs in a
//! `stagepipe.stage` span and emits structured events such as
//! `stagepipe.cancelled`, `stagepipe.downstream.closed`,
//! `stagepipe.drain.finished`, `stagepipe.retry.attempt_failed`
//! (with the chosen action), `stagepipe.retry.sleep` and
//! `stagepipe.retry.exhausted`.
//!
//! ```ignore
//! use tracing_subscriber::fmt;
//!
//! fn main() {
//!     fmt()
//!         .with_target(false)
//!         .with_env_filter("stagepipe=debug")
//!         .init();
//! }
//! ```
//!
//! ---
//!
//! ## Feature Flags
//!
//! - `tracing` *(default)*: spans and events through `tracing`.
//!
//! [`Sequence`]: pipeline::stage::Sequence
//! [`Stage`]: pipeline::stage::Stage
//! [`StageExt`]: pipeline::chain::StageExt
//! [`Executor`]: pipeline::executor::Executor
//! [`Executor::run`]: pipeline::executor::Executor::run
//! [`CancelToken`]: pipeline::cancel::CancelToken
//! [`CancelToken::cancel_after`]: pipeline::cancel::CancelToken::cancel_after
//! [`try_map`]: pipeline::adapters_try::try_map

pub mod error;
pub mod pipeline;
pub mod source;

pub mod prelude {
    //! Convenient imports for most `stagepipe` users.

    pub use crate::pipeline::adapters::{filter, inspect, map, Identity};
    pub use crate::pipeline::adapters_try::try_map;
    pub use crate::pipeline::cancel::CancelToken;
    pub use crate::pipeline::chain::StageExt;
    pub use crate::pipeline::executor::{execute, Executor};
    pub use crate::pipeline::retry::{Backoff, ErrorAction, RetryPolicy};
    pub use crate::pipeline::stage::{stage_fn, BoxStage, Sequence, Stage, StageContext};
}
