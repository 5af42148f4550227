use std::future::Future;

use tokio::sync::mpsc::{self, Receiver, Sender};
use tokio::task::JoinHandle;

use crate::pipeline::cancel::CancelToken;
use crate::pipeline::config::StageConfig;

/// Single-producer, single-consumer ordered stream of items.
///
/// Closed once its sender is dropped.
pub type Sequence<T> = Receiver<T>;

pub type BoxStage<I, O> = Box<dyn Stage<I, O>>;

pub(crate) const DEFAULT_BUFFER: usize = 128;

/// A transformation from one sequence to another.
///
/// `apply` is called exactly once per run. It must return its output
/// sequence immediately and produce values from tasks it spawns itself,
/// usually through [`StageContext::spawn`]. Stages are expected to stop
/// producing once [`StageContext::cancel`] fires.
pub trait Stage<I: Send + 'static, O: Send + 'static>: Send + 'static {
    fn stage_name(&self) -> &'static str {
        "stage"
    }

    fn apply(self: Box<Self>, input: Sequence<I>, cx: &StageContext) -> Sequence<O>;
}

impl<I, O> Stage<I, O> for BoxStage<I, O>
where
    I: Send + 'static,
    O: Send + 'static,
{
    fn stage_name(&self) -> &'static str {
        (**self).stage_name()
    }

    fn apply(self: Box<Self>, input: Sequence<I>, cx: &StageContext) -> Sequence<O> {
        <dyn Stage<I, O> as Stage<I, O>>::apply(*self, input, cx)
    }
}

/// Everything a stage needs to wire itself into a run: the run's
/// cancellation token and the channel/concurrency settings.
#[derive(Clone, Debug)]
pub struct StageContext {
    cancel: CancelToken,
    buffer: usize,
    config: StageConfig,
}

impl StageContext {
    /// Context with default settings, for driving a stage by hand.
    pub fn new(cancel: CancelToken) -> Self {
        Self::with_config(cancel, DEFAULT_BUFFER, StageConfig::default())
    }

    pub(crate) fn with_config(cancel: CancelToken, buffer: usize, config: StageConfig) -> Self {
        Self {
            cancel,
            buffer: buffer.max(1),
            config,
        }
    }

    pub fn cancel(&self) -> &CancelToken {
        &self.cancel
    }

    pub fn buffer_for(&self, stage: &'static str) -> usize {
        self.config.buffer_for(stage, self.buffer)
    }

    pub fn concurrency_for(&self, stage: &'static str) -> usize {
        self.config.concurrency_for(stage)
    }

    /// Bounded channel sized for `stage`'s output.
    pub fn channel<T>(&self, stage: &'static str) -> (Sender<T>, Receiver<T>) {
        mpsc::channel(self.buffer_for(stage))
    }

    pub fn spawn<F>(&self, stage: &'static str, task: F) -> JoinHandle<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        #[cfg(feature = "tracing")]
        let handle = {
            use tracing::Instrument;
            let span = tracing::info_span!(
                "stagepipe.stage",
                stage = stage,
                buffer = self.buffer_for(stage)
            );
            tokio::spawn(task.instrument(span))
        };

        #[cfg(not(feature = "tracing"))]
        let handle = {
            let _ = stage;
            tokio::spawn(task)
        };

        handle
    }
}

/// Stage built from a closure, see [`stage_fn`].
pub struct FnStage<F> {
    stage: &'static str,
    f: F,
}

/// Wraps `f` as a [`Stage`]. The closure receives the input sequence and the
/// run's context and must return the output sequence without blocking.
pub fn stage_fn<I, O, F>(stage: &'static str, f: F) -> FnStage<F>
where
    I: Send + 'static,
    O: Send + 'static,
    F: FnOnce(Sequence<I>, &StageContext) -> Sequence<O> + Send + 'static,
{
    FnStage { stage, f }
}

impl<I, O, F> Stage<I, O> for FnStage<F>
where
    I: Send + 'static,
    O: Send + 'static,
    F: FnOnce(Sequence<I>, &StageContext) -> Sequence<O> + Send + 'static,
{
    fn stage_name(&self) -> &'static str {
        self.stage
    }

    fn apply(self: Box<Self>, input: Sequence<I>, cx: &StageContext) -> Sequence<O> {
        (self.f)(input, cx)
    }
}
