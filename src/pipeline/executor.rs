use tokio::runtime::Handle;
use tokio::sync::mpsc;

use crate::error::{Error, Result};
use crate::pipeline::cancel::CancelToken;
use crate::pipeline::config::StageConfig;
use crate::pipeline::send::{send_or_cancel, Delivery};
use crate::pipeline::stage::{BoxStage, Sequence, Stage, StageContext, DEFAULT_BUFFER};

/// Stage label of the drainer task in tracing spans and events. The result
/// sequence is sized by [`Executor::output_buffer`], never by a
/// `buffer_stage` override, so user stages may also be called `drain`.
pub const DRAIN_STAGE: &str = "drain";

/// Wires stages into a running pipeline.
///
/// The executor itself spawns exactly one task per run, the drainer, which
/// moves items from the last stage into the returned sequence until the
/// upstream closes or the run is cancelled. Stages spawn their own tasks.
#[derive(Clone, Debug)]
pub struct Executor {
    buffer: usize,
    output_buffer: Option<usize>,
    config: StageConfig,
}

impl Executor {
    pub fn new() -> Self {
        Self {
            buffer: DEFAULT_BUFFER,
            output_buffer: None,
            config: StageConfig::default(),
        }
    }

    /// Default channel size for every stage. Zero is treated as one.
    pub fn buffer(mut self, buffer: usize) -> Self {
        self.buffer = buffer.max(1);
        self
    }

    /// Size of the returned sequence's channel, i.e. how many items may sit
    /// unread by the caller. Defaults to [`buffer`](Self::buffer).
    pub fn output_buffer(mut self, buffer: usize) -> Self {
        self.output_buffer = Some(buffer.max(1));
        self
    }

    /// Overrides the output channel size of the stage named `stage`.
    /// Chained adapters are addressed by the name they were built with;
    /// stages sharing a name share the override.
    pub fn buffer_stage(mut self, stage: &'static str, buffer: usize) -> Self {
        self.config = self.config.with_buffer(stage, buffer);
        self
    }

    /// Lets the stage named `stage` keep up to `workers` items in flight.
    /// Output order is unchanged.
    pub fn concurrency_stage(mut self, stage: &'static str, workers: usize) -> Self {
        self.config = self.config.with_concurrency(stage, workers);
        self
    }

    pub fn context(&self, cancel: &CancelToken) -> StageContext {
        StageContext::with_config(cancel.clone(), self.buffer, self.config.clone())
    }

    /// Runs `input` through `stages` in order and returns the result sequence.
    ///
    /// Returns immediately. Must be called from within a Tokio runtime; see
    /// [`try_execute`](Self::try_execute) for a checked variant.
    pub fn execute<T>(
        &self,
        cancel: &CancelToken,
        input: Sequence<T>,
        stages: Vec<BoxStage<T, T>>,
    ) -> Sequence<T>
    where
        T: Send + 'static,
    {
        let cx = self.context(cancel);

        let mut current = input;
        for stage in stages {
            current = stage.apply(current, &cx);
        }

        self.drain(current, &cx)
    }

    /// Like [`execute`](Self::execute), but fails with [`Error::NoRuntime`]
    /// instead of panicking when no Tokio runtime is running.
    pub fn try_execute<T>(
        &self,
        cancel: &CancelToken,
        input: Sequence<T>,
        stages: Vec<BoxStage<T, T>>,
    ) -> Result<Sequence<T>>
    where
        T: Send + 'static,
    {
        Handle::try_current().map_err(|_| Error::NoRuntime)?;
        Ok(self.execute(cancel, input, stages))
    }

    /// Runs a typed pipeline, usually a [`Chain`](crate::pipeline::chain::Chain)
    /// whose item type changes between stages.
    pub fn run<I, O, S>(&self, cancel: &CancelToken, input: Sequence<I>, stage: S) -> Sequence<O>
    where
        I: Send + 'static,
        O: Send + 'static,
        S: Stage<I, O>,
    {
        let cx = self.context(cancel);
        let last = Box::new(stage).apply(input, &cx);
        self.drain(last, &cx)
    }

    fn drain<T>(&self, mut upstream: Sequence<T>, cx: &StageContext) -> Sequence<T>
    where
        T: Send + 'static,
    {
        let (output, rx) = mpsc::channel(self.output_buffer.unwrap_or(self.buffer));
        let cancel = cx.cancel().clone();

        cx.spawn(DRAIN_STAGE, async move {
            let mut forwarded = 0u64;

            let end = loop {
                // Cancellation is polled first: once raised, nothing else is
                // read from upstream or written downstream.
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break DrainEnd::Cancelled,
                    msg = upstream.recv() => {
                        let Some(item) = msg else {
                            break DrainEnd::Exhausted;
                        };
                        match send_or_cancel(&output, item, &cancel).await {
                            Delivery::Sent => forwarded += 1,
                            Delivery::Cancelled => break DrainEnd::Cancelled,
                            Delivery::Closed => break DrainEnd::DownstreamClosed,
                        }
                    }
                }
            };

            finished(forwarded, end);
            // `output` and `upstream` drop here: the result sequence closes and
            // the last stage sees its receiver gone.
        });

        rx
    }
}

impl Default for Executor {
    fn default() -> Self {
        Self::new()
    }
}

/// [`Executor::execute`] with default settings.
pub fn execute<T>(
    cancel: &CancelToken,
    input: Sequence<T>,
    stages: Vec<BoxStage<T, T>>,
) -> Sequence<T>
where
    T: Send + 'static,
{
    Executor::new().execute(cancel, input, stages)
}

#[derive(Debug, Clone, Copy)]
enum DrainEnd {
    Exhausted,
    Cancelled,
    DownstreamClosed,
}

#[cfg(feature = "tracing")]
fn finished(forwarded: u64, end: DrainEnd) {
    let reason = match end {
        DrainEnd::Exhausted => "exhausted",
        DrainEnd::Cancelled => {
            tracing::event!(
                tracing::Level::DEBUG,
                event = "stagepipe.cancelled",
                stage = DRAIN_STAGE,
                where_ = "drain",
                "stagepipe.cancelled"
            );
            "cancelled"
        }
        DrainEnd::DownstreamClosed => {
            tracing::event!(
                tracing::Level::INFO,
                event = "stagepipe.downstream.closed",
                stage = DRAIN_STAGE,
                "stagepipe.downstream.closed"
            );
            "downstream_closed"
        }
    };
    tracing::event!(
        tracing::Level::DEBUG,
        event = "stagepipe.drain.finished",
        forwarded = forwarded,
        reason = reason,
        "stagepipe.drain.finished"
    );
}

#[cfg(not(feature = "tracing"))]
fn finished(_forwarded: u64, _end: DrainEnd) {}
