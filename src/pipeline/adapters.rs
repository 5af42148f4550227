use std::future::{ready, Future};

use futures::stream::{FuturesOrdered, StreamExt};

use crate::pipeline::send::{send_or_cancel, Delivery};
use crate::pipeline::stage::{Sequence, Stage, StageContext};

/// What one unit of stage work produced.
pub(crate) enum Step<O> {
    Emit(O),
    Skip,
    /// Emit the value, if any, then close the stage's output.
    Finish(Option<O>),
}

/// Spawns the task behind a per-item stage.
///
/// Up to `concurrency_for(stage)` calls of `f` are in flight at once inside
/// the single stage task; results are emitted in input order.
pub(crate) fn spawn_ordered<I, O, F, Fut>(
    cx: &StageContext,
    stage: &'static str,
    mut input: Sequence<I>,
    mut f: F,
) -> Sequence<O>
where
    I: Send + 'static,
    O: Send + 'static,
    F: FnMut(I) -> Fut + Send + 'static,
    Fut: Future<Output = Step<O>> + Send + 'static,
{
    let (output, rx) = cx.channel::<O>(stage);
    let workers = cx.concurrency_for(stage);
    let cancel = cx.cancel().clone();

    cx.spawn(stage, async move {
        let mut in_flight = FuturesOrdered::new();
        let mut exhausted = false;

        loop {
            if exhausted && in_flight.is_empty() {
                break;
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    #[cfg(feature = "tracing")]
                    tracing::event!(
                        tracing::Level::DEBUG,
                        event = "stagepipe.cancelled",
                        stage = stage,
                        where_ = "recv",
                        "stagepipe.cancelled"
                    );
                    break;
                }
                Some(step) = in_flight.next(), if !in_flight.is_empty() => {
                    let (value, last) = match step {
                        Step::Emit(v) => (Some(v), false),
                        Step::Skip => (None, false),
                        Step::Finish(v) => (v, true),
                    };

                    if let Some(v) = value {
                        match send_or_cancel(&output, v, &cancel).await {
                            Delivery::Sent => {}
                            Delivery::Cancelled => {
                                #[cfg(feature = "tracing")]
                                tracing::event!(
                                    tracing::Level::DEBUG,
                                    event = "stagepipe.cancelled",
                                    stage = stage,
                                    where_ = "send",
                                    "stagepipe.cancelled"
                                );
                                break;
                            }
                            Delivery::Closed => {
                                #[cfg(feature = "tracing")]
                                tracing::event!(
                                    tracing::Level::INFO,
                                    event = "stagepipe.downstream.closed",
                                    stage = stage,
                                    "stagepipe.downstream.closed"
                                );
                                break;
                            }
                        }
                    }
                    if last {
                        break;
                    }
                }
                msg = input.recv(), if !exhausted && in_flight.len() < workers => {
                    match msg {
                        Some(item) => in_flight.push_back(f(item)),
                        None => exhausted = true,
                    }
                }
            }
        }
    });

    rx
}

/// map: I -> N
pub struct MapStage<F> {
    stage: &'static str,
    f: F,
}

impl<F> MapStage<F> {
    pub fn new(stage: &'static str, f: F) -> Self {
        Self { stage, f }
    }
}

impl<I, N, F> Stage<I, N> for MapStage<F>
where
    I: Send + 'static,
    N: Send + 'static,
    F: FnMut(I) -> N + Send + 'static,
{
    fn stage_name(&self) -> &'static str {
        self.stage
    }

    fn apply(self: Box<Self>, input: Sequence<I>, cx: &StageContext) -> Sequence<N> {
        let Self { stage, mut f } = *self;
        spawn_ordered(cx, stage, input, move |item| ready(Step::Emit(f(item))))
    }
}

pub struct FilterStage<P> {
    stage: &'static str,
    pred: P,
}

impl<P> FilterStage<P> {
    pub fn new(stage: &'static str, pred: P) -> Self {
        Self { stage, pred }
    }
}

impl<T, P> Stage<T, T> for FilterStage<P>
where
    T: Send + 'static,
    P: FnMut(&T) -> bool + Send + 'static,
{
    fn stage_name(&self) -> &'static str {
        self.stage
    }

    fn apply(self: Box<Self>, input: Sequence<T>, cx: &StageContext) -> Sequence<T> {
        let Self { stage, mut pred } = *self;
        spawn_ordered(cx, stage, input, move |item| {
            ready(if pred(&item) {
                Step::Emit(item)
            } else {
                Step::Skip
            })
        })
    }
}

pub struct InspectStage<F> {
    stage: &'static str,
    f: F,
}

impl<F> InspectStage<F> {
    pub fn new(stage: &'static str, f: F) -> Self {
        Self { stage, f }
    }
}

impl<T, F> Stage<T, T> for InspectStage<F>
where
    T: Send + 'static,
    F: FnMut(&T) + Send + 'static,
{
    fn stage_name(&self) -> &'static str {
        self.stage
    }

    fn apply(self: Box<Self>, input: Sequence<T>, cx: &StageContext) -> Sequence<T> {
        let Self { stage, mut f } = *self;
        spawn_ordered(cx, stage, input, move |item| {
            f(&item);
            ready(Step::Emit(item))
        })
    }
}

/// Forwards every item unchanged.
pub struct Identity;

impl<T: Send + 'static> Stage<T, T> for Identity {
    fn stage_name(&self) -> &'static str {
        "identity"
    }

    fn apply(self: Box<Self>, input: Sequence<T>, cx: &StageContext) -> Sequence<T> {
        spawn_ordered(cx, "identity", input, |item| ready(Step::Emit(item)))
    }
}

pub fn map<I, N, F>(stage: &'static str, f: F) -> MapStage<F>
where
    F: FnMut(I) -> N + Send + 'static,
{
    MapStage::new(stage, f)
}

pub fn filter<T, P>(stage: &'static str, pred: P) -> FilterStage<P>
where
    P: FnMut(&T) -> bool + Send + 'static,
{
    FilterStage::new(stage, pred)
}

pub fn inspect<T, F>(stage: &'static str, f: F) -> InspectStage<F>
where
    F: FnMut(&T) + Send + 'static,
{
    InspectStage::new(stage, f)
}
