use std::future::Future;
use std::marker::PhantomData;

use crate::error::{Error, Result};
use crate::pipeline::adapters::{FilterStage, InspectStage, MapStage};
use crate::pipeline::adapters_try::TryMapStage;
use crate::pipeline::retry::{ErrorAction, RetryPolicy};
use crate::pipeline::stage::{BoxStage, Sequence, Stage, StageContext};

/// `a` followed by `b`, where `M` is the item type between them.
pub struct Chain<A, B, M> {
    a: A,
    b: B,
    _m: PhantomData<fn() -> M>,
}

impl<A, B, M> Chain<A, B, M> {
    pub fn new(a: A, b: B) -> Self {
        Self {
            a,
            b,
            _m: PhantomData,
        }
    }
}

impl<I, M, O, A, B> Stage<I, O> for Chain<A, B, M>
where
    I: Send + 'static,
    M: Send + 'static,
    O: Send + 'static,
    A: Stage<I, M>,
    B: Stage<M, O>,
{
    fn stage_name(&self) -> &'static str {
        "chain"
    }

    fn apply(self: Box<Self>, input: Sequence<I>, cx: &StageContext) -> Sequence<O> {
        let Self { a, b, .. } = *self;
        let mid = Box::new(a).apply(input, cx);
        Box::new(b).apply(mid, cx)
    }
}

impl<A, F, M> Chain<A, TryMapStage<F>, M> {
    /// See [`TryMapStage::with_retry`].
    pub fn with_retry(self, policy: RetryPolicy) -> Self {
        Self::new(self.a, self.b.with_retry(policy))
    }

    /// See [`TryMapStage::on_error`].
    pub fn on_error<H>(self, handler: H) -> Self
    where
        H: Fn(&Error) -> ErrorAction + Send + Sync + 'static,
    {
        Self::new(self.a, self.b.on_error(handler))
    }
}

pub trait StageExt<I, O>: Stage<I, O> + Sized
where
    I: Send + 'static,
    O: Send + 'static,
{
    fn then<N, S>(self, next: S) -> Chain<Self, S, O>
    where
        N: Send + 'static,
        S: Stage<O, N>,
    {
        Chain::new(self, next)
    }

    fn map<N, F>(self, stage: &'static str, f: F) -> Chain<Self, MapStage<F>, O>
    where
        N: Send + 'static,
        F: FnMut(O) -> N + Send + 'static,
    {
        Chain::new(self, MapStage::new(stage, f))
    }

    fn filter<F>(self, stage: &'static str, pred: F) -> Chain<Self, FilterStage<F>, O>
    where
        F: FnMut(&O) -> bool + Send + 'static,
    {
        Chain::new(self, FilterStage::new(stage, pred))
    }

    fn inspect<F>(self, stage: &'static str, f: F) -> Chain<Self, InspectStage<F>, O>
    where
        F: FnMut(&O) + Send + 'static,
    {
        Chain::new(self, InspectStage::new(stage, f))
    }

    fn try_map<N, F, Fut>(self, stage: &'static str, f: F) -> Chain<Self, TryMapStage<F>, O>
    where
        N: Send + 'static,
        O: Clone,
        F: Fn(O) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<N>> + Send + 'static,
    {
        Chain::new(self, TryMapStage::new(stage, f))
    }

    fn boxed(self) -> BoxStage<I, O> {
        Box::new(self)
    }
}

impl<I, O, S> StageExt<I, O> for S
where
    I: Send + 'static,
    O: Send + 'static,
    S: Stage<I, O>,
{
}
