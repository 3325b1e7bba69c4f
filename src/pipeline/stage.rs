//! Stage abstraction for the pipeline.
//!
//! Two-layer design, as with the built-in stages:
//! - **`Stage` trait**: any transform `T -> Option<T>` that may fail.
//!   Returning `Ok(None)` drops the item.
//! - **`BuiltinStage` enum** (in [`stages`](crate::pipeline::stages)): the
//!   configurable stages, dispatched by `match` instead of a vtable.
//!
//! Stages take `&self` so one instance can serve every worker of a fan-out
//! stage. Stateful stages use atomics or a mutex internally.

use crate::pipeline::error::StageResult;
use crate::pipeline::id::WorkerId;
use std::marker::PhantomData;
use std::sync::Arc;

/// One transform step of a pipeline.
pub trait Stage<T>: Send + Sync {
    /// Transform one item. `Ok(None)` drops it; `Err` is a stage fault.
    fn process(&self, item: T) -> StageResult<Option<T>>;

    /// Called on the worker thread before it consumes its first item.
    fn on_start(&self, _worker: WorkerId) {}

    /// Called on the worker thread after its input sequence ends.
    fn on_stop(&self, _worker: WorkerId) {}
}

/// Stage shared between the workers of one stage group.
pub type SharedStage<T> = Arc<dyn Stage<T>>;

impl<T, S> Stage<T> for Arc<S>
where
    S: Stage<T> + ?Sized,
{
    fn process(&self, item: T) -> StageResult<Option<T>> {
        (**self).process(item)
    }

    fn on_start(&self, worker: WorkerId) {
        (**self).on_start(worker)
    }

    fn on_stop(&self, worker: WorkerId) {
        (**self).on_stop(worker)
    }
}

/// Infallible closure stage.
pub struct FnStage<T, F> {
    f: F,
    _item: PhantomData<fn(T) -> T>,
}

impl<T, F> FnStage<T, F>
where
    F: Fn(T) -> Option<T> + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self {
            f,
            _item: PhantomData,
        }
    }
}

impl<T, F> Stage<T> for FnStage<T, F>
where
    F: Fn(T) -> Option<T> + Send + Sync,
{
    fn process(&self, item: T) -> StageResult<Option<T>> {
        Ok((self.f)(item))
    }
}

/// Fallible closure stage.
pub struct TryFnStage<T, F> {
    f: F,
    _item: PhantomData<fn(T) -> T>,
}

impl<T, F> TryFnStage<T, F>
where
    F: Fn(T) -> StageResult<Option<T>> + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self {
            f,
            _item: PhantomData,
        }
    }
}

impl<T, F> Stage<T> for TryFnStage<T, F>
where
    F: Fn(T) -> StageResult<Option<T>> + Send + Sync,
{
    fn process(&self, item: T) -> StageResult<Option<T>> {
        (self.f)(item)
    }
}

/// Wrap a closure returning `Option<T>` as a shared stage.
pub fn filter_map<T, F>(f: F) -> SharedStage<T>
where
    T: 'static,
    F: Fn(T) -> Option<T> + Send + Sync + 'static,
{
    Arc::new(FnStage::new(f))
}

/// Wrap a closure that always forwards its result.
pub fn map<T, F>(f: F) -> SharedStage<T>
where
    T: 'static,
    F: Fn(T) -> T + Send + Sync + 'static,
{
    Arc::new(FnStage::new(move |item| Some(f(item))))
}

/// Wrap a fallible closure as a shared stage.
pub fn try_filter_map<T, F>(f: F) -> SharedStage<T>
where
    T: 'static,
    F: Fn(T) -> StageResult<Option<T>> + Send + Sync + 'static,
{
    Arc::new(TryFnStage::new(f))
}
