//! Stage workers.
//!
//! A `Worker` binds one stage transform to one input [`ClosableQueue`] and one
//! [`Outlet`]. It runs on its own named thread, consumes its input until it
//! dequeues a sentinel, and never forwards sentinels downstream: only the
//! driver closes queues.
//!
//! # Faults
//!
//! A transform that returns `Err` or panics is a stage fault. What happens
//! next depends on the [`FaultPolicy`]:
//!
//! - `Abort`: the worker cancels the pipeline token and exits. Every queue
//!   force-shuts, so no other worker or the driver can hang.
//! - `Isolate`: the item is counted as failed and the worker moves on.

use crate::pipeline::cancel::CancelToken;
use crate::pipeline::error::{PipelineError, PipelineResult, StageError, StageResult};
use crate::pipeline::id::{StageId, WorkerId};
use crate::pipeline::queue::ClosableQueue;
use crate::pipeline::sink::Outlet;
use crate::pipeline::stage::{SharedStage, Stage};
use crate::types::StageCounters;
use serde::{Deserialize, Serialize};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

/// What a worker does when its transform faults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultPolicy {
    /// Cancel the whole pipeline and report the fault.
    #[default]
    Abort,
    /// Drop the faulting item and keep going.
    Isolate,
}

/// A fault that stopped a worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageFault {
    pub stage: StageId,
    pub name: String,
    pub worker: WorkerId,
    pub error: StageError,
}

impl From<StageFault> for PipelineError {
    fn from(fault: StageFault) -> Self {
        PipelineError::StageFailed {
            stage: fault.stage,
            name: fault.name,
            worker: fault.worker,
            message: fault.error.to_string(),
        }
    }
}

/// Why a worker's loop ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerExit {
    /// Dequeued a sentinel.
    Completed,
    /// The pipeline was cancelled (by another worker's fault or a timeout).
    Cancelled,
    /// This worker's transform faulted under `FaultPolicy::Abort`.
    Faulted(StageFault),
}

/// Final account of one worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerReport {
    pub stage: StageId,
    pub worker: WorkerId,
    /// Items this worker took off its input queue.
    pub processed: u64,
    pub exit: WorkerExit,
}

/// A worker that has been created but not started.
pub struct Worker<T> {
    stage: StageId,
    worker: WorkerId,
    name: String,
    transform: SharedStage<T>,
    input: ClosableQueue<T>,
    output: Arc<dyn Outlet<T>>,
    counters: Arc<StageCounters>,
    policy: FaultPolicy,
    cancel: CancelToken,
    /// Items taken off the input so far; readable after a thread panic.
    processed: Arc<AtomicU64>,
}

impl<T: Send + 'static> Worker<T> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        stage: StageId,
        worker: WorkerId,
        name: impl Into<String>,
        transform: SharedStage<T>,
        input: ClosableQueue<T>,
        output: Arc<dyn Outlet<T>>,
        counters: Arc<StageCounters>,
        policy: FaultPolicy,
    ) -> Self {
        let cancel = input.cancel_token().clone();
        Self {
            stage,
            worker,
            name: name.into(),
            transform,
            input,
            output,
            counters,
            policy,
            cancel,
            processed: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Start the worker on a new thread. Consumes the worker: it runs once.
    pub fn spawn(self) -> PipelineResult<WorkerHandle> {
        let stage = self.stage;
        let worker = self.worker;
        let name = self.name.clone();
        let processed = Arc::clone(&self.processed);
        let thread_name = format!("{}-{}", self.name, worker.0);
        let handle = std::thread::Builder::new()
            .name(thread_name)
            .spawn(move || self.run())
            .map_err(|e| PipelineError::Spawn(e.to_string()))?;

        Ok(WorkerHandle {
            stage,
            worker,
            name,
            processed,
            handle,
        })
    }

    /// Run the consume loop on the current thread.
    pub fn run(self) -> WorkerReport {
        tracing::debug!("Worker {} of stage '{}' started", self.worker, self.name);

        // A worker that never starts consuming would leave its queue undrained.
        if let Err(error) = self.hook(|stage, worker| stage.on_start(worker)) {
            let fault = self.fault(error);
            self.abort(&fault);
            return self.report(WorkerExit::Faulted(fault));
        }

        let mut consume = self.input.consume();
        let mut fault = None;

        while let Some(item) = consume.next() {
            self.processed.fetch_add(1, Ordering::Relaxed);
            self.counters.add_received();

            match self.apply(item) {
                Ok(Some(out)) => match self.output.put(out) {
                    Ok(()) => self.counters.add_forwarded(),
                    Err(PipelineError::Cancelled) => break,
                    Err(e) => {
                        fault = Some(self.fault(StageError::Failed(e.to_string())));
                        break;
                    }
                },
                Ok(None) => self.counters.add_dropped(),
                Err(err) => {
                    self.counters.add_failed();
                    match self.policy {
                        FaultPolicy::Isolate => {
                            tracing::warn!(
                                "Stage '{}' worker {} dropped a faulting item: {}",
                                self.name,
                                self.worker,
                                err
                            );
                        }
                        FaultPolicy::Abort => {
                            fault = Some(self.fault(err));
                            break;
                        }
                    }
                }
            }
        }

        let saw_sentinel = consume.saw_sentinel();
        drop(consume);

        if let Some(fault) = &fault {
            self.abort(fault);
        }

        if let Err(error) = self.hook(|stage, worker| stage.on_stop(worker)) {
            match (self.policy, &fault) {
                (FaultPolicy::Abort, None) => {
                    let stop_fault = self.fault(error);
                    self.abort(&stop_fault);
                    fault = Some(stop_fault);
                }
                _ => tracing::warn!(
                    "Stage '{}' worker {} failed in on_stop: {}",
                    self.name,
                    self.worker,
                    error
                ),
            }
        }

        let exit = match fault {
            Some(fault) => WorkerExit::Faulted(fault),
            None if saw_sentinel => WorkerExit::Completed,
            None => WorkerExit::Cancelled,
        };
        self.report(exit)
    }

    fn apply(&self, item: T) -> StageResult<Option<T>> {
        match catch_unwind(AssertUnwindSafe(|| self.transform.process(item))) {
            Ok(result) => result,
            Err(payload) => Err(StageError::Panicked(panic_message(payload.as_ref()))),
        }
    }

    fn hook<F>(&self, call: F) -> StageResult<()>
    where
        F: FnOnce(&dyn Stage<T>, WorkerId),
    {
        catch_unwind(AssertUnwindSafe(|| call(&*self.transform, self.worker)))
            .map_err(|payload| StageError::Panicked(panic_message(payload.as_ref())))
    }

    fn fault(&self, error: StageError) -> StageFault {
        StageFault {
            stage: self.stage,
            name: self.name.clone(),
            worker: self.worker,
            error,
        }
    }

    fn abort(&self, fault: &StageFault) {
        tracing::error!(
            "Stage '{}' worker {} faulted, cancelling pipeline: {}",
            self.name,
            self.worker,
            fault.error
        );
        self.cancel.cancel();
    }

    fn report(&self, exit: WorkerExit) -> WorkerReport {
        let processed = self.processed.load(Ordering::Relaxed);
        tracing::debug!(
            "Worker {} of stage '{}' exiting after {} items ({:?})",
            self.worker,
            self.name,
            processed,
            exit
        );
        WorkerReport {
            stage: self.stage,
            worker: self.worker,
            processed,
            exit,
        }
    }
}

/// A running worker thread.
pub struct WorkerHandle {
    stage: StageId,
    worker: WorkerId,
    name: String,
    processed: Arc<AtomicU64>,
    handle: JoinHandle<WorkerReport>,
}

impl WorkerHandle {
    pub fn worker(&self) -> WorkerId {
        self.worker
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the thread to exit.
    pub fn join(self) -> WorkerReport {
        let WorkerHandle {
            stage,
            worker,
            name,
            processed,
            handle,
        } = self;
        handle.join().unwrap_or_else(|payload| WorkerReport {
            stage,
            worker,
            processed: processed.load(Ordering::Relaxed),
            exit: WorkerExit::Faulted(StageFault {
                stage,
                name,
                worker,
                error: StageError::Panicked(panic_message(payload.as_ref())),
            }),
        })
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
