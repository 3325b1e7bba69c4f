//! Pipeline driver: construction, feeding and ordered shutdown.
//!
//! Stage `k` reads queue `k` and writes queue `k + 1`; the last stage writes
//! the sink. Shutdown walks the chain upstream to downstream:
//!
//! ```text
//! close(q0) × workers(0); join(q0)
//! close(q1) × workers(1); join(q1)
//! ...
//! ```
//!
//! `join(qk)` only returns once every item of `qk` has been processed and
//! forwarded into `qk+1`, so the sentinel for `qk+1` is always enqueued
//! behind the last item that stage will ever receive.

use crate::config::AppConfig;
use crate::pipeline::cancel::CancelToken;
use crate::pipeline::error::{PipelineError, PipelineResult};
use crate::pipeline::id::{StageId, WorkerId};
use crate::pipeline::queue::{ClosableQueue, QueueState};
use crate::pipeline::sink::{Outlet, SinkQueue};
use crate::pipeline::stage::{self, SharedStage, Stage};
use crate::pipeline::stages::{BuiltinStage, Filter};
use crate::pipeline::worker::{FaultPolicy, Worker, WorkerExit, WorkerHandle, WorkerReport};
use crate::types::{RunSummary, StageCounters, StageStats};
use chrono::Utc;
use std::fmt::Debug;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

struct StagePlan<T> {
    name: String,
    workers: usize,
    transform: SharedStage<T>,
}

/// Builder for a [`Pipeline`].
pub struct PipelineBuilder<T> {
    stages: Vec<StagePlan<T>>,
    capacity: usize,
    policy: FaultPolicy,
    drain_timeout: Option<Duration>,
}

impl<T: Send + 'static> PipelineBuilder<T> {
    pub fn new() -> Self {
        Self {
            stages: Vec::new(),
            capacity: 0,
            policy: FaultPolicy::default(),
            drain_timeout: None,
        }
    }

    /// Capacity of every stage queue. `0` means unbounded.
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn fault_policy(mut self, policy: FaultPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Bound each drain wait during shutdown.
    pub fn drain_timeout(mut self, timeout: Duration) -> Self {
        self.drain_timeout = Some(timeout);
        self
    }

    /// Append a stage with one worker.
    pub fn stage<S>(self, name: impl Into<String>, stage: S) -> Self
    where
        S: Stage<T> + 'static,
    {
        self.stage_with_workers(name, 1, stage)
    }

    /// Append a fan-out stage: `workers` threads share one input queue.
    pub fn stage_with_workers<S>(self, name: impl Into<String>, workers: usize, stage: S) -> Self
    where
        S: Stage<T> + 'static,
    {
        self.shared_stage(name, workers, Arc::new(stage))
    }

    pub fn shared_stage(
        mut self,
        name: impl Into<String>,
        workers: usize,
        transform: SharedStage<T>,
    ) -> Self {
        self.stages.push(StagePlan {
            name: name.into(),
            workers,
            transform,
        });
        self
    }

    /// Append a closure stage that always forwards.
    pub fn map<F>(self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(T) -> T + Send + Sync + 'static,
    {
        self.shared_stage(name, 1, stage::map(f))
    }

    /// Append a closure stage; returning `None` drops the item.
    pub fn filter_map<F>(self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(T) -> Option<T> + Send + Sync + 'static,
    {
        self.shared_stage(name, 1, stage::filter_map(f))
    }

    /// Append a predicate stage; items failing `predicate` are dropped.
    pub fn filter<P>(self, name: impl Into<String>, predicate: P) -> Self
    where
        P: Fn(&T) -> bool + Send + Sync + 'static,
    {
        self.stage(name, Filter::new(predicate))
    }

    /// Create queues and workers. Nothing runs until the pipeline starts.
    pub fn build(self) -> PipelineResult<Pipeline<T>> {
        if self.stages.is_empty() {
            return Err(PipelineError::InvalidStage(
                "pipeline needs at least one stage".to_string(),
            ));
        }
        if let Some(plan) = self.stages.iter().find(|s| s.workers == 0) {
            return Err(PipelineError::InvalidStage(format!(
                "stage '{}' has no workers",
                plan.name
            )));
        }

        let cancel = CancelToken::new();
        let sink = SinkQueue::new();
        let queues: Vec<ClosableQueue<T>> = self
            .stages
            .iter()
            .map(|_| ClosableQueue::with_token(self.capacity, cancel.clone()))
            .collect();

        let mut stages = Vec::with_capacity(self.stages.len());
        let mut workers = Vec::new();

        for (idx, plan) in self.stages.into_iter().enumerate() {
            let id = StageId(idx as u32);
            let counters = Arc::new(StageCounters::new());
            let output: Arc<dyn Outlet<T>> = match queues.get(idx + 1) {
                Some(next) => Arc::new(next.clone()),
                None => Arc::new(sink.clone()),
            };

            for w in 0..plan.workers {
                workers.push(Worker::new(
                    id,
                    WorkerId(w as u32),
                    plan.name.clone(),
                    Arc::clone(&plan.transform),
                    queues[idx].clone(),
                    Arc::clone(&output),
                    Arc::clone(&counters),
                    self.policy,
                ));
            }

            stages.push(StageRuntime {
                id,
                name: plan.name,
                workers: plan.workers,
                input: queues[idx].clone(),
                counters,
            });
        }

        Ok(Pipeline {
            stages,
            pending: workers,
            handles: Vec::new(),
            sink,
            cancel,
            drain_timeout: self.drain_timeout,
            submitted: Arc::new(AtomicU64::new(0)),
            started_at: None,
        })
    }
}

impl<T: Debug + Send + 'static> PipelineBuilder<T> {
    /// Builder for the stages and settings described by a config file.
    pub fn from_config(config: &AppConfig) -> Self {
        let mut builder = Self::new()
            .capacity(config.pipeline.capacity)
            .fault_policy(config.pipeline.fault_policy);
        if let Some(timeout) = config.pipeline.drain_timeout() {
            builder = builder.drain_timeout(timeout);
        }
        for stage in &config.stages {
            let transform = BuiltinStage::from_config(&stage.name, &stage.kind);
            builder = builder.stage_with_workers(stage.name.clone(), stage.workers, transform);
        }
        builder
    }
}

impl<T: Send + 'static> Default for PipelineBuilder<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// One-worker-per-stage pipeline over the given transforms.
pub fn new_pipeline<T: Send + 'static>(stages: Vec<SharedStage<T>>) -> PipelineResult<Pipeline<T>> {
    stages
        .into_iter()
        .enumerate()
        .fold(PipelineBuilder::new(), |builder, (idx, transform)| {
            builder.shared_stage(format!("stage-{}", idx), 1, transform)
        })
        .build()
}

struct StageRuntime<T> {
    id: StageId,
    name: String,
    workers: usize,
    input: ClosableQueue<T>,
    counters: Arc<StageCounters>,
}

/// Result of a completed run.
#[derive(Debug)]
pub struct PipelineReport<T> {
    /// Sink contents in arrival order.
    pub items: Vec<T>,
    pub workers: Vec<WorkerReport>,
    pub summary: RunSummary,
}

impl<T> PipelineReport<T> {
    pub fn count(&self) -> usize {
        self.items.len()
    }

    pub fn stages(&self) -> &[StageStats] {
        &self.summary.stages
    }
}

/// Cloneable handle for feeding the first queue from several threads.
pub struct Submitter<T> {
    queue: ClosableQueue<T>,
    submitted: Arc<AtomicU64>,
}

impl<T> Clone for Submitter<T> {
    fn clone(&self) -> Self {
        Self {
            queue: self.queue.clone(),
            submitted: Arc::clone(&self.submitted),
        }
    }
}

impl<T: Send> Submitter<T> {
    pub fn submit(&self, item: T) -> PipelineResult<()> {
        self.queue.put(item)?;
        self.submitted.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

/// A chain of worker stages ending in a sink.
pub struct Pipeline<T> {
    stages: Vec<StageRuntime<T>>,
    /// Workers created but not yet started.
    pending: Vec<Worker<T>>,
    handles: Vec<WorkerHandle>,
    sink: SinkQueue<T>,
    cancel: CancelToken,
    drain_timeout: Option<Duration>,
    submitted: Arc<AtomicU64>,
    started_at: Option<chrono::DateTime<Utc>>,
}

impl<T: Send + 'static> Pipeline<T> {
    pub fn builder() -> PipelineBuilder<T> {
        PipelineBuilder::new()
    }

    /// Start every worker. A pipeline starts once.
    pub fn start(&mut self) -> PipelineResult<()> {
        if self.started_at.is_some() {
            return Err(PipelineError::AlreadyStarted);
        }
        self.started_at = Some(Utc::now());

        tracing::info!(
            "Starting pipeline: {} stages, {} workers",
            self.stages.len(),
            self.pending.len()
        );

        for worker in std::mem::take(&mut self.pending) {
            match worker.spawn() {
                Ok(handle) => self.handles.push(handle),
                Err(e) => {
                    tracing::error!("Failed to start pipeline: {}", e);
                    self.cancel.cancel();
                    for handle in self.handles.drain(..) {
                        handle.join();
                    }
                    return Err(e);
                }
            }
        }
        Ok(())
    }

    pub fn is_started(&self) -> bool {
        self.started_at.is_some()
    }

    fn ensure_started(&mut self) -> PipelineResult<()> {
        if self.is_started() {
            Ok(())
        } else {
            self.start()
        }
    }

    /// Feed one item into the first queue, starting the pipeline if needed.
    pub fn submit(&mut self, item: T) -> PipelineResult<()> {
        self.ensure_started()?;
        self.stages[0].input.put(item)?;
        self.submitted.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Handle that other producer threads can use to feed the pipeline.
    ///
    /// All producers must have finished before `run_to_completion`.
    pub fn submitter(&mut self) -> PipelineResult<Submitter<T>> {
        self.ensure_started()?;
        Ok(Submitter {
            queue: self.stages[0].input.clone(),
            submitted: Arc::clone(&self.submitted),
        })
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    /// State of the queue feeding `stage`.
    pub fn queue_state(&self, stage: StageId) -> Option<QueueState> {
        self.stages.get(stage.index()).map(|s| s.input.state())
    }

    /// Ordered shutdown, then collect the sink and every worker's report.
    pub fn run_to_completion(mut self) -> PipelineResult<PipelineReport<T>> {
        self.ensure_started()?;
        let shutdown = self.shutdown();

        if let Err(PipelineError::DrainTimeout { stage, timeout_ms }) = shutdown {
            // Workers notice the cancellation once their current item returns.
            tracing::warn!("{} failed to drain in {} ms", stage, timeout_ms);
            for handle in self.handles.drain(..).filter(|h| !h.is_finished()) {
                tracing::warn!(
                    "Abandoning worker {} of stage '{}'",
                    handle.worker(),
                    handle.name()
                );
            }
            return Err(PipelineError::DrainTimeout { stage, timeout_ms });
        }

        let workers: Vec<WorkerReport> = self.handles.drain(..).map(WorkerHandle::join).collect();

        let fault = workers.iter().find_map(|report| match &report.exit {
            WorkerExit::Faulted(fault) => Some(fault.clone()),
            _ => None,
        });
        if let Some(fault) = fault {
            return Err(fault.into());
        }
        shutdown?;

        let items = self.sink.drain();
        let summary = RunSummary {
            started_at: self.started_at.unwrap_or_else(Utc::now),
            finished_at: Utc::now(),
            submitted: self.submitted.load(Ordering::Relaxed),
            collected: items.len() as u64,
            stages: self.stage_stats(),
        };

        tracing::info!(
            "Pipeline finished: {} submitted, {} collected in {:?}",
            summary.submitted,
            summary.collected,
            summary.elapsed()
        );

        Ok(PipelineReport {
            items,
            workers,
            summary,
        })
    }

    fn shutdown(&self) -> PipelineResult<()> {
        for stage in &self.stages {
            for _ in 0..stage.workers {
                stage.input.close()?;
            }

            match self.drain_timeout {
                None => stage.input.join()?,
                Some(timeout) => {
                    if !stage.input.join_timeout(timeout)? {
                        self.cancel.cancel();
                        return Err(PipelineError::DrainTimeout {
                            stage: stage.id,
                            timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                        });
                    }
                }
            }

            tracing::info!(
                "Stage '{}' drained: {} received, {} forwarded, {} dropped",
                stage.name,
                stage.counters.received(),
                stage.counters.forwarded(),
                stage.counters.dropped()
            );
        }
        Ok(())
    }

    /// Current per-stage counters.
    pub fn stage_stats(&self) -> Vec<StageStats> {
        self.stages
            .iter()
            .map(|s| s.counters.snapshot(s.id, &s.name, s.workers))
            .collect()
    }
}

impl<T> Drop for Pipeline<T> {
    fn drop(&mut self) {
        if !self.handles.is_empty() {
            tracing::debug!("Pipeline dropped with {} live workers", self.handles.len());
        }
        // Nothing reads the queues any more: release blocked workers and late submitters.
        self.cancel.cancel();
    }
}
