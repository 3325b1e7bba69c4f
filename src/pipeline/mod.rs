//! Closable multi-stage worker pipeline.
//!
//! Items flow through a chain of stages. Each stage has one or more worker
//! threads reading a shared closable queue and writing the next stage's queue;
//! the last stage writes a plain sink.
//!
//! # Architecture
//!
//! ```text
//! driver ──► [q0] ──► download ──► [q1] ──► resize ──► [q2] ──► upload ──► sink
//! ```
//!
//! # Design
//!
//! - **Tagged sentinel**: queues carry `ChannelMsg::Data(T)` or
//!   `ChannelMsg::Shutdown`; no item value is reserved.
//! - **Drain accounting**: `join` waits for every message, sentinel included,
//!   to be marked done.
//! - **Ordered teardown**: the driver closes and drains queue `k` before it
//!   closes queue `k + 1`.
//! - **One sentinel per consumer**: fan-out stages are closed once per worker.
//! - **Explicit faults**: stage errors and panics reach the driver; under
//!   `FaultPolicy::Abort` a shared `CancelToken` force-shuts every queue.

pub mod cancel;
pub mod error;
pub mod executor;
pub mod id;
pub mod message;
pub mod queue;
pub mod sink;
pub mod stage;
pub mod stages;
pub mod worker;

pub use cancel::CancelToken;
pub use error::{PipelineError, PipelineResult, StageError, StageResult};
pub use executor::{new_pipeline, Pipeline, PipelineBuilder, PipelineReport, Submitter};
pub use id::{StageId, WorkerId};
pub use message::ChannelMsg;
pub use queue::{ClosableQueue, Consume, QueueState};
pub use sink::{Outlet, SinkQueue};
pub use stage::{filter_map, map, try_filter_map, FnStage, SharedStage, Stage, TryFnStage};
pub use stages::BuiltinStage;
pub use worker::{FaultPolicy, StageFault, Worker, WorkerExit, WorkerHandle, WorkerReport};
