//! # closable-pipeline: Multi-Stage Worker Pipeline
//!
//! Chains worker stages through closable queues. Every stage runs one or more
//! threads that take items from its input queue, transform them and hand them
//! to the next stage. Shutdown is an explicit, ordered drain: a sentinel per
//! consumer closes each queue, and the driver waits until every queued item
//! has been accounted for before closing the next one.
//!
//! ## Architecture
//!
//! - **Queues**: `crossbeam-channel` carries `ChannelMsg` values; a mutex and
//!   condvar track unfinished work for `join`
//! - **Stages**: anything implementing [`pipeline::Stage`], plus closures and
//!   the built-in stages selected from config
//! - **Driver**: [`pipeline::Pipeline`] starts workers, feeds the first queue
//!   and performs the ordered teardown
//! - **Faults**: stage errors and panics surface as [`pipeline::PipelineError`];
//!   a shared [`pipeline::CancelToken`] force-shuts everything on abort
//!
//! ## Configuration
//!
//! The demo binary reads `pipeline.toml` from the platform config directory
//! under `closable-pipeline`, or a path given on the command line.
//!
//! ## Example
//!
//! ```no_run
//! use closable_pipeline::pipeline::{Pipeline, PipelineResult};
//!
//! fn main() -> PipelineResult<()> {
//!     let mut pipeline = Pipeline::<u64>::builder()
//!         .map("download", |x| x)
//!         .map("resize", |x| x)
//!         .map("upload", |x| x)
//!         .build()?;
//!
//!     for i in 1..=100 {
//!         pipeline.submit(i)?;
//!     }
//!
//!     let report = pipeline.run_to_completion()?;
//!     println!("{} pictures finished", report.count());
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod pipeline;
pub mod types;

// Re-export commonly used types
pub use config::{AppConfig, StageConfig, StageKind};
pub use error::{Error, Result};
pub use pipeline::{
    new_pipeline, ClosableQueue, FaultPolicy, Pipeline, PipelineBuilder, PipelineError,
    PipelineReport, Stage,
};
pub use types::{RunSummary, StageStats};
