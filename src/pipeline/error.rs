//! Pipeline-specific error types.

use crate::pipeline::id::{StageId, WorkerId};
use thiserror::Error;

/// Errors that can occur within the pipeline system.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PipelineError {
    #[error("Invalid stage: {0}")]
    InvalidStage(String),

    #[error("Stage {stage} ('{name}') worker {worker} failed: {message}")]
    StageFailed {
        stage: StageId,
        name: String,
        worker: WorkerId,
        message: String,
    },

    #[error("Queue for stage {stage} did not drain within {timeout_ms} ms")]
    DrainTimeout { stage: StageId, timeout_ms: u64 },

    #[error("Queue is full")]
    QueueFull,

    #[error("task_done() called more times than messages were enqueued")]
    TaskDoneOverflow,

    #[error("Pipeline was cancelled")]
    Cancelled,

    #[error("Pipeline already started")]
    AlreadyStarted,

    #[error("Failed to spawn worker thread: {0}")]
    Spawn(String),

    #[error("Channel send error")]
    ChannelSend,

    #[error("Channel receive error")]
    ChannelRecv,
}

pub type PipelineResult<T> = std::result::Result<T, PipelineError>;

/// A fault raised by a stage transform while processing one item.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StageError {
    #[error("{0}")]
    Failed(String),

    #[error("panicked: {0}")]
    Panicked(String),
}

impl StageError {
    pub fn failed(message: impl Into<String>) -> Self {
        StageError::Failed(message.into())
    }
}

pub type StageResult<T> = std::result::Result<T, StageError>;
