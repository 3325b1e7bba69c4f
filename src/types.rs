//! Core data types for run accounting.
//!
//! # Main Types
//!
//! - [`StageCounters`] - Atomic counters shared by every worker of a stage
//! - [`StageStats`] - Point-in-time snapshot of one stage's counters
//! - [`RunSummary`] - Serializable summary of a completed pipeline run

use crate::pipeline::id::StageId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Per-stage counters. Held behind an `Arc` and updated by all workers of
/// the stage; every update is a single atomic increment.
#[derive(Debug, Default)]
pub struct StageCounters {
    received: AtomicU64,
    forwarded: AtomicU64,
    dropped: AtomicU64,
    failed: AtomicU64,
}

impl StageCounters {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn add_received(&self) {
        self.received.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn add_forwarded(&self) {
        self.forwarded.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn add_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn add_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn received(&self) -> u64 {
        self.received.load(Ordering::Relaxed)
    }

    pub fn forwarded(&self) -> u64 {
        self.forwarded.load(Ordering::Relaxed)
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self, stage: StageId, name: &str, workers: usize) -> StageStats {
        StageStats {
            stage,
            name: name.to_string(),
            workers,
            received: self.received(),
            forwarded: self.forwarded(),
            dropped: self.dropped(),
            failed: self.failed(),
        }
    }
}

/// Snapshot of one stage after a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageStats {
    pub stage: StageId,
    pub name: String,
    pub workers: usize,
    /// Items taken off the input queue
    pub received: u64,
    /// Items put on the output queue
    pub forwarded: u64,
    /// Items the transform chose not to forward
    pub dropped: u64,
    /// Items whose transform faulted
    pub failed: u64,
}

impl StageStats {
    /// Items the stage has not yet accounted for (non-zero only after an abort).
    pub fn unaccounted(&self) -> u64 {
        self.received
            .saturating_sub(self.forwarded + self.dropped + self.failed)
    }
}

/// Summary of a completed run, suitable for writing to a report file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub submitted: u64,
    pub collected: u64,
    pub stages: Vec<StageStats>,
}

impl RunSummary {
    pub fn elapsed(&self) -> Duration {
        (self.finished_at - self.started_at)
            .to_std()
            .unwrap_or(Duration::ZERO)
    }

    pub fn total_dropped(&self) -> u64 {
        self.stages.iter().map(|s| s.dropped).sum()
    }

    pub fn total_failed(&self) -> u64 {
        self.stages.iter().map(|s| s.failed).sum()
    }

    /// Items per second through the whole pipeline.
    pub fn throughput(&self) -> f64 {
        let secs = self.elapsed().as_secs_f64();
        if secs == 0.0 {
            0.0
        } else {
            self.collected as f64 / secs
        }
    }
}
