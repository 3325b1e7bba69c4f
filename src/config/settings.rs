//! Settings sections of a pipeline configuration file
//!
//! # Main Types
//!
//! - [`PipelineSettings`] - Item count, queue capacity, fault policy, timeouts
//! - [`StageConfig`] - One stage: name, worker count and built-in kind
//! - [`StageKind`] - Which built-in transform a stage runs
//! - [`LoggingConfig`] - Log filter and optional log file
//!
//! # Example
//!
//! ```toml
//! [pipeline]
//! items = 100
//! capacity = 16
//! fault_policy = "isolate"
//!
//! [[stages]]
//! name = "download"
//! workers = 2
//! kind = { type = "delay", millis = 100 }
//! ```

use crate::pipeline::FaultPolicy;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Default number of items the demo driver submits
pub const DEFAULT_ITEM_COUNT: u64 = 100;

/// Default simulated latency for the demo's download and resize stages
pub const DEFAULT_STAGE_LATENCY_MS: u64 = 100;

/// Default log filter when `RUST_LOG` is not set
pub const DEFAULT_LOG_FILTER: &str = "info,closable_pipeline=debug";

/// Pipeline-wide settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineSettings {
    /// Number of items to feed (the driver submits `1..=items`)
    #[serde(default = "default_item_count")]
    pub items: u64,

    /// Capacity of each stage queue; 0 means unbounded
    #[serde(default)]
    pub capacity: usize,

    /// What a worker does when its stage faults
    #[serde(default)]
    pub fault_policy: FaultPolicy,

    /// Upper bound on each drain wait during shutdown
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub drain_timeout_ms: Option<u64>,

    /// Where to write a JSON run summary
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report_path: Option<PathBuf>,
}

fn default_item_count() -> u64 {
    DEFAULT_ITEM_COUNT
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            items: DEFAULT_ITEM_COUNT,
            capacity: 0,
            fault_policy: FaultPolicy::default(),
            drain_timeout_ms: None,
            report_path: None,
        }
    }
}

impl PipelineSettings {
    pub fn drain_timeout(&self) -> Option<Duration> {
        self.drain_timeout_ms.map(Duration::from_millis)
    }
}

/// Built-in transform a stage runs
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StageKind {
    /// Forward every item unchanged
    #[default]
    Identity,
    /// Sleep for a fixed time per item, then forward it
    Delay { millis: u64 },
    /// Log every item, then forward it
    Trace,
    /// Drop every n-th item
    DropEvery { n: u64 },
    /// Fault on every n-th item
    FailEvery { n: u64 },
}

/// One stage of the pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageConfig {
    /// Stage name (used in logs and worker thread names)
    pub name: String,

    /// Number of worker threads sharing the stage's input queue
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Transform to run
    #[serde(default)]
    pub kind: StageKind,
}

fn default_workers() -> usize {
    1
}

impl StageConfig {
    pub fn new(name: impl Into<String>, kind: StageKind) -> Self {
        Self {
            name: name.into(),
            workers: 1,
            kind,
        }
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }
}

/// Logging configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,

    /// Also write logs to this file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
}

impl LoggingConfig {
    pub fn filter_or_default(&self) -> &str {
        self.filter.as_deref().unwrap_or(DEFAULT_LOG_FILTER)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_kind_toml_forms() {
        #[derive(Deserialize)]
        struct Wrapper {
            kind: StageKind,
        }

        let delay: Wrapper = toml::from_str(r#"kind = { type = "delay", millis = 25 }"#).unwrap();
        assert_eq!(delay.kind, StageKind::Delay { millis: 25 });

        let identity: Wrapper = toml::from_str(r#"kind = { type = "identity" }"#).unwrap();
        assert_eq!(identity.kind, StageKind::Identity);

        let drop: Wrapper = toml::from_str(r#"kind = { type = "drop_every", n = 3 }"#).unwrap();
        assert_eq!(drop.kind, StageKind::DropEvery { n: 3 });
    }

    #[test]
    fn test_stage_config_defaults() {
        let stage: StageConfig = toml::from_str(r#"name = "upload""#).unwrap();
        assert_eq!(stage.workers, 1);
        assert_eq!(stage.kind, StageKind::Identity);
    }

    #[test]
    fn test_pipeline_settings_defaults() {
        let settings: PipelineSettings = toml::from_str("").unwrap();
        assert_eq!(settings.items, DEFAULT_ITEM_COUNT);
        assert_eq!(settings.capacity, 0);
        assert_eq!(settings.fault_policy, FaultPolicy::Abort);
        assert_eq!(settings.drain_timeout(), None);
    }

    #[test]
    fn test_fault_policy_names() {
        let settings: PipelineSettings =
            toml::from_str(r#"fault_policy = "isolate""#).unwrap();
        assert_eq!(settings.fault_policy, FaultPolicy::Isolate);
    }

    #[test]
    fn test_logging_filter_default() {
        assert_eq!(LoggingConfig::default().filter_or_default(), DEFAULT_LOG_FILTER);
    }
}
