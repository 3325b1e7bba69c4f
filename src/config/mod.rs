//! Configuration module for closable-pipeline
//!
//! This module handles the pipeline configuration file:
//! - Loading from TOML (primary) or JSON, chosen by file extension
//! - Validation of stage lists and worker counts
//! - The built-in download → resize → upload demo as the default
//!
//! # Config Location
//!
//! Without an explicit path the binary looks for `pipeline.toml` in the
//! platform config directory under `closable-pipeline`:
//! - **Linux**: `~/.config/closable-pipeline/`
//! - **macOS**: `~/Library/Application Support/closable-pipeline/`
//! - **Windows**: `%APPDATA%\closable-pipeline\`
//!
//! # Example
//!
//! ```ignore
//! use closable_pipeline::config::AppConfig;
//!
//! let config = AppConfig::load("pipeline.toml")?;
//! config.validate()?;
//! ```

pub mod settings;

pub use settings::*;

use crate::error::{Error, Result, ResultExt};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Application identifier for config directories
pub const APP_ID: &str = "closable-pipeline";

/// Config filename
pub const CONFIG_FILE: &str = "pipeline.toml";

/// Get the application config directory path
pub fn config_dir() -> Option<PathBuf> {
    dirs_next::config_dir().map(|p| p.join(APP_ID))
}

/// Get the path to the default config file
pub fn default_config_path() -> Option<PathBuf> {
    config_dir().map(|p| p.join(CONFIG_FILE))
}

/// Serialization format of a config file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Toml,
    Json,
}

impl ConfigFormat {
    /// Pick the format from a file extension; anything but `.json` is TOML.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => ConfigFormat::Json,
            _ => ConfigFormat::Toml,
        }
    }
}

/// Complete pipeline configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Pipeline-wide settings
    #[serde(default)]
    pub pipeline: PipelineSettings,

    /// Stages in upstream-to-downstream order
    #[serde(default = "demo_stages")]
    pub stages: Vec<StageConfig>,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

fn demo_stages() -> Vec<StageConfig> {
    vec![
        StageConfig::new(
            "download",
            StageKind::Delay {
                millis: DEFAULT_STAGE_LATENCY_MS,
            },
        ),
        StageConfig::new(
            "resize",
            StageKind::Delay {
                millis: DEFAULT_STAGE_LATENCY_MS,
            },
        ),
        StageConfig::new("upload", StageKind::Trace),
    ]
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            pipeline: PipelineSettings::default(),
            stages: demo_stages(),
            logging: LoggingConfig::default(),
        }
    }
}

impl AppConfig {
    /// Create the default (demo) configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a config file from disk
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(Error::from)
            .with_context(|| format!("Failed to read config {:?}", path))?;
        Self::parse(&content, ConfigFormat::from_path(path))
            .with_context(|| format!("Failed to parse config {:?}", path))
    }

    /// Parse config text in the given format
    pub fn parse(content: &str, format: ConfigFormat) -> Result<Self> {
        match format {
            ConfigFormat::Toml => {
                toml::from_str(content).map_err(|e| Error::Serialization(e.to_string()))
            }
            ConfigFormat::Json => {
                serde_json::from_str(content).map_err(|e| Error::Serialization(e.to_string()))
            }
        }
    }

    /// Load the config at `path`, or the default location, or fall back to the demo.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::load(path);
        }
        match default_config_path() {
            Some(path) if path.exists() => {
                tracing::info!("Loading config from {:?}", path);
                Self::load(&path)
            }
            _ => {
                tracing::info!("No config file found, using built-in demo pipeline");
                Ok(Self::default())
            }
        }
    }

    /// Save config to disk, format chosen by extension
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(Error::from)
                    .context("Failed to create config directory")?;
            }
        }

        let content = match ConfigFormat::from_path(path) {
            ConfigFormat::Toml => {
                toml::to_string_pretty(self).map_err(|e| Error::Serialization(e.to_string()))?
            }
            ConfigFormat::Json => serde_json::to_string_pretty(self)
                .map_err(|e| Error::Serialization(e.to_string()))?,
        };

        std::fs::write(path, content)
            .map_err(Error::from)
            .with_context(|| format!("Failed to write config {:?}", path))
    }

    /// Check that the configuration describes a runnable pipeline
    pub fn validate(&self) -> Result<()> {
        if self.stages.is_empty() {
            return Err(Error::Config("at least one stage is required".to_string()));
        }
        for (idx, stage) in self.stages.iter().enumerate() {
            if stage.name.trim().is_empty() {
                return Err(Error::Config(format!("stage {} has an empty name", idx)));
            }
            if stage.workers == 0 {
                return Err(Error::Config(format!(
                    "stage '{}' must have at least one worker",
                    stage.name
                )));
            }
        }
        if self.pipeline.drain_timeout_ms == Some(0) {
            return Err(Error::Config(
                "drain_timeout_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Total worker threads across all stages
    pub fn total_workers(&self) -> usize {
        self.stages.iter().map(|s| s.workers).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_demo_pipeline() {
        let config = AppConfig::default();
        let names: Vec<_> = config.stages.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, ["download", "resize", "upload"]);
        assert_eq!(config.pipeline.items, 100);
        assert_eq!(config.total_workers(), 3);
        config.validate().unwrap();
    }

    #[test]
    fn test_format_from_path() {
        assert_eq!(ConfigFormat::from_path(Path::new("a.json")), ConfigFormat::Json);
        assert_eq!(ConfigFormat::from_path(Path::new("a.JSON")), ConfigFormat::Json);
        assert_eq!(ConfigFormat::from_path(Path::new("a.toml")), ConfigFormat::Toml);
        assert_eq!(ConfigFormat::from_path(Path::new("pipeline")), ConfigFormat::Toml);
    }

    #[test]
    fn test_parse_toml() {
        let config = AppConfig::parse(
            r#"
            [pipeline]
            items = 10
            capacity = 4
            drain_timeout_ms = 500

            [[stages]]
            name = "fetch"
            workers = 2
            kind = { type = "delay", millis = 5 }

            [[stages]]
            name = "store"
            "#,
            ConfigFormat::Toml,
        )
        .unwrap();
        assert_eq!(config.pipeline.items, 10);
        assert_eq!(config.pipeline.capacity, 4);
        assert_eq!(
            config.pipeline.drain_timeout(),
            Some(std::time::Duration::from_millis(500))
        );
        assert_eq!(config.stages.len(), 2);
        assert_eq!(config.stages[0].workers, 2);
        assert_eq!(config.stages[1].kind, StageKind::Identity);
    }

    #[test]
    fn test_parse_json() {
        let config = AppConfig::parse(
            r#"{"stages": [{"name": "only", "kind": {"type": "trace"}}]}"#,
            ConfigFormat::Json,
        )
        .unwrap();
        assert_eq!(config.stages, vec![StageConfig::new("only", StageKind::Trace)]);
    }

    #[test]
    fn test_missing_stages_defaults_to_demo() {
        let config = AppConfig::parse("[pipeline]\nitems = 3\n", ConfigFormat::Toml).unwrap();
        assert_eq!(config.stages.len(), 3);
    }

    #[test]
    fn test_validate_rejects_bad_stages() {
        let mut config = AppConfig::default();
        config.stages[1].workers = 0;
        assert!(config.validate().unwrap_err().to_string().contains("resize"));

        config.stages.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_timeout() {
        let mut config = AppConfig::default();
        config.pipeline.drain_timeout_ms = Some(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_parse_error_is_serialization() {
        let err = AppConfig::parse("stages = 5", ConfigFormat::Toml).unwrap_err();
        assert!(matches!(err, Error::Serialization(_)));
    }
}
