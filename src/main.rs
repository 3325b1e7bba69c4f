//! closable-pipeline - Main Entry Point
//!
//! Runs the configured pipeline over the items `1..=N` and prints how many
//! reached the end.
//!
//! Usage: `closable-pipeline [CONFIG]`

use anyhow::Context;
use closable_pipeline::{
    config::{AppConfig, LoggingConfig},
    pipeline::PipelineBuilder,
    types::RunSummary,
};
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn main() -> anyhow::Result<()> {
    let config_path = std::env::args_os().nth(1).map(PathBuf::from);

    let config = AppConfig::load_or_default(config_path.as_deref())
        .context("Failed to load pipeline configuration")?;

    // Keep the guard alive so buffered file logs are flushed on exit
    let _log_guard = init_logging(&config.logging)?;

    config.validate().context("Invalid pipeline configuration")?;

    tracing::info!(
        "Running {} items through {} stages ({} workers)",
        config.pipeline.items,
        config.stages.len(),
        config.total_workers()
    );

    let mut pipeline = PipelineBuilder::<u64>::from_config(&config)
        .build()
        .context("Failed to build pipeline")?;

    for item in 1..=config.pipeline.items {
        if let Err(e) = pipeline.submit(item) {
            // A faulted stage cancels the run; the real cause comes from run_to_completion
            tracing::warn!("Stopped feeding at item {}: {}", item, e);
            break;
        }
    }

    let report = pipeline
        .run_to_completion()
        .context("Pipeline run failed")?;

    for stage in report.stages() {
        tracing::debug!(
            "{}: received {}, forwarded {}, dropped {}, failed {}",
            stage.name,
            stage.received,
            stage.forwarded,
            stage.dropped,
            stage.failed
        );
    }

    if let Some(path) = &config.pipeline.report_path {
        write_report(path, &report.summary)?;
        tracing::info!("Wrote run summary to {:?}", path);
    }

    println!("{} pictures finished", report.count());
    Ok(())
}

fn init_logging(logging: &LoggingConfig) -> anyhow::Result<Option<WorkerGuard>> {
    let filter = || {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(logging.filter_or_default()))
    };

    match &logging.file {
        Some(path) => {
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            let file_name = path
                .file_name()
                .with_context(|| format!("Log file path {:?} has no file name", path))?;
            let appender = tracing_appender::rolling::never(dir, file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);

            tracing_subscriber::registry()
                .with(filter())
                .with(tracing_subscriber::fmt::layer())
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_ansi(false)
                        .with_writer(writer),
                )
                .init();
            Ok(Some(guard))
        }
        None => {
            tracing_subscriber::registry()
                .with(filter())
                .with(tracing_subscriber::fmt::layer())
                .init();
            Ok(None)
        }
    }
}

fn write_report(path: &Path, summary: &RunSummary) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(summary).context("Failed to serialize run summary")?;
    std::fs::write(path, json).with_context(|| format!("Failed to write report {:?}", path))
}
