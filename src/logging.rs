/// Logging Module
///
/// Builds the log sink handed to the pipeline: formatted events on stdout and
/// appended to a log file.
use anyhow::{Context, Result};
use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;
use tracing::Dispatch;
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::EnvFilter;

pub const DEFAULT_LOG_FILE: &str = "reddit_etl.log";

/// Build a dispatcher writing to stdout and to `log_file`.
///
/// The level defaults to INFO and can be changed through `RUST_LOG`.
pub fn build_log_sink(log_file: &Path) -> Result<Dispatch> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_file)
        .context(format!("Failed to open log file {}", log_file.display()))?;

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .with_writer(std::io::stdout.and(Mutex::new(file)))
        .with_ansi(false)
        .finish();

    Ok(Dispatch::new(subscriber))
}
