//! Logging configuration for sqlbatch.
//!
//! A job logs to a per-run file under the deployment log directory and
//! mirrors INFO to stdout and WARN/ERROR to stderr, so the calling shell
//! script sees failures on stderr.

use crate::config::RuntimePaths;
use crate::error::{BatchError, Result};
use chrono::Local;
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use tracing::Level;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Initializes logging for a job run.
///
/// The file receives DEBUG and above (`RUST_LOG` overrides) without ANSI
/// colors. Returns an error if the file cannot be opened; installing a
/// second subscriber is silently ignored.
pub fn init_job_logging(log_path: &Path) -> Result<()> {
    if let Some(parent) = log_path.parent() {
        fs::create_dir_all(parent).map_err(|e| {
            BatchError::io(format!("Could not create log directory {}: {e}", parent.display()))
        })?;
    }

    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_path)
        .map_err(|e| BatchError::io(format!("Could not open log file {}: {e}", log_path.display())))?;

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(log_file)
        .with_ansi(false)
        .with_target(false)
        .with_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")));

    let _ = tracing_subscriber::registry()
        .with(file_layer)
        .with(console_layer())
        .try_init();

    Ok(())
}

/// Initializes console-only logging, for runs where the log file is not
/// wanted or cannot be created.
pub fn init_console_logging() {
    let _ = tracing_subscriber::registry().with(console_layer()).try_init();
}

fn console_layer<S>() -> impl Layer<S>
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
{
    tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr.with_max_level(Level::WARN).or_else(std::io::stdout))
        .with_target(false)
        .without_time()
        .with_filter(LevelFilter::INFO)
}

/// Log file for `script_name` started now.
///
/// Falls back to the user's state directory when the deployment log
/// directory cannot be created.
pub fn job_log_path(script_name: &str) -> PathBuf {
    let paths = RuntimePaths::from_env();
    let now = Local::now();
    let preferred = paths.log_file(script_name, now);

    match preferred.parent() {
        Some(dir) if fs::create_dir_all(dir).is_ok() => preferred,
        _ => fallback_log_dir().join(crate::config::log_file_name(script_name, now)),
    }
}

fn fallback_log_dir() -> PathBuf {
    if let Some(state_dir) = dirs::state_dir() {
        return state_dir.join("sqlbatch");
    }
    if let Some(cache_dir) = dirs::cache_dir() {
        return cache_dir.join("sqlbatch");
    }
    std::env::temp_dir().join("sqlbatch")
}
