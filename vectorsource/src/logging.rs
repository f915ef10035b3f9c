//! Logging setup for binaries embedding the dispatch core.
//!
//! The library itself only emits `tracing` events. This module installs a
//! subscriber for them:
//! - stdout output, always
//! - an optional log file, cleared at startup and written off-thread
//! - level filtering through `RUST_LOG` (default `info`)

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Keeps the file writer alive. Dropping it flushes and closes the log file.
pub struct LoggingGuard {
    _file_guard: Option<WorkerGuard>,
}

/// Installs the global subscriber.
///
/// When `log_dir` is given, events are also written to `log_dir/log_file`.
///
/// # Errors
///
/// Fails if the log file cannot be prepared or a global subscriber is
/// already installed.
pub fn init_logging(log_dir: Option<&Path>, log_file: &str) -> Result<LoggingGuard, io::Error> {
    let (file_layer, file_guard) = match log_dir {
        Some(dir) => {
            prepare_log_file(dir, log_file)?;
            let appender = tracing_appender::rolling::never(dir, log_file);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let stdout_layer = tracing_subscriber::fmt::layer()
        .with_writer(io::stdout)
        .with_target(false);

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(stdout_layer)
        .try_init()
        .map_err(io::Error::other)?;

    Ok(LoggingGuard {
        _file_guard: file_guard,
    })
}

/// Creates `dir` if needed and truncates the log file inside it.
pub fn prepare_log_file(dir: &Path, log_file: &str) -> Result<PathBuf, io::Error> {
    fs::create_dir_all(dir)?;
    let path = dir.join(log_file);
    fs::write(&path, "")?;
    Ok(path)
}

/// Default log file name.
pub fn default_log_file() -> &'static str {
    "vectorsource.log"
}
