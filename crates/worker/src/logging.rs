//! # Worker Logging
//!
//! Tracing output for the worker binary: human-readable lines on stderr and
//! a daily-rolled file under `logs/`. Stdout stays clean for command output.
//!
//! The filter defaults to `info` and can be overridden with `RUST_LOG`.

use std::io;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

const LOG_DIR: &str = "logs";
const LOG_FILE: &str = "conveyor.log";

/// Keeps the non-blocking file writer alive. Hold this for the lifetime of
/// the process; dropping it flushes buffered log lines.
pub struct LoggingGuard {
    _file_guard: WorkerGuard,
}

/// Install the global tracing subscriber.
pub fn init() -> Result<LoggingGuard, io::Error> {
    std::fs::create_dir_all(LOG_DIR)?;

    let file_appender = tracing_appender::rolling::daily(LOG_DIR, LOG_FILE);
    let (non_blocking_file, file_guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking_file)
        .with_ansi(false);

    let console_layer = tracing_subscriber::fmt::layer().with_writer(io::stderr);

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(console_layer)
        .init();

    Ok(LoggingGuard {
        _file_guard: file_guard,
    })
}
