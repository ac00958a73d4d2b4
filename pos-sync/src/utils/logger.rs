//! Logging Infrastructure
//!
//! Structured logging via `tracing`. `RUST_LOG` wins over the configured
//! level when set. With a log directory, events go to stdout and to a daily
//! rolling file.

use std::path::Path;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

/// Initialize the logger on stdout at `info`
pub fn init_logger() {
    init_logger_with_file(None, None);
}

/// Initialize the logger with optional daily rolling file output
///
/// Falls back to stdout only when `log_dir` does not exist and cannot be created.
pub fn init_logger_with_file(log_level: Option<&str>, log_dir: Option<&str>) {
    let level = log_level.unwrap_or("info");
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let console = fmt::layer()
        .with_file(false)
        .with_line_number(false)
        .with_thread_ids(false)
        .with_target(false);

    let file = log_dir.and_then(|dir| {
        let log_path = Path::new(dir);
        if !log_path.exists() && std::fs::create_dir_all(log_path).is_err() {
            return None;
        }
        let file_appender = tracing_appender::rolling::daily(log_path, "pos-sync");
        Some(
            fmt::layer()
                .with_ansi(false)
                .with_target(false)
                .with_writer(file_appender),
        )
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file)
        .init();
}
