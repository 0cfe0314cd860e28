// Logging setup: console output for the operator plus a rotating,
// append-only log file that keeps the debug detail (response bodies,
// request URLs) of every run.

use anyhow::{Context, Result};
use std::path::Path;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

pub const LOG_PREFIX: &str = "application_logs";
pub const LOG_SUFFIX: &str = "log";
/// Daily files, so this is also the retention in days.
pub const MAX_LOG_FILES: usize = 10;

const FILE_FILTER: &str = "debug,hyper=warn,reqwest=info";

pub fn file_appender(dir: &Path) -> Result<RollingFileAppender> {
    RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(LOG_PREFIX)
        .filename_suffix(LOG_SUFFIX)
        .max_log_files(MAX_LOG_FILES)
        .build(dir)
        .with_context(|| format!("Failed to open log file in {}", dir.display()))
}

/// Install the global subscriber. `RUST_LOG` overrides the console level.
pub fn init(log_dir: &Path) -> Result<()> {
    let console_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let console = fmt::layer()
        .without_time()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_filter(console_filter);

    let file = fmt::layer()
        .with_ansi(false)
        .with_target(false)
        .with_writer(file_appender(log_dir)?)
        .with_filter(EnvFilter::new(FILE_FILTER));

    tracing_subscriber::registry()
        .with(console)
        .with(file)
        .try_init()
        .map_err(|err| anyhow::anyhow!(err.to_string()))?;
    Ok(())
}
