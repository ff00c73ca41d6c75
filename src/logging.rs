//! Logging setup
//!
//! Builds a subscriber writing to stdout and to a daily log file under
//! `{log_dir}/autoDataGrabber/`. The subscriber is handed back as a
//! [`Dispatch`] for the caller to attach to the futures it runs; nothing here
//! installs a process-wide default.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::level_filters::LevelFilter;
use tracing::Dispatch;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

pub const LOG_FOLDER: &str = "autoDataGrabber";
const LOG_FILE_PREFIX: &str = "grabber.log";

/// Directory the log files end up in
pub fn log_path(log_dir: &Path) -> PathBuf {
    log_dir.join(LOG_FOLDER)
}

/// The returned guard must be kept alive for as long as the file should be written
pub fn build_dispatch(log_dir: &Path) -> Result<(Dispatch, WorkerGuard)> {
    let dir = log_path(log_dir);
    std::fs::create_dir_all(&dir)
        .context(format!("Failed to create log directory: {:?}", dir))?;

    let (file_writer, guard) = tracing_appender::non_blocking(
        tracing_appender::rolling::daily(&dir, LOG_FILE_PREFIX),
    );

    // RUST_LOG wins, INFO otherwise
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();

    let subscriber = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .with(fmt::layer().with_ansi(false).with_writer(file_writer));

    Ok((Dispatch::new(subscriber), guard))
}
