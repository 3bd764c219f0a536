//! Tracing subscriber setup shared by the binaries
//!
//! `RUST_LOG` wins over the configured level. When a log directory is
//! given, events are also written to a plain-text file there that rolls
//! over at midnight (`train.log.YYYY-MM-DD`), keeping the last
//! [`LOG_BACKUPS`] days next to the current one.

use crate::errors::{AiCoreError, Result};
use std::fs;
use std::path::Path;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Install the global subscriber
///
/// Fails if a subscriber is already installed or the log file cannot be
/// opened.
pub fn init_logging(level: &str, log_dir: Option<&Path>, file_name: &str) -> Result<()> {
    let filter = build_filter(level)?;

    let file_layer = match log_dir {
        Some(dir) => {
            let appender = rolling_appender(dir, file_name)?;
            Some(
                fmt::layer()
                    .with_ansi(false)
                    .with_target(true)
                    .with_writer(appender),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .with(file_layer)
        .try_init()
        .map_err(|e| AiCoreError::Internal(format!("failed to install logger: {e}")))
}

/// Rotated files kept besides the active one
pub const LOG_BACKUPS: usize = 5;

fn rolling_appender(dir: &Path, file_name: &str) -> Result<RollingFileAppender> {
    fs::create_dir_all(dir)?;
    RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(file_name)
        .max_log_files(LOG_BACKUPS + 1)
        .build(dir)
        .map_err(|e| {
            AiCoreError::Internal(format!("failed to open log file in {}: {e}", dir.display()))
        })
}

fn build_filter(level: &str) -> Result<EnvFilter> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(level)
            .map_err(|e| AiCoreError::Config(format!("invalid log level {level:?}: {e}"))),
    }
}
