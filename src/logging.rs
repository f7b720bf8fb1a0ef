//! Tracing setup.
//!
//! The TUI owns the terminal, so in that mode diagnostics go to a log file in
//! the data directory. Text and JSON modes log to stderr, which keeps stdout
//! clean for their output.

use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};

use crate::storage::data_dir;

use time::{format_description::FormatItem, macros::format_description, UtcOffset};
use tracing_appender::{non_blocking::WorkerGuard, rolling};
use tracing_subscriber::{fmt, prelude::*, EnvFilter, Registry};

const LOG_FILE_NAME: &str = "mining-control.log";

/// Where log records end up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogTarget {
    Stderr,
    File,
}

#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("no suitable data directory available for logs")]
    NoDataDir,
    #[error("failed to prepare log file {path}: {source}")]
    LogFile {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid log filter {filter:?}: {source}")]
    Filter {
        filter: String,
        source: tracing_subscriber::filter::ParseError,
    },
    #[error("failed to install global tracing subscriber: {0}")]
    SetGlobal(#[from] tracing::subscriber::SetGlobalDefaultError),
}

/// Install the global subscriber.
///
/// An explicit `level` wins over `RUST_LOG`; with neither, `info` is used.
/// The returned guard must be held for the file writer to flush.
pub fn init(target: LogTarget, level: Option<&str>) -> Result<Option<WorkerGuard>, LoggingError> {
    let filter = build_env_filter(level)?;
    let timer = build_timer();

    match target {
        LogTarget::Stderr => {
            let layer = fmt::layer()
                .with_timer(timer)
                .with_target(false)
                .with_writer(std::io::stderr);
            tracing::subscriber::set_global_default(Registry::default().with(filter).with(layer))?;
            Ok(None)
        }
        LogTarget::File => {
            let dir = data_dir().ok_or(LoggingError::NoDataDir)?;
            let path = dir.join(LOG_FILE_NAME);
            prepare_log_file(&dir, &path)?;
            let (writer, guard) = tracing_appender::non_blocking(rolling::never(&dir, LOG_FILE_NAME));
            let layer = fmt::layer()
                .with_ansi(false)
                .with_timer(timer)
                .with_writer(writer);
            tracing::subscriber::set_global_default(Registry::default().with(filter).with(layer))?;
            tracing::info!("logging to {}", path.display());
            Ok(Some(guard))
        }
    }
}

fn build_env_filter(level: Option<&str>) -> Result<EnvFilter, LoggingError> {
    match level {
        Some(filter) => EnvFilter::try_new(filter).map_err(|source| LoggingError::Filter {
            filter: filter.to_string(),
            source,
        }),
        None => Ok(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))),
    }
}

fn build_timer() -> fmt::time::OffsetTime<&'static [FormatItem<'static>]> {
    const DISPLAY_FORMAT: &[FormatItem<'static>] =
        format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");
    let offset = UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC);
    fmt::time::OffsetTime::new(offset, DISPLAY_FORMAT)
}

fn prepare_log_file(dir: &Path, path: &Path) -> Result<(), LoggingError> {
    let err = |source| LoggingError::LogFile {
        path: path.to_path_buf(),
        source,
    };
    fs::create_dir_all(dir).map_err(err)?;
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map(|_| ())
        .map_err(err)
}
