//! Tracing subscriber setup for the command-line front end.
//!
//! Two layers share one filter: human-readable output on stderr, and a plain
//! text log file under `~/.rncs-mirror/logs/` written from a background
//! thread. `RUST_LOG` overrides the default filter.

use std::fs;
use std::io;
use std::path::PathBuf;

use thiserror::Error;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::time::LocalTime;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::config::log_directory;

const DEFAULT_LOG_FILTER: &str = "rncs_mirror=info";
const VERBOSE_LOG_FILTER: &str = "rncs_mirror=debug";

pub const LOG_FILE_NAME: &str = "rncs-mirror.log";

/// Errors raised while installing the subscriber.
#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("Failed to create log directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to install tracing subscriber: {0}")]
    Init(String),
}

/// Logging options.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Log at debug level instead of info (ignored when `RUST_LOG` is set).
    pub verbose: bool,
    /// Directory of the log file; `None` logs to stderr only.
    pub log_dir: Option<PathBuf>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            verbose: false,
            log_dir: Some(log_directory()),
        }
    }
}

impl LogConfig {
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn without_file(mut self) -> Self {
        self.log_dir = None;
        self
    }

    fn filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(if self.verbose {
                VERBOSE_LOG_FILTER
            } else {
                DEFAULT_LOG_FILTER
            })
        })
    }
}

/// Install the global subscriber.
///
/// Keep the returned guard alive until exit; dropping it flushes the log file.
pub fn init_logging(config: &LogConfig) -> Result<Option<WorkerGuard>, LoggingError> {
    let (file_layer, guard) = match &config.log_dir {
        Some(dir) => {
            fs::create_dir_all(dir).map_err(|source| LoggingError::CreateDir {
                path: dir.clone(),
                source,
            })?;
            let (writer, guard) = tracing_appender::non_blocking(
                tracing_appender::rolling::never(dir, LOG_FILE_NAME),
            );
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_timer(LocalTime::rfc_3339())
                .with_filter(config.filter());
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(file_layer)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(io::stderr)
                .with_timer(LocalTime::rfc_3339())
                .with_target(false)
                .with_filter(config.filter()),
        )
        .try_init()
        .map_err(|e| LoggingError::Init(e.to_string()))?;

    Ok(guard)
}
