//! Logging and tracing initialization for arkd.
//!
//! Logs go to the console (pretty or JSON) and to `arkd.log` in the configured
//! log directory. The file is what the `read_logs` command tails.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    EnvFilter,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

use crate::error::{Error, Result};

pub const LOG_FILE_NAME: &str = "arkd.log";

/// Default number of lines returned by `read_logs`.
pub const DEFAULT_TAIL_LINES: usize = 100;

/// Configuration for the logging system.
#[derive(Default)]
pub struct LogConfig {
    /// Output console logs as JSON (for machine parsing)
    pub json: bool,
    /// Enable verbose logging (sets default level to DEBUG)
    pub verbose: bool,
    /// Directory for the log file; console only when `None`
    pub log_dir: Option<PathBuf>,
}

/// Initialize the tracing subscriber with the given configuration.
///
/// The log level can be overridden at runtime via the `RUST_LOG` environment
/// variable. The returned guard flushes the file writer on drop and must be
/// held for the lifetime of the process.
pub fn init(config: LogConfig) -> Option<WorkerGuard> {
    let default_level = if config.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("arkd={}", default_level.as_str().to_lowercase()))
    });

    let (file_layer, guard) = match config.log_dir {
        Some(dir) => match fs::create_dir_all(&dir) {
            Ok(()) => {
                let appender = tracing_appender::rolling::never(&dir, LOG_FILE_NAME);
                let (writer, guard) = tracing_appender::non_blocking(appender);
                let layer = fmt::layer()
                    .with_ansi(false)
                    .with_target(false)
                    .with_writer(writer);
                (Some(layer), Some(guard))
            }
            Err(e) => {
                eprintln!("Failed to create log directory {}: {}", dir.display(), e);
                (None, None)
            }
        },
        None => (None, None),
    };

    let registry = tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer);

    if config.json {
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_span_events(FmtSpan::CLOSE)
                    .with_current_span(true)
                    .with_target(true),
            )
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .init();
    }

    guard
}

/// Return the last `lines` lines of the most recently modified `*.log` file
/// in `log_dir`. Empty when there is no log file yet.
pub fn read_logs(log_dir: &Path, lines: usize) -> Result<String> {
    if !log_dir.exists() {
        return Ok(String::new());
    }

    let entries = fs::read_dir(log_dir).map_err(|e| Error::io_at("read", log_dir, e))?;

    let newest = entries
        .filter_map(|e| e.ok())
        .filter(|e| e.path().extension().and_then(|s| s.to_str()) == Some("log"))
        .max_by_key(|e| {
            e.metadata()
                .and_then(|m| m.modified())
                .unwrap_or(SystemTime::UNIX_EPOCH)
        });

    let Some(newest) = newest else {
        return Ok(String::new());
    };

    let path = newest.path();
    let content = fs::read_to_string(&path).map_err(|e| Error::io_at("read", &path, e))?;
    let all: Vec<&str> = content.lines().collect();
    let start = all.len().saturating_sub(lines);
    Ok(all[start..].join("\n"))
}
