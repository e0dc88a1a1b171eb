//! # Logging Utilities
//!
//! Logging setup for sosym using `tracing`.
//!
//! Console output goes to stderr so command output on stdout stays clean for
//! scripts. Optionally the same events are also written to a log file.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use sosym_utils::init_logging;
//!
//! // Reads RUST_LOG, SOSYM_LOG_FORMAT and SOSYM_LOG_FILE
//! init_logging().expect("Failed to initialize logging");
//!
//! tracing::info!("symbol session started");
//! ```
//!
//! ## Environment Variables
//!
//! - `RUST_LOG`: level filter (e.g., `RUST_LOG=debug`, `RUST_LOG=sosym_core=trace`)
//! - `SOSYM_LOG_FORMAT`: `json` or `pretty` (default: `pretty`)
//! - `SOSYM_LOG_FILE`: optional log file. When it names a directory, a
//!   dated `YYYY-MM-DD-sosym.log` file is created inside it.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::{env, fs, io};

use chrono::Utc;
use tracing::Level;
use tracing_subscriber::fmt::time::ChronoUtc;
use tracing_subscriber::fmt::{self};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

/// Environment variable selecting the output format.
pub const LOG_FORMAT_ENV: &str = "SOSYM_LOG_FORMAT";
/// Environment variable naming an optional log file or directory.
pub const LOG_FILE_ENV: &str = "SOSYM_LOG_FILE";

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat
{
    /// Human-readable output
    #[default]
    Pretty,
    /// One JSON object per event
    Json,
}

impl FromStr for LogFormat
{
    type Err = LoggingError;

    fn from_str(s: &str) -> Result<Self, Self::Err>
    {
        match s.to_lowercase().as_str() {
            "pretty" | "text" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            _ => Err(LoggingError::InvalidFormat(s.to_string())),
        }
    }
}

/// Log level
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel
{
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for Level
{
    fn from(level: LogLevel) -> Self
    {
        match level {
            LogLevel::Error => Level::ERROR,
            LogLevel::Warn => Level::WARN,
            LogLevel::Info => Level::INFO,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Trace => Level::TRACE,
        }
    }
}

impl FromStr for LogLevel
{
    type Err = LoggingError;

    fn from_str(s: &str) -> Result<Self, Self::Err>
    {
        match s.to_lowercase().as_str() {
            "error" => Ok(LogLevel::Error),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            "debug" => Ok(LogLevel::Debug),
            "trace" => Ok(LogLevel::Trace),
            _ => Err(LoggingError::InvalidLevel(s.to_string())),
        }
    }
}

/// Initialize logging from the environment.
///
/// `RUST_LOG` defaults to `warn` so the CLI stays quiet unless asked.
///
/// ## Errors
///
/// Returns an error if `SOSYM_LOG_FORMAT` is not a known format, the log file
/// directory cannot be created, or a global subscriber is already set.
pub fn init_logging() -> Result<(), LoggingError>
{
    let format = match env::var(LOG_FORMAT_ENV) {
        Ok(value) => value.parse()?,
        Err(_) => LogFormat::default(),
    };
    init_logging_internal(format, None, log_file_from_env())
}

/// Initialize logging with an explicit level, ignoring `RUST_LOG`.
///
/// `SOSYM_LOG_FILE` is still honoured.
///
/// ## Errors
///
/// Same as [`init_logging`].
pub fn init_logging_with_level(level: LogLevel, format: LogFormat) -> Result<(), LoggingError>
{
    init_logging_internal(format, Some(level.into()), log_file_from_env())
}

fn log_file_from_env() -> Option<PathBuf>
{
    env::var_os(LOG_FILE_ENV).filter(|value| !value.is_empty()).map(PathBuf::from)
}

/// File to log into for a configured path; directories get a dated file.
fn resolve_log_file(path: &Path) -> PathBuf
{
    if path.is_dir() {
        let today = Utc::now().format("%Y-%m-%d");
        path.join(format!("{today}-sosym.log"))
    } else {
        path.to_path_buf()
    }
}

/// Level filter: an explicit level wins, then `RUST_LOG`, then `warn`.
fn build_filter(explicit: Option<Level>) -> EnvFilter
{
    match explicit {
        Some(level) => EnvFilter::new(level.to_string()),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(Level::WARN.to_string())),
    }
}

fn init_logging_internal(format: LogFormat, explicit: Option<Level>, log_file: Option<PathBuf>)
    -> Result<(), LoggingError>
{
    let mut layers: Vec<BoxedLayer> = vec![console_layer(format, build_filter(explicit))];

    if let Some(path) = log_file {
        let path = resolve_log_file(&path);
        let directory = path.parent().map_or_else(|| PathBuf::from("."), Path::to_path_buf);
        fs::create_dir_all(&directory)?;
        let file_name = path
            .file_name()
            .ok_or_else(|| LoggingError::InvalidFile(path.display().to_string()))?;

        // The date is already part of the name when one was generated.
        let appender = tracing_appender::rolling::never(&directory, file_name);
        let (writer, guard) = tracing_appender::non_blocking(appender);
        // Flushes on drop; logging lives for the rest of the process.
        std::mem::forget(guard);
        layers.push(file_layer(format, writer, build_filter(explicit)));
    }

    Registry::default()
        .with(layers)
        .try_init()
        .map_err(|err| LoggingError::InitializationFailed(err.to_string()))
}

fn console_layer(format: LogFormat, filter: EnvFilter) -> BoxedLayer
{
    let layer = fmt::layer()
        .with_target(true)
        .with_timer(ChronoUtc::rfc_3339())
        .with_writer(io::stderr);
    match format {
        LogFormat::Pretty => layer.with_ansi(true).with_filter(filter).boxed(),
        LogFormat::Json => layer.json().with_current_span(true).with_filter(filter).boxed(),
    }
}

fn file_layer(format: LogFormat, writer: tracing_appender::non_blocking::NonBlocking, filter: EnvFilter) -> BoxedLayer
{
    let layer = fmt::layer()
        .with_writer(writer)
        .with_target(true)
        .with_thread_ids(true)
        .with_thread_names(true)
        .with_file(true)
        .with_line_number(true)
        .with_timer(ChronoUtc::rfc_3339());
    match format {
        LogFormat::Pretty => layer.with_ansi(false).with_filter(filter).boxed(),
        LogFormat::Json => layer
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_filter(filter)
            .boxed(),
    }
}

/// Logging initialization error
#[derive(Debug, thiserror::Error)]
pub enum LoggingError
{
    /// Invalid log format
    #[error("Invalid log format: {0}. Use 'pretty' or 'json'")]
    InvalidFormat(String),

    /// Invalid log level
    #[error("Invalid log level: {0}. Use 'error', 'warn', 'info', 'debug', or 'trace'")]
    InvalidLevel(String),

    /// The log file path has no file name
    #[error("Invalid log file: {0}")]
    InvalidFile(String),

    /// A global subscriber is already installed
    #[error("Failed to initialize logging: {0}")]
    InitializationFailed(String),

    /// File logging error
    #[error("File logging error: {0}")]
    FileError(#[from] io::Error),
}
