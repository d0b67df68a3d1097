//! Logging initialization (spec.md §4.12, new in the expanded spec).
//! Structured logging via `tracing`, grounded in the teacher's
//! `infrastructure::logging::logger::LoggerImpl::init`: an `EnvFilter`
//! seeded from the configured level, a stdout layer in the configured
//! format, and an optional rolling file layer.

use std::io;

use thiserror::Error;
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::config::LoggingConfig;

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("invalid log level '{0}'")]
    InvalidLevel(String),
    #[error("failed to install global subscriber: {0}")]
    Init(String),
}

/// Holds the non-blocking file-appender worker guard; dropping it flushes
/// the appender. Must stay alive for the process lifetime.
pub struct LoggerGuard {
    _file_guard: Option<WorkerGuard>,
}

fn parse_level(level: &str) -> Result<Level, LoggingError> {
    match level.to_lowercase().as_str() {
        "trace" => Ok(Level::TRACE),
        "debug" => Ok(Level::DEBUG),
        "info" => Ok(Level::INFO),
        "warn" => Ok(Level::WARN),
        "error" => Ok(Level::ERROR),
        other => Err(LoggingError::InvalidLevel(other.to_string())),
    }
}

/// Installs the global `tracing` subscriber from [`LoggingConfig`].
/// `format` of `"json"` selects JSON output; anything else selects the
/// pretty human-readable formatter. When `directory` is set, a daily
/// rolling JSON file layer is added alongside stdout.
pub fn init(config: &LoggingConfig) -> Result<LoggerGuard, LoggingError> {
    let level = parse_level(&config.level)?;
    let env_filter = EnvFilter::builder().with_default_directive(level.into()).from_env_lossy();
    let json = config.format.eq_ignore_ascii_case("json");

    let file_guard = if let Some(dir) = &config.directory {
        let appender = rolling::daily(dir, "nebula.log");
        let (non_blocking, guard) = tracing_appender::non_blocking(appender);
        let file_layer = tracing_subscriber::fmt::layer()
            .json()
            .with_writer(non_blocking)
            .with_ansi(false)
            .with_target(true)
            .with_filter(env_filter.clone());

        install(json, env_filter, Some(file_layer));
        Some(guard)
    } else {
        install(json, env_filter, None);
        None
    };

    tracing::info!(level = %config.level, format = %config.format, "logger initialized");
    Ok(LoggerGuard { _file_guard: file_guard })
}

fn install<L>(json: bool, env_filter: EnvFilter, file_layer: Option<L>)
where
    L: tracing_subscriber::Layer<tracing_subscriber::Registry> + Send + Sync + 'static,
{
    let registry = tracing_subscriber::registry().with(file_layer);
    if json {
        let stdout_layer = tracing_subscriber::fmt::layer()
            .json()
            .with_writer(io::stdout)
            .with_target(true)
            .with_filter(env_filter);
        registry.with(stdout_layer).init();
    } else {
        let stdout_layer = tracing_subscriber::fmt::layer()
            .pretty()
            .with_writer(io::stdout)
            .with_target(true)
            .with_span_events(FmtSpan::CLOSE)
            .with_filter(env_filter);
        registry.with(stdout_layer).init();
    }
}
