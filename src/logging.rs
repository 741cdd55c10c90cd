//! Logging infrastructure - structured tracing throughout the runtime
//!
//! Design: uses `tracing` for structured, contextual logging with:
//! - Configurable level, overridable by `RUST_LOG`
//! - Human-readable or JSON output
//! - Optional file output through a non-blocking appender
//! - Span events for invocations when `show_spans` is set

use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    fmt::{format::FmtSpan, writer::BoxMakeWriter},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

static LOGGER_INITIALIZED: OnceCell<()> = OnceCell::new();

/// Flushes the file writer when dropped; kept for the life of the process
static FILE_GUARD: Mutex<Option<WorkerGuard>> = parking_lot::const_mutex(None);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Off => "off",
            Self::Error => "error",
            Self::Warn => "warn",
            Self::Info => "info",
            Self::Debug => "debug",
            Self::Trace => "trace",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "off" => Some(Self::Off),
            "error" => Some(Self::Error),
            "warn" => Some(Self::Warn),
            "info" => Some(Self::Info),
            "debug" => Some(Self::Debug),
            "trace" => Some(Self::Trace),
            _ => None,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Default log level
    pub level: LogLevel,
    /// Log file path; logs go to stderr when unset
    pub log_path: Option<PathBuf>,
    /// Enable JSON format (vs human-readable)
    pub json_format: bool,
    /// Show span events (enter/close)
    pub show_spans: bool,
}

pub(crate) fn env_flag(name: &str) -> Option<bool> {
    std::env::var(name)
        .ok()
        .map(|val| val == "1" || val.eq_ignore_ascii_case("true"))
}

impl LogConfig {
    /// Create config from environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    /// Override fields from `NATIVEIMPL_LOG_*` variables
    pub fn apply_env(&mut self) {
        // NATIVEIMPL_LOG_LEVEL: off, error, warn, info, debug, trace
        if let Some(level) = std::env::var("NATIVEIMPL_LOG_LEVEL")
            .ok()
            .and_then(|s| LogLevel::parse(&s))
        {
            self.level = level;
        }

        if let Ok(path) = std::env::var("NATIVEIMPL_LOG_FILE") {
            self.log_path = Some(PathBuf::from(path));
        }

        if let Some(json) = env_flag("NATIVEIMPL_LOG_JSON") {
            self.json_format = json;
        }

        if let Some(spans) = env_flag("NATIVEIMPL_LOG_SPANS") {
            self.show_spans = spans;
        }
    }

    /// Minimal logging
    pub fn performance() -> Self {
        Self {
            level: LogLevel::Error,
            ..Self::default()
        }
    }

    /// Verbose logging
    pub fn debug() -> Self {
        Self {
            level: LogLevel::Trace,
            show_spans: true,
            ..Self::default()
        }
    }
}

fn file_writer(path: &Path) -> BoxMakeWriter {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let file = path.file_name().map_or_else(|| "nativeimpl.log".into(), |f| f.to_owned());

    let appender = tracing_appender::rolling::never(dir, file);
    let (writer, guard) = tracing_appender::non_blocking(appender);
    *FILE_GUARD.lock() = Some(guard);
    BoxMakeWriter::new(writer)
}

/// Initialize logging with custom configuration
///
/// Only the first call installs a subscriber. A subscriber installed by the
/// embedding process wins over ours.
pub fn init_with_config(config: &LogConfig) {
    LOGGER_INITIALIZED.get_or_init(|| {
        let env_filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(format!("nativeimpl={}", config.level)));

        let span_events = if config.show_spans {
            FmtSpan::ENTER | FmtSpan::CLOSE
        } else {
            FmtSpan::NONE
        };

        let writer = match &config.log_path {
            Some(path) => file_writer(path),
            None => BoxMakeWriter::new(io::stderr),
        };

        let (json, text) = if config.json_format {
            let layer = tracing_subscriber::fmt::layer()
                .json()
                .with_writer(writer)
                .with_span_events(span_events);
            (Some(layer), None)
        } else {
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_span_events(span_events)
                .with_target(true)
                .with_thread_ids(cfg!(debug_assertions))
                .with_line_number(cfg!(debug_assertions));
            (None, Some(layer))
        };

        tracing_subscriber::registry()
            .with(env_filter)
            .with(json)
            .with(text)
            .try_init()
            .ok();
    });
}

/// Check if logging is initialized
pub fn is_initialized() -> bool {
    LOGGER_INITIALIZED.get().is_some()
}
