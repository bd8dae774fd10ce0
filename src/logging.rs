//! Logging infrastructure - structured tracing for loads and calls
//!
//! Design: `tracing` events with stable `event` fields, zero-cost when no
//! subscriber is installed. `init_logging` installs one subscriber per
//! process; later calls are no-ops.

use crate::reflect::Type;
use once_cell::sync::OnceCell;
use std::path::PathBuf;
use tracing::{debug, info, trace, warn, Level, Subscriber};
use tracing_appender::{non_blocking::NonBlocking, non_blocking::WorkerGuard, rolling};
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    registry::LookupSpan,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

static LOGGER_INITIALIZED: OnceCell<()> = OnceCell::new();

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Compact,
    Json,
}

/// Log output destination
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogOutput {
    Stdout,
    Stderr,
    /// Daily rotated file
    File { directory: PathBuf, prefix: String },
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    pub level: Level,
    pub format: LogFormat,
    pub output: LogOutput,
    /// Emit span enter/close events
    pub span_events: bool,
    /// Extra filter directives, e.g. "wirebind::frame=trace"
    pub filter: Option<String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            format: LogFormat::Compact,
            output: LogOutput::Stderr,
            span_events: false,
            filter: None,
        }
    }
}

impl LogConfig {
    pub fn with_level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_output(mut self, output: LogOutput) -> Self {
        self.output = output;
        self
    }

    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    /// Create config from environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();

        // WIREBIND_LOG_LEVEL: trace, debug, info, warn, error
        if let Ok(level) = std::env::var("WIREBIND_LOG_LEVEL") {
            config.level = parse_level(&level).unwrap_or(Level::INFO);
        }

        // WIREBIND_LOG_FILE: directory/prefix of a rotated log file
        if let Ok(path) = std::env::var("WIREBIND_LOG_FILE") {
            config.output = file_output(&path);
        }

        if std::env::var("WIREBIND_LOG_JSON").is_ok() {
            config.format = LogFormat::Json;
        }
        config.span_events = std::env::var("WIREBIND_LOG_SPANS").is_ok();

        config
    }
}

/// Parse a level name, case-insensitively
pub fn parse_level(name: &str) -> Option<Level> {
    match name.to_lowercase().as_str() {
        "trace" => Some(Level::TRACE),
        "debug" => Some(Level::DEBUG),
        "info" => Some(Level::INFO),
        "warn" => Some(Level::WARN),
        "error" => Some(Level::ERROR),
        _ => None,
    }
}

/// Split a log file path into the rolling appender's directory and prefix
pub fn file_output(path: &str) -> LogOutput {
    let path = PathBuf::from(path);
    let directory = path
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));
    let prefix = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "wirebind.log".to_string());
    LogOutput::File { directory, prefix }
}

/// Install the global subscriber.
///
/// Returns the writer guard on first initialization; keep it alive until
/// exit so buffered lines are flushed.
pub fn init_logging(config: LogConfig) -> Option<WorkerGuard> {
    let mut guard = None;
    LOGGER_INITIALIZED.get_or_init(|| {
        let (writer, worker) = match &config.output {
            LogOutput::Stdout => tracing_appender::non_blocking(std::io::stdout()),
            LogOutput::Stderr => tracing_appender::non_blocking(std::io::stderr()),
            LogOutput::File { directory, prefix } => {
                tracing_appender::non_blocking(rolling::daily(directory, prefix))
            }
        };
        let spans = if config.span_events {
            FmtSpan::NEW | FmtSpan::CLOSE
        } else {
            FmtSpan::NONE
        };

        // Another subscriber may already be installed by the host
        let _ = tracing_subscriber::registry()
            .with(build_filter(&config))
            .with(format_layer(config.format, writer, spans))
            .try_init();
        guard = Some(worker);
    });
    guard
}

/// Initialize from `WIREBIND_LOG_*` variables
pub fn init() -> Option<WorkerGuard> {
    init_logging(LogConfig::from_env())
}

pub fn is_initialized() -> bool {
    LOGGER_INITIALIZED.get().is_some()
}

fn format_layer<S>(format: LogFormat, writer: NonBlocking, spans: FmtSpan) -> Box<dyn Layer<S> + Send + Sync>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    match format {
        LogFormat::Pretty => fmt::layer()
            .with_writer(writer)
            .pretty()
            .with_span_events(spans)
            .boxed(),
        LogFormat::Compact => fmt::layer()
            .with_writer(writer)
            .compact()
            .with_span_events(spans)
            .boxed(),
        LogFormat::Json => fmt::layer()
            .with_writer(writer)
            .json()
            .with_span_events(spans)
            .boxed(),
    }
}

fn build_filter(config: &LogConfig) -> EnvFilter {
    let base = EnvFilter::from_default_env().add_directive(config.level.into());
    match &config.filter {
        Some(directives) => directives
            .split(',')
            .filter(|directive| !directive.trim().is_empty())
            .fold(base, |filter, directive| match directive.trim().parse() {
                Ok(parsed) => filter.add_directive(parsed),
                Err(_) => {
                    warn!("Invalid filter directive: {}", directive);
                    filter
                }
            }),
        None => base,
    }
}

// ============================================================================
// Wire-layer events
// ============================================================================

pub fn log_module_loaded(label: &str, methods: usize, types: usize) {
    info!(
        event = "module_loaded",
        module = label,
        methods = methods,
        types = types,
        "Module loaded"
    );
}

#[inline]
pub fn log_reflect(id: u32, ty: &Type) {
    trace!(event = "reflect", id = id, ty = %ty, "Type reflected");
}

#[inline]
pub fn log_call(method: &str, args: usize, frame: usize) {
    debug!(
        event = "call",
        method = method,
        args = args,
        frame = frame,
        "Calling export"
    );
}

#[inline]
pub fn log_rollback(entry: usize, high_water: usize) {
    trace!(
        event = "rollback",
        cursor = entry,
        high_water = high_water,
        "Frame rolled back"
    );
}

pub fn log_range_fault(value: i128, bits: u32, signed: bool) {
    debug!(
        event = "range_fault",
        value = %value,
        bits = bits,
        signed = signed,
        "Argument out of range"
    );
}

pub fn log_config_rejected(path: &std::path::Path, reason: &str) {
    warn!(
        event = "config_rejected",
        path = %path.display(),
        reason = reason,
        "Configuration file rejected"
    );
}

pub fn log_unsupported(method: &str, reason: &str) {
    warn!(
        event = "unsupported_type",
        method = method,
        reason = reason,
        "Method has no wire mapping"
    );
}
