//! Logging infrastructure - structured tracing throughout the type system
//!
//! Design: Uses `tracing` for structured, contextual logging with:
//! - Configurable log levels per module
//! - Zero-cost when disabled
//! - Span-based performance tracking
//! - Console or file output, plain or JSON

use once_cell::sync::OnceCell;
use std::io;
use std::path::Path;
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

// Re-export tracing macros for use throughout the crate
pub use tracing::{debug, error, info, trace, warn};

/// Global logging state
static LOGGER_INITIALIZED: OnceCell<()> = OnceCell::new();

/// Keeps the non-blocking file writer flushing until process exit
static FILE_GUARD: OnceCell<WorkerGuard> = OnceCell::new();

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Default log level
    pub level: Level,
    /// Enable file logging
    pub file_output: bool,
    /// Log file path (if file_output enabled)
    pub log_path: Option<String>,
    /// Enable JSON format (vs human-readable)
    pub json_format: bool,
    /// Show span events (enter/exit)
    pub show_spans: bool,
    /// Enable performance tracking
    pub track_performance: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            file_output: false,
            log_path: None,
            json_format: false,
            show_spans: false,
            track_performance: cfg!(debug_assertions),
        }
    }
}

impl LogConfig {
    /// Apply `METATYPE_LOG_*` environment overrides on top of this config
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from `lookup`, keyed by environment variable name
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        // METATYPE_LOG_LEVEL: trace, debug, info, warn, error
        if let Some(level_str) = lookup("METATYPE_LOG_LEVEL") {
            self.level = parse_level(&level_str);
        }

        // METATYPE_LOG_FILE: path to log file
        if let Some(path) = lookup("METATYPE_LOG_FILE") {
            self.file_output = true;
            self.log_path = Some(path);
        }

        if lookup("METATYPE_LOG_JSON").is_some() {
            self.json_format = true;
        }
        if lookup("METATYPE_LOG_SPANS").is_some() {
            self.show_spans = true;
        }

        if let Some(val) = lookup("METATYPE_LOG_PERF") {
            self.track_performance = val == "1" || val.to_lowercase() == "true";
        }

        self
    }
}

/// Map a level name to a `Level`, defaulting to INFO
pub fn parse_level(name: &str) -> Level {
    match name.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}

/// Initialize logging with custom configuration
///
/// Only the first call installs a subscriber; later calls only update
/// performance tracking. If the host already installed a global subscriber
/// that one is left in place.
pub fn init_with_config(config: LogConfig) {
    perf::set_enabled(config.track_performance);
    LOGGER_INITIALIZED.get_or_init(|| {
        let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("metatype={}", config.level.as_str().to_lowercase()))
        });

        let span_events = if config.show_spans {
            FmtSpan::ENTER | FmtSpan::CLOSE
        } else {
            FmtSpan::NONE
        };

        let file_writer = match (config.file_output, config.log_path.as_deref()) {
            (true, Some(path)) => {
                let path = Path::new(path);
                let directory = path.parent().unwrap_or_else(|| Path::new("."));
                let file_name = path
                    .file_name()
                    .map(|name| name.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "metatype.log".to_string());
                let appender = tracing_appender::rolling::never(directory, file_name);
                let (writer, guard) = tracing_appender::non_blocking(appender);
                let _ = FILE_GUARD.set(guard);
                Some(writer)
            }
            _ => None,
        };

        let layer = match (file_writer, config.json_format) {
            (Some(writer), true) => fmt::layer()
                .json()
                .with_writer(writer)
                .with_span_events(span_events)
                .boxed(),
            (Some(writer), false) => fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_span_events(span_events)
                .with_target(true)
                .boxed(),
            (None, true) => fmt::layer()
                .json()
                .with_writer(io::stdout)
                .with_span_events(span_events)
                .boxed(),
            (None, false) => fmt::layer()
                .with_writer(io::stdout)
                .with_span_events(span_events)
                .with_target(true)
                .with_thread_ids(cfg!(debug_assertions))
                .with_line_number(cfg!(debug_assertions))
                .boxed(),
        };

        let _ = tracing_subscriber::registry()
            .with(layer.with_filter(env_filter))
            .try_init();
    });
}

// ============================================================================
// Type-system logging functions
// ============================================================================

/// Log type registration
#[inline]
pub fn log_type_registered(name: &str, parent: Option<&str>, depth: usize) {
    debug!(
        event = "type_registered",
        name,
        parent = parent.unwrap_or("<root>"),
        depth,
        "Type registered"
    );
}

/// Log type unregistration
#[inline]
pub fn log_type_unregistered(name: &str) {
    debug!(event = "type_unregistered", name, "Type unregistered");
}

/// Log class construction
#[inline]
pub fn log_class_constructed(type_name: &str, kind: &str) {
    trace!(
        event = "class_constructed",
        type_name,
        kind,
        "Class constructed"
    );
}

/// Log class destruction
#[inline]
pub fn log_class_destructed(type_name: &str, kind: &str) {
    trace!(
        event = "class_destructed",
        type_name,
        kind,
        "Class destructed"
    );
}

/// Log a default class reference count change
#[inline]
pub fn log_class_refcount(type_name: &str, count: usize) {
    trace!(
        event = "class_refcount",
        type_name,
        count,
        "Default class refcount changed"
    );
}

/// Log instance creation
#[inline]
pub fn log_instance_created(type_name: &str, id: u64, in_place: bool) {
    trace!(
        event = "instance_created",
        type_name,
        id,
        in_place,
        "Instance created"
    );
}

/// Log instance destruction
#[inline]
pub fn log_instance_destroyed(type_name: &str, id: u64, remaining: usize) {
    trace!(
        event = "instance_destroyed",
        type_name,
        id,
        remaining,
        "Instance destroyed"
    );
}

/// Log signal installation
#[inline]
pub fn log_signal_installed(type_name: &str, signal: &str, arg_count: usize) {
    debug!(
        event = "signal_installed",
        type_name,
        signal,
        args = arg_count,
        "Signal installed"
    );
}

/// Log a new connection
#[inline]
pub fn log_connection(signal: &str, emitter: u64, receiver: u64) {
    trace!(
        event = "connection",
        signal,
        emitter,
        receiver,
        "Connection created"
    );
}

/// Log removed connections
#[inline]
pub fn log_disconnect(removed: usize) {
    trace!(event = "disconnect", removed, "Connections removed");
}

/// Log a signal emission
#[inline]
pub fn log_emission(signal: &str, emitter: u64, connections: usize) {
    trace!(
        event = "emit",
        signal,
        emitter,
        connections,
        "Signal emitted"
    );
}

/// Log memory reservation
#[inline]
pub fn log_allocation(size: usize, label: &str) {
    trace!(
        event = "allocation",
        size_bytes = size,
        label,
        "Memory reserved"
    );
}

/// Log memory release
#[inline]
pub fn log_deallocation(size: usize, label: &str) {
    trace!(
        event = "deallocation",
        size_bytes = size,
        label,
        "Memory released"
    );
}

/// Log a recoverable runtime failure
pub fn log_runtime_error(error: &str, frame: &str) {
    warn!(
        event = "runtime_error",
        error,
        frame,
        "Runtime error occurred"
    );
}

/// Log lifecycle misuse by the caller
pub fn log_usage_error(error: &str, frame: &str) {
    error!(
        event = "usage_error",
        error,
        frame,
        "Invalid use of the type system"
    );
}

/// Log runtime warning
pub fn log_runtime_warning(warning: &str) {
    warn!(event = "runtime_warning", warning, "Runtime warning");
}

/// Log runtime initialization
pub fn log_runtime_init(builtin_types: usize) {
    info!(
        event = "runtime_init",
        builtin_types,
        "Type system initialized"
    );
}

/// Log runtime shutdown
pub fn log_runtime_shutdown(types: usize) {
    info!(
        event = "runtime_shutdown",
        types,
        "Type system shutting down"
    );
}

/// Performance tracking utilities
///
/// Guards are only handed out while tracking is enabled, so untracked hot
/// paths pay one relaxed load.
pub mod perf {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Instant;
    use tracing::debug;

    static ENABLED: AtomicBool = AtomicBool::new(false);

    pub(crate) fn set_enabled(enabled: bool) {
        ENABLED.store(enabled, Ordering::Relaxed);
    }

    #[inline]
    pub fn enabled() -> bool {
        ENABLED.load(Ordering::Relaxed)
    }

    /// Track operation duration (returns guard that logs on drop)
    #[must_use]
    pub fn track(operation: &'static str) -> Option<PerformanceGuard> {
        enabled().then(|| PerformanceGuard {
            operation,
            start: Instant::now(),
        })
    }

    pub struct PerformanceGuard {
        operation: &'static str,
        start: Instant,
    }

    impl Drop for PerformanceGuard {
        fn drop(&mut self) {
            let elapsed = self.start.elapsed();
            debug!(
                event = "perf",
                operation = self.operation,
                duration_us = elapsed.as_micros() as u64,
                "operation completed"
            );
        }
    }
}
