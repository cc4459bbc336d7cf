//! Logging infrastructure - structured tracing throughout the runtime
//!
//! Design: `tracing` events carry an `event = "..."` field so output can
//! be filtered by what happened rather than by message text:
//! - levels configurable per module through `RUST_LOG` or `DOMAIN_LOG_LEVEL`
//! - zero-cost when disabled
//! - console output, optionally JSON, plus an optional log file

use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use std::io;
use std::path::Path;
use tracing::Level;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

pub use tracing::{debug, error, info, trace, warn};

static LOGGER_INITIALIZED: OnceCell<()> = OnceCell::new();

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    pub level: Level,
    /// Path of an additional log file
    pub log_path: Option<String>,
    /// JSON lines instead of human-readable output
    pub json_format: bool,
    /// Emit span enter/exit events
    pub show_spans: bool,
    /// Log durations of load, save and update passes
    pub track_performance: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            log_path: None,
            json_format: false,
            show_spans: false,
            track_performance: cfg!(debug_assertions),
        }
    }
}

impl LogConfig {
    /// Create config from environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();

        // DOMAIN_LOG_LEVEL: trace, debug, info, warn, error
        if let Ok(level) = std::env::var("DOMAIN_LOG_LEVEL") {
            config.level = parse_level(&level).unwrap_or(Level::INFO);
        }

        if let Ok(path) = std::env::var("DOMAIN_LOG_FILE") {
            config.log_path = Some(path);
        }

        config.json_format = std::env::var("DOMAIN_LOG_JSON").is_ok();
        config.show_spans = std::env::var("DOMAIN_LOG_SPANS").is_ok();

        if let Ok(val) = std::env::var("DOMAIN_LOG_PERF") {
            config.track_performance = val == "1" || val.eq_ignore_ascii_case("true");
        }

        config
    }

    /// Errors only
    pub fn quiet() -> Self {
        Self {
            level: Level::ERROR,
            track_performance: false,
            ..Self::default()
        }
    }

    /// Everything, including per-block trace events
    pub fn verbose() -> Self {
        Self {
            level: Level::TRACE,
            show_spans: true,
            track_performance: true,
            ..Self::default()
        }
    }
}

/// Serializable form of [`LogConfig`] used inside the runtime config file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    pub level: String,
    pub file: Option<String>,
    pub json: bool,
    pub spans: bool,
    pub performance: bool,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
            json: false,
            spans: false,
            performance: cfg!(debug_assertions),
        }
    }
}

impl From<&LogSettings> for LogConfig {
    fn from(settings: &LogSettings) -> Self {
        Self {
            level: parse_level(&settings.level).unwrap_or(Level::INFO),
            log_path: settings.file.clone(),
            json_format: settings.json,
            show_spans: settings.spans,
            track_performance: settings.performance,
        }
    }
}

pub fn parse_level(level: &str) -> Option<Level> {
    match level.to_ascii_lowercase().as_str() {
        "trace" => Some(Level::TRACE),
        "debug" => Some(Level::DEBUG),
        "info" => Some(Level::INFO),
        "warn" => Some(Level::WARN),
        "error" => Some(Level::ERROR),
        _ => None,
    }
}

/// Initialize logging with configuration from the environment
pub fn init() {
    init_with_config(LogConfig::from_env());
}

/// Initialize logging once; later calls are no-ops
pub fn init_with_config(config: LogConfig) {
    LOGGER_INITIALIZED.get_or_init(|| {
        perf::set_enabled(config.track_performance);

        let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("domain_runtime={}", config.level.as_str().to_lowercase()))
        });

        let span_events = if config.show_spans {
            FmtSpan::ENTER | FmtSpan::CLOSE
        } else {
            FmtSpan::NONE
        };

        let console = if config.json_format {
            fmt::layer()
                .json()
                .with_writer(io::stdout)
                .with_span_events(span_events)
                .with_target(true)
                .boxed()
        } else {
            fmt::layer()
                .with_writer(io::stdout)
                .with_span_events(span_events)
                .with_target(true)
                .with_thread_ids(cfg!(debug_assertions))
                .with_line_number(cfg!(debug_assertions))
                .boxed()
        };

        let file = config.log_path.as_deref().map(|path| {
            let path = Path::new(path);
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or(Path::new("."));
            let name = path
                .file_name()
                .map_or_else(|| "domain_runtime.log".into(), |n| n.to_owned());
            fmt::layer()
                .with_writer(tracing_appender::rolling::never(dir, name))
                .with_ansi(false)
                .with_target(true)
                .boxed()
        });

        // Another subscriber may already be installed (tests, embedding apps)
        let _ = tracing_subscriber::registry().with(env_filter).with(console).with(file).try_init();
    });
}

pub fn is_initialized() -> bool {
    LOGGER_INITIALIZED.get().is_some()
}

// ============================================================================
// Runtime-specific logging functions
// ============================================================================

/// Log a cycle released as a unit
#[inline]
pub fn log_cycle_release(type_name: &str, objects: usize) {
    debug!(
        event = "cycle_release",
        type_name = type_name,
        objects = objects,
        "released self-contained subgraph"
    );
}

/// Log an object brought into memory
#[inline]
pub fn log_object_load(id: impl std::fmt::Display, class: &str) {
    debug!(event = "object_load", id = %id, class = class, "object loaded");
}

/// Log an object written out
#[inline]
pub fn log_object_save(id: impl std::fmt::Display, class: &str) {
    trace!(event = "object_save", id = %id, class = class, "object saved");
}

/// Log a finished update pass
pub fn log_update_pass(updated: usize, pruned: usize, next_millis: u64) {
    debug!(
        event = "update_pass",
        updated = updated,
        pruned = pruned,
        next_ms = next_millis,
        "update pass complete"
    );
}

/// Performance tracking utilities
pub mod perf {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Instant;
    use tracing::debug;

    static ENABLED: AtomicBool = AtomicBool::new(cfg!(debug_assertions));

    pub fn set_enabled(enabled: bool) {
        ENABLED.store(enabled, Ordering::Relaxed);
    }

    pub fn is_enabled() -> bool {
        ENABLED.load(Ordering::Relaxed)
    }

    /// Track operation duration (returns guard that logs on drop)
    #[must_use]
    pub fn track(operation: &'static str) -> PerformanceGuard {
        PerformanceGuard {
            operation,
            start: is_enabled().then(Instant::now),
        }
    }

    pub struct PerformanceGuard {
        operation: &'static str,
        start: Option<Instant>,
    }

    impl Drop for PerformanceGuard {
        fn drop(&mut self) {
            if let Some(start) = self.start {
                debug!(
                    operation = self.operation,
                    duration_us = start.elapsed().as_micros() as u64,
                    "operation completed"
                );
            }
        }
    }
}
