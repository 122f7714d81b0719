//! Logging setup for shm-worker.
//!
//! # Environment Variables
//!
//! - `SHM_WORKER_LOG` - Log filter (overrides RUST_LOG)
//! - `SHM_WORKER_LOG_LEVEL` - Log level: error, warn, info, debug, trace
//! - `SHM_WORKER_LOG_FORMAT` - Output format: pretty, compact, json
//! - `RUST_LOG` - Standard Rust log filter (fallback)
//!
//! Worker processes are forked from the controller and keep its subscriber,
//! so their events land on the same stderr.
//!
//! # Example
//!
//! ```no_run
//! use shm_worker::logging::{LogConfig, init};
//!
//! init(LogConfig::default().with_env_overrides());
//! ```

use std::str::FromStr;

use tracing::Level;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable multi-line format
    Pretty,
    /// Single-line format (default)
    #[default]
    Compact,
    /// JSON lines for log aggregation systems
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pretty" | "full" => Ok(Self::Pretty),
            "compact" => Ok(Self::Compact),
            "json" => Ok(Self::Json),
            _ => Err(format!(
                "Unknown log format: '{}'. Valid options: pretty, compact, json",
                s
            )),
        }
    }
}

impl std::fmt::Display for LogFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pretty => write!(f, "pretty"),
            Self::Compact => write!(f, "compact"),
            Self::Json => write!(f, "json"),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Base log level (default: WARN)
    pub level: Level,
    /// Log format (default: Compact)
    pub format: LogFormat,
    /// Custom filter string (overrides level if set)
    pub filter: Option<String>,
    /// Show target module in logs (default: false)
    pub show_target: bool,
    /// Show process and thread IDs (default: false)
    pub show_thread_ids: bool,
    /// Disable ANSI colors (default: false)
    pub no_color: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::WARN,
            format: LogFormat::Compact,
            filter: None,
            show_target: false,
            show_thread_ids: false,
            no_color: false,
        }
    }
}

impl LogConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Preset derived from `-v`/`-q` counts on the command line.
    ///
    /// `-v` shows lifecycle events (info), `-vv` debug, `-vvv` trace. Quiet
    /// keeps only errors. With neither, the level is left for env overrides.
    pub fn from_verbosity(verbose: u8, quiet: bool) -> Self {
        let config = Self::default();
        match (quiet, verbose) {
            (true, _) => config.with_filter("error".to_string()),
            (false, 0) => config,
            (false, 1) => config.with_filter("info".to_string()),
            (false, 2) => config.with_filter("debug".to_string()),
            (false, _) => config
                .with_filter("trace".to_string())
                .with_thread_ids(true),
        }
    }

    pub fn with_level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    /// Set a custom filter string.
    pub fn with_filter(mut self, filter: String) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn with_thread_ids(mut self, enabled: bool) -> Self {
        self.show_thread_ids = enabled;
        self
    }

    pub fn with_no_color(mut self, no_color: bool) -> Self {
        self.no_color = no_color;
        self
    }

    /// Apply environment variable overrides.
    ///
    /// CLI arguments take precedence: if a filter is already set (from `-v`
    /// or `--log-level`), the filter variables are not consulted.
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary key lookup.
    pub fn with_overrides_from<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if self.filter.is_none() {
            self.filter = lookup("SHM_WORKER_LOG").or_else(|| lookup("RUST_LOG"));
        }

        if self.filter.is_none()
            && let Some(level_str) = lookup("SHM_WORKER_LOG_LEVEL")
        {
            self.level = parse_level(&level_str).unwrap_or(self.level);
        }

        if let Some(format) = lookup("SHM_WORKER_LOG_FORMAT")
            && let Ok(f) = format.parse()
        {
            self.format = f;
        }

        self
    }

    fn build_filter(&self) -> EnvFilter {
        if let Some(ref filter) = self.filter {
            EnvFilter::try_new(filter).unwrap_or_else(|_| {
                eprintln!("Warning: Invalid log filter '{}', using default", filter);
                EnvFilter::new(self.level.as_str().to_lowercase())
            })
        } else {
            EnvFilter::new(self.level.as_str().to_lowercase())
        }
    }
}

/// Parse a log level string.
pub fn parse_level(s: &str) -> Option<Level> {
    match s.to_lowercase().as_str() {
        "error" => Some(Level::ERROR),
        "warn" | "warning" => Some(Level::WARN),
        "info" => Some(Level::INFO),
        "debug" => Some(Level::DEBUG),
        "trace" => Some(Level::TRACE),
        _ => None,
    }
}

/// Initialize the global tracing subscriber, writing to stderr.
///
/// Subsequent calls are silently ignored.
pub fn init(config: LogConfig) {
    let filter = config.build_filter();
    let ansi = !config.no_color;

    let result = match config.format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .json()
                    .with_target(config.show_target)
                    .with_thread_ids(config.show_thread_ids)
                    .with_writer(std::io::stderr),
            )
            .try_init(),
        LogFormat::Compact => tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .compact()
                    .with_target(config.show_target)
                    .with_thread_ids(config.show_thread_ids)
                    .with_ansi(ansi)
                    .with_writer(std::io::stderr),
            )
            .try_init(),
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .pretty()
                    .with_target(config.show_target)
                    .with_thread_ids(config.show_thread_ids)
                    .with_ansi(ansi)
                    .with_writer(std::io::stderr),
            )
            .try_init(),
    };

    // Already initialized
    let _ = result;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_format_from_str() {
        assert_eq!("pretty".parse::<LogFormat>().unwrap(), LogFormat::Pretty);
        assert_eq!("full".parse::<LogFormat>().unwrap(), LogFormat::Pretty);
        assert_eq!("compact".parse::<LogFormat>().unwrap(), LogFormat::Compact);
        assert_eq!("JSON".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert!("xml".parse::<LogFormat>().is_err());
    }

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level("error"), Some(Level::ERROR));
        assert_eq!(parse_level("warning"), Some(Level::WARN));
        assert_eq!(parse_level("INFO"), Some(Level::INFO));
        assert_eq!(parse_level("trace"), Some(Level::TRACE));
        assert_eq!(parse_level("loud"), None);
    }

    #[test]
    fn test_from_verbosity() {
        assert!(LogConfig::from_verbosity(0, false).filter.is_none());
        assert_eq!(
            LogConfig::from_verbosity(1, false).filter.as_deref(),
            Some("info")
        );
        assert_eq!(
            LogConfig::from_verbosity(2, false).filter.as_deref(),
            Some("debug")
        );
        let trace = LogConfig::from_verbosity(5, false);
        assert_eq!(trace.filter.as_deref(), Some("trace"));
        assert!(trace.show_thread_ids);
        assert_eq!(
            LogConfig::from_verbosity(3, true).filter.as_deref(),
            Some("error")
        );
    }

    #[test]
    fn test_env_overrides_respect_cli_filter() {
        let lookup = |key: &str| match key {
            "SHM_WORKER_LOG" => Some("shm_worker=trace".to_string()),
            "SHM_WORKER_LOG_FORMAT" => Some("json".to_string()),
            _ => None,
        };

        let from_env = LogConfig::default().with_overrides_from(lookup);
        assert_eq!(from_env.filter.as_deref(), Some("shm_worker=trace"));
        assert_eq!(from_env.format, LogFormat::Json);

        let from_cli = LogConfig::from_verbosity(1, false).with_overrides_from(lookup);
        assert_eq!(from_cli.filter.as_deref(), Some("info"));
    }

    #[test]
    fn test_level_override_only_without_filter() {
        let lookup = |key: &str| match key {
            "SHM_WORKER_LOG_LEVEL" => Some("debug".to_string()),
            _ => None,
        };
        let config = LogConfig::default().with_overrides_from(lookup);
        assert_eq!(config.level, Level::DEBUG);
        assert!(config.filter.is_none());
    }

    #[test]
    fn test_init_is_idempotent() {
        init(LogConfig::default());
        init(LogConfig::default().with_format(LogFormat::Json));
    }
}
