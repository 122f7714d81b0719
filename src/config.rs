//! Worker configuration.
//!
//! # Environment Variables
//!
//! - `SHM_WORKER_LAUNCH_TIMEOUT` - Seconds to wait for the ready flag (float)
//! - `SHM_WORKER_CAPACITY` - Capacity of each channel (at least 1)
//! - `SHM_WORKER_POLL_INTERVAL_MS` - Sleep between loop ticks, in milliseconds
//! - `SHM_WORKER_VERBOSE` - `1`/`true`/`yes`/`on` enables drop diagnostics

use crate::error::{Result, WorkerError};
use std::time::Duration;
use tracing::warn;

/// Settings shared by the controller and the worker process.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerConfig {
    /// Upper bound for `start(true)` to see the ready flag (default: 5s)
    pub launch_timeout: Duration,
    /// Capacity of the command, input and output channels (default: 8)
    pub capacity: usize,
    /// Sleep between loop ticks (default: 10ms)
    pub poll_interval: Duration,
    /// Log dropped items and empty reads at a visible level (default: false)
    pub verbose: bool,
    /// How long dropping a running worker waits before SIGKILL (default: 1s)
    pub shutdown_grace: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            launch_timeout: Duration::from_secs(5),
            capacity: 8,
            poll_interval: Duration::from_millis(10),
            verbose: false,
            shutdown_grace: Duration::from_secs(1),
        }
    }
}

impl WorkerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_launch_timeout(mut self, timeout: Duration) -> Self {
        self.launch_timeout = timeout;
        self
    }

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    /// Apply `SHM_WORKER_*` environment variable overrides.
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary key lookup.
    ///
    /// Values that fail to parse are ignored with a warning.
    pub fn with_overrides_from<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup("SHM_WORKER_LAUNCH_TIMEOUT") {
            let parsed = value
                .trim()
                .parse::<f64>()
                .ok()
                .and_then(|secs| Duration::try_from_secs_f64(secs).ok());
            match parsed {
                Some(timeout) => self.launch_timeout = timeout,
                None => warn!(%value, "Ignoring invalid SHM_WORKER_LAUNCH_TIMEOUT"),
            }
        }

        if let Some(value) = lookup("SHM_WORKER_CAPACITY") {
            match value.trim().parse::<usize>() {
                Ok(capacity) if capacity >= 1 => self.capacity = capacity,
                _ => warn!(%value, "Ignoring invalid SHM_WORKER_CAPACITY"),
            }
        }

        if let Some(value) = lookup("SHM_WORKER_POLL_INTERVAL_MS") {
            match value.trim().parse::<u64>() {
                Ok(ms) => self.poll_interval = Duration::from_millis(ms),
                Err(_) => warn!(%value, "Ignoring invalid SHM_WORKER_POLL_INTERVAL_MS"),
            }
        }

        if let Some(value) = lookup("SHM_WORKER_VERBOSE") {
            match parse_bool(&value) {
                Some(verbose) => self.verbose = verbose,
                None => warn!(%value, "Ignoring invalid SHM_WORKER_VERBOSE"),
            }
        }

        self
    }

    /// Reject settings no worker can run with.
    pub fn validate(&self) -> Result<()> {
        if self.capacity == 0 {
            return Err(WorkerError::InvalidConfig(
                "capacity must be at least 1".into(),
            ));
        }
        if self.launch_timeout.is_zero() {
            return Err(WorkerError::InvalidConfig(
                "launch timeout must be positive".into(),
            ));
        }
        Ok(())
    }
}

/// Parse a boolean flag value.
pub fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" | "" => Some(false),
        _ => None,
    }
}
