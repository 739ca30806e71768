// SPDX-License-Identifier: MIT
//
// Construction-time options of a pool and their normalization.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Name used for the log target and the thread names when none is given.
pub const DEFAULT_NAME: &str = "adaptive-pool";
/// Time after which an idle worker retires if capacity exceeds demand.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(10);
pub const MIN_IDLE_TIMEOUT: Duration = Duration::from_millis(10);
/// Worker ceiling when unspecified. `0` means unbounded.
pub const DEFAULT_MAX_WORKERS: u32 = 64;
/// Size of the bounded buffer that holds jobs no idle worker could take.
pub const DEFAULT_QUEUE_CAPACITY: usize = 128;
pub const MIN_QUEUE_CAPACITY: usize = 128;
/// Comfortable size for the output channels, so that a slow reader rarely misses an outcome.
pub const DEFAULT_OUTPUT_CAPACITY: usize = 100;
/// Workers started by the constructor (never more than `max_workers`).
pub const INITIAL_WORKERS: u32 = 2;

/// Verbosity of a single pool instance.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    #[default]
    /// Only errors (rejected submissions, worker panics, spawn failures)
    Silent,
    /// Errors and lifecycle events of workers and shutdown
    Info,
    /// Everything, including per-job handoff traces
    Debug,
}

impl LogLevel {
    pub fn as_filter(self) -> log::LevelFilter {
        match self {
            LogLevel::Silent => log::LevelFilter::Error,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LogLevel::Silent => "silent",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
        };
        f.write_str(s)
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "silent" => Ok(LogLevel::Silent),
            "info" => Ok(LogLevel::Info),
            "debug" => Ok(LogLevel::Debug),
            other => Err(format!("unknown log level '{other}'")),
        }
    }
}

/// Options of a pool. Unset (zero) fields take the documented defaults and
/// values below a minimum are clamped up, never rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolOptions {
    pub name: String,
    /// Upper bound of live workers, `0` scales purely on demand.
    pub max_workers: u32,
    pub idle_timeout: Duration,
    pub queue_capacity: usize,
    /// Capacity of the error channel and of the result channel.
    pub output_capacity: usize,
    pub log_level: LogLevel,
}

impl Default for PoolOptions {
    fn default() -> Self {
        Self {
            name: DEFAULT_NAME.to_string(),
            max_workers: DEFAULT_MAX_WORKERS,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            output_capacity: DEFAULT_OUTPUT_CAPACITY,
            log_level: LogLevel::default(),
        }
    }
}

impl PoolOptions {
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn max_workers(mut self, max_workers: u32) -> Self {
        self.max_workers = max_workers;
        self
    }

    pub fn idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    pub fn queue_capacity(mut self, queue_capacity: usize) -> Self {
        self.queue_capacity = queue_capacity;
        self
    }

    pub fn output_capacity(mut self, output_capacity: usize) -> Self {
        self.output_capacity = output_capacity;
        self
    }

    pub fn log_level(mut self, log_level: LogLevel) -> Self {
        self.log_level = log_level;
        self
    }

    /// Apply defaults and minimums. The result is what the engine runs with.
    pub fn normalize(&self) -> Settings {
        let name = if self.name.trim().is_empty() {
            DEFAULT_NAME.to_string()
        } else {
            self.name.clone()
        };

        let idle_timeout = if self.idle_timeout.is_zero() {
            DEFAULT_IDLE_TIMEOUT
        } else {
            self.idle_timeout.max(MIN_IDLE_TIMEOUT)
        };

        let queue_capacity = match self.queue_capacity {
            0 => DEFAULT_QUEUE_CAPACITY,
            n => n.max(MIN_QUEUE_CAPACITY),
        };

        let output_capacity = match self.output_capacity {
            0 => DEFAULT_OUTPUT_CAPACITY,
            n => n,
        };

        let initial_workers = match self.max_workers {
            0 => INITIAL_WORKERS,
            max => INITIAL_WORKERS.min(max),
        };

        Settings {
            name,
            max_workers: self.max_workers,
            initial_workers,
            idle_timeout,
            queue_capacity,
            output_capacity,
            log_level: self.log_level,
        }
    }
}

/// Normalized options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub name: String,
    pub max_workers: u32,
    pub initial_workers: u32,
    pub idle_timeout: Duration,
    pub queue_capacity: usize,
    pub output_capacity: usize,
    pub log_level: LogLevel,
}
