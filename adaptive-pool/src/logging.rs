// SPDX-License-Identifier: MIT
//
// Per-instance logger. Records go through the `log` facade with the pool name
// as target; the host process decides where they end up (e.g. env_logger).

use std::fmt;

use log::{Level, LevelFilter};

use crate::options::LogLevel;

#[derive(Debug, Clone)]
pub struct PoolLog {
    target: String,
    level: LevelFilter,
}

impl PoolLog {
    pub fn new(target: impl Into<String>, level: LogLevel) -> Self {
        Self {
            target: target.into(),
            level: level.as_filter(),
        }
    }

    #[cfg(test)]
    pub(crate) fn target(&self) -> &str {
        &self.target
    }

    #[cfg(test)]
    pub(crate) fn enabled(&self, level: Level) -> bool {
        level <= self.level && log::log_enabled!(target: &self.target, level)
    }

    pub fn log(&self, level: Level, args: fmt::Arguments<'_>) {
        if level <= self.level {
            log::log!(target: &self.target, level, "{}", args);
        }
    }

    pub fn error(&self, args: fmt::Arguments<'_>) {
        self.log(Level::Error, args);
    }

    pub fn info(&self, args: fmt::Arguments<'_>) {
        self.log(Level::Info, args);
    }

    pub fn debug(&self, args: fmt::Arguments<'_>) {
        self.log(Level::Debug, args);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn silent_only_lets_errors_through() {
        let log = PoolLog::new("test-pool", LogLevel::Silent);
        // No logger is installed, so `enabled` is false, but the instance filter
        // must already reject anything above error.
        assert!(!log.enabled(Level::Info));
        assert!(!log.enabled(Level::Debug));
        assert_eq!(log.target(), "test-pool");
    }
}
