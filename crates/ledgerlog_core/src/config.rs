//! Store configuration.

use std::path::PathBuf;
use std::time::Duration;

/// Configuration for opening an entry log store.
#[derive(Debug, Clone)]
pub struct Config {
    /// Storage directories for segment files.
    pub ledger_dirs: Vec<PathBuf>,

    /// Segment size threshold (bytes) that triggers rollover.
    pub entry_log_size_limit: u64,

    /// Interval between garbage collection cycles.
    pub gc_wait_time: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ledger_dirs: Vec::new(),
            entry_log_size_limit: 2 * 1024 * 1024 * 1024, // 2 GiB
            gc_wait_time: Duration::from_millis(1000),
        }
    }
}

impl Config {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a storage directory.
    #[must_use]
    pub fn ledger_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.ledger_dirs.push(dir.into());
        self
    }

    /// Sets the segment size threshold.
    #[must_use]
    pub const fn entry_log_size_limit(mut self, limit: u64) -> Self {
        self.entry_log_size_limit = limit;
        self
    }

    /// Sets the garbage collection interval.
    #[must_use]
    pub const fn gc_wait_time(mut self, interval: Duration) -> Self {
        self.gc_wait_time = interval;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = Config::default();
        assert!(config.ledger_dirs.is_empty());
        assert_eq!(config.entry_log_size_limit, 2 * 1024 * 1024 * 1024);
        assert_eq!(config.gc_wait_time, Duration::from_millis(1000));
    }

    #[test]
    fn builder_pattern() {
        let config = Config::new()
            .ledger_dir("/data/a")
            .ledger_dir("/data/b")
            .entry_log_size_limit(2048)
            .gc_wait_time(Duration::from_millis(50));

        assert_eq!(config.ledger_dirs.len(), 2);
        assert_eq!(config.entry_log_size_limit, 2048);
        assert_eq!(config.gc_wait_time, Duration::from_millis(50));
    }
}
