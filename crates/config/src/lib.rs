//! # Config - RiptideTS memdb settings
//!
//! Every tunable of the in-memory write path lives in [`MemDbConfig`]. The
//! values can be built in code (tests, benches) or read from the environment
//! (the CLI):
//!
//! ```text
//! RIPTIDE_TIME_WINDOW    slots per block              (default: 60)
//! RIPTIDE_FLUSH_MB       memory threshold in MiB      (default: 64)
//! RIPTIDE_POOL_MAX_FREE  recycled blocks kept per type (default: 1024)
//! ```

use anyhow::Result;

/// Default number of slots a single block holds before the window rolls.
pub const DEFAULT_TIME_WINDOW: u32 = 60;
/// Default memory threshold (64 MiB) after which the memdb reports itself full.
pub const DEFAULT_FLUSH_THRESHOLD: usize = 64 * 1024 * 1024;
/// Default number of released blocks the pool keeps per value type.
pub const DEFAULT_POOL_MAX_FREE: usize = 1024;

/// Reads a configuration value from the environment, falling back to `default`.
pub fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Settings shared by the block pool and the memdb.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemDbConfig {
    /// Number of contiguous slots per block (the time window).
    pub time_window: u32,
    /// Memory size in bytes at which the memdb reports itself full and a
    /// flush should be scheduled.
    pub flush_threshold: usize,
    /// Upper bound of released blocks retained per value type for reuse.
    pub pool_max_free: usize,
}

impl Default for MemDbConfig {
    fn default() -> Self {
        Self {
            time_window: DEFAULT_TIME_WINDOW,
            flush_threshold: DEFAULT_FLUSH_THRESHOLD,
            pool_max_free: DEFAULT_POOL_MAX_FREE,
        }
    }
}

impl MemDbConfig {
    /// Builds a config with the given time window and default everything else.
    pub fn with_time_window(time_window: u32) -> Self {
        Self {
            time_window,
            ..Self::default()
        }
    }

    /// Loads the config from `RIPTIDE_*` environment variables.
    ///
    /// Unparseable values fall back to the defaults; the result is validated
    /// before it is returned.
    pub fn from_env() -> Result<Self> {
        let time_window: u32 = env_or("RIPTIDE_TIME_WINDOW", "60")
            .parse()
            .unwrap_or(DEFAULT_TIME_WINDOW);
        let flush_mb: usize = env_or("RIPTIDE_FLUSH_MB", "64").parse().unwrap_or(64);
        let pool_max_free: usize = env_or("RIPTIDE_POOL_MAX_FREE", "1024")
            .parse()
            .unwrap_or(DEFAULT_POOL_MAX_FREE);

        let config = Self {
            time_window,
            flush_threshold: flush_mb.saturating_mul(1024 * 1024),
            pool_max_free,
        };
        config.validate()?;
        Ok(config)
    }

    /// Rejects settings the write path cannot run with.
    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(self.time_window > 0, "time window must be at least one slot");
        anyhow::ensure!(
            self.time_window <= u16::MAX as u32,
            "time window too large: {} slots (max {})",
            self.time_window,
            u16::MAX
        );
        anyhow::ensure!(self.flush_threshold > 0, "flush threshold must not be zero");
        Ok(())
    }
}

#[cfg(test)]
mod tests;
