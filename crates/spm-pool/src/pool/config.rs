//! Pool configuration types

use std::time::Duration;

use serde::{Deserialize, Serialize};

const DEFAULT_MAX_SIZE: usize = 20_000;
const DEFAULT_REAPER_INTERVAL_MS: u64 = 300_000;
const DEFAULT_STALE_THRESHOLD_MS: u64 = 150_000;
const DEFAULT_REPACE_INTERVAL_MS: u64 = 3_600_000;
const DEFAULT_KEEP_ALIVE_QUERY: &str = "select 1";

/// Configuration for a connection pool
///
/// Controls the capacity bound, leak reclamation timing and keep-alive
/// behaviour. The number of connections opened at startup comes from the
/// pool's `DatabaseConfig`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Maximum number of connections the pool will ever hold
    max_size: usize,
    /// How often the reaper scans for leaked resources, in milliseconds
    reaper_interval_ms: u64,
    /// Age in milliseconds after which a checked-out resource counts as leaked
    stale_threshold_ms: u64,
    /// Whether to run the keep-alive pacer
    keep_alive: bool,
    /// Statement used for keep-alive round-trips
    keep_alive_query: String,
    /// How often the pacer re-derives its ping interval, in milliseconds
    repace_interval_ms: u64,
}

impl PoolConfig {
    /// Create a new pool configuration with the given capacity bound
    ///
    /// # Panics
    ///
    /// Panics if `max_size` is 0.
    pub fn new(max_size: usize) -> Self {
        assert!(
            max_size > 0,
            "max_size must be greater than 0, got {}",
            max_size
        );

        Self {
            max_size,
            reaper_interval_ms: DEFAULT_REAPER_INTERVAL_MS,
            stale_threshold_ms: DEFAULT_STALE_THRESHOLD_MS,
            keep_alive: true,
            keep_alive_query: DEFAULT_KEEP_ALIVE_QUERY.to_string(),
            repace_interval_ms: DEFAULT_REPACE_INTERVAL_MS,
        }
    }

    /// Set the capacity bound
    pub fn with_max_size(mut self, max_size: usize) -> Self {
        self.max_size = max_size;
        self
    }

    /// Set the reaper scan interval in milliseconds
    pub fn with_reaper_interval_ms(mut self, interval_ms: u64) -> Self {
        self.reaper_interval_ms = interval_ms;
        self
    }

    /// Set the staleness threshold in milliseconds
    pub fn with_stale_threshold_ms(mut self, threshold_ms: u64) -> Self {
        self.stale_threshold_ms = threshold_ms;
        self
    }

    /// Enable or disable the keep-alive pacer
    pub fn with_keep_alive(mut self, enabled: bool) -> Self {
        self.keep_alive = enabled;
        self
    }

    /// Set the statement used for keep-alive round-trips
    pub fn with_keep_alive_query(mut self, query: &str) -> Self {
        self.keep_alive_query = query.to_string();
        self
    }

    /// Set the pacer's re-pacing interval in milliseconds
    pub fn with_repace_interval_ms(mut self, interval_ms: u64) -> Self {
        self.repace_interval_ms = interval_ms;
        self
    }

    /// Get the capacity bound
    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Get the reaper scan interval as a Duration
    pub fn reaper_interval(&self) -> Duration {
        Duration::from_millis(self.reaper_interval_ms)
    }

    /// Get the staleness threshold as a Duration
    pub fn stale_threshold(&self) -> Duration {
        Duration::from_millis(self.stale_threshold_ms)
    }

    pub fn keep_alive(&self) -> bool {
        self.keep_alive
    }

    pub fn keep_alive_query(&self) -> &str {
        &self.keep_alive_query
    }

    /// Get the re-pacing interval as a Duration
    pub fn repace_interval(&self) -> Duration {
        Duration::from_millis(self.repace_interval_ms)
    }

    /// Check values that deserialization cannot enforce on its own
    pub(crate) fn validate(&self) -> spm_core::Result<()> {
        if self.max_size == 0 {
            return Err(spm_core::SpmError::Configuration(
                "max_size must be greater than 0".into(),
            ));
        }
        if self.reaper_interval_ms == 0 || self.repace_interval_ms == 0 {
            return Err(spm_core::SpmError::Configuration(
                "reaper and re-pacing intervals must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}

impl Default for PoolConfig {
    /// Create a default pool configuration
    ///
    /// Defaults:
    /// - max_size: 20000
    /// - reaper_interval: 300 seconds
    /// - stale_threshold: 150 seconds
    /// - keep_alive: enabled, `select 1`, re-paced hourly
    fn default() -> Self {
        Self::new(DEFAULT_MAX_SIZE)
    }
}
