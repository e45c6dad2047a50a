//! Pool statistics types

use serde::{Deserialize, Serialize};

/// Snapshot of a connection pool's state
///
/// Every field is read without a global lock, so under concurrent checkout
/// the snapshot is advisory only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolStats {
    /// Total number of live connections (idle + checked out)
    total: usize,
    /// Number of idle connections available in the pool
    idle: usize,
    /// Number of entries in the checkout tracking set
    tracked: usize,
    /// Checkouts counted since the pacer last reset its counter
    checkouts: u64,
}

impl PoolStats {
    /// Create new pool statistics
    pub fn new(total: usize, idle: usize, tracked: usize, checkouts: u64) -> Self {
        Self {
            total,
            idle,
            tracked,
            checkouts,
        }
    }

    /// Get the total number of connections
    pub fn total(&self) -> usize {
        self.total
    }

    /// Get the number of idle connections
    pub fn idle(&self) -> usize {
        self.idle
    }

    /// Get the number of connections currently checked out
    pub fn active(&self) -> usize {
        self.total.saturating_sub(self.idle)
    }

    /// Get the number of tracked connections and cursors
    pub fn tracked(&self) -> usize {
        self.tracked
    }

    pub fn checkouts(&self) -> u64 {
        self.checkouts
    }

    /// Calculate pool utilization as a percentage (0.0 to 1.0)
    ///
    /// Returns 0.0 if total is 0 to avoid division by zero.
    pub fn utilization(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.active() as f64 / self.total as f64
        }
    }
}

impl Default for PoolStats {
    fn default() -> Self {
        Self::new(0, 0, 0, 0)
    }
}
