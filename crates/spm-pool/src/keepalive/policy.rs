//! Pacing policy: maps measured checkout load to a keep-alive interval

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Measured utilization over the current pacing window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadBracket {
    VeryLow,
    Low,
    Medium,
    High,
    /// At or above the top bracket: real traffic keeps connections alive
    Saturated,
}

/// Outcome of one re-pacing decision
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacingDecision {
    pub bracket: LoadBracket,
    /// New ping interval, or `None` to keep the current one
    pub interval: Option<Duration>,
    /// Whether the checkout counter starts again from zero
    pub reset_counter: bool,
}

/// Decides how often the keep-alive pacer pings, from recent checkout volume.
///
/// Kept free of timers and pool state so it can be tested on its own.
pub trait PacingPolicy: Send + Sync {
    /// Interval used before the first decision and after a day change
    fn initial_interval(&self) -> Duration;

    /// Derive the next interval from the checkouts counted since the counter
    /// was last reset, relative to the pool's initial size.
    fn decide(&self, checkouts: u64, initial_size: usize) -> PacingDecision;
}

/// Default policy: four brackets at quarters of the pool's initial size.
///
/// | bracket   | checkouts `c`, initial size `s` | interval   |
/// |-----------|---------------------------------|------------|
/// | VeryLow   | `c < s/4`                       | very_low   |
/// | Low       | `c < s/2`                       | low        |
/// | Medium    | `c < 3s/4`                      | medium     |
/// | High      | `c < s`                         | high       |
/// | Saturated | `c >= s`                        | unchanged  |
///
/// Only the saturated bracket resets the counter; below it the counter keeps
/// accumulating across windows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BracketPolicy {
    very_low: Duration,
    low: Duration,
    medium: Duration,
    high: Duration,
}

impl BracketPolicy {
    /// Create a policy with intervals for the very low, low, medium and high
    /// brackets, in that order.
    pub fn new(intervals: [Duration; 4]) -> Self {
        let [very_low, low, medium, high] = intervals;
        Self {
            very_low,
            low,
            medium,
            high,
        }
    }

    /// Place `checkouts` into a bracket for a pool of `initial_size`
    pub fn classify(checkouts: u64, initial_size: usize) -> LoadBracket {
        let size = initial_size as u64;
        let quarters = checkouts.saturating_mul(4);
        if quarters < size {
            LoadBracket::VeryLow
        } else if quarters < size.saturating_mul(2) {
            LoadBracket::Low
        } else if quarters < size.saturating_mul(3) {
            LoadBracket::Medium
        } else if checkouts < size {
            LoadBracket::High
        } else {
            LoadBracket::Saturated
        }
    }
}

impl Default for BracketPolicy {
    /// 60s, 2min, 5min and 10min
    fn default() -> Self {
        Self::new([
            Duration::from_secs(60),
            Duration::from_secs(120),
            Duration::from_secs(300),
            Duration::from_secs(600),
        ])
    }
}

impl PacingPolicy for BracketPolicy {
    fn initial_interval(&self) -> Duration {
        self.very_low
    }

    fn decide(&self, checkouts: u64, initial_size: usize) -> PacingDecision {
        let bracket = Self::classify(checkouts, initial_size);
        let interval = match bracket {
            LoadBracket::VeryLow => Some(self.very_low),
            LoadBracket::Low => Some(self.low),
            LoadBracket::Medium => Some(self.medium),
            LoadBracket::High => Some(self.high),
            LoadBracket::Saturated => None,
        };
        PacingDecision {
            bracket,
            interval,
            reset_counter: bracket == LoadBracket::Saturated,
        }
    }
}
