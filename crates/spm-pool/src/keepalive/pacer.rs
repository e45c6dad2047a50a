//! Keep-alive pacer task

use std::sync::atomic::Ordering;
use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::{Local, NaiveDate};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use super::ping::keep_alive_round_trip;
use super::policy::{LoadBracket, PacingDecision, PacingPolicy};
use crate::ConnectionPool;
use crate::pool::PoolShared;

/// Pacing state carried between iterations of the pacer loop.
///
/// Holds the calendar day the state belongs to, the current ping interval
/// and the bracket chosen by the last decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PacerState {
    day: NaiveDate,
    interval: Duration,
    bracket: Option<LoadBracket>,
}

impl PacerState {
    pub fn new(today: NaiveDate, policy: &dyn PacingPolicy) -> Self {
        Self {
            day: today,
            interval: policy.initial_interval(),
            bracket: None,
        }
    }

    pub fn day(&self) -> NaiveDate {
        self.day
    }

    /// Current ping interval
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Bracket chosen by the last decision, `None` before the first one
    pub fn bracket(&self) -> Option<LoadBracket> {
        self.bracket
    }

    /// Start over when the calendar day changed. Returns true if it did; the
    /// caller then resets its checkout counter too.
    pub fn observe_day(&mut self, today: NaiveDate, policy: &dyn PacingPolicy) -> bool {
        if today == self.day {
            return false;
        }
        *self = Self::new(today, policy);
        true
    }

    /// Apply one re-pacing decision for the measured `checkouts`
    pub fn repace(
        &mut self,
        checkouts: u64,
        initial_size: usize,
        policy: &dyn PacingPolicy,
    ) -> PacingDecision {
        let decision = policy.decide(checkouts, initial_size);
        if let Some(interval) = decision.interval {
            self.interval = interval;
        }
        self.bracket = Some(decision.bracket);
        decision
    }
}

pub(crate) fn spawn(pool: &Arc<PoolShared>, policy: Arc<dyn PacingPolicy>) -> JoinHandle<()> {
    tokio::spawn(run(Arc::downgrade(pool), policy))
}

async fn run(pool: Weak<PoolShared>, policy: Arc<dyn PacingPolicy>) {
    let Some((repace_every, query, initial_size)) = pool.upgrade().map(|pool| {
        (
            pool.config.repace_interval(),
            pool.config.keep_alive_query().to_string(),
            pool.database.initial_size,
        )
    }) else {
        return;
    };

    let mut state = PacerState::new(Local::now().date_naive(), policy.as_ref());
    let mut next_repace = Instant::now() + repace_every;

    loop {
        // If the last handle to the pool was dropped while we were sleeping
        let Some(shared) = pool.upgrade() else {
            break;
        };

        if state.observe_day(Local::now().date_naive(), policy.as_ref()) {
            shared.checkouts.store(0, Ordering::SeqCst);
            tracing::debug!(pool = %shared.name(), day = %state.day(), "new day, keep-alive pacing reset");
        }

        if Instant::now() >= next_repace {
            let checkouts = shared.checkouts.load(Ordering::SeqCst);
            let decision = state.repace(checkouts, initial_size, policy.as_ref());
            if decision.reset_counter {
                shared.checkouts.store(0, Ordering::SeqCst);
            }
            tracing::debug!(
                pool = %shared.name(),
                checkouts,
                bracket = ?decision.bracket,
                interval = ?state.interval(),
                "keep-alive interval re-paced"
            );
            next_repace = Instant::now() + repace_every;
        }

        if !shared.is_stopped() {
            let handle = ConnectionPool::from_shared(shared.clone());
            match keep_alive_round_trip(&handle, &query).await {
                Ok(latency) => {
                    tracing::trace!(pool = %shared.name(), ?latency, "keep-alive ping");
                }
                Err(e) => {
                    tracing::warn!(pool = %shared.name(), error = %e, "keep-alive ping failed");
                }
            }
        }

        let interval = state.interval();
        // Don't hold a reference to the pool while sleeping.
        drop(shared);
        tokio::time::sleep(interval).await;
    }
    tracing::debug!("keep-alive pacer stopped");
}
