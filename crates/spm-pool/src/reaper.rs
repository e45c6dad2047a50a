//! Leaked-resource reclamation
//!
//! Two cooperating tasks per pool:
//!
//! - the **scanner** wakes every `reaper_interval`, drains tracking entries
//!   older than `stale_threshold` and queues them for reclamation;
//! - the **closer** takes queued resources one at a time and closes them,
//!   returning connections to the pool and releasing cursors.
//!
//! Both hold only a weak reference to the pool so they never keep it alive.

use std::sync::{Arc, Weak};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::pool::PoolShared;
use crate::pool::tracker::TrackedResource;


pub(crate) fn spawn(
    pool: &Arc<PoolShared>,
    reclaim_rx: mpsc::UnboundedReceiver<TrackedResource>,
) -> Vec<JoinHandle<()>> {
    let scanner = tokio::spawn(scan_loop(Arc::downgrade(pool)));
    let closer = tokio::spawn(close_loop(Arc::downgrade(pool), reclaim_rx));
    vec![scanner, closer]
}

/// Queue every stale resource of `pool` for the closer. Returns how many
/// were queued.
pub(crate) fn scan_once(pool: &PoolShared) -> usize {
    let stale = pool.tracker.drain_stale(pool.config.stale_threshold());
    let mut queued = 0;
    for resource in stale {
        if pool.reclaim_tx.send(resource).is_err() {
            tracing::warn!(pool = %pool.name(), "reclamation queue closed");
            break;
        }
        queued += 1;
    }
    if queued > 0 {
        tracing::info!(pool = %pool.name(), queued, "reclaiming resources checked out past the staleness threshold");
    }
    queued
}

async fn scan_loop(pool: Weak<PoolShared>) {
    let Some(period) = pool.upgrade().map(|pool| pool.config.reaper_interval()) else {
        return;
    };

    loop {
        tokio::time::sleep(period).await;

        // If the last handle to the pool was dropped while we were sleeping
        let Some(pool) = pool.upgrade() else {
            break;
        };
        tracing::debug!(pool = %pool.name(), tracked = pool.tracker.len(), "scanning for stale resources");
        scan_once(&pool);
    }
    tracing::debug!("reaper scanner stopped");
}

async fn close_loop(
    pool: Weak<PoolShared>,
    mut reclaim_rx: mpsc::UnboundedReceiver<TrackedResource>,
) {
    while let Some(resource) = reclaim_rx.recv().await {
        match resource {
            TrackedResource::Connection { slot, lease } => {
                let Some(pool) = pool.upgrade() else {
                    break;
                };
                tracing::debug!(pool = %pool.name(), connection = slot.id(), "reclaiming leaked connection");
                if let Some(slot) = pool.release(&slot, lease)
                    && let Err(e) = slot.shutdown().await
                {
                    tracing::warn!(connection = slot.id(), error = %e, "failed to close reclaimed connection");
                }
            }
            TrackedResource::Cursor(handle) => {
                if let Some(handle) = handle.upgrade()
                    && handle.close()
                {
                    tracing::debug!(cursor = handle.id(), "released leaked cursor");
                }
            }
        }
    }
    tracing::debug!("reaper closer stopped");
}
