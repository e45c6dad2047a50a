//! Pooled connection handle and the slot it leases

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::Mutex;
use spm_core::{DriverConnection, Result, SpmError};

use crate::pool::PoolShared;
use crate::pool::tracker::{ResourceKey, TrackedResource};
use crate::result::{CursorHandle, ResultSet};

static NEXT_SLOT_ID: AtomicU64 = AtomicU64::new(1);
static NEXT_LEASE: AtomicU64 = AtomicU64::new(1);

/// Lease numbers are process-wide so a stale handle can never match a lease
/// handed out later, even after its slot moved to another pool.
pub(crate) fn next_lease() -> u64 {
    NEXT_LEASE.fetch_add(1, Ordering::Relaxed)
}

/// One physical connection owned by a pool.
///
/// `holder` is 0 while the slot sits in the idle queue and holds the lease
/// number of the current checkout otherwise.
pub(crate) struct Slot {
    id: u64,
    link: tokio::sync::Mutex<Box<dyn DriverConnection>>,
    holder: AtomicU64,
    autocommit: AtomicBool,
    last_result: Mutex<Option<Arc<CursorHandle>>>,
}

impl Slot {
    pub(crate) fn new(link: Box<dyn DriverConnection>) -> Self {
        Self {
            id: NEXT_SLOT_ID.fetch_add(1, Ordering::Relaxed),
            link: tokio::sync::Mutex::new(link),
            holder: AtomicU64::new(0),
            autocommit: AtomicBool::new(true),
            last_result: Mutex::new(None),
        }
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    pub(crate) fn is_held_by(&self, lease: u64) -> bool {
        self.holder.load(Ordering::SeqCst) == lease
    }

    pub(crate) fn assign(&self, lease: u64) {
        self.holder.store(lease, Ordering::SeqCst);
    }

    /// Give up `lease`. Returns false if the lease was already given up.
    pub(crate) fn release(&self, lease: u64) -> bool {
        let released = self
            .holder
            .compare_exchange(lease, 0, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok();
        if released {
            self.last_result.lock().take();
        }
        released
    }

    /// Restore the default state a caller expects from a fresh checkout
    pub(crate) async fn reset(&self) -> Result<()> {
        self.last_result.lock().take();
        self.link.lock().await.set_autocommit(true).await?;
        self.autocommit.store(true, Ordering::SeqCst);
        Ok(())
    }

    /// Close the underlying driver connection
    pub(crate) async fn shutdown(&self) -> Result<()> {
        tracing::debug!(slot = self.id, "closing driver connection");
        self.link.lock().await.close().await
    }
}

/// A connection checked out of a [`ConnectionPool`](crate::ConnectionPool)
///
/// Calling [`close`](Self::close) hands the connection back to its pool.
/// Dropping the handle without closing it does the same, so a connection is
/// only lost to the pool while some handle to it is kept alive. Handles kept
/// alive past the pool's staleness threshold are reclaimed by the reaper;
/// once that happens every operation on the stale handle fails with
/// [`SpmError::ConnectionClosed`].
pub struct PooledConnection {
    slot: Arc<Slot>,
    pool: Arc<PoolShared>,
    lease: u64,
    closed: AtomicBool,
}

impl PooledConnection {
    pub(crate) fn new(slot: Arc<Slot>, pool: Arc<PoolShared>, lease: u64) -> Self {
        Self {
            slot,
            pool,
            lease,
            closed: AtomicBool::new(false),
        }
    }

    /// Identifier of the physical connection behind this handle
    pub fn id(&self) -> u64 {
        self.slot.id()
    }

    /// Whether this handle can no longer be used, either because it was
    /// closed or because the reaper reclaimed the connection.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst) || !self.slot.is_held_by(self.lease)
    }

    /// Whether the connection is in autocommit mode
    pub fn autocommit(&self) -> bool {
        self.slot.autocommit.load(Ordering::SeqCst)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            Err(SpmError::ConnectionClosed)
        } else {
            Ok(())
        }
    }

    /// Start a transaction by turning autocommit off
    pub async fn begin_transaction(&self) -> Result<()> {
        let mut link = self.slot.link.lock().await;
        self.ensure_open()?;
        link.set_autocommit(false).await?;
        self.slot.autocommit.store(false, Ordering::SeqCst);
        tracing::debug!(connection = self.id(), "transaction started");
        Ok(())
    }

    /// Commit the open transaction and return to autocommit mode.
    ///
    /// Without an open transaction this is a no-op.
    pub async fn commit(&self) -> Result<()> {
        let mut link = self.slot.link.lock().await;
        self.ensure_open()?;
        if self.autocommit() {
            return Ok(());
        }
        link.commit().await?;
        link.set_autocommit(true).await?;
        self.slot.autocommit.store(true, Ordering::SeqCst);
        tracing::debug!(connection = self.id(), "transaction committed");
        Ok(())
    }

    /// Roll back the current transaction. Autocommit mode is left as it is.
    pub async fn rollback(&self) -> Result<()> {
        let mut link = self.slot.link.lock().await;
        self.ensure_open()?;
        link.rollback().await?;
        tracing::debug!(connection = self.id(), "transaction rolled back");
        Ok(())
    }

    /// Execute a statement and return its result.
    ///
    /// The result becomes this connection's current result. Only the current
    /// result's cursor is tracked, so the reaper can release it if it is kept
    /// around too long; earlier results are left to their owners.
    ///
    /// Fails with `ConnectionClosed` if the connection was reclaimed while
    /// the statement ran.
    #[tracing::instrument(skip(self, sql), fields(connection = self.id(), sql_preview = %sql.chars().take(100).collect::<String>()))]
    pub async fn execute(&self, sql: &str) -> Result<ResultSet> {
        let mut link = self.slot.link.lock().await;
        self.ensure_open()?;
        let cursor = link.execute(sql).await?;

        // Recorded under the link lock so the next holder's reset runs after it
        let (result, handle) = ResultSet::new(cursor, &self.pool);
        self.pool
            .tracker
            .track(self.slot.id(), TrackedResource::Cursor(Arc::downgrade(&handle)));
        let previous = self.slot.last_result.lock().replace(handle);
        if let Some(previous) = previous {
            self.pool.tracker.untrack(ResourceKey::Cursor(previous.id()));
        }
        if !self.slot.is_held_by(self.lease) {
            self.slot.last_result.lock().take();
            result.close();
            tracing::debug!("connection reclaimed while the statement ran");
            return Err(SpmError::ConnectionClosed);
        }
        drop(link);

        tracing::debug!(row_count = result.row_count(), "statement executed");
        Ok(result)
    }

    /// Return the connection to its pool.
    ///
    /// Idempotent. If the pool was shut down while this connection was
    /// checked out, the driver connection is closed instead.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(slot) = self.pool.release(&self.slot, self.lease)
            && let Err(e) = slot.shutdown().await
        {
            tracing::warn!(connection = slot.id(), error = %e, "failed to close connection returned to stopped pool");
        }
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        tracing::debug!(connection = self.id(), "connection dropped without close, returning it");
        let Some(slot) = self.pool.release(&self.slot, self.lease) else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = slot.shutdown().await {
                        tracing::warn!(connection = slot.id(), error = %e, "failed to close connection returned to stopped pool");
                    }
                });
            }
            Err(_) => {
                tracing::warn!(connection = slot.id(), "no runtime to close connection returned to stopped pool");
            }
        }
    }
}

impl std::fmt::Debug for PooledConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledConnection")
            .field("id", &self.id())
            .field("lease", &self.lease)
            .field("closed", &self.is_closed())
            .finish()
    }
}
