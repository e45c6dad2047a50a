//! Connection pool implementation

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use spm_core::{DatabaseConfig, Driver, Result, SpmError};
use tokio::sync::{Notify, mpsc};
use tokio::task::JoinHandle;

use super::config::PoolConfig;
use super::stats::PoolStats;
use super::tracker::{ResourceTracker, TrackedResource};
use crate::connection::{PooledConnection, Slot, next_lease};
use crate::keepalive::{self, BracketPolicy, PacingPolicy};
use crate::reaper;

/// Whether a checkout feeds the pacer's load measurement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CheckoutKind {
    Caller,
    KeepAlive,
}

/// State shared by every handle to one pool and by its background tasks
pub(crate) struct PoolShared {
    pub(crate) database: DatabaseConfig,
    pub(crate) config: PoolConfig,
    driver: Arc<dyn Driver>,
    /// Available idle connections
    idle: Mutex<VecDeque<Arc<Slot>>>,
    /// Signalled whenever a connection is pushed onto `idle`
    available: Notify,
    /// Live connections, idle or checked out
    total: AtomicUsize,
    stopped: AtomicBool,
    /// Caller checkouts since the pacer last reset the counter
    pub(crate) checkouts: AtomicU64,
    pub(crate) tracker: ResourceTracker,
    /// Reclamation queue feeding the reaper's closer
    pub(crate) reclaim_tx: mpsc::UnboundedSender<TrackedResource>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl PoolShared {
    pub(crate) fn name(&self) -> &str {
        &self.database.name
    }

    pub(crate) fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Take back a checked-out connection.
    ///
    /// Returns `None` when the connection went back to the idle queue or
    /// `lease` had already been given up. Returns the slot when the pool is
    /// stopped; the caller must then shut it down.
    pub(crate) fn release(&self, slot: &Arc<Slot>, lease: u64) -> Option<Arc<Slot>> {
        if !slot.release(lease) {
            return None;
        }
        self.tracker.untrack_connection(slot.id());

        let mut idle = self.idle.lock();
        if self.is_stopped() {
            drop(idle);
            self.total.fetch_sub(1, Ordering::SeqCst);
            tracing::debug!(pool = %self.name(), connection = slot.id(), "pool stopped, closing returned connection");
            return Some(slot.clone());
        }
        idle.push_back(slot.clone());
        drop(idle);

        self.available.notify_one();
        tracing::debug!(pool = %self.name(), connection = slot.id(), "connection returned");
        None
    }

    /// Take a connection out of the pool for good, giving up `lease`.
    ///
    /// Returns false if `lease` had already been given up; the connection
    /// then belongs to someone else and must be left alone.
    pub(crate) fn discard(&self, slot: &Slot, lease: u64) -> bool {
        if !slot.release(lease) {
            return false;
        }
        self.tracker.untrack_connection(slot.id());
        self.total.fetch_sub(1, Ordering::SeqCst);
        true
    }

    /// Reserve room for up to `requested` new connections without exceeding
    /// `max_size`. Returns how many were granted.
    fn reserve(&self, requested: usize) -> usize {
        let max_size = self.config.max_size();
        let mut granted = 0;
        let _ = self
            .total
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |total| {
                granted = requested.min(max_size.saturating_sub(total));
                Some(total + granted)
            });
        granted
    }

    fn push_idle(&self, slot: Arc<Slot>) {
        self.idle.lock().push_back(slot);
        self.available.notify_one();
    }
}

impl Drop for PoolShared {
    fn drop(&mut self) {
        for task in self.tasks.get_mut().drain(..) {
            task.abort();
        }
    }
}

/// A pool of database connections
///
/// The pool opens the configured number of connections at startup and hands
/// them out on demand. Checkout waits for a returned connection when all of
/// them are in use; the pool never opens connections on its own beyond what
/// [`startup`](Self::startup) and [`grow_by`](Self::grow_by) ask for.
///
/// Cloning a `ConnectionPool` yields another handle to the same pool. The
/// reaper and keep-alive tasks stop once every handle has been dropped.
#[derive(Clone)]
pub struct ConnectionPool {
    shared: Arc<PoolShared>,
}

impl ConnectionPool {
    /// Create a pool, start its background tasks and open its initial
    /// connections, using the default keep-alive pacing policy.
    ///
    /// Must be called from within a Tokio runtime.
    pub async fn connect(
        database: DatabaseConfig,
        config: PoolConfig,
        driver: Arc<dyn Driver>,
    ) -> Result<Self> {
        Self::connect_with_policy(database, config, driver, Arc::new(BracketPolicy::default()))
            .await
    }

    /// Like [`connect`](Self::connect), pacing keep-alive traffic with `policy`
    #[tracing::instrument(skip_all, fields(pool = %database.name))]
    pub async fn connect_with_policy(
        database: DatabaseConfig,
        config: PoolConfig,
        driver: Arc<dyn Driver>,
        policy: Arc<dyn PacingPolicy>,
    ) -> Result<Self> {
        config.validate()?;

        let (reclaim_tx, reclaim_rx) = mpsc::unbounded_channel();
        let shared = Arc::new(PoolShared {
            database,
            config,
            driver,
            idle: Mutex::new(VecDeque::new()),
            available: Notify::new(),
            total: AtomicUsize::new(0),
            stopped: AtomicBool::new(true),
            checkouts: AtomicU64::new(0),
            tracker: ResourceTracker::new(),
            reclaim_tx,
            tasks: Mutex::new(Vec::new()),
        });

        let mut tasks = reaper::spawn(&shared, reclaim_rx);
        if shared.config.keep_alive() {
            tasks.push(keepalive::spawn(&shared, policy));
        }
        shared.tasks.lock().extend(tasks);

        let pool = Self { shared };
        if let Err(e) = pool.startup().await {
            tracing::warn!(error = %e, "pool started without any connection");
        }
        Ok(pool)
    }

    pub(crate) fn from_shared(shared: Arc<PoolShared>) -> Self {
        Self { shared }
    }

    /// Name of the configuration this pool was built from
    pub fn name(&self) -> &str {
        self.shared.name()
    }

    pub fn database(&self) -> &DatabaseConfig {
        &self.shared.database
    }

    /// Get the pool configuration
    pub fn config(&self) -> &PoolConfig {
        &self.shared.config
    }

    /// Open the initial connections and accept checkouts again.
    ///
    /// Opens connections until the pool holds `initial_size` of them, so
    /// calling it on a running pool only tops it up. Startup is best effort:
    /// if the driver fails part way, the pool keeps the connections that did
    /// open. An error is returned only when not a single requested
    /// connection could be opened; the pool accepts checkouts either way.
    #[tracing::instrument(skip(self), fields(pool = %self.name()))]
    pub async fn startup(&self) -> Result<usize> {
        self.shared.stopped.store(false, Ordering::SeqCst);
        let missing = self
            .shared
            .database
            .initial_size
            .saturating_sub(self.size());
        let opened = self.open_connections(missing).await?;
        tracing::info!(opened, total = self.size(), "connection pool started");
        Ok(opened)
    }

    /// Open `n` more connections, up to the configured `max_size`.
    ///
    /// Returns how many were opened. Fails with `PoolStopped` on a stopped
    /// pool, or with the driver's error if none could be opened.
    #[tracing::instrument(skip(self), fields(pool = %self.name()))]
    pub async fn grow_by(&self, n: usize) -> Result<usize> {
        if self.is_stopped() {
            return Err(SpmError::PoolStopped);
        }
        let opened = self.open_connections(n).await?;
        tracing::info!(opened, total = self.size(), "connection pool grown");
        Ok(opened)
    }

    async fn open_connections(&self, requested: usize) -> Result<usize> {
        let granted = self.shared.reserve(requested);
        if granted < requested {
            tracing::warn!(
                requested,
                granted,
                max_size = self.shared.config.max_size(),
                "pool capacity reached, opening fewer connections"
            );
        }

        let mut opened = 0;
        for _ in 0..granted {
            match self.shared.driver.open(&self.shared.database).await {
                Ok(link) => {
                    self.shared.push_idle(Arc::new(Slot::new(link)));
                    opened += 1;
                }
                Err(e) => {
                    self.shared
                        .total
                        .fetch_sub(granted - opened, Ordering::SeqCst);
                    tracing::warn!(
                        opened,
                        requested = granted,
                        error = %e,
                        "could not open every requested connection"
                    );
                    if opened == 0 {
                        return Err(e);
                    }
                    return Ok(opened);
                }
            }
        }
        Ok(opened)
    }

    /// Move every idle connection of `other` into this pool, up to this
    /// pool's `max_size`. Connections `other` has checked out stay with it.
    ///
    /// Returns the number of connections moved. Nothing is moved into a stopped pool.
    pub fn absorb(&self, other: &ConnectionPool) -> usize {
        if Arc::ptr_eq(&self.shared, &other.shared) {
            return 0;
        }
        if self.is_stopped() {
            tracing::warn!(pool = %self.name(), from = %other.name(), "absorb into stopped pool ignored");
            return 0;
        }

        let granted = self.shared.reserve(other.available_count());
        let moved: Vec<Arc<Slot>> = {
            let mut idle = other.shared.idle.lock();
            let n = granted.min(idle.len());
            idle.drain(..n).collect()
        };
        other.shared.total.fetch_sub(moved.len(), Ordering::SeqCst);
        self.shared
            .total
            .fetch_sub(granted - moved.len(), Ordering::SeqCst);

        let count = moved.len();
        for slot in moved {
            self.shared.push_idle(slot);
        }
        tracing::info!(pool = %self.name(), from = %other.name(), moved = count, "absorbed idle connections");
        count
    }

    /// Check out a connection, waiting for one to be returned if none is idle.
    ///
    /// There is no deadline; use [`checkout_timeout`](Self::checkout_timeout)
    /// or race this future against your own. The connection comes back in
    /// its default state: autocommit on and no current result.
    pub async fn checkout(&self) -> Result<PooledConnection> {
        self.acquire(CheckoutKind::Caller).await
    }

    /// Check out a connection, failing with `Timeout` after `timeout`
    pub async fn checkout_timeout(&self, timeout: Duration) -> Result<PooledConnection> {
        match tokio::time::timeout(timeout, self.checkout()).await {
            Ok(result) => result,
            Err(_) => Err(SpmError::Timeout(format!(
                "timed out waiting for a connection from pool {} (timeout: {:?})",
                self.name(),
                timeout
            ))),
        }
    }

    pub(crate) async fn acquire(&self, kind: CheckoutKind) -> Result<PooledConnection> {
        let shared = &self.shared;
        let slot = loop {
            let notified = shared.available.notified();
            if shared.is_stopped() {
                tracing::warn!(pool = %shared.name(), "checkout attempted on stopped pool");
                return Err(SpmError::PoolStopped);
            }
            let popped = shared.idle.lock().pop_front();
            if let Some(slot) = popped {
                break slot;
            }
            let stats = self.stats();
            tracing::debug!(
                pool = %shared.name(),
                total = stats.total(),
                utilization = stats.utilization(),
                "no idle connection, waiting for a return"
            );
            notified.await;
        };

        let lease = next_lease();
        slot.assign(lease);
        if let Err(e) = slot.reset().await {
            tracing::warn!(pool = %shared.name(), connection = slot.id(), error = %e, "failed to reset connection on checkout, discarding it");
            self.replace_broken(&slot, lease).await;
            return Err(e);
        }

        shared.tracker.track(
            slot.id(),
            TrackedResource::Connection {
                slot: slot.clone(),
                lease,
            },
        );
        if kind == CheckoutKind::Caller {
            shared.checkouts.fetch_add(1, Ordering::SeqCst);
        }
        tracing::debug!(pool = %shared.name(), connection = slot.id(), ?kind, "connection checked out");
        Ok(PooledConnection::new(slot, shared.clone(), lease))
    }

    /// Close a connection that can no longer be used and open another one in
    /// its place. The pool shrinks by one if the driver cannot open it.
    async fn replace_broken(&self, slot: &Slot, lease: u64) {
        if !self.shared.discard(slot, lease) {
            return;
        }
        if let Err(e) = slot.shutdown().await {
            tracing::warn!(connection = slot.id(), error = %e, "failed to close broken connection");
        }
        if self.is_stopped() {
            return;
        }
        if let Ok(opened) = self.open_connections(1).await {
            tracing::info!(pool = %self.name(), opened, total = self.size(), "replaced broken connection");
        }
    }

    /// Return a connection to the pool. Same as [`PooledConnection::close`].
    pub async fn release(&self, conn: &PooledConnection) {
        conn.close().await;
    }

    /// Run one reaper scan now instead of waiting for the next interval.
    ///
    /// Returns the number of stale resources queued for reclamation.
    pub fn reap_stale(&self) -> usize {
        reaper::scan_once(&self.shared)
    }

    /// Number of idle connections. Advisory only.
    pub fn available_count(&self) -> usize {
        self.shared.idle.lock().len()
    }

    /// Whether an idle connection is available right now. Advisory only.
    pub fn is_usable(&self) -> bool {
        self.available_count() > 0
    }

    /// Number of live connections, idle or checked out
    pub fn size(&self) -> usize {
        self.shared.total.load(Ordering::SeqCst)
    }

    pub fn is_stopped(&self) -> bool {
        self.shared.is_stopped()
    }

    /// Get current pool statistics
    pub fn stats(&self) -> PoolStats {
        PoolStats::new(
            self.size(),
            self.available_count(),
            self.shared.tracker.len(),
            self.shared.checkouts.load(Ordering::SeqCst),
        )
    }

    /// Close every idle connection and refuse further checkouts.
    ///
    /// Connections that are checked out are closed when they come back.
    /// Callers waiting in `checkout` fail with `PoolStopped`.
    #[tracing::instrument(skip(self), fields(pool = %self.name()))]
    pub async fn shutdown(&self) {
        self.shared.stopped.store(true, Ordering::SeqCst);
        let drained: Vec<Arc<Slot>> = self.shared.idle.lock().drain(..).collect();
        self.shared
            .total
            .fetch_sub(drained.len(), Ordering::SeqCst);
        self.shared.available.notify_waiters();

        for slot in &drained {
            if let Err(e) = slot.shutdown().await {
                tracing::warn!(connection = slot.id(), error = %e, "failed to close connection during shutdown");
            }
        }
        tracing::info!(closed = drained.len(), outstanding = self.size(), "connection pool stopped");
    }
}

impl std::fmt::Debug for ConnectionPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("name", &self.name())
            .field("stats", &self.stats())
            .field("stopped", &self.is_stopped())
            .finish()
    }
}
