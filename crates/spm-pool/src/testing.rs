//! In-memory driver for unit tests

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use spm_core::{
    BufferedCursor, ColumnDescription, DatabaseConfig, Driver, DriverConnection, DriverCursor,
    Result, SpmError, Value,
};
use tokio::sync::Semaphore;

use crate::{ConnectionPool, PoolConfig};

/// Install a test subscriber once; honours `RUST_LOG`
pub(crate) fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// What the fake driver and its connections share
#[derive(Default)]
struct DriverState {
    opened: AtomicUsize,
    closed: AtomicUsize,
    /// Number of further opens that succeed; `None` means unlimited
    open_budget: Mutex<Option<usize>>,
    /// Connections with a lower id behave as if the server dropped them
    gone_below: AtomicUsize,
    /// Number of upcoming closes that report an error
    close_failures: AtomicUsize,
    /// When set, every open waits for a permit
    open_gate: Mutex<Option<Arc<Semaphore>>>,
    /// Statements that wait for a permit before they run
    statement_gates: Mutex<HashMap<String, Arc<Semaphore>>>,
    calls: Mutex<Vec<(usize, String)>>,
    scripts: Mutex<HashMap<String, BufferedCursor>>,
}

/// Driver whose connections live in memory and record every call
#[derive(Default)]
pub(crate) struct FakeDriver {
    state: Arc<DriverState>,
}

impl FakeDriver {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Let the next `n` opens succeed and fail every one after that
    pub(crate) fn fail_opens_after(&self, n: usize) {
        *self.state.open_budget.lock() = Some(n);
    }

    /// Serve `cursor` whenever `sql` is executed
    pub(crate) fn script(&self, sql: &str, cursor: BufferedCursor) {
        self.state.scripts.lock().insert(sql.to_string(), cursor);
    }

    /// Make every connection opened so far fail its statements, the way a
    /// link the server has closed does
    pub(crate) fn drop_links(&self) {
        self.state
            .gone_below
            .store(self.opened(), Ordering::SeqCst);
    }

    /// Let the next `n` driver closes fail
    pub(crate) fn fail_next_closes(&self, n: usize) {
        self.state.close_failures.store(n, Ordering::SeqCst);
    }

    /// Hold every open until a permit is added to the returned semaphore
    pub(crate) fn hold_opens(&self) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        *self.state.open_gate.lock() = Some(gate.clone());
        gate
    }

    /// Hold `sql` until a permit is added to the returned semaphore
    pub(crate) fn hold_statement(&self, sql: &str) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        self.state
            .statement_gates
            .lock()
            .insert(sql.to_string(), gate.clone());
        gate
    }

    pub(crate) fn opened(&self) -> usize {
        self.state.opened.load(Ordering::SeqCst)
    }

    pub(crate) fn closed(&self) -> usize {
        self.state.closed.load(Ordering::SeqCst)
    }

    /// Statements sent to one connection
    pub(crate) fn calls_on(&self, connection: usize) -> Vec<String> {
        self.state
            .calls
            .lock()
            .iter()
            .filter(|(id, _)| *id == connection)
            .map(|(_, sql)| sql.clone())
            .collect()
    }

    /// How many times `sql` was executed across all connections
    pub(crate) fn count(&self, sql: &str) -> usize {
        self.state.calls.lock().iter().filter(|(_, s)| s == sql).count()
    }
}

#[async_trait]
impl Driver for FakeDriver {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn open(&self, config: &DatabaseConfig) -> Result<Box<dyn DriverConnection>> {
        let gate = self.state.open_gate.lock().clone();
        if let Some(gate) = gate {
            pass_gate(&gate).await;
        }
        if let Some(remaining) = self.state.open_budget.lock().as_mut() {
            if *remaining == 0 {
                return Err(SpmError::Connect(format!(
                    "connection refused by {}",
                    config.address()
                )));
            }
            *remaining -= 1;
        }
        let id = self.state.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeConnection {
            id,
            state: self.state.clone(),
            closed: false,
        }))
    }
}

async fn pass_gate(gate: &Semaphore) {
    if let Ok(permit) = gate.acquire().await {
        permit.forget();
    }
}

struct FakeConnection {
    id: usize,
    state: Arc<DriverState>,
    closed: bool,
}

impl FakeConnection {
    fn send(&self, sql: &str) -> Result<()> {
        if self.closed {
            return Err(SpmError::Driver("link already closed".into()));
        }
        if self.id < self.state.gone_below.load(Ordering::SeqCst) {
            return Err(SpmError::Driver("server has gone away".into()));
        }
        self.state.calls.lock().push((self.id, sql.to_string()));
        Ok(())
    }
}

#[async_trait]
impl DriverConnection for FakeConnection {
    async fn set_autocommit(&mut self, enabled: bool) -> Result<()> {
        self.send(if enabled {
            "SET autocommit=1"
        } else {
            "SET autocommit=0"
        })
    }

    async fn execute(&mut self, sql: &str) -> Result<Box<dyn DriverCursor>> {
        let gate = self.state.statement_gates.lock().get(sql).cloned();
        if let Some(gate) = gate {
            pass_gate(&gate).await;
        }
        self.send(sql)?;
        if sql.starts_with("fail") {
            return Err(SpmError::Query(format!("syntax error near '{sql}'")));
        }
        if let Some(cursor) = self.state.scripts.lock().get(sql) {
            return Ok(Box::new(cursor.clone()));
        }
        if sql.eq_ignore_ascii_case("select 1") {
            return Ok(Box::new(BufferedCursor::new(
                vec![ColumnDescription::new("1", "LONGLONG")],
                vec![vec![Value::Int64(1)]],
            )));
        }
        Ok(Box::new(BufferedCursor::affected(0)))
    }

    async fn commit(&mut self) -> Result<()> {
        self.send("COMMIT")
    }

    async fn rollback(&mut self) -> Result<()> {
        self.send("ROLLBACK")
    }

    async fn close(&mut self) -> Result<()> {
        let failing = self
            .state
            .close_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(SpmError::Driver("error while closing link".into()));
        }
        if !self.closed {
            self.closed = true;
            self.state.closed.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

pub(crate) fn database(initial_size: usize) -> DatabaseConfig {
    DatabaseConfig::new("test", "root", "secret", "app").with_initial_size(initial_size)
}

/// Pool config without background traffic, so tests control every call
pub(crate) fn quiet_config() -> PoolConfig {
    PoolConfig::default().with_keep_alive(false)
}

pub(crate) async fn pool(
    initial_size: usize,
    config: PoolConfig,
) -> (ConnectionPool, Arc<FakeDriver>) {
    init_tracing();
    let driver = FakeDriver::new();
    let pool = ConnectionPool::connect(database(initial_size), config, driver.clone())
        .await
        .expect("pool should build");
    (pool, driver)
}
