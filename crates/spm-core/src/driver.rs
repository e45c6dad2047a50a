//! Driver boundary: the narrow interface the pool needs from a database driver

use crate::{ColumnDescription, DatabaseConfig, Result, Value};
use async_trait::async_trait;

/// Core driver trait: opens raw protocol links from a configuration
#[async_trait]
pub trait Driver: Send + Sync {
    /// Driver name (e.g., "mysql")
    fn name(&self) -> &'static str;

    /// Open a new connection.
    ///
    /// Fails with [`SpmError::Connect`](crate::SpmError::Connect) when the
    /// server cannot be reached or the handshake is rejected.
    async fn open(&self, config: &DatabaseConfig) -> Result<Box<dyn DriverConnection>>;
}

/// A raw, unpooled database connection
#[async_trait]
pub trait DriverConnection: Send + Sync {
    /// Turn autocommit mode on or off
    async fn set_autocommit(&mut self, enabled: bool) -> Result<()>;

    /// Execute a statement and return a cursor over its result
    async fn execute(&mut self, sql: &str) -> Result<Box<dyn DriverCursor>>;

    /// Commit the current transaction
    async fn commit(&mut self) -> Result<()>;

    /// Roll back the current transaction
    async fn rollback(&mut self) -> Result<()>;

    /// Close the link. Further calls on this connection fail.
    async fn close(&mut self) -> Result<()>;
}

/// A statement cursor.
///
/// Cursors are client-side buffered: every operation works on rows the
/// driver already received, so none of them needs to await the server.
pub trait DriverCursor: Send + Sync {
    /// Columns of the result, in order
    fn description(&self) -> &[ColumnDescription];

    /// Rows produced by a query, or rows affected by a statement
    fn row_count(&self) -> u64;

    /// Fetch the next record, advancing the cursor
    fn fetch_one(&mut self) -> Result<Option<Vec<Value>>>;

    /// Fetch every remaining record, advancing the cursor to the end
    fn fetch_all(&mut self) -> Result<Vec<Vec<Value>>>;

    /// Move the cursor by `offset` records relative to its current position
    fn scroll(&mut self, offset: i64) -> Result<()>;

    /// Release the cursor's rows
    fn close(&mut self);
}
