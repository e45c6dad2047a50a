//! Round-trip ping
//!
//! Executes a trivial statement and measures how long the server took to
//! answer.

use std::time::Duration;

use spm_core::{Result, SpmError};
use tokio::time::Instant;

use crate::ConnectionPool;
use crate::connection::PooledConnection;
use crate::pool::CheckoutKind;

/// Ping a checked-out connection with `query` and return the round-trip time.
///
/// # Example
///
/// ```ignore
/// let latency = spm_pool::ping(&conn, "select 1").await?;
/// tracing::info!(?latency, "database reachable");
/// ```
pub async fn ping(conn: &PooledConnection, query: &str) -> Result<Duration> {
    if conn.is_closed() {
        return Err(SpmError::ConnectionClosed);
    }

    let start = Instant::now();
    let result = conn.execute(query).await?;
    let latency = start.elapsed();
    result.close();
    Ok(latency)
}

/// Borrow some idle connection, ping it and hand it back.
///
/// Keep-alive checkouts are not counted as load.
pub(crate) async fn keep_alive_round_trip(pool: &ConnectionPool, query: &str) -> Result<Duration> {
    let conn = pool.acquire(CheckoutKind::KeepAlive).await?;
    let latency = ping(&conn, query).await;
    conn.close().await;
    latency
}
