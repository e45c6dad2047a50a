//! spm-pool - Self-returning database connection pool
//!
//! Named database configurations map to pools of live connections. A pool
//! opens its initial connections eagerly, hands them out on `checkout` and
//! waits when every connection is in use. Connections go back to the pool
//! when closed or dropped. Two safety nets run in the background:
//!
//! - the reaper reclaims connections and cursors kept past a staleness
//!   threshold, invalidating the forgotten handles;
//! - the keep-alive pacer pings idle connections at an interval adapted to
//!   recent checkout volume.
//!
//! Pools are usually obtained through a [`PoolRegistry`] built once per
//! process, either by hand or from a [`RegistrySettings`] file.

mod connection;
pub mod keepalive;
mod pool;
mod reaper;
mod registry;
mod result;
mod settings;

#[cfg(test)]
pub(crate) mod testing;

pub use connection::PooledConnection;
pub use keepalive::{BracketPolicy, LoadBracket, PacerState, PacingDecision, PacingPolicy, ping};
pub use pool::{ConnectionPool, PoolConfig, PoolStats};
pub use registry::PoolRegistry;
pub use result::ResultSet;
pub use settings::RegistrySettings;

pub use spm_core::{DatabaseConfig, Driver, Result, Row, SpmError, Value};
