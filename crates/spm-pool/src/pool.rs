//! Connection pooling
//!
//! A bounded set of live connections with checkout/return, a tracking set
//! of outstanding checkouts for leak reclamation, and explicit growth.
//!
//! # Example
//!
//! ```ignore
//! use spm_pool::{ConnectionPool, PoolConfig};
//!
//! let database = DatabaseConfig::new("dev", "root", "secret", "test").with_initial_size(5);
//! let pool = ConnectionPool::connect(database, PoolConfig::default(), driver).await?;
//!
//! let conn = pool.checkout().await?;
//! let rows = conn.execute("select id, name from users").await?.all()?;
//! conn.close().await;
//! ```

mod config;
mod pool;
mod stats;
pub(crate) mod tracker;


pub use config::PoolConfig;
pub(crate) use pool::{CheckoutKind, PoolShared};
pub use pool::ConnectionPool;
pub use stats::PoolStats;
