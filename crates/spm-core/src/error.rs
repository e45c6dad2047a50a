//! Error types for spmpool

use thiserror::Error;

/// Core error type for pool and driver operations
#[derive(Error, Debug)]
pub enum SpmError {
    /// The driver could not establish a link to the server
    #[error("Connect error: {0}")]
    Connect(String),

    /// Checkout attempted on a pool that has been shut down
    #[error("Connection pool is stopped; call startup() to use it again")]
    PoolStopped,

    /// Operation on a connection that was closed or reclaimed
    #[error("Connection is closed")]
    ConnectionClosed,

    /// The driver reported a statement execution failure
    #[error("Query error: {0}")]
    Query(String),

    /// Read from a result whose cursor has already been released
    #[error("Result cursor is closed")]
    CursorClosed,

    #[error("Driver error: {0}")]
    Driver(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SpmError {
    /// Whether this error means the pool or connection can no longer be used
    /// for the requested operation, as opposed to a failure reported by the server.
    pub fn is_closed(&self) -> bool {
        matches!(
            self,
            SpmError::PoolStopped | SpmError::ConnectionClosed | SpmError::CursorClosed
        )
    }
}

/// Result type alias for spmpool operations
pub type Result<T> = std::result::Result<T, SpmError>;
