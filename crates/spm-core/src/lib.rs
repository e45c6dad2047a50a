//! spm-core - Driver boundary and shared types for spmpool
//!
//! This crate defines what the pool needs from a database driver and the
//! data types that cross that boundary:
//!
//! - `Driver` / `DriverConnection` / `DriverCursor` - the driver traits
//! - `BufferedCursor` - a client-side cursor drivers can hand back
//! - `Value`, `Row`, `ColumnDescription` - result data
//! - `DatabaseConfig` - a named connection configuration
//! - `SpmError` - the error type shared by every spmpool crate

mod config;
mod cursor;
mod driver;
mod error;
mod types;

pub use config::*;
pub use cursor::*;
pub use driver::*;
pub use error::*;
pub use types::*;
