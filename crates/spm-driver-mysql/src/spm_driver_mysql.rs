//! MySQL/MariaDB driver for spmpool
//!
//! Opens one `mysql_async` connection per pooled link; pooling itself is
//! left to `spm-pool`. Result sets are read in full and served through a
//! [`BufferedCursor`](spm_core::BufferedCursor).

mod connection;
mod driver;

pub use connection::MySqlConnection;
pub use driver::MySqlDriver;
