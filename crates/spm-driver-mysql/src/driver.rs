//! MySQL driver implementation

use async_trait::async_trait;
use mysql_async::{Opts, OptsBuilder};
use spm_core::{DatabaseConfig, Driver, DriverConnection, Result};

use crate::MySqlConnection;

/// MySQL database driver
#[derive(Debug, Clone, Copy)]
pub struct MySqlDriver;

impl MySqlDriver {
    /// Create a new MySQL driver instance
    pub fn new() -> Self {
        tracing::debug!("MySQL driver initialized");
        Self
    }
}

impl Default for MySqlDriver {
    fn default() -> Self {
        Self::new()
    }
}

/// Build connection options from a pool configuration.
///
/// The character set is applied with an init statement so every new link
/// starts with `SET NAMES <charset>`.
pub(crate) fn build_opts(config: &DatabaseConfig) -> Opts {
    let mut builder = OptsBuilder::default()
        .ip_or_hostname(config.host.clone())
        .tcp_port(config.port)
        .user(Some(config.user.clone()))
        .db_name(Some(config.database.clone()))
        .init(vec![format!("SET NAMES {}", config.charset)]);

    if !config.password.is_empty() {
        builder = builder.pass(Some(config.password.clone()));
    }
    builder.into()
}

#[async_trait]
impl Driver for MySqlDriver {
    fn name(&self) -> &'static str {
        "mysql"
    }

    #[tracing::instrument(skip(self, config), fields(address = %config.address(), database = %config.database))]
    async fn open(&self, config: &DatabaseConfig) -> Result<Box<dyn DriverConnection>> {
        let conn = MySqlConnection::connect(build_opts(config)).await?;
        Ok(Box::new(conn))
    }
}
