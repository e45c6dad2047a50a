//! Named database configuration

use serde::{Deserialize, Serialize};

const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 3306;
const DEFAULT_CHARSET: &str = "utf8";
const DEFAULT_INITIAL_SIZE: usize = 10;

fn default_host() -> String {
    DEFAULT_HOST.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_charset() -> String {
    DEFAULT_CHARSET.to_string()
}

fn default_initial_size() -> usize {
    DEFAULT_INITIAL_SIZE
}

/// Configuration a pool is built from.
///
/// A pool copies its configuration at construction; changing a registered
/// configuration afterwards does not affect pools that already exist.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Name the configuration is registered under
    pub name: String,
    /// Host address
    #[serde(default = "default_host")]
    pub host: String,
    /// Port number
    #[serde(default = "default_port")]
    pub port: u16,
    /// Username
    pub user: String,
    /// Password
    #[serde(default)]
    pub password: String,
    /// Database (schema) to select after connecting
    pub database: String,
    /// Connection character set
    #[serde(default = "default_charset")]
    pub charset: String,
    /// Connections opened eagerly when the pool starts
    #[serde(default = "default_initial_size")]
    pub initial_size: usize,
}

impl DatabaseConfig {
    /// Create a configuration with default host, port, charset and pool size
    pub fn new(name: &str, user: &str, password: &str, database: &str) -> Self {
        Self {
            name: name.to_string(),
            host: default_host(),
            port: DEFAULT_PORT,
            user: user.to_string(),
            password: password.to_string(),
            database: database.to_string(),
            charset: default_charset(),
            initial_size: DEFAULT_INITIAL_SIZE,
        }
    }

    pub fn with_host(mut self, host: &str) -> Self {
        self.host = host.to_string();
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_charset(mut self, charset: &str) -> Self {
        self.charset = charset.to_string();
        self
    }

    pub fn with_initial_size(mut self, initial_size: usize) -> Self {
        self.initial_size = initial_size;
        self
    }

    /// `host:port` of the server
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl std::fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("name", &self.name)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("database", &self.database)
            .field("charset", &self.charset)
            .field("initial_size", &self.initial_size)
            .finish()
    }
}
