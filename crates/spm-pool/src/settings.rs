//! Registry settings file
//!
//! ```toml
//! [pool]
//! max_size = 200
//! stale_threshold_ms = 60000
//!
//! [[databases]]
//! name = "orders"
//! host = "db.internal"
//! user = "app"
//! password = "secret"
//! database = "orders"
//! initial_size = 5
//! ```

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};
use spm_core::{DatabaseConfig, Result, SpmError};

use crate::PoolConfig;

/// Contents of a registry settings file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrySettings {
    /// Pool settings shared by every registered database
    #[serde(default)]
    pub pool: PoolConfig,
    #[serde(default)]
    pub databases: Vec<DatabaseConfig>,
}

impl RegistrySettings {
    /// Parse and validate settings from a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let settings: Self = toml::from_str(content)
            .map_err(|e| SpmError::Configuration(format!("invalid settings: {}", e)))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Read settings from a TOML file
    #[tracing::instrument]
    pub async fn load(path: &Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(path).await?;
        let settings = Self::from_toml_str(&content)?;
        tracing::info!(databases = settings.databases.len(), "settings loaded");
        Ok(settings)
    }

    /// Serialize back to TOML
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| SpmError::Configuration(format!("cannot serialize settings: {}", e)))
    }

    pub fn validate(&self) -> Result<()> {
        self.pool.validate()?;
        let mut seen = HashSet::new();
        for database in &self.databases {
            if database.name.is_empty() {
                return Err(SpmError::Configuration(
                    "database entry without a name".into(),
                ));
            }
            if !seen.insert(database.name.as_str()) {
                return Err(SpmError::Configuration(format!(
                    "database '{}' is configured more than once",
                    database.name
                )));
            }
        }
        Ok(())
    }
}
