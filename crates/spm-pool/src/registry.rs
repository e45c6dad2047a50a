//! Named pool registry

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use spm_core::{DatabaseConfig, Driver, Result, SpmError};
use tokio::sync::OnceCell;

use crate::keepalive::{BracketPolicy, PacingPolicy};
use crate::settings::RegistrySettings;
use crate::{ConnectionPool, PoolConfig};

#[cfg(test)]
mod tests;

/// Maps configuration names to pools.
///
/// Construct one per process and pass it to whatever needs pool lookup.
/// A pool is created and started the first time its name is requested and
/// the same pool is handed out afterwards.
pub struct PoolRegistry {
    driver: Arc<dyn Driver>,
    pool_config: PoolConfig,
    policy: Arc<dyn PacingPolicy>,
    /// Registered configurations
    configs: RwLock<HashMap<String, DatabaseConfig>>,
    /// One cell per requested name. Concurrent first requests for a name
    /// wait on its cell, so a single pool is built and other names are not
    /// held up.
    pools: Mutex<HashMap<String, Arc<OnceCell<ConnectionPool>>>>,
}

impl PoolRegistry {
    /// Create an empty registry whose pools open connections with `driver`
    pub fn new(driver: Arc<dyn Driver>) -> Self {
        Self {
            driver,
            pool_config: PoolConfig::default(),
            policy: Arc::new(BracketPolicy::default()),
            configs: RwLock::new(HashMap::new()),
            pools: Mutex::new(HashMap::new()),
        }
    }

    /// Use `config` for every pool created from now on
    pub fn with_pool_config(mut self, config: PoolConfig) -> Self {
        self.pool_config = config;
        self
    }

    /// Pace keep-alive traffic of every pool created from now on with `policy`
    pub fn with_pacing_policy(mut self, policy: Arc<dyn PacingPolicy>) -> Self {
        self.policy = policy;
        self
    }

    /// Build a registry from loaded settings, registering every database
    pub fn from_settings(settings: RegistrySettings, driver: Arc<dyn Driver>) -> Self {
        let registry = Self::new(driver).with_pool_config(settings.pool);
        for database in settings.databases {
            registry.register_config(database);
        }
        registry
    }

    /// Register `config` under its name, replacing any earlier configuration
    /// with that name. A pool already built from the earlier configuration
    /// keeps using it.
    pub fn register_config(&self, config: DatabaseConfig) {
        tracing::debug!(name = %config.name, address = %config.address(), "registered database configuration");
        self.configs.write().insert(config.name.clone(), config);
    }

    /// Get a registered configuration
    pub fn config(&self, name: &str) -> Option<DatabaseConfig> {
        self.configs.read().get(name).cloned()
    }

    /// Names of every registered configuration, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.configs.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Get the pool for `name`, creating and starting it on first access.
    ///
    /// Fails with `NotFound` if no configuration is registered under `name`.
    #[tracing::instrument(skip(self))]
    pub async fn get_pool(&self, name: &str) -> Result<ConnectionPool> {
        let cell = self.cell(name)?;
        let pool = cell
            .get_or_try_init(|| async {
                let config = self.config(name).ok_or_else(|| not_registered(name))?;
                let pool = ConnectionPool::connect_with_policy(
                    config,
                    self.pool_config.clone(),
                    self.driver.clone(),
                    self.policy.clone(),
                )
                .await?;
                tracing::info!(size = pool.size(), "pool created");
                Ok::<_, SpmError>(pool)
            })
            .await?;
        Ok(pool.clone())
    }

    /// The cell for `name`, created on first request for a registered name
    fn cell(&self, name: &str) -> Result<Arc<OnceCell<ConnectionPool>>> {
        let mut pools = self.pools.lock();
        if let Some(cell) = pools.get(name) {
            return Ok(cell.clone());
        }
        if !self.configs.read().contains_key(name) {
            return Err(not_registered(name));
        }
        let cell = Arc::new(OnceCell::new());
        pools.insert(name.to_string(), cell.clone());
        Ok(cell)
    }

    /// Whether a pool was already created for `name`
    pub fn has_pool(&self, name: &str) -> bool {
        self.pools
            .lock()
            .get(name)
            .is_some_and(|cell| cell.initialized())
    }

    /// Shut down every pool created so far.
    ///
    /// The pools stay registered; `get_pool` hands out the stopped instance
    /// until it is restarted with `startup`.
    #[tracing::instrument(skip(self))]
    pub async fn shutdown_all(&self) {
        let pools: Vec<ConnectionPool> = self
            .pools
            .lock()
            .values()
            .filter_map(|cell| cell.get().cloned())
            .collect();
        for pool in &pools {
            pool.shutdown().await;
        }
        tracing::info!(count = pools.len(), "all pools shut down");
    }
}

impl std::fmt::Debug for PoolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolRegistry")
            .field("driver", &self.driver.name())
            .field("pool_config", &self.pool_config)
            .field("names", &self.names())
            .finish()
    }
}

fn not_registered(name: &str) -> SpmError {
    SpmError::NotFound(format!("no database registered as '{}'", name))
}
