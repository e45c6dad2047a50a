//! Tests for the pool registry

use std::sync::Arc;
use std::time::Duration;

use spm_core::{DatabaseConfig, SpmError};

use super::PoolRegistry;
use crate::RegistrySettings;
use crate::testing::{FakeDriver, init_tracing, quiet_config};

fn registry() -> (PoolRegistry, Arc<FakeDriver>) {
    init_tracing();
    let driver = FakeDriver::new();
    let registry = PoolRegistry::new(driver.clone()).with_pool_config(quiet_config());
    registry.register_config(
        DatabaseConfig::new("orders", "app", "secret", "orders").with_initial_size(2),
    );
    registry.register_config(
        DatabaseConfig::new("audit", "app", "secret", "audit").with_initial_size(1),
    );
    (registry, driver)
}

#[tokio::test]
async fn test_get_pool_is_lazy_and_reused() {
    let (registry, driver) = registry();
    assert!(!registry.has_pool("orders"));
    assert_eq!(driver.opened(), 0);

    let first = registry.get_pool("orders").await.unwrap();
    assert!(registry.has_pool("orders"));
    assert_eq!(first.size(), 2);
    assert_eq!(driver.opened(), 2);

    let second = registry.get_pool("orders").await.unwrap();
    assert_eq!(driver.opened(), 2);

    // Both handles refer to the same pool
    let conn = first.checkout().await.unwrap();
    assert_eq!(second.available_count(), 1);
    conn.close().await;
}

#[tokio::test]
async fn test_get_pool_unknown_name() {
    let (registry, _driver) = registry();
    let err = registry.get_pool("missing").await.unwrap_err();
    assert!(matches!(err, SpmError::NotFound(_)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_first_requests_build_one_pool() {
    let (registry, driver) = registry();
    let registry = Arc::new(registry);

    let mut tasks = Vec::new();
    for _ in 0..8 {
        let registry = registry.clone();
        tasks.push(tokio::spawn(async move {
            registry.get_pool("orders").await.map(|pool| pool.size())
        }));
    }
    for task in tasks {
        assert_eq!(task.await.unwrap().unwrap(), 2);
    }
    assert_eq!(driver.opened(), 2);
}

#[tokio::test]
async fn test_slow_startup_does_not_block_other_pools() {
    let (registry, driver) = registry();
    let registry = Arc::new(registry);
    let audit = registry.get_pool("audit").await.unwrap();

    let gate = driver.hold_opens();
    let orders = {
        let registry = registry.clone();
        tokio::spawn(async move { registry.get_pool("orders").await.map(|pool| pool.size()) })
    };
    tokio::task::yield_now().await;
    assert!(!registry.has_pool("orders"));

    // An existing pool is handed out while "orders" is still opening
    let again = tokio::time::timeout(Duration::from_secs(5), registry.get_pool("audit"))
        .await
        .expect("lookup of an existing pool should not wait")
        .unwrap();
    assert_eq!(again.name(), audit.name());

    gate.add_permits(2);
    assert_eq!(orders.await.unwrap().unwrap(), 2);
    assert!(registry.has_pool("orders"));
}

#[tokio::test]
async fn test_failed_lookup_does_not_register_a_pool() {
    let (registry, _driver) = registry();
    assert!(registry.get_pool("missing").await.is_err());
    assert!(!registry.has_pool("missing"));

    registry.register_config(
        DatabaseConfig::new("missing", "app", "secret", "late").with_initial_size(1),
    );
    assert_eq!(registry.get_pool("missing").await.unwrap().size(), 1);
}

#[tokio::test]
async fn test_reregistering_does_not_affect_existing_pool() {
    let (registry, _driver) = registry();
    let pool = registry.get_pool("audit").await.unwrap();
    registry.register_config(
        DatabaseConfig::new("audit", "app", "secret", "audit").with_initial_size(5),
    );
    assert_eq!(registry.config("audit").unwrap().initial_size, 5);
    assert_eq!(pool.database().initial_size, 1);
    assert_eq!(registry.get_pool("audit").await.unwrap().size(), 1);
}

#[tokio::test]
async fn test_shutdown_all() {
    let (registry, driver) = registry();
    let orders = registry.get_pool("orders").await.unwrap();
    let audit = registry.get_pool("audit").await.unwrap();

    registry.shutdown_all().await;
    assert!(orders.is_stopped());
    assert!(audit.is_stopped());
    assert_eq!(driver.closed(), 3);
    assert!(matches!(
        registry.get_pool("orders").await.unwrap().checkout().await,
        Err(SpmError::PoolStopped)
    ));
}

#[test]
fn test_names_are_sorted() {
    let (registry, _driver) = registry();
    assert_eq!(registry.names(), vec!["audit", "orders"]);
    assert!(registry.config("orders").is_some());
    assert!(registry.config("missing").is_none());
}

#[tokio::test]
async fn test_from_settings() {
    init_tracing();
    let settings = RegistrySettings::from_toml_str(
        r#"
        [pool]
        max_size = 3
        keep_alive = false

        [[databases]]
        name = "reports"
        user = "reader"
        database = "reports"
        initial_size = 5
        "#,
    )
    .unwrap();

    let driver = FakeDriver::new();
    let registry = PoolRegistry::from_settings(settings, driver.clone());
    assert_eq!(registry.names(), vec!["reports"]);

    // Capacity comes from the shared pool settings
    let pool = registry.get_pool("reports").await.unwrap();
    assert_eq!(pool.size(), 3);
    assert_eq!(pool.config().max_size(), 3);
}
