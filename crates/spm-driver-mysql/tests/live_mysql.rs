//! Pool tests against a live MySQL server
//!
//! Connection settings come from `SPM_TEST_MYSQL_HOST`, `SPM_TEST_MYSQL_PORT`,
//! `SPM_TEST_MYSQL_USER`, `SPM_TEST_MYSQL_PASSWORD` and
//! `SPM_TEST_MYSQL_DATABASE`. When no server is reachable the tests log the
//! error and pass.

use std::env;
use std::sync::Arc;

use anyhow::Result;
use spm_driver_mysql::MySqlDriver;
use spm_pool::{ConnectionPool, DatabaseConfig, PoolConfig, Value};

fn initialize_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn test_config() -> DatabaseConfig {
    let var = |name: &str, default: &str| env::var(name).unwrap_or_else(|_| default.to_string());
    DatabaseConfig::new(
        "live",
        &var("SPM_TEST_MYSQL_USER", "root"),
        &var("SPM_TEST_MYSQL_PASSWORD", "test_password"),
        &var("SPM_TEST_MYSQL_DATABASE", "test"),
    )
    .with_host(&var("SPM_TEST_MYSQL_HOST", "127.0.0.1"))
    .with_port(var("SPM_TEST_MYSQL_PORT", "3306").parse().unwrap_or(3306))
    .with_initial_size(2)
}

/// A started pool, or `None` when the server is not reachable
async fn live_pool() -> Option<ConnectionPool> {
    initialize_logging();
    let pool = ConnectionPool::connect(
        test_config(),
        PoolConfig::default().with_keep_alive(false),
        Arc::new(MySqlDriver::new()),
    )
    .await
    .ok()?;
    if pool.size() == 0 {
        eprintln!("MySQL server not reachable, skipping live test");
        return None;
    }
    Some(pool)
}

#[tokio::test]
async fn test_select_through_pool() -> Result<()> {
    let Some(pool) = live_pool().await else {
        return Ok(());
    };
    let conn = pool.checkout().await?;
    let result = conn.execute("SELECT 1 AS num, 'a' AS name").await?;
    let row = result.first()?.expect("one row");
    assert_eq!(row["num"], Value::Int64(1));
    assert_eq!(row["name"], Value::String("a".into()));
    assert_eq!(result.row_count(), 1);

    // Unnamed numeric column
    let row = conn.execute("SELECT 1").await?.first()?.expect("one row");
    assert_eq!(row["col0"], Value::Int64(1));

    conn.close().await;
    pool.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_transaction_rollback() -> Result<()> {
    let Some(pool) = live_pool().await else {
        return Ok(());
    };
    let conn = pool.checkout().await?;
    conn.execute("CREATE TEMPORARY TABLE spm_tx (id INT) ENGINE=InnoDB")
        .await?;

    conn.begin_transaction().await?;
    let inserted = conn.execute("INSERT INTO spm_tx VALUES (1), (2)").await?;
    assert_eq!(inserted.row_count(), 2);
    conn.rollback().await?;

    let rows = conn.execute("SELECT id FROM spm_tx").await?.all()?;
    assert!(rows.is_empty());

    conn.begin_transaction().await?;
    conn.execute("INSERT INTO spm_tx VALUES (3)").await?;
    conn.commit().await?;
    assert!(conn.autocommit());

    let rows = conn.execute("SELECT id FROM spm_tx").await?.all()?;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["id"], Value::Int64(3));

    conn.close().await;
    pool.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_query_error_is_reported() -> Result<()> {
    let Some(pool) = live_pool().await else {
        return Ok(());
    };
    let conn = pool.checkout().await?;
    let err = conn.execute("SELEC nonsense").await.unwrap_err();
    assert!(matches!(err, spm_pool::SpmError::Query(_)));

    // The connection is still usable
    assert!(conn.execute("SELECT 1").await.is_ok());
    conn.close().await;
    pool.shutdown().await;
    Ok(())
}
