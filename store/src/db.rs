use crate::{StoreConfig, StoreError};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;
use tracing::info;

/// Open the pool and create the schema if needed
pub async fn connect(config: &StoreConfig) -> Result<SqlitePool, StoreError> {
    info!("Initializing database: {}", config.database_url);

    if let Some(db_path) = config.database_url.strip_prefix("sqlite://") {
        if let Some(parent) = Path::new(db_path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    StoreError::ConnectionError(format!(
                        "Failed to create database directory {}: {}",
                        parent.display(),
                        e
                    ))
                })?;
            }
        }
    }

    let options = SqliteConnectOptions::from_str(&config.database_url)
        .map_err(|e| StoreError::ConnectionError(e.to_string()))?
        .create_if_missing(true);

    // every connection to :memory: is a separate database, so keep exactly one alive
    let pool_options = if config.is_in_memory() {
        SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
    } else {
        SqlitePoolOptions::new().max_connections(config.max_connections)
    };

    let pool = pool_options
        .connect_with(options)
        .await
        .map_err(|e| StoreError::ConnectionError(e.to_string()))?;

    run_migrations(&pool).await?;

    Ok(pool)
}

async fn run_migrations(pool: &SqlitePool) -> Result<(), StoreError> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS exchange_accounts (
            identity TEXT PRIMARY KEY,
            encrypted_api_key TEXT,
            encrypted_api_secret TEXT,
            fingerprint TEXT,
            is_connected BOOLEAN NOT NULL DEFAULT 0,
            connected_at DATETIME NOT NULL,
            last_synced_at DATETIME,
            updated_at DATETIME NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(|e| {
        StoreError::MigrationError(format!("Failed to create exchange_accounts table: {}", e))
    })?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_exchange_accounts_fingerprint ON exchange_accounts(fingerprint)",
    )
    .execute(pool)
    .await
    .map_err(|e| StoreError::MigrationError(format!("Failed to create fingerprint index: {}", e)))?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS trades (
            identity TEXT NOT NULL,
            feed TEXT NOT NULL CHECK(feed IN ('executions', 'closed_pnl')),
            trade_id TEXT NOT NULL,
            symbol TEXT NOT NULL,
            side TEXT NOT NULL CHECK(side IN ('Buy', 'Sell')),
            price TEXT NOT NULL,
            quantity TEXT NOT NULL,
            executed_at INTEGER NOT NULL,
            order_id TEXT NOT NULL DEFAULT '',
            category TEXT NOT NULL,
            fee TEXT NOT NULL DEFAULT '0',
            pnl TEXT NOT NULL DEFAULT '0',
            created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
            PRIMARY KEY (identity, feed, trade_id)
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(|e| StoreError::MigrationError(format!("Failed to create trades table: {}", e)))?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_trades_identity_executed ON trades(identity, feed, executed_at DESC)",
    )
    .execute(pool)
    .await
    .map_err(|e| StoreError::MigrationError(format!("Failed to create trades index: {}", e)))?;

    Ok(())
}
