use crate::{StoreError, TradeStore};
use chrono::{DateTime, Utc};
use common::models::CredentialRecord;
use sqlx::{sqlite::SqliteRow, Row};
use tracing::{debug, info};

impl TradeStore {
    /// Create or overwrite the account link for an identity.
    ///
    /// `connected_at` is kept when the identity is already connected and reset when
    /// the previous link had been disconnected.
    pub async fn upsert_credentials(
        &self,
        identity: &str,
        encrypted_api_key: &str,
        encrypted_api_secret: &str,
        fingerprint: &str,
    ) -> Result<CredentialRecord, StoreError> {
        let now = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO exchange_accounts (
                identity, encrypted_api_key, encrypted_api_secret, fingerprint,
                is_connected, connected_at, last_synced_at, updated_at
            )
            VALUES (?1, ?2, ?3, ?4, 1, ?5, NULL, ?5)
            ON CONFLICT(identity) DO UPDATE SET
                encrypted_api_key = excluded.encrypted_api_key,
                encrypted_api_secret = excluded.encrypted_api_secret,
                fingerprint = excluded.fingerprint,
                connected_at = CASE WHEN exchange_accounts.is_connected
                    THEN exchange_accounts.connected_at ELSE excluded.connected_at END,
                last_synced_at = CASE WHEN exchange_accounts.is_connected
                    THEN exchange_accounts.last_synced_at ELSE NULL END,
                is_connected = 1,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(identity)
        .bind(encrypted_api_key)
        .bind(encrypted_api_secret)
        .bind(fingerprint)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::WriteError(format!("Failed to save credentials: {}", e)))?;

        self.get_credentials(identity).await?.ok_or_else(|| {
            StoreError::WriteError(format!("Account for {} vanished after write", identity))
        })
    }

    pub async fn get_credentials(
        &self,
        identity: &str,
    ) -> Result<Option<CredentialRecord>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT identity, encrypted_api_key, encrypted_api_secret, fingerprint,
                   is_connected, connected_at, last_synced_at
            FROM exchange_accounts
            WHERE identity = ?1
            "#,
        )
        .bind(identity)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(scan_credentials).transpose()
    }

    pub async fn exists_by_fingerprint(&self, fingerprint: &str) -> Result<bool, StoreError> {
        Ok(self.fingerprint_owner(fingerprint).await?.is_some())
    }

    /// Identity currently linked to this key pair, if any
    pub async fn fingerprint_owner(&self, fingerprint: &str) -> Result<Option<String>, StoreError> {
        let owner: Option<String> = sqlx::query_scalar(
            "SELECT identity FROM exchange_accounts WHERE fingerprint = ?1 AND is_connected = 1 LIMIT 1",
        )
        .bind(fingerprint)
        .fetch_optional(&self.pool)
        .await?;

        Ok(owner)
    }

    /// Clear key material and mark the identity disconnected; purges cached trades
    /// when configured to. Returns whether a record existed.
    pub async fn disconnect(&self, identity: &str) -> Result<bool, StoreError> {
        let updated = sqlx::query(
            r#"
            UPDATE exchange_accounts
            SET encrypted_api_key = NULL,
                encrypted_api_secret = NULL,
                fingerprint = NULL,
                is_connected = 0,
                updated_at = ?1
            WHERE identity = ?2
            "#,
        )
        .bind(Utc::now())
        .bind(identity)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::WriteError(format!("Failed to disconnect account: {}", e)))?
        .rows_affected();

        if self.config.purge_trades_on_disconnect {
            self.purge_trades(identity).await?;
        }

        info!("Disconnected exchange account for identity {}", identity);
        Ok(updated > 0)
    }

    pub async fn touch_last_synced(&self, identity: &str) -> Result<(), StoreError> {
        sqlx::query("UPDATE exchange_accounts SET last_synced_at = ?1 WHERE identity = ?2")
            .bind(Utc::now())
            .bind(identity)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::WriteError(format!("Failed to update last_synced_at: {}", e)))?;

        debug!("Updated last_synced_at for identity {}", identity);
        Ok(())
    }
}

fn scan_credentials(row: &SqliteRow) -> Result<CredentialRecord, StoreError> {
    let connected_at: DateTime<Utc> = row.try_get("connected_at")?;
    let last_synced_at: Option<DateTime<Utc>> = row.try_get("last_synced_at")?;

    Ok(CredentialRecord {
        identity: row.try_get("identity")?,
        encrypted_api_key: row.try_get("encrypted_api_key")?,
        encrypted_api_secret: row.try_get("encrypted_api_secret")?,
        fingerprint: row.try_get("fingerprint")?,
        is_connected: row.try_get("is_connected")?,
        connected_at,
        last_synced_at,
    })
}
