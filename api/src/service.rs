use chrono::{DateTime, Utc};
use common::{
    models::{
        AccountStatus, ApiCredentials, Category, CredentialRecord, NormalizedPosition,
        NormalizedTrade, TradeFeed,
    },
    Error, Result,
};
use connectors::{ExchangeConnector, MAX_PAGE_LIMIT};
use serde::Serialize;
use std::sync::Arc;
use store::TradeStore;
use tracing::{debug, error, info, warn};
use vault::CredentialVault;

/// Tunables for account linking and syncing
#[derive(Debug, Clone)]
pub struct SyncPolicy {
    /// Refuse to link a key pair already linked to another identity
    pub block_duplicate_accounts: bool,
    /// Page size when the caller gives none
    pub default_trade_limit: usize,
    /// Category prefetched right after a successful connect
    pub initial_sync_category: Category,
}

impl Default for SyncPolicy {
    fn default() -> Self {
        Self {
            block_duplicate_accounts: true,
            default_trade_limit: 50,
            initial_sync_category: Category::Spot,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TradeSource {
    Exchange,
    Cache,
}

#[derive(Debug, Clone)]
pub struct ConnectOutcome {
    /// Trades fetched and stored by the initial sync
    pub trades_count: usize,
}

#[derive(Debug, Clone)]
pub struct TradeListing {
    pub trades: Vec<NormalizedTrade>,
    pub source: TradeSource,
    pub last_synced: Option<DateTime<Utc>>,
    /// Why the cache was served, when it was
    pub message: Option<String>,
}

/// Use-case layer tying the vault, the exchange connector and the store together
pub struct SyncOrchestrator {
    connector: Arc<dyn ExchangeConnector>,
    vault: Arc<CredentialVault>,
    store: Arc<TradeStore>,
    policy: SyncPolicy,
}

impl SyncOrchestrator {
    pub fn new(
        connector: Arc<dyn ExchangeConnector>,
        vault: Arc<CredentialVault>,
        store: Arc<TradeStore>,
        policy: SyncPolicy,
    ) -> Self {
        Self {
            connector,
            vault,
            store,
            policy,
        }
    }

    /// Validate a key pair with the exchange, store it encrypted and prefetch recent trades
    pub async fn connect_account(
        &self,
        identity: &str,
        api_key: Option<&str>,
        api_secret: Option<&str>,
    ) -> Result<ConnectOutcome> {
        let api_key = api_key.map(str::trim).filter(|v| !v.is_empty());
        let api_secret = api_secret.map(str::trim).filter(|v| !v.is_empty());
        let (api_key, api_secret) = match (api_key, api_secret) {
            (Some(key), Some(secret)) => (key, secret),
            _ => {
                return Err(Error::MissingFields(
                    "API Key and Secret are required".to_string(),
                ))
            }
        };

        let fingerprint = self.vault.fingerprint(api_key, api_secret);

        if self.policy.block_duplicate_accounts {
            if let Some(owner) = self.store.fingerprint_owner(&fingerprint).await? {
                if owner != identity {
                    warn!("Identity {} tried to link an account owned by another identity", identity);
                    return Err(Error::DuplicateAccount);
                }
            }
        }

        let credentials = ApiCredentials::new(api_key, api_secret);
        if !self.connector.validate_credentials(&credentials).await {
            return Err(Error::InvalidCredentials(
                "The exchange rejected the key or it lacks the required permission".to_string(),
            ));
        }

        let encrypted_key = self.seal(credentials.api_key())?;
        let encrypted_secret = self.seal(credentials.api_secret())?;
        self.store
            .upsert_credentials(identity, &encrypted_key, &encrypted_secret, &fingerprint)
            .await?;

        info!("Connected exchange account for identity {}", identity);

        // prefetch is best effort; the link stands even if it fails
        let trades_count = match self
            .connector
            .fetch_trades(
                &credentials,
                self.policy.initial_sync_category,
                self.policy.default_trade_limit,
            )
            .await
        {
            Ok(trades) => match self
                .store
                .upsert_trades(identity, TradeFeed::Executions, &trades)
                .await
            {
                Ok(_) => trades.len(),
                Err(e) => {
                    warn!("Initial trade sync for {} could not be stored: {}", identity, e);
                    0
                }
            },
            Err(e) => {
                warn!("Initial trade sync for {} failed: {}", identity, e);
                0
            }
        };

        Ok(ConnectOutcome { trades_count })
    }

    /// Fresh trades merged into the store, or the stored view when the exchange fails
    pub async fn list_trades(
        &self,
        identity: &str,
        category: Category,
        limit: Option<usize>,
        feed: TradeFeed,
    ) -> Result<TradeListing> {
        let limit = limit
            .unwrap_or(self.policy.default_trade_limit)
            .clamp(1, MAX_PAGE_LIMIT);
        let (credentials, record) = self.load_credentials(identity).await?;

        let fetched = match feed {
            TradeFeed::Executions => {
                self.connector
                    .fetch_trades(&credentials, category, limit)
                    .await
            }
            TradeFeed::ClosedPnl => {
                self.connector
                    .fetch_closed_pnl(&credentials, category, limit)
                    .await
            }
        };
        drop(credentials);

        match fetched {
            Ok(trades) => {
                debug!("Fetched {} trades for {} from the exchange", trades.len(), identity);
                self.store.upsert_trades(identity, feed, &trades).await?;
                let merged = self.store.list_trades(identity, feed, limit).await?;
                let last_synced = self
                    .store
                    .get_credentials(identity)
                    .await?
                    .and_then(|r| r.last_synced_at);

                Ok(TradeListing {
                    trades: merged,
                    source: TradeSource::Exchange,
                    last_synced,
                    message: None,
                })
            }
            Err(e) if e.is_upstream() => {
                let cached = self.store.list_trades(identity, feed, limit).await?;
                if cached.is_empty() {
                    warn!("Exchange failed for {} and no cached trades exist: {}", identity, e);
                    return Err(e);
                }

                warn!("Serving {} cached trades for {}: {}", cached.len(), identity, e);
                Ok(TradeListing {
                    trades: cached,
                    source: TradeSource::Cache,
                    last_synced: record.last_synced_at,
                    message: Some(e.to_string()),
                })
            }
            Err(e) => Err(e),
        }
    }

    /// Open positions straight from the exchange; failures are surfaced
    pub async fn list_positions(
        &self,
        identity: &str,
        category: Category,
    ) -> Result<Vec<NormalizedPosition>> {
        let (credentials, _) = self.load_credentials(identity).await?;
        self.connector.fetch_positions(&credentials, category).await
    }

    /// Idempotent: unknown identities succeed too
    pub async fn disconnect_account(&self, identity: &str) -> Result<()> {
        let existed = self.store.disconnect(identity).await?;
        if !existed {
            debug!("Disconnect for {} found no linked account", identity);
        }
        Ok(())
    }

    pub async fn account_status(&self, identity: &str) -> Result<AccountStatus> {
        Ok(AccountStatus::from(self.store.get_credentials(identity).await?))
    }

    async fn load_credentials(&self, identity: &str) -> Result<(ApiCredentials, CredentialRecord)> {
        let record = self
            .store
            .get_credentials(identity)
            .await?
            .ok_or(Error::AccountNotConnected)?;

        let (encrypted_key, encrypted_secret) =
            record.ciphertexts().ok_or(Error::AccountNotConnected)?;

        let api_key = self.open(identity, encrypted_key)?;
        let api_secret = self.open(identity, encrypted_secret)?;

        Ok((ApiCredentials::new(api_key, api_secret), record))
    }

    fn seal(&self, plaintext: &str) -> Result<String> {
        self.vault.encrypt(plaintext).map_err(|e| {
            error!(misconfiguration = true, "Credential encryption failed: {}", e);
            Error::from(e)
        })
    }

    fn open(&self, identity: &str, ciphertext: &str) -> Result<String> {
        self.vault.decrypt(ciphertext).map_err(|e| {
            error!(
                misconfiguration = true,
                "Stored credentials for {} could not be decrypted; check ENCRYPTION_MASTER_KEY: {}",
                identity,
                e
            );
            Error::from(e)
        })
    }
}
