use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use common::{
    models::{ApiCredentials, Category, NormalizedPosition, NormalizedTrade, Side},
    Error, Result,
};
use connectors::ExchangeConnector;
use rust_decimal_macros::dec;
use std::sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Arc, Mutex,
};
use store::{StoreConfig, TradeStore};
use vault::CredentialVault;

use crate::service::{SyncOrchestrator, SyncPolicy};

/// Scripted exchange used by service and router tests
pub struct MockConnector {
    pub valid: AtomicBool,
    pub fail_trades: AtomicBool,
    pub fail_positions: AtomicBool,
    pub validations: AtomicUsize,
    pub closed_pnl_calls: AtomicUsize,
    trades: Mutex<Vec<NormalizedTrade>>,
    closed_pnl: Mutex<Vec<NormalizedTrade>>,
    positions: Mutex<Vec<NormalizedPosition>>,
}

impl Default for MockConnector {
    fn default() -> Self {
        Self {
            valid: AtomicBool::new(true),
            fail_trades: AtomicBool::new(false),
            fail_positions: AtomicBool::new(false),
            validations: AtomicUsize::new(0),
            closed_pnl_calls: AtomicUsize::new(0),
            trades: Mutex::new(Vec::new()),
            closed_pnl: Mutex::new(Vec::new()),
            positions: Mutex::new(Vec::new()),
        }
    }
}

impl MockConnector {
    pub fn set_trades(&self, trades: Vec<NormalizedTrade>) {
        *self.trades.lock().unwrap() = trades;
    }

    pub fn set_closed_pnl(&self, trades: Vec<NormalizedTrade>) {
        *self.closed_pnl.lock().unwrap() = trades;
    }

    pub fn set_positions(&self, positions: Vec<NormalizedPosition>) {
        *self.positions.lock().unwrap() = positions;
    }
}

#[async_trait]
impl ExchangeConnector for MockConnector {
    async fn validate_credentials(&self, _credentials: &ApiCredentials) -> bool {
        self.validations.fetch_add(1, Ordering::SeqCst);
        self.valid.load(Ordering::SeqCst)
    }

    async fn fetch_trades(
        &self,
        _credentials: &ApiCredentials,
        _category: Category,
        limit: usize,
    ) -> Result<Vec<NormalizedTrade>> {
        if self.fail_trades.load(Ordering::SeqCst) {
            return Err(Error::UpstreamUnavailable("connection refused".to_string()));
        }
        let trades = self.trades.lock().unwrap();
        Ok(trades.iter().take(limit).cloned().collect())
    }

    async fn fetch_closed_pnl(
        &self,
        _credentials: &ApiCredentials,
        _category: Category,
        limit: usize,
    ) -> Result<Vec<NormalizedTrade>> {
        self.closed_pnl_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_trades.load(Ordering::SeqCst) {
            return Err(Error::UpstreamUnavailable("connection refused".to_string()));
        }
        let trades = self.closed_pnl.lock().unwrap();
        Ok(trades.iter().take(limit).cloned().collect())
    }

    async fn fetch_positions(
        &self,
        _credentials: &ApiCredentials,
        _category: Category,
    ) -> Result<Vec<NormalizedPosition>> {
        if self.fail_positions.load(Ordering::SeqCst) {
            return Err(Error::UpstreamUnavailable("connection refused".to_string()));
        }
        Ok(self.positions.lock().unwrap().clone())
    }
}

/// A spot buy executed `minute` minutes after a fixed epoch
pub fn trade(id: &str, minute: i64) -> NormalizedTrade {
    NormalizedTrade {
        trade_id: id.to_string(),
        symbol: "BTCUSDT".to_string(),
        side: Side::Buy,
        price: dec!(42000.5),
        quantity: dec!(0.01),
        executed_at: Utc.timestamp_opt(1_700_000_000 + minute * 60, 0).unwrap(),
        order_id: format!("order-{}", id),
        category: Category::Spot,
        fee: dec!(0.42),
        pnl: dec!(0),
    }
}

pub fn position(symbol: &str) -> NormalizedPosition {
    NormalizedPosition {
        symbol: symbol.to_string(),
        side: Side::Buy,
        size: dec!(0.5),
        entry_price: dec!(41000),
        mark_price: Some(dec!(42000)),
        position_value: Some(dec!(20500)),
        unrealised_pnl: dec!(500),
        leverage: Some(dec!(10)),
        liquidation_price: None,
        category: Category::Linear,
        updated_at: None,
    }
}

pub async fn orchestrator() -> (
    SyncOrchestrator,
    Arc<MockConnector>,
    Arc<TradeStore>,
    Arc<CredentialVault>,
) {
    orchestrator_with(SyncPolicy::default()).await
}

pub async fn orchestrator_with(
    policy: SyncPolicy,
) -> (
    SyncOrchestrator,
    Arc<MockConnector>,
    Arc<TradeStore>,
    Arc<CredentialVault>,
) {
    let connector = Arc::new(MockConnector::default());
    let store = Arc::new(TradeStore::new(StoreConfig::in_memory()).await.unwrap());
    let vault = Arc::new(CredentialVault::new(&vault::generate_master_key()).unwrap());

    let service = SyncOrchestrator::new(connector.clone(), vault.clone(), store.clone(), policy);
    (service, connector, store, vault)
}
