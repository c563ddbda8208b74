use crate::{db, StoreConfig, StoreError};
use chrono::{DateTime, Utc};
use common::models::{Category, NormalizedTrade, Side, TradeFeed};
use rust_decimal::Decimal;
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};
use std::str::FromStr;
use tracing::debug;

/// Persists exchange account links and the trades synced for them, keyed by identity
#[derive(Clone)]
pub struct TradeStore {
    pub(crate) pool: SqlitePool,
    pub(crate) config: StoreConfig,
}

impl TradeStore {
    pub async fn new(config: StoreConfig) -> Result<Self, StoreError> {
        let pool = db::connect(&config).await?;
        Ok(Self { pool, config })
    }

    /// Insert trades not yet stored for this identity and feed, then bump `last_synced_at`.
    ///
    /// Returns the number of rows written. Trades already present keep their first
    /// stored copy unless `overwrite_existing_trades` is set. Each feed keeps its own
    /// rows, since closed-PnL records reuse the order id of the closing fill.
    pub async fn upsert_trades(
        &self,
        identity: &str,
        feed: TradeFeed,
        trades: &[NormalizedTrade],
    ) -> Result<usize, StoreError> {
        let statement = if self.config.overwrite_existing_trades {
            r#"
            INSERT INTO trades (
                identity, trade_id, symbol, side, price, quantity,
                executed_at, order_id, category, fee, pnl, feed
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            ON CONFLICT(identity, feed, trade_id) DO UPDATE SET
                symbol = excluded.symbol,
                side = excluded.side,
                price = excluded.price,
                quantity = excluded.quantity,
                executed_at = excluded.executed_at,
                order_id = excluded.order_id,
                category = excluded.category,
                fee = excluded.fee,
                pnl = excluded.pnl
            "#
        } else {
            r#"
            INSERT OR IGNORE INTO trades (
                identity, trade_id, symbol, side, price, quantity,
                executed_at, order_id, category, fee, pnl, feed
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            "#
        };

        let mut tx = self.pool.begin().await?;
        let mut written = 0u64;

        for trade in trades {
            written += sqlx::query(statement)
                .bind(identity)
                .bind(&trade.trade_id)
                .bind(&trade.symbol)
                .bind(trade.side.as_str())
                .bind(trade.price.to_string())
                .bind(trade.quantity.to_string())
                .bind(trade.executed_at.timestamp_millis())
                .bind(&trade.order_id)
                .bind(trade.category.as_str())
                .bind(trade.fee.to_string())
                .bind(trade.pnl.to_string())
                .bind(feed.as_str())
                .execute(&mut *tx)
                .await
                .map_err(|e| StoreError::WriteError(format!("Failed to store trade {}: {}", trade.trade_id, e)))?
                .rows_affected();
        }

        tx.commit()
            .await
            .map_err(|e| StoreError::WriteError(format!("Failed to commit trades: {}", e)))?;

        // separate write; a stale timestamp is repaired by the next sync
        self.touch_last_synced(identity).await?;

        debug!(
            "Stored {} of {} trades for identity {}",
            written,
            trades.len(),
            identity
        );

        Ok(written as usize)
    }

    /// Stored trades for an identity and feed, most recent first
    pub async fn list_trades(
        &self,
        identity: &str,
        feed: TradeFeed,
        limit: usize,
    ) -> Result<Vec<NormalizedTrade>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT trade_id, symbol, side, price, quantity, executed_at,
                   order_id, category, fee, pnl
            FROM trades
            WHERE identity = ?1 AND feed = ?2
            ORDER BY executed_at DESC, trade_id DESC
            LIMIT ?3
            "#,
        )
        .bind(identity)
        .bind(feed.as_str())
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(scan_trade).collect()
    }

    pub async fn count_trades(&self, identity: &str) -> Result<usize, StoreError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM trades WHERE identity = ?1")
            .bind(identity)
            .fetch_one(&self.pool)
            .await?;
        Ok(count as usize)
    }

    pub async fn purge_trades(&self, identity: &str) -> Result<u64, StoreError> {
        let deleted = sqlx::query("DELETE FROM trades WHERE identity = ?1")
            .bind(identity)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::WriteError(format!("Failed to purge trades: {}", e)))?
            .rows_affected();

        debug!("Purged {} trades for identity {}", deleted, identity);
        Ok(deleted)
    }
}

fn scan_trade(row: &SqliteRow) -> Result<NormalizedTrade, StoreError> {
    let executed_at: i64 = row.try_get("executed_at")?;
    let side: String = row.try_get("side")?;
    let category: String = row.try_get("category")?;

    Ok(NormalizedTrade {
        trade_id: row.try_get("trade_id")?,
        symbol: row.try_get("symbol")?,
        side: Side::from_str(&side).map_err(|e| StoreError::ConversionError(e.to_string()))?,
        price: scan_decimal(row, "price")?,
        quantity: scan_decimal(row, "quantity")?,
        executed_at: DateTime::<Utc>::from_timestamp_millis(executed_at).ok_or_else(|| {
            StoreError::ConversionError(format!("executed_at out of range: {}", executed_at))
        })?,
        order_id: row.try_get("order_id")?,
        category: Category::from_str(&category)
            .map_err(|e| StoreError::ConversionError(e.to_string()))?,
        fee: scan_decimal(row, "fee")?,
        pnl: scan_decimal(row, "pnl")?,
    })
}

fn scan_decimal(row: &SqliteRow, column: &str) -> Result<Decimal, StoreError> {
    let raw: String = row.try_get(column)?;
    Decimal::from_str(&raw)
        .map_err(|e| StoreError::ConversionError(format!("{} is not a decimal ({}): {}", column, raw, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    async fn memory_store(config: StoreConfig) -> TradeStore {
        TradeStore::new(config).await.unwrap()
    }

    fn trade(id: &str, executed_ms: i64, price: Decimal) -> NormalizedTrade {
        NormalizedTrade {
            trade_id: id.to_string(),
            symbol: "BTCUSDT".to_string(),
            side: Side::Buy,
            price,
            quantity: dec!(0.001),
            executed_at: DateTime::from_timestamp_millis(executed_ms).unwrap(),
            order_id: format!("order-{}", id),
            category: Category::Linear,
            fee: dec!(0.0258),
            pnl: Decimal::ZERO,
        }
    }

    #[tokio::test]
    async fn test_same_trade_twice_is_stored_once() {
        let store = memory_store(StoreConfig::in_memory()).await;
        let t = trade("e-1", 1_700_000_000_000, dec!(43000));

        assert_eq!(store.upsert_trades("alice", TradeFeed::Executions, &[t.clone()]).await.unwrap(), 1);
        assert_eq!(store.upsert_trades("alice", TradeFeed::Executions, &[t.clone()]).await.unwrap(), 0);

        assert_eq!(store.count_trades("alice").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_first_write_wins_by_default() {
        let store = memory_store(StoreConfig::in_memory()).await;

        store
            .upsert_trades("alice", TradeFeed::Executions, &[trade("e-1", 1_700_000_000_000, dec!(43000))])
            .await
            .unwrap();
        store
            .upsert_trades("alice", TradeFeed::Executions, &[trade("e-1", 1_700_000_000_000, dec!(99999))])
            .await
            .unwrap();

        let stored = store.list_trades("alice", TradeFeed::Executions, 10).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].price, dec!(43000));
    }

    #[tokio::test]
    async fn test_overwrite_mode_keeps_last_write() {
        let store = memory_store(StoreConfig {
            overwrite_existing_trades: true,
            ..StoreConfig::in_memory()
        })
        .await;

        store
            .upsert_trades("alice", TradeFeed::Executions, &[trade("e-1", 1_700_000_000_000, dec!(43000))])
            .await
            .unwrap();
        store
            .upsert_trades("alice", TradeFeed::Executions, &[trade("e-1", 1_700_000_000_000, dec!(43500.25))])
            .await
            .unwrap();

        let stored = store.list_trades("alice", TradeFeed::Executions, 10).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].price, dec!(43500.25));
    }

    #[tokio::test]
    async fn test_list_trades_newest_first_and_capped() {
        let store = memory_store(StoreConfig::in_memory()).await;
        let trades = vec![
            trade("e-1", 1_700_000_000_000, dec!(1)),
            trade("e-3", 1_700_000_200_000, dec!(3)),
            trade("e-2", 1_700_000_100_000, dec!(2)),
        ];
        store.upsert_trades("alice", TradeFeed::Executions, &trades).await.unwrap();

        let listed = store.list_trades("alice", TradeFeed::Executions, 2).await.unwrap();
        let ids: Vec<_> = listed.iter().map(|t| t.trade_id.as_str()).collect();
        assert_eq!(ids, vec!["e-3", "e-2"]);
    }

    #[tokio::test]
    async fn test_trades_are_scoped_by_identity() {
        let store = memory_store(StoreConfig::in_memory()).await;
        let t = trade("e-1", 1_700_000_000_000, dec!(43000));

        store.upsert_trades("alice", TradeFeed::Executions, &[t.clone()]).await.unwrap();
        assert_eq!(store.upsert_trades("bob", TradeFeed::Executions, &[t]).await.unwrap(), 1);

        assert_eq!(store.count_trades("alice").await.unwrap(), 1);
        assert_eq!(store.count_trades("bob").await.unwrap(), 1);
        assert!(store.list_trades("carol", TradeFeed::Executions, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_decimals_survive_storage() {
        let store = memory_store(StoreConfig::in_memory()).await;
        let mut t = trade("e-1", 1_700_000_000_123, dec!(0.000012345678));
        t.pnl = dec!(-12.5);
        store.upsert_trades("alice", TradeFeed::Executions, &[t.clone()]).await.unwrap();

        let stored = store.list_trades("alice", TradeFeed::Executions, 1).await.unwrap();
        assert_eq!(stored[0], t);
    }

    #[tokio::test]
    async fn test_purge_trades() {
        let store = memory_store(StoreConfig::in_memory()).await;
        store
            .upsert_trades("alice", TradeFeed::Executions, &[trade("e-1", 1_700_000_000_000, dec!(1))])
            .await
            .unwrap();

        assert_eq!(store.purge_trades("alice").await.unwrap(), 1);
        assert_eq!(store.count_trades("alice").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_feeds_do_not_share_rows() {
        let store = memory_store(StoreConfig::in_memory()).await;

        let mut fill = trade("exec-1", 1_700_000_000_000, dec!(43000));
        fill.order_id = "ord-9".to_string();
        let mut closed = trade("ord-9", 1_700_000_060_000, dec!(43100));
        closed.order_id = "ord-9".to_string();
        closed.side = Side::Sell;

        store.upsert_trades("alice", TradeFeed::Executions, &[fill.clone()]).await.unwrap();
        store.upsert_trades("alice", TradeFeed::ClosedPnl, &[closed.clone()]).await.unwrap();

        let executions = store.list_trades("alice", TradeFeed::Executions, 10).await.unwrap();
        assert_eq!(executions, vec![fill]);

        let closed_pnl = store.list_trades("alice", TradeFeed::ClosedPnl, 10).await.unwrap();
        assert_eq!(closed_pnl, vec![closed]);
    }

    #[tokio::test]
    async fn test_same_id_in_both_feeds_is_kept_twice() {
        let store = memory_store(StoreConfig::in_memory()).await;
        let t = trade("ord-9", 1_700_000_000_000, dec!(43000));

        assert_eq!(store.upsert_trades("alice", TradeFeed::Executions, &[t.clone()]).await.unwrap(), 1);
        assert_eq!(store.upsert_trades("alice", TradeFeed::ClosedPnl, &[t]).await.unwrap(), 1);
        assert_eq!(store.count_trades("alice").await.unwrap(), 2);
    }
}
