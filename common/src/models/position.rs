use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::models::{Category, Side};

/// An open position as reported by the exchange. Never persisted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedPosition {
    pub symbol: String,
    pub side: Side,
    pub size: Decimal,
    pub entry_price: Decimal,
    pub mark_price: Option<Decimal>,
    pub position_value: Option<Decimal>,
    pub unrealised_pnl: Decimal,
    pub leverage: Option<Decimal>,
    pub liquidation_price: Option<Decimal>,
    pub category: Category,
    pub updated_at: Option<DateTime<Utc>>,
}
