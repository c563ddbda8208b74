//! Typed Bybit V5 response shapes and their translation into the canonical models.
//!
//! Raw records deserialize every field as optional; required fields are checked
//! here so a missing value surfaces as `UpstreamDataInvalid` naming the field.

use chrono::{DateTime, Utc};
use common::{
    models::{Category, NormalizedPosition, NormalizedTrade, Side},
    Error, Result,
};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::HashMap;
use std::str::FromStr;

/// `{retCode, retMsg, result}` wrapper shared by every V5 endpoint
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiEnvelope<T> {
    pub ret_code: i64,
    #[serde(default)]
    pub ret_msg: String,
    pub result: Option<T>,
}

impl<T> ApiEnvelope<T> {
    /// Unwrap the result, mapping a non-zero return code to `UpstreamRejected`
    pub fn into_result(self) -> Result<T> {
        if self.ret_code != 0 {
            return Err(Error::UpstreamRejected {
                code: self.ret_code,
                message: self.ret_msg,
            });
        }
        self.result
            .ok_or_else(|| Error::UpstreamDataInvalid("response has no result".to_string()))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListResult<T> {
    #[serde(default = "Vec::new")]
    pub list: Vec<T>,
    #[serde(default)]
    pub next_page_cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiKeyInfo {
    #[serde(default)]
    pub read_only: Option<i64>,
    #[serde(default)]
    pub permissions: HashMap<String, Vec<String>>,
    #[serde(default, rename = "userID")]
    pub user_id: Option<i64>,
}

impl ApiKeyInfo {
    /// A permission group counts as granted when the exchange lists at least one scope for it
    pub fn grants(&self, group: &str) -> bool {
        self.permissions
            .get(group)
            .map(|scopes| !scopes.is_empty())
            .unwrap_or(false)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionRecord {
    pub exec_id: Option<String>,
    pub symbol: Option<String>,
    pub side: Option<String>,
    pub exec_price: Option<String>,
    pub exec_qty: Option<String>,
    pub exec_time: Option<String>,
    pub order_id: Option<String>,
    pub exec_fee: Option<String>,
    pub closed_pnl: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClosedPnlRecord {
    pub order_id: Option<String>,
    pub symbol: Option<String>,
    pub side: Option<String>,
    pub avg_exit_price: Option<String>,
    pub closed_size: Option<String>,
    pub closed_pnl: Option<String>,
    pub updated_time: Option<String>,
    pub open_fee: Option<String>,
    pub close_fee: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionRecord {
    pub symbol: Option<String>,
    pub side: Option<String>,
    pub size: Option<String>,
    pub avg_price: Option<String>,
    pub mark_price: Option<String>,
    pub position_value: Option<String>,
    pub unrealised_pnl: Option<String>,
    pub leverage: Option<String>,
    pub liq_price: Option<String>,
    pub updated_time: Option<String>,
}

fn required<'a>(value: &'a Option<String>, field: &str) -> Result<&'a str> {
    match value.as_deref().map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(Error::UpstreamDataInvalid(format!("missing field {}", field))),
    }
}

fn decimal(value: &str, field: &str) -> Result<Decimal> {
    Decimal::from_str(value)
        .map_err(|e| Error::UpstreamDataInvalid(format!("{} is not a decimal ({:?}): {}", field, value, e)))
}

fn required_decimal(value: &Option<String>, field: &str) -> Result<Decimal> {
    decimal(required(value, field)?, field)
}

/// Empty or absent optional numbers count as zero, the way the exchange reports "no fee"
fn decimal_or_zero(value: &Option<String>, field: &str) -> Result<Decimal> {
    match value.as_deref().map(str::trim) {
        Some(v) if !v.is_empty() => decimal(v, field),
        _ => Ok(Decimal::ZERO),
    }
}

fn optional_decimal(value: &Option<String>, field: &str) -> Result<Option<Decimal>> {
    match value.as_deref().map(str::trim) {
        Some(v) if !v.is_empty() => decimal(v, field).map(Some),
        _ => Ok(None),
    }
}

fn millis(value: &str, field: &str) -> Result<DateTime<Utc>> {
    value
        .parse::<i64>()
        .ok()
        .and_then(DateTime::from_timestamp_millis)
        .ok_or_else(|| Error::UpstreamDataInvalid(format!("{} is not epoch millis: {:?}", field, value)))
}

pub fn normalize_execution(record: &ExecutionRecord, category: Category) -> Result<NormalizedTrade> {
    Ok(NormalizedTrade {
        trade_id: required(&record.exec_id, "execId")?.to_string(),
        symbol: required(&record.symbol, "symbol")?.to_string(),
        side: Side::from_str(required(&record.side, "side")?)?,
        price: required_decimal(&record.exec_price, "execPrice")?,
        quantity: required_decimal(&record.exec_qty, "execQty")?,
        executed_at: millis(required(&record.exec_time, "execTime")?, "execTime")?,
        order_id: record.order_id.clone().unwrap_or_default(),
        category,
        fee: decimal_or_zero(&record.exec_fee, "execFee")?,
        pnl: decimal_or_zero(&record.closed_pnl, "closedPnl")?,
    })
}

/// Closed-PnL records carry the side of the opening leg; the closing action is the opposite.
pub fn normalize_closed_pnl(record: &ClosedPnlRecord, category: Category) -> Result<NormalizedTrade> {
    let opening_side = Side::from_str(required(&record.side, "side")?)?;
    let order_id = required(&record.order_id, "orderId")?.to_string();

    Ok(NormalizedTrade {
        trade_id: order_id.clone(),
        symbol: required(&record.symbol, "symbol")?.to_string(),
        side: opening_side.inverted(),
        price: required_decimal(&record.avg_exit_price, "avgExitPrice")?,
        quantity: required_decimal(&record.closed_size, "closedSize")?,
        executed_at: millis(required(&record.updated_time, "updatedTime")?, "updatedTime")?,
        order_id,
        category,
        fee: decimal_or_zero(&record.open_fee, "openFee")? + decimal_or_zero(&record.close_fee, "closeFee")?,
        pnl: decimal_or_zero(&record.closed_pnl, "closedPnl")?,
    })
}

/// `None` for flat positions; the exchange lists those with size 0 and an empty side.
pub fn normalize_position(record: &PositionRecord, category: Category) -> Result<Option<NormalizedPosition>> {
    let size = required_decimal(&record.size, "size")?;
    if size <= Decimal::ZERO {
        return Ok(None);
    }

    let updated_at = match record.updated_time.as_deref().map(str::trim) {
        Some(v) if !v.is_empty() => Some(millis(v, "updatedTime")?),
        _ => None,
    };

    Ok(Some(NormalizedPosition {
        symbol: required(&record.symbol, "symbol")?.to_string(),
        side: Side::from_str(required(&record.side, "side")?)?,
        size,
        entry_price: required_decimal(&record.avg_price, "avgPrice")?,
        mark_price: optional_decimal(&record.mark_price, "markPrice")?,
        position_value: optional_decimal(&record.position_value, "positionValue")?,
        unrealised_pnl: decimal_or_zero(&record.unrealised_pnl, "unrealisedPnl")?,
        leverage: optional_decimal(&record.leverage, "leverage")?,
        liquidation_price: optional_decimal(&record.liq_price, "liqPrice")?,
        category,
        updated_at,
    }))
}
