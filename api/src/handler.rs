use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Extension, Json,
};
use chrono::{DateTime, Utc};
use common::{
    models::{AccountStatus, Category, NormalizedPosition, NormalizedTrade, TradeFeed},
    Error as CommonError,
};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tracing::{debug, error, warn};

use crate::{auth::Identity, service::TradeSource, AppState};

// Wrapper so common::Error can become an axum response
#[derive(Debug)]
pub struct ApiError(CommonError);

impl From<CommonError> for ApiError {
    fn from(err: CommonError) -> Self {
        ApiError(err)
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    success: bool,
    error: &'static str,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let err = self.0;
        let status = match &err {
            CommonError::MissingFields(_)
            | CommonError::InvalidCredentials(_)
            | CommonError::DuplicateAccount
            | CommonError::AccountNotConnected
            | CommonError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            CommonError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            CommonError::UpstreamUnavailable(_)
            | CommonError::UpstreamRejected { .. }
            | CommonError::UpstreamDataInvalid(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!(
                misconfiguration = err.is_misconfiguration(),
                "Request failed: {}", err
            );
            "Internal server error".to_string()
        } else {
            debug!("Request rejected: {}", err);
            err.to_string()
        };

        (
            status,
            Json(ErrorResponse {
                success: false,
                error: err.code(),
                message,
            }),
        )
            .into_response()
    }
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub timestamp: DateTime<Utc>,
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "OK",
        timestamp: Utc::now(),
    })
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConnectRequest {
    pub api_key: Option<String>,
    pub api_secret: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectResponse {
    pub success: bool,
    pub message: String,
    pub trades_count: usize,
}

// Link an exchange account to the caller
pub async fn connect_account(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    body: Option<Json<ConnectRequest>>,
) -> Result<Json<ConnectResponse>, ApiError> {
    let request = body.map(|Json(b)| b).unwrap_or_default();

    let outcome = state
        .orchestrator
        .connect_account(
            identity.as_str(),
            request.api_key.as_deref(),
            request.api_secret.as_deref(),
        )
        .await?;

    Ok(Json(ConnectResponse {
        success: true,
        message: "Exchange account connected".to_string(),
        trades_count: outcome.trades_count,
    }))
}

#[derive(Debug, Deserialize)]
pub struct TradesQuery {
    // parsed by hand so bad values get the JSON error envelope
    pub limit: Option<String>,
    pub category: Option<String>,
    pub feed: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TradesResponse {
    pub success: bool,
    pub trades: Vec<NormalizedTrade>,
    pub source: TradeSource,
    pub total: usize,
    pub last_synced: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

// Recent trades for the caller, fresh when the exchange answers
pub async fn list_trades(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Query(query): Query<TradesQuery>,
) -> Result<Json<TradesResponse>, ApiError> {
    let category = parse_category(query.category.as_deref(), Category::Spot)?;
    let feed = parse_feed(query.feed.as_deref())?;
    let limit = parse_limit(query.limit.as_deref())?;

    let listing = state
        .orchestrator
        .list_trades(identity.as_str(), category, limit, feed)
        .await?;

    if listing.source == TradeSource::Cache {
        warn!("Returned cached trades to {}", identity.as_str());
    }

    Ok(Json(TradesResponse {
        success: true,
        total: listing.trades.len(),
        trades: listing.trades,
        source: listing.source,
        last_synced: listing.last_synced,
        message: listing.message,
    }))
}

#[derive(Debug, Deserialize)]
pub struct PositionsQuery {
    pub category: Option<String>,
}

#[derive(Serialize)]
pub struct PositionsResponse {
    pub success: bool,
    pub positions: Vec<NormalizedPosition>,
}

pub async fn list_positions(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Query(query): Query<PositionsQuery>,
) -> Result<Json<PositionsResponse>, ApiError> {
    let category = parse_category(query.category.as_deref(), Category::Linear)?;
    let positions = state
        .orchestrator
        .list_positions(identity.as_str(), category)
        .await?;

    Ok(Json(PositionsResponse {
        success: true,
        positions,
    }))
}

#[derive(Serialize)]
pub struct DisconnectResponse {
    pub success: bool,
    pub message: String,
}

pub async fn disconnect_account(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> Result<Json<DisconnectResponse>, ApiError> {
    state
        .orchestrator
        .disconnect_account(identity.as_str())
        .await?;

    Ok(Json(DisconnectResponse {
        success: true,
        message: "Exchange account disconnected".to_string(),
    }))
}

pub async fn account_status(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> Result<Json<AccountStatus>, ApiError> {
    let status = state.orchestrator.account_status(identity.as_str()).await?;
    Ok(Json(status))
}

fn parse_category(raw: Option<&str>, default: Category) -> Result<Category, ApiError> {
    match raw.map(str::trim).filter(|c| !c.is_empty()) {
        Some(raw) => Ok(Category::from_str(raw)?),
        None => Ok(default),
    }
}

fn parse_feed(raw: Option<&str>) -> Result<TradeFeed, ApiError> {
    match raw.map(str::trim).filter(|f| !f.is_empty()) {
        None => Ok(TradeFeed::default()),
        Some(f) if f.eq_ignore_ascii_case("executions") => Ok(TradeFeed::Executions),
        Some(f) if f.eq_ignore_ascii_case("closed_pnl") => Ok(TradeFeed::ClosedPnl),
        Some(f) => Err(CommonError::InvalidRequest(format!(
            "Unknown feed '{}', expected executions or closed_pnl",
            f
        ))
        .into()),
    }
}

fn parse_limit(raw: Option<&str>) -> Result<Option<usize>, ApiError> {
    match raw.map(str::trim).filter(|l| !l.is_empty()) {
        None => Ok(None),
        Some(l) => l.parse::<usize>().map(Some).map_err(|_| {
            CommonError::InvalidRequest(format!("limit must be a positive integer, got '{}'", l))
                .into()
        }),
    }
}
