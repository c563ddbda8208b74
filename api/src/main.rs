mod auth;
mod config;
mod handler;
mod service;
#[cfg(test)]
mod testing;

use auth::AuthConfig;
use axum::{
    http::HeaderValue,
    middleware,
    routing::{get, post},
    Router,
};
use config::ApiConfig;
use connectors::{BybitConfig, BybitConnector};
use service::SyncOrchestrator;
use std::net::SocketAddr;
use std::sync::Arc;
use store::{StoreConfig, TradeStore};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use vault::CredentialVault;

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<SyncOrchestrator>,
    pub auth: Arc<AuthConfig>,
}

/// Account and trade routes behind identity resolution, plus a public health check
pub fn build_router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/account/connect", post(handler::connect_account))
        .route("/account/disconnect", post(handler::disconnect_account))
        .route("/account/status", get(handler::account_status))
        .route("/trades", get(handler::list_trades))
        .route("/positions", get(handler::list_positions))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_identity,
        ));

    Router::new()
        .route("/health", get(handler::health))
        .merge(protected)
        .with_state(state)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Starting TradeLink API");

    let api_config = ApiConfig::from_env();
    let auth_config = api_config.auth()?;
    if auth_config.dev_mode {
        warn!("DEV_MODE is enabled; identities are taken from the X-User-Id header");
    }

    let vault = CredentialVault::from_env()
        .map_err(|e| format!("Failed to initialize credential vault: {}", e))?;

    let store_config = StoreConfig::from_env()
        .map_err(|e| format!("Failed to load store configuration: {}", e))?;
    let trade_store = TradeStore::new(store_config)
        .await
        .map_err(|e| format!("Failed to open trade store: {}", e))?;

    let bybit_config = BybitConfig::from_env();
    info!("Using Bybit endpoint {}", bybit_config.base_url);
    let connector = BybitConnector::new(bybit_config)?;

    let orchestrator = SyncOrchestrator::new(
        Arc::new(connector),
        Arc::new(vault),
        Arc::new(trade_store),
        api_config.sync_policy(),
    );

    let state = AppState {
        orchestrator: Arc::new(orchestrator),
        auth: Arc::new(auth_config),
    };

    let cors = match &api_config.cors_origin {
        Some(origin) => CorsLayer::new().allow_origin(origin.parse::<HeaderValue>()?),
        None => CorsLayer::new().allow_origin(Any),
    }
    .allow_methods(Any)
    .allow_headers(Any);

    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors);

    let addr: SocketAddr = format!("{}:{}", api_config.host, api_config.port).parse()?;
    info!("Listening on {}", addr);

    axum::Server::bind(&addr)
        .serve(app.into_make_service())
        .await?;

    Ok(())
}
