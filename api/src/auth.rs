//! Identity resolution for inbound requests.
//!
//! Production requests carry Telegram WebApp init data in `X-Telegram-Init-Data`;
//! the `hash` field is verified against the bot token before the user id is trusted.
//! In dev mode the identity is read from `X-User-Id` instead.

use axum::{
    extract::State,
    http::{HeaderMap, Request},
    middleware::Next,
    response::Response,
};
use common::Error;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use tracing::{debug, warn};

use crate::{handler::ApiError, AppState};

type HmacSha256 = Hmac<Sha256>;

pub const INIT_DATA_HEADER: &str = "x-telegram-init-data";
pub const DEV_USER_HEADER: &str = "x-user-id";
const DEV_DEFAULT_USER: &str = "test-user";

/// Stable user identity injected into request extensions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity(pub String);

impl Identity {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub dev_mode: bool,
    pub bot_token: Option<String>,
}

pub fn resolve_identity(config: &AuthConfig, headers: &HeaderMap) -> Result<Identity, Error> {
    if config.dev_mode {
        let user = headers
            .get(DEV_USER_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .unwrap_or(DEV_DEFAULT_USER);
        return Ok(Identity(user.to_string()));
    }

    let init_data = headers
        .get(INIT_DATA_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| Error::Unauthorized("Telegram authentication required".to_string()))?;

    let bot_token = config
        .bot_token
        .as_deref()
        .ok_or_else(|| Error::ConfigError("Telegram bot token not configured".to_string()))?;

    verify_init_data(init_data, bot_token).map(Identity)
}

/// Verify Telegram WebApp init data and return the user id it vouches for
pub fn verify_init_data(init_data: &str, bot_token: &str) -> Result<String, Error> {
    let mut hash = None;
    let mut user = None;
    let mut fields = Vec::new();

    for (key, value) in url::form_urlencoded::parse(init_data.as_bytes()) {
        if key == "hash" {
            hash = Some(value.into_owned());
            continue;
        }
        if key == "user" {
            user = Some(value.to_string());
        }
        fields.push(format!("{}={}", key, value));
    }

    let hash = hash.ok_or_else(|| Error::Unauthorized("Invalid Telegram authentication".to_string()))?;
    let expected = hex::decode(&hash)
        .map_err(|_| Error::Unauthorized("Invalid Telegram authentication".to_string()))?;

    fields.sort();
    let data_check_string = fields.join("\n");

    let mut secret = HmacSha256::new_from_slice(b"WebAppData")
        .map_err(|e| Error::InternalError(e.to_string()))?;
    secret.update(bot_token.as_bytes());
    let secret_key = secret.finalize().into_bytes();

    let mut mac = HmacSha256::new_from_slice(&secret_key)
        .map_err(|e| Error::InternalError(e.to_string()))?;
    mac.update(data_check_string.as_bytes());
    mac.verify_slice(&expected).map_err(|_| {
        warn!("Telegram init data failed signature check");
        Error::Unauthorized("Invalid Telegram authentication".to_string())
    })?;

    // signature checked out; what is left is a malformed payload
    let user = user.ok_or_else(|| Error::InvalidRequest("User data not found".to_string()))?;
    let user: serde_json::Value = serde_json::from_str(&user)
        .map_err(|_| Error::InvalidRequest("Invalid user data".to_string()))?;

    match &user["id"] {
        serde_json::Value::Number(id) => Ok(id.to_string()),
        serde_json::Value::String(id) if !id.is_empty() => Ok(id.clone()),
        _ => Err(Error::InvalidRequest("Invalid user data".to_string())),
    }
}

pub async fn require_identity<B>(
    State(state): State<AppState>,
    mut request: Request<B>,
    next: Next<B>,
) -> Result<Response, ApiError> {
    let identity = resolve_identity(&state.auth, request.headers())?;
    debug!("Resolved identity {}", identity.as_str());
    request.extensions_mut().insert(identity);
    Ok(next.run(request).await)
}
