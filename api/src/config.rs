use serde::{Deserialize, Serialize};

use crate::auth::AuthConfig;
use crate::service::SyncPolicy;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
    /// Skip Telegram verification and trust the `X-User-Id` header
    pub dev_mode: bool,
    pub telegram_bot_token: Option<String>,
    /// Allowed CORS origin; any origin when unset
    pub cors_origin: Option<String>,
    pub block_duplicate_accounts: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            dev_mode: false,
            telegram_bot_token: None,
            cors_origin: None,
            block_duplicate_accounts: true,
        }
    }
}

impl ApiConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let host = std::env::var("API_HOST").unwrap_or(defaults.host);
        let port = std::env::var("API_PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(defaults.port);

        Self {
            host,
            port,
            dev_mode: env_flag("DEV_MODE").unwrap_or(defaults.dev_mode),
            telegram_bot_token: std::env::var("TELEGRAM_BOT_TOKEN")
                .ok()
                .filter(|t| !t.trim().is_empty()),
            cors_origin: std::env::var("CORS_ORIGIN")
                .ok()
                .filter(|o| !o.trim().is_empty() && o != "*"),
            block_duplicate_accounts: env_flag("BLOCK_DUPLICATE_ACCOUNTS")
                .unwrap_or(defaults.block_duplicate_accounts),
        }
    }

    /// Identity resolution settings; a bot token is mandatory outside dev mode
    pub fn auth(&self) -> common::Result<AuthConfig> {
        if !self.dev_mode && self.telegram_bot_token.is_none() {
            return Err(common::Error::ConfigError(
                "TELEGRAM_BOT_TOKEN must be set unless DEV_MODE is enabled".to_string(),
            ));
        }

        Ok(AuthConfig {
            dev_mode: self.dev_mode,
            bot_token: self.telegram_bot_token.clone(),
        })
    }

    pub fn sync_policy(&self) -> SyncPolicy {
        SyncPolicy {
            block_duplicate_accounts: self.block_duplicate_accounts,
            ..SyncPolicy::default()
        }
    }
}

fn env_flag(name: &str) -> Option<bool> {
    std::env::var(name)
        .ok()
        .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_requires_token_outside_dev_mode() {
        let config = ApiConfig::default();
        assert!(matches!(
            config.auth(),
            Err(common::Error::ConfigError(_))
        ));

        let dev = ApiConfig {
            dev_mode: true,
            ..ApiConfig::default()
        };
        assert!(dev.auth().unwrap().dev_mode);
    }

    #[test]
    fn sync_policy_follows_duplicate_flag() {
        let config = ApiConfig {
            block_duplicate_accounts: false,
            ..ApiConfig::default()
        };
        assert!(!config.sync_policy().block_duplicate_accounts);
    }
}
