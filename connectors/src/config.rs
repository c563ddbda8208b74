use std::time::Duration;

pub const BYBIT_MAINNET_URL: &str = "https://api.bybit.com";
pub const BYBIT_TESTNET_URL: &str = "https://api-testnet.bybit.com";

/// Configuration for the Bybit connector
#[derive(Debug, Clone)]
pub struct BybitConfig {
    /// REST root, without trailing slash
    pub base_url: String,
    /// Clock-skew tolerance sent with every signed request (ms)
    pub recv_window: u64,
    /// Upper bound on a single exchange round-trip
    pub timeout: Duration,
    /// Permission group the API key must be granted
    pub required_permission: String,
    /// Settle coin attached to linear position queries
    pub settle_coin: String,
    /// Sign execution-list calls with the sorted-query scheme instead of headers
    pub legacy_query_signing: bool,
}

impl Default for BybitConfig {
    fn default() -> Self {
        Self {
            base_url: BYBIT_MAINNET_URL.to_string(),
            recv_window: 5000,
            timeout: Duration::from_secs(10),
            required_permission: "ContractTrade".to_string(),
            settle_coin: "USDT".to_string(),
            legacy_query_signing: false,
        }
    }
}

impl BybitConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let testnet = env_flag("BYBIT_TESTNET");
        let base_url = std::env::var("BYBIT_BASE_URL").unwrap_or_else(|_| {
            if testnet {
                BYBIT_TESTNET_URL.to_string()
            } else {
                BYBIT_MAINNET_URL.to_string()
            }
        });

        let recv_window = std::env::var("BYBIT_RECV_WINDOW")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.recv_window);

        let timeout = std::env::var("BYBIT_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(defaults.timeout);

        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            recv_window,
            timeout,
            required_permission: std::env::var("BYBIT_REQUIRED_PERMISSION")
                .unwrap_or(defaults.required_permission),
            settle_coin: std::env::var("BYBIT_SETTLE_COIN").unwrap_or(defaults.settle_coin),
            legacy_query_signing: env_flag("BYBIT_LEGACY_QUERY_SIGNING"),
        }
    }
}

fn env_flag(name: &str) -> bool {
    std::env::var(name)
        .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
        .unwrap_or(false)
}
