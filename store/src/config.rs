/// Configuration for the SQLite trade store
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// sqlx connection URL, e.g. `sqlite://data/tradelink.db` or `sqlite::memory:`
    pub database_url: String,
    /// Pool size for file-backed databases
    pub max_connections: u32,
    /// Delete cached trades when an account is disconnected
    pub purge_trades_on_disconnect: bool,
    /// Let re-ingested trades overwrite stored fields instead of keeping the first copy
    pub overwrite_existing_trades: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite://data/tradelink.db".to_string(),
            max_connections: 5,
            purge_trades_on_disconnect: true,
            overwrite_existing_trades: false,
        }
    }
}

impl StoreConfig {
    /// Create a new store configuration from environment variables
    pub fn from_env() -> Result<Self, String> {
        let defaults = Self::default();

        let database_url = std::env::var("DATABASE_URL").unwrap_or(defaults.database_url);
        let max_connections = match std::env::var("DATABASE_MAX_CONNECTIONS") {
            Ok(v) => v
                .parse()
                .map_err(|_| format!("DATABASE_MAX_CONNECTIONS is not a number: {}", v))?,
            Err(_) => defaults.max_connections,
        };

        Ok(Self {
            database_url,
            max_connections,
            purge_trades_on_disconnect: env_bool(
                "PURGE_TRADES_ON_DISCONNECT",
                defaults.purge_trades_on_disconnect,
            )?,
            overwrite_existing_trades: env_bool(
                "OVERWRITE_EXISTING_TRADES",
                defaults.overwrite_existing_trades,
            )?,
        })
    }

    /// Private in-memory database, used by tests
    pub fn in_memory() -> Self {
        Self {
            database_url: "sqlite::memory:".to_string(),
            ..Self::default()
        }
    }

    pub fn is_in_memory(&self) -> bool {
        self.database_url.contains(":memory:")
    }
}

fn env_bool(name: &str, default: bool) -> Result<bool, String> {
    match std::env::var(name) {
        Ok(v) => match v.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" => Ok(true),
            "0" | "false" | "no" => Ok(false),
            other => Err(format!("{} must be true or false, got {}", name, other)),
        },
        Err(_) => Ok(default),
    }
}
