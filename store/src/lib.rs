mod config;
mod credentials;
mod db;
mod error;
mod trade_store;

pub use config::StoreConfig;
pub use db::connect;
pub use error::StoreError;
pub use trade_store::TradeStore;
