mod account;
mod position;
mod trade;

pub use account::{AccountStatus, ApiCredentials, CredentialRecord};
pub use position::NormalizedPosition;
pub use trade::{Category, NormalizedTrade, Side, TradeFeed};
