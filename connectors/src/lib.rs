pub mod bybit;
pub mod config;
pub mod normalize;
pub mod signer;

use async_trait::async_trait;
use common::{
    models::{ApiCredentials, Category, NormalizedPosition, NormalizedTrade},
    Result,
};

pub use bybit::BybitConnector;
pub use config::BybitConfig;
pub use signer::{ExchangeSigner, SignatureScheme};

/// Largest page the history endpoints accept
pub const MAX_PAGE_LIMIT: usize = 100;

/// Trait defining the interface for signed exchange account access.
///
/// Implementations never retry; retry and fallback policy belongs to the caller.
#[async_trait]
pub trait ExchangeConnector: Send + Sync {
    /// True only when the key works and carries the permission this service needs.
    /// Transport and exchange errors yield `false`.
    async fn validate_credentials(&self, credentials: &ApiCredentials) -> bool;

    /// Recent fills from the execution list
    async fn fetch_trades(
        &self,
        credentials: &ApiCredentials,
        category: Category,
        limit: usize,
    ) -> Result<Vec<NormalizedTrade>>;

    /// Recent closed positions, normalized to the closing side
    async fn fetch_closed_pnl(
        &self,
        credentials: &ApiCredentials,
        category: Category,
        limit: usize,
    ) -> Result<Vec<NormalizedTrade>>;

    /// Open positions with non-zero size
    async fn fetch_positions(
        &self,
        credentials: &ApiCredentials,
        category: Category,
    ) -> Result<Vec<NormalizedPosition>>;
}
