use crate::{
    normalize::{
        normalize_closed_pnl, normalize_execution, normalize_position, ApiEnvelope, ApiKeyInfo,
        ClosedPnlRecord, ExecutionRecord, ListResult, PositionRecord,
    },
    BybitConfig, ExchangeConnector, ExchangeSigner, SignatureScheme, MAX_PAGE_LIMIT,
};
use async_trait::async_trait;
use chrono::Utc;
use common::{
    models::{ApiCredentials, Category, NormalizedPosition, NormalizedTrade},
    Error, Result,
};
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use tracing::{debug, error, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Endpoint {
    KeyInfo,
    ExecutionList,
    ClosedPnl,
    PositionList,
}

impl Endpoint {
    fn path(&self) -> &'static str {
        match self {
            Endpoint::KeyInfo => "/v5/user/query-api",
            Endpoint::ExecutionList => "/v5/execution/list",
            Endpoint::ClosedPnl => "/v5/position/closed-pnl",
            Endpoint::PositionList => "/v5/position/list",
        }
    }
}

pub struct BybitConnector {
    client: reqwest::Client,
    config: BybitConfig,
    signer: ExchangeSigner,
}

impl BybitConnector {
    pub fn new(config: BybitConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| Error::ConfigError(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            signer: ExchangeSigner::new(config.recv_window),
            config,
        })
    }

    fn scheme_for(&self, endpoint: Endpoint) -> SignatureScheme {
        match endpoint {
            Endpoint::ExecutionList if self.config.legacy_query_signing => {
                SignatureScheme::QueryParams
            }
            _ => SignatureScheme::Headers,
        }
    }

    async fn signed_get<T: DeserializeOwned>(
        &self,
        endpoint: Endpoint,
        credentials: &ApiCredentials,
        params: BTreeMap<String, String>,
    ) -> Result<T> {
        let timestamp = Utc::now().timestamp_millis() as u64;
        let signed = self
            .signer
            .envelope(self.scheme_for(endpoint), credentials, &params, timestamp)?;

        let mut url = format!("{}{}", self.config.base_url, endpoint.path());
        if !signed.query.is_empty() {
            url.push('?');
            url.push_str(&signed.query);
        }

        debug!("Calling Bybit {}", endpoint.path());

        let mut request = self.client.get(&url);
        for (name, value) in &signed.headers {
            request = request.header(*name, value);
        }

        // reqwest errors carry the URL, which includes the signature on query-signed calls
        let response = request.send().await.map_err(|e| {
            let e = e.without_url();
            warn!("Bybit {} unreachable: {}", endpoint.path(), e);
            Error::from(e)
        })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            error!("Bybit API error on {}: {} - {}", endpoint.path(), status, error_text);
            return Err(Error::UpstreamUnavailable(format!(
                "Bybit API error: {} - {}",
                status, error_text
            )));
        }

        let body = response.text().await.map_err(|e| Error::from(e.without_url()))?;
        let envelope: ApiEnvelope<T> = serde_json::from_str(&body).map_err(|e| {
            Error::UpstreamDataInvalid(format!(
                "Failed to parse Bybit {} response: {}",
                endpoint.path(),
                e
            ))
        })?;

        envelope.into_result().map_err(|e| {
            if let Error::UpstreamRejected { code, message } = &e {
                warn!("Bybit rejected {}: retCode={} retMsg={}", endpoint.path(), code, message);
            }
            e
        })
    }

    /// Key metadata, including the granted permission groups
    pub async fn key_info(&self, credentials: &ApiCredentials) -> Result<ApiKeyInfo> {
        self.signed_get(Endpoint::KeyInfo, credentials, BTreeMap::new())
            .await
    }

    fn page_params(category: Category, limit: usize) -> BTreeMap<String, String> {
        let mut params = BTreeMap::new();
        params.insert("category".to_string(), category.to_string());
        params.insert(
            "limit".to_string(),
            limit.clamp(1, MAX_PAGE_LIMIT).to_string(),
        );
        params
    }
}

#[async_trait]
impl ExchangeConnector for BybitConnector {
    async fn validate_credentials(&self, credentials: &ApiCredentials) -> bool {
        match self.key_info(credentials).await {
            Ok(info) if info.grants(&self.config.required_permission) => true,
            Ok(_) => {
                warn!(
                    "API key lacks the {} permission",
                    self.config.required_permission
                );
                false
            }
            Err(e) => {
                warn!("Credential validation failed: {}", e);
                false
            }
        }
    }

    async fn fetch_trades(
        &self,
        credentials: &ApiCredentials,
        category: Category,
        limit: usize,
    ) -> Result<Vec<NormalizedTrade>> {
        let page: ListResult<ExecutionRecord> = self
            .signed_get(
                Endpoint::ExecutionList,
                credentials,
                Self::page_params(category, limit),
            )
            .await?;

        debug!("Fetched {} executions from Bybit", page.list.len());

        page.list
            .iter()
            .map(|record| normalize_execution(record, category))
            .collect()
    }

    async fn fetch_closed_pnl(
        &self,
        credentials: &ApiCredentials,
        category: Category,
        limit: usize,
    ) -> Result<Vec<NormalizedTrade>> {
        let page: ListResult<ClosedPnlRecord> = self
            .signed_get(
                Endpoint::ClosedPnl,
                credentials,
                Self::page_params(category, limit),
            )
            .await?;

        debug!("Fetched {} closed-pnl records from Bybit", page.list.len());

        page.list
            .iter()
            .map(|record| normalize_closed_pnl(record, category))
            .collect()
    }

    async fn fetch_positions(
        &self,
        credentials: &ApiCredentials,
        category: Category,
    ) -> Result<Vec<NormalizedPosition>> {
        let mut params = BTreeMap::new();
        params.insert("category".to_string(), category.to_string());
        if category == Category::Linear {
            params.insert("settleCoin".to_string(), self.config.settle_coin.clone());
        }

        let page: ListResult<PositionRecord> = self
            .signed_get(Endpoint::PositionList, credentials, params)
            .await?;

        let mut positions = Vec::with_capacity(page.list.len());
        for record in &page.list {
            if let Some(position) = normalize_position(record, category)? {
                positions.push(position);
            }
        }

        Ok(positions)
    }
}
