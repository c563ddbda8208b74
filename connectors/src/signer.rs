//! Request signing for the Bybit REST API.
//!
//! Two schemes are in use:
//! - query signing: `api_key`, `timestamp` and `recv_window` are added to the
//!   parameters, which are sorted by key and joined as `k=v&k=v` (no URL encoding).
//!   The hex HMAC-SHA256 of that string is sent as the `sign` parameter.
//! - header signing: the hex HMAC-SHA256 of `timestamp + api_key + recv_window + query`
//!   is sent in `X-BAPI-SIGN` alongside the key, timestamp and window headers.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::collections::BTreeMap;

use common::{models::ApiCredentials, Error, Result};

type HmacSha256 = Hmac<Sha256>;

pub const HEADER_API_KEY: &str = "X-BAPI-API-KEY";
pub const HEADER_TIMESTAMP: &str = "X-BAPI-TIMESTAMP";
pub const HEADER_SIGN: &str = "X-BAPI-SIGN";
pub const HEADER_RECV_WINDOW: &str = "X-BAPI-RECV-WINDOW";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureScheme {
    QueryParams,
    Headers,
}

/// A signed request ready to send: the exact query string that was signed plus auth headers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedRequest {
    pub query: String,
    pub headers: Vec<(&'static str, String)>,
}

#[derive(Debug, Clone)]
pub struct ExchangeSigner {
    recv_window: u64,
}

impl ExchangeSigner {
    pub fn new(recv_window: u64) -> Self {
        Self { recv_window }
    }

    /// Sorted `key=value&...` string. Values are used verbatim.
    pub fn canonical_query(params: &BTreeMap<String, String>) -> String {
        params
            .iter()
            .map(|(key, value)| format!("{}={}", key, value))
            .collect::<Vec<_>>()
            .join("&")
    }

    /// Hex HMAC-SHA256 of the canonical query string
    pub fn sign(secret: &str, params: &BTreeMap<String, String>) -> Result<String> {
        hmac_hex(secret, &Self::canonical_query(params))
    }

    /// Hex HMAC-SHA256 of `timestamp + api_key + recv_window + query`
    pub fn sign_header_payload(
        secret: &str,
        timestamp: u64,
        api_key: &str,
        recv_window: u64,
        query: &str,
    ) -> Result<String> {
        hmac_hex(
            secret,
            &format!("{}{}{}{}", timestamp, api_key, recv_window, query),
        )
    }

    pub fn envelope(
        &self,
        scheme: SignatureScheme,
        credentials: &ApiCredentials,
        params: &BTreeMap<String, String>,
        timestamp: u64,
    ) -> Result<SignedRequest> {
        match scheme {
            SignatureScheme::QueryParams => {
                let mut signed = params.clone();
                signed.insert("api_key".to_string(), credentials.api_key().to_string());
                signed.insert("timestamp".to_string(), timestamp.to_string());
                signed.insert("recv_window".to_string(), self.recv_window.to_string());

                let signature = Self::sign(credentials.api_secret(), &signed)?;
                let query = format!("{}&sign={}", Self::canonical_query(&signed), signature);

                Ok(SignedRequest {
                    query,
                    headers: Vec::new(),
                })
            }
            SignatureScheme::Headers => {
                let query = Self::canonical_query(params);
                let signature = Self::sign_header_payload(
                    credentials.api_secret(),
                    timestamp,
                    credentials.api_key(),
                    self.recv_window,
                    &query,
                )?;

                Ok(SignedRequest {
                    query,
                    headers: vec![
                        (HEADER_API_KEY, credentials.api_key().to_string()),
                        (HEADER_TIMESTAMP, timestamp.to_string()),
                        (HEADER_SIGN, signature),
                        (HEADER_RECV_WINDOW, self.recv_window.to_string()),
                    ],
                })
            }
        }
    }
}

impl Default for ExchangeSigner {
    fn default() -> Self {
        Self::new(5000)
    }
}

fn hmac_hex(secret: &str, payload: &str) -> Result<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| Error::InternalError(format!("Failed to initialize HMAC: {}", e)))?;
    mac.update(payload.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_canonical_query_sorts_keys() {
        let p = params(&[
            ("timestamp", "1700000000000"),
            ("api_key", "K"),
            ("recv_window", "5000"),
        ]);
        assert_eq!(
            ExchangeSigner::canonical_query(&p),
            "api_key=K&recv_window=5000&timestamp=1700000000000"
        );
    }

    #[test]
    fn test_query_signature_known_vector() {
        let p = params(&[
            ("api_key", "K"),
            ("timestamp", "1700000000000"),
            ("recv_window", "5000"),
        ]);
        assert_eq!(
            ExchangeSigner::sign("S", &p).unwrap(),
            "299654922abadad21f8638494920985a53208e1f2e2acf2fb6dd1ba995b0baa6"
        );
    }

    #[test]
    fn test_insertion_order_does_not_change_signature() {
        let a = params(&[("recv_window", "5000"), ("api_key", "K"), ("timestamp", "1700000000000")]);
        let b = params(&[("timestamp", "1700000000000"), ("recv_window", "5000"), ("api_key", "K")]);
        assert_eq!(
            ExchangeSigner::sign("S", &a).unwrap(),
            ExchangeSigner::sign("S", &b).unwrap()
        );
    }

    #[test]
    fn test_header_signature_known_vector() {
        let signature =
            ExchangeSigner::sign_header_payload("S", 1_700_000_000_000, "K", 5000, "category=linear&limit=50").unwrap();
        assert_eq!(
            signature,
            "4f1441a95f48c6ab11ac324ee836fc5902f4be5d48ef0b4ddea2775eb4043b73"
        );
    }

    #[test]
    fn test_query_envelope_carries_auth_fields() {
        let signer = ExchangeSigner::new(5000);
        let creds = ApiCredentials::new("K", "S");
        let signed = signer.envelope(
            SignatureScheme::QueryParams,
            &creds,
            &BTreeMap::new(),
            1_700_000_000_000,
        )
        .unwrap();

        assert!(signed.headers.is_empty());
        assert_eq!(
            signed.query,
            "api_key=K&recv_window=5000&timestamp=1700000000000\
             &sign=299654922abadad21f8638494920985a53208e1f2e2acf2fb6dd1ba995b0baa6"
        );
    }

    #[test]
    fn test_header_envelope() {
        let signer = ExchangeSigner::new(5000);
        let creds = ApiCredentials::new("K", "S");
        let p = params(&[("limit", "50"), ("category", "linear")]);
        let signed = signer.envelope(SignatureScheme::Headers, &creds, &p, 1_700_000_000_000).unwrap();

        assert_eq!(signed.query, "category=linear&limit=50");
        let header = |name: &str| {
            signed
                .headers
                .iter()
                .find(|(k, _)| *k == name)
                .map(|(_, v)| v.clone())
                .unwrap()
        };
        assert_eq!(header(HEADER_API_KEY), "K");
        assert_eq!(header(HEADER_TIMESTAMP), "1700000000000");
        assert_eq!(header(HEADER_RECV_WINDOW), "5000");
        assert_eq!(
            header(HEADER_SIGN),
            "4f1441a95f48c6ab11ac324ee836fc5902f4be5d48ef0b4ddea2775eb4043b73"
        );
    }

    #[test]
    fn test_signing_accepts_any_secret_length() {
        let p = params(&[("category", "spot")]);
        let long_secret = "s".repeat(256);

        for secret in ["", "S", long_secret.as_str()] {
            let signature = ExchangeSigner::sign(secret, &p).unwrap();
            assert_eq!(signature.len(), 64);
        }
    }
}
