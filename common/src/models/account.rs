use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;

/// Stored linkage between a user identity and their encrypted exchange key pair
#[derive(Debug, Clone, PartialEq)]
pub struct CredentialRecord {
    pub identity: String,
    /// Vault ciphertext; `None` once the account has been disconnected
    pub encrypted_api_key: Option<String>,
    pub encrypted_api_secret: Option<String>,
    pub fingerprint: Option<String>,
    pub is_connected: bool,
    pub connected_at: DateTime<Utc>,
    pub last_synced_at: Option<DateTime<Utc>>,
}

impl CredentialRecord {
    /// Ciphertext pair, present only while the account is connected
    pub fn ciphertexts(&self) -> Option<(&str, &str)> {
        if !self.is_connected {
            return None;
        }
        match (&self.encrypted_api_key, &self.encrypted_api_secret) {
            (Some(key), Some(secret)) => Some((key.as_str(), secret.as_str())),
            _ => None,
        }
    }
}

/// Plaintext key pair, alive only for the duration of an exchange call
pub struct ApiCredentials {
    api_key: SecretString,
    api_secret: SecretString,
}

impl ApiCredentials {
    pub fn new(api_key: impl Into<String>, api_secret: impl Into<String>) -> Self {
        let api_key: String = api_key.into();
        let api_secret: String = api_secret.into();
        Self {
            api_key: SecretString::new(api_key.into_boxed_str()),
            api_secret: SecretString::new(api_secret.into_boxed_str()),
        }
    }

    pub fn api_key(&self) -> &str {
        self.api_key.expose_secret()
    }

    pub fn api_secret(&self) -> &str {
        self.api_secret.expose_secret()
    }
}

impl std::fmt::Debug for ApiCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiCredentials")
            .field("api_key", &"[REDACTED]")
            .field("api_secret", &"[REDACTED]")
            .finish()
    }
}

/// Connection state reported to clients
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AccountStatus {
    pub is_connected: bool,
    pub connected_at: Option<DateTime<Utc>>,
    pub last_synced: Option<DateTime<Utc>>,
}

impl From<Option<CredentialRecord>> for AccountStatus {
    fn from(record: Option<CredentialRecord>) -> Self {
        match record {
            Some(record) => Self {
                is_connected: record.is_connected,
                connected_at: record.is_connected.then_some(record.connected_at),
                last_synced: record.last_synced_at,
            },
            None => Self {
                is_connected: false,
                connected_at: None,
                last_synced: None,
            },
        }
    }
}
