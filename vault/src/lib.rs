//! Encryption at rest for exchange API key material.
//!
//! Ciphertexts are AES-256-GCM, stored as base64 of `nonce || ciphertext || tag`
//! with a fresh 12-byte nonce per call. The GCM tag is checked on decryption, so a
//! wrong master key or a tampered value fails instead of yielding garbage.
//! Rotating the master key invalidates every stored ciphertext.

use aes_gcm::{
    aead::{Aead, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::STANDARD, Engine};
use rand::RngCore;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::error;

/// AES-256-GCM nonce size in bytes
pub const NONCE_SIZE: usize = 12;

/// AES-256 key size in bytes
pub const KEY_SIZE: usize = 32;

#[derive(Error, Debug)]
pub enum VaultError {
    #[error("Master key not configured")]
    MasterKeyNotConfigured,

    #[error("Master key is not valid base64: {0}")]
    MalformedMasterKey(#[from] base64::DecodeError),

    #[error("Invalid master key length: expected 32 bytes, got {0}")]
    InvalidKeyLength(usize),

    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    #[error("Decryption failed: {0}")]
    DecryptionFailed(String),
}

impl From<VaultError> for common::Error {
    fn from(err: VaultError) -> Self {
        match err {
            VaultError::DecryptionFailed(msg) => common::Error::DecryptionError(msg),
            other => common::Error::EncryptionError(other.to_string()),
        }
    }
}

pub struct CredentialVault {
    cipher: Aes256Gcm,
}

impl CredentialVault {
    /// Build a vault from a base64-encoded 32-byte master key
    pub fn new(master_key: &str) -> Result<Self, VaultError> {
        let master_key = master_key.trim();
        if master_key.is_empty() {
            return Err(VaultError::MasterKeyNotConfigured);
        }

        let key_bytes = STANDARD.decode(master_key)?;
        if key_bytes.len() != KEY_SIZE {
            return Err(VaultError::InvalidKeyLength(key_bytes.len()));
        }

        let cipher = Aes256Gcm::new_from_slice(&key_bytes)
            .map_err(|e| VaultError::EncryptionFailed(e.to_string()))?;

        Ok(Self { cipher })
    }

    /// Read the master key from `ENCRYPTION_MASTER_KEY`
    pub fn from_env() -> Result<Self, VaultError> {
        let key = std::env::var("ENCRYPTION_MASTER_KEY")
            .map_err(|_| VaultError::MasterKeyNotConfigured)?;
        Self::new(&key)
    }

    pub fn encrypt(&self, plaintext: &str) -> Result<String, VaultError> {
        let mut nonce_bytes = [0u8; NONCE_SIZE];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|e| VaultError::EncryptionFailed(e.to_string()))?;

        let mut sealed = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        sealed.extend_from_slice(&nonce_bytes);
        sealed.extend_from_slice(&ciphertext);

        Ok(STANDARD.encode(sealed))
    }

    pub fn decrypt(&self, sealed: &str) -> Result<String, VaultError> {
        let bytes = STANDARD
            .decode(sealed)
            .map_err(|e| VaultError::DecryptionFailed(format!("ciphertext is not base64: {}", e)))?;

        // nonce plus at least the 16-byte tag
        if bytes.len() < NONCE_SIZE + 16 {
            return Err(VaultError::DecryptionFailed(format!(
                "ciphertext too short: {} bytes",
                bytes.len()
            )));
        }

        let (nonce_bytes, ciphertext) = bytes.split_at(NONCE_SIZE);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
            .map_err(|_| {
                error!(misconfiguration = true, "credential ciphertext failed authentication");
                VaultError::DecryptionFailed("authentication tag mismatch".to_string())
            })?;

        String::from_utf8(plaintext)
            .map_err(|e| VaultError::DecryptionFailed(format!("plaintext is not UTF-8: {}", e)))
    }

    pub fn fingerprint(&self, api_key: &str, api_secret: &str) -> String {
        fingerprint(api_key, api_secret)
    }
}

/// Stable one-way hash of a key pair, used to detect the same exchange account linked twice.
///
/// The NUL separator keeps `("ab", "c")` and `("a", "bc")` apart.
pub fn fingerprint(api_key: &str, api_secret: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(api_key.as_bytes());
    hasher.update([0u8]);
    hasher.update(api_secret.as_bytes());
    hex::encode(hasher.finalize())
}

/// Generate a fresh base64 master key for provisioning
pub fn generate_master_key() -> String {
    let mut key = [0u8; KEY_SIZE];
    OsRng.fill_bytes(&mut key);
    STANDARD.encode(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_vault() -> CredentialVault {
        CredentialVault::new(&generate_master_key()).unwrap()
    }

    #[test]
    fn test_encrypt_decrypt_round_trip() {
        let vault = test_vault();
        for plaintext in ["XXXXXXXXXXXXXXXXXX", "s3cr3t-with-ünïcode", ""] {
            let sealed = vault.encrypt(plaintext).unwrap();
            assert_ne!(sealed, plaintext);
            assert_eq!(vault.decrypt(&sealed).unwrap(), plaintext);
        }
    }

    #[test]
    fn test_encryption_is_randomized() {
        let vault = test_vault();
        let a = vault.encrypt("same-input").unwrap();
        let b = vault.encrypt("same-input").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_wrong_key_fails_instead_of_returning_garbage() {
        let sealed = test_vault().encrypt("api-secret").unwrap();
        let other = test_vault();
        assert!(matches!(
            other.decrypt(&sealed),
            Err(VaultError::DecryptionFailed(_))
        ));
    }

    #[test]
    fn test_tampered_ciphertext_fails() {
        let vault = test_vault();
        let sealed = vault.encrypt("api-secret").unwrap();
        let mut bytes = STANDARD.decode(&sealed).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0x01;
        let tampered = STANDARD.encode(bytes);
        assert!(matches!(
            vault.decrypt(&tampered),
            Err(VaultError::DecryptionFailed(_))
        ));
    }

    #[test]
    fn test_malformed_ciphertext_fails() {
        let vault = test_vault();
        assert!(vault.decrypt("not base64 !!").is_err());
        assert!(vault.decrypt(&STANDARD.encode([1u8; 8])).is_err());
    }

    #[test]
    fn test_master_key_validation() {
        assert!(matches!(
            CredentialVault::new(""),
            Err(VaultError::MasterKeyNotConfigured)
        ));
        assert!(matches!(
            CredentialVault::new("%%%"),
            Err(VaultError::MalformedMasterKey(_))
        ));
        let short_key = STANDARD.encode([0u8; 16]);
        assert!(matches!(
            CredentialVault::new(&short_key),
            Err(VaultError::InvalidKeyLength(16))
        ));
    }

    #[test]
    fn test_vault_errors_map_to_taxonomy() {
        let err: common::Error = VaultError::DecryptionFailed("x".into()).into();
        assert!(matches!(err, common::Error::DecryptionError(_)));
        let err: common::Error = VaultError::MasterKeyNotConfigured.into();
        assert!(matches!(err, common::Error::EncryptionError(_)));
    }

    #[test]
    fn test_fingerprint_is_deterministic() {
        assert_eq!(fingerprint("key", "secret"), fingerprint("key", "secret"));
        assert_eq!(
            fingerprint("key", "secret"),
            "a9ce298b72befca4280a9db0b149031302d321caa95688f1ff244c80433eb2bf"
        );
    }

    #[test]
    fn test_fingerprint_distinguishes_pairs() {
        assert_ne!(fingerprint("key", "secret-a"), fingerprint("key", "secret-b"));
        assert_ne!(fingerprint("ab", "c"), fingerprint("a", "bc"));
    }
}
