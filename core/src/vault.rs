// ## 📂 File: `src/vault.rs`

//! Per-file key generation and sealing.
//!
//! The raw 32-byte key that re-encrypts a file never leaves process memory.
//! What is persisted in job parameters and published in completion events is
//! the sealed reference: base64(`nonce || AES-256-GCM(key) || tag`) under a
//! key derived from the service secret.

use std::fmt;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use rand::RngCore;
use thiserror::Error;

use crate::constants::labels;
use crate::crypto::{derive_wrap_key, open_with_prefixed_nonce, seal_with_random_nonce, AeadImpl, CryptoError, KEY_LEN_32};
use crate::headers::CipherSuite;

const VAULT_SALT: &[u8] = b"ingest-vault-v1";

#[derive(Debug, Error)]
pub enum VaultError {
    #[error("vault secret must not be empty")]
    EmptySecret,

    #[error("sealed key is not valid base64: {0}")]
    Encoding(String),

    #[error("sealed key does not open under this vault secret")]
    Unseal,

    #[error("vault crypto error: {0}")]
    Crypto(#[from] CryptoError),
}

/// Fresh per-file encryption key.
#[derive(Clone, PartialEq, Eq)]
pub struct FileKey([u8; KEY_LEN_32]);

impl FileKey {
    pub fn generate() -> Self {
        let mut key = [0u8; KEY_LEN_32];
        rand::rngs::OsRng.fill_bytes(&mut key);
        Self(key)
    }

    pub fn as_bytes(&self) -> &[u8; KEY_LEN_32] {
        &self.0
    }
}

impl fmt::Debug for FileKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FileKey(..)")
    }
}

impl From<[u8; KEY_LEN_32]> for FileKey {
    fn from(raw: [u8; KEY_LEN_32]) -> Self {
        Self(raw)
    }
}

#[derive(Clone)]
pub struct KeyVault {
    aead: AeadImpl,
}

impl fmt::Debug for KeyVault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("KeyVault(..)")
    }
}

impl KeyVault {
    pub fn new(secret: &str) -> Result<Self, VaultError> {
        if secret.is_empty() {
            return Err(VaultError::EmptySecret);
        }
        let key = derive_wrap_key(secret.as_bytes(), VAULT_SALT, labels::VAULT)?;
        Ok(Self { aead: AeadImpl::new(CipherSuite::Aes256Gcm, &key)? })
    }

    pub fn seal(&self, key: &FileKey) -> Result<String, VaultError> {
        let blob = seal_with_random_nonce(&self.aead, labels::VAULT, key.as_bytes())?;
        Ok(STANDARD.encode(blob))
    }

    pub fn open(&self, sealed: &str) -> Result<FileKey, VaultError> {
        let blob = STANDARD.decode(sealed.trim()).map_err(|e| VaultError::Encoding(e.to_string()))?;
        let raw = open_with_prefixed_nonce(&self.aead, labels::VAULT, &blob).map_err(|_| VaultError::Unseal)?;
        let raw: [u8; KEY_LEN_32] = raw.try_into().map_err(|_| VaultError::Unseal)?;
        Ok(FileKey(raw))
    }

    /// Generate a key and its sealed reference in one step.
    pub fn generate(&self) -> Result<(FileKey, String), VaultError> {
        let key = FileKey::generate();
        let sealed = self.seal(&key)?;
        Ok((key, sealed))
    }
}
