// ## 📂 File: `src/keyring/types.rs`

use std::io;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::crypto::CryptoError;
use crate::types::CipherError;

pub const KEYRING_FORMAT_V1: u16 = 1;

/// Length of a key fingerprint (truncated SHA-256 of the public key).
pub const FINGERPRINT_LEN: usize = 8;

#[derive(Debug, Error)]
pub enum KeyRingError {
    /// Passphrase does not open the keyring.
    #[error("wrong keyring passphrase")]
    WrongPassword,

    /// Legacy header is addressed to a key not held in this ring, or its
    /// wrapped session key does not open.
    #[error("legacy header does not match any keyring key: {0}")]
    WrongHeader(String),

    /// Input does not start with a legacy envelope.
    #[error("input is not a legacy envelope")]
    NotLegacy,

    /// Legacy envelope header is damaged.
    #[error("malformed legacy header: {0}")]
    MalformedHeader(String),

    /// Keyring file is structurally invalid.
    #[error("corrupt keyring: {0}")]
    Corrupt(String),

    #[error("keyring I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("keyring JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("keyring crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error(transparent)]
    Cipher(#[from] CipherError),
}

impl KeyRingError {
    /// True when the error stems from the supplied keyring, passphrase or
    /// input rather than the environment.
    pub fn is_user_error(&self) -> bool {
        match self {
            KeyRingError::Io(_) => false,
            KeyRingError::Cipher(e) => e.is_user_error(),
            _ => true,
        }
    }
}

/// One keyring entry on disk. The X25519 secret is sealed under a key derived
/// from the passphrase and the per-entry salt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealedKeyEntry {
    /// Hex fingerprint of the public key.
    pub fingerprint: String,
    /// Base64 X25519 public key.
    pub public_key: String,
    /// Base64 16-byte salt.
    pub salt: String,
    /// Base64 `nonce || ciphertext || tag` of the 32-byte secret.
    pub sealed_secret: String,
    pub created_at: DateTime<Utc>,
}

/// Keyring file layout (JSON).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyRingFile {
    pub version: u16,
    pub keys: Vec<SealedKeyEntry>,
}
