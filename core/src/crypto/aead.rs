// ## 📂 File: `src/crypto/aead.rs`

//! src/crypto/aead.rs
//! AEAD interface for AES-256-GCM and ChaCha20-Poly1305.
//!
//! Design notes:
//! - Both ciphers use 32-byte keys and 12-byte nonces.
//! - Tag verification fails closed (no partial plaintext is ever returned).
//! - Callers provide nonce and AAD; stream frames use `nonce` + `aad`, key
//!   wrapping (keyring, vault, legacy envelope) uses random nonces.

use crate::headers::{CipherSuite, StreamHeader};
use crate::crypto::types::{KEY_LEN_32, NONCE_LEN_12, TAG_LEN};
use crate::crypto::types::CryptoError;

use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes256Gcm, Nonce as AesNonce};
use chacha20poly1305::{ChaCha20Poly1305, Nonce as ChaNonce};

/// Unified AEAD cipher implementation.
#[derive(Clone)]
pub enum AeadImpl {
    AesGcm(Aes256Gcm),
    ChaCha(ChaCha20Poly1305),
}

impl AeadImpl {
    /// Construct an AEAD for `suite` keyed with a 32-byte key.
    pub fn new(suite: CipherSuite, key: &[u8]) -> Result<Self, CryptoError> {
        if key.len() != KEY_LEN_32 {
            return Err(CryptoError::KeyLength { expected: KEY_LEN_32, actual: key.len() });
        }
        match suite {
            CipherSuite::Aes256Gcm => {
                let cipher = Aes256Gcm::new_from_slice(key)
                    .map_err(|_| CryptoError::KeyLength { expected: KEY_LEN_32, actual: key.len() })?;
                Ok(Self::AesGcm(cipher))
            }
            CipherSuite::Chacha20Poly1305 => {
                let cipher = ChaCha20Poly1305::new_from_slice(key)
                    .map_err(|_| CryptoError::KeyLength { expected: KEY_LEN_32, actual: key.len() })?;
                Ok(Self::ChaCha(cipher))
            }
        }
    }

    /// Construct from the header's cipher registry ID and derived session key.
    pub fn from_header_and_key(header: &StreamHeader, session_key: &[u8]) -> Result<Self, CryptoError> {
        let suite = CipherSuite::try_from(header.cipher)
            .map_err(|_| CryptoError::UnsupportedCipher { cipher_id: header.cipher })?;
        Self::new(suite, session_key)
    }

    /// AEAD seal (encrypt) plaintext with nonce and AAD.
    pub fn seal(
        &self,
        nonce_12: &[u8],
        aad: &[u8],
        plaintext: &[u8],
    ) -> Result<Vec<u8>, CryptoError> {
        if nonce_12.len() != NONCE_LEN_12 {
            return Err(CryptoError::NonceLength { expected: NONCE_LEN_12, actual: nonce_12.len() });
        }

        if plaintext.is_empty() {
            return Err(CryptoError::EmptyInput("plaintext"));
        }

        match self {
            AeadImpl::AesGcm(cipher) => cipher
                .encrypt(AesNonce::from_slice(nonce_12), Payload { msg: plaintext, aad })
                .map_err(|_| CryptoError::Primitive("AES-GCM seal")),
            AeadImpl::ChaCha(cipher) => cipher
                .encrypt(ChaNonce::from_slice(nonce_12), Payload { msg: plaintext, aad })
                .map_err(|_| CryptoError::Primitive("ChaCha20-Poly1305 seal")),
        }
    }

    /// AEAD open (decrypt) ciphertext with nonce and AAD.
    pub fn open(
        &self,
        nonce_12: &[u8],
        aad: &[u8],
        ciphertext_and_tag: &[u8],
    ) -> Result<Vec<u8>, CryptoError> {
        if nonce_12.len() != NONCE_LEN_12 {
            return Err(CryptoError::NonceLength { expected: NONCE_LEN_12, actual: nonce_12.len() });
        }

        if ciphertext_and_tag.len() < TAG_LEN {
            return Err(CryptoError::TooShort { what: "ciphertext", len: ciphertext_and_tag.len() });
        }

        match self {
            AeadImpl::AesGcm(cipher) => cipher
                .decrypt(AesNonce::from_slice(nonce_12), Payload { msg: ciphertext_and_tag, aad })
                .map_err(|_| CryptoError::Authentication),
            AeadImpl::ChaCha(cipher) => cipher
                .decrypt(ChaNonce::from_slice(nonce_12), Payload { msg: ciphertext_and_tag, aad })
                .map_err(|_| CryptoError::Authentication),
        }
    }
}

/// Seal with a fresh random nonce; output is `nonce || ciphertext || tag`.
/// Used for small key blobs, never for stream frames.
pub fn seal_with_random_nonce(
    aead: &AeadImpl,
    aad: &[u8],
    plaintext: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    use rand::RngCore;

    let mut nonce = [0u8; NONCE_LEN_12];
    rand::rngs::OsRng.fill_bytes(&mut nonce);

    let sealed = aead.seal(&nonce, aad, plaintext)?;
    let mut out = Vec::with_capacity(NONCE_LEN_12 + sealed.len());
    out.extend_from_slice(&nonce);
    out.extend_from_slice(&sealed);
    Ok(out)
}

/// Inverse of [`seal_with_random_nonce`].
pub fn open_with_prefixed_nonce(
    aead: &AeadImpl,
    aad: &[u8],
    blob: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    if blob.len() < NONCE_LEN_12 + TAG_LEN {
        return Err(CryptoError::TooShort { what: "sealed blob", len: blob.len() });
    }
    let (nonce, body) = blob.split_at(NONCE_LEN_12);
    aead.open(nonce, aad, body)
}
