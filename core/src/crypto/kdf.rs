// ## src/crypto/kdf.rs

//! crypto/kdf.rs
//! HKDF-based key derivation.
//!
//! Design:
//! - HKDF-Extract(key material, salt) -> PRK
//! - HKDF-Expand(PRK, label || header identity) -> session key / key check
//!
//! Industry notes:
//! - Mirrors TLS 1.3 key schedules: traffic keys and verifiers come from
//!   one PRK under distinct labels.
//! - The key check is a 16-byte verifier stored in the header. A reader that
//!   derives a different check holds the wrong key; no frame is touched.

use hkdf::Hkdf;
use sha2::{Sha256, Sha512};

use crate::constants::labels;
use crate::crypto::types::{CryptoError, KEY_CHECK_LEN, KEY_LEN_32};
use crate::headers::{HkdfPrf, StreamHeader};

/// Keys derived for one cipher stream.
pub struct StreamKeys {
    pub session_key: [u8; KEY_LEN_32],
    pub key_check: [u8; KEY_CHECK_LEN],
}

/// Summary: HKDF `info` suffix binding protocol identity and configuration.
/// Excludes salt (already the HKDF salt), key check and reserved bytes.
#[inline]
fn build_info_from_header(label: &[u8], header: &StreamHeader) -> Vec<u8> {
    let mut info = Vec::with_capacity(label.len() + 16);
    info.extend_from_slice(label);
    info.extend_from_slice(&header.magic);
    info.extend_from_slice(&header.version.to_le_bytes());
    info.extend_from_slice(&header.cipher.to_le_bytes());
    info.extend_from_slice(&header.hkdf_prf.to_le_bytes());
    info.extend_from_slice(&header.flags.to_le_bytes());
    info.extend_from_slice(&header.chunk_size.to_le_bytes());
    info
}

fn expand_into(prf: HkdfPrf, salt: &[u8], ikm: &[u8], info: &[u8], out: &mut [u8]) -> Result<(), CryptoError> {
    match prf {
        HkdfPrf::Sha256 => Hkdf::<Sha256>::new(Some(salt), ikm)
            .expand(info, out)
            .map_err(|_| CryptoError::Primitive("HKDF-SHA256 expand")),
        HkdfPrf::Sha512 => Hkdf::<Sha512>::new(Some(salt), ikm)
            .expand(info, out)
            .map_err(|_| CryptoError::Primitive("HKDF-SHA512 expand")),
    }
}

/// Derive the session key and key check for a stream from caller key material
/// and the header salt.
///
/// Errors:
/// - Unsupported PRF selection returns `CryptoError::UnsupportedPrf`.
/// - All-zero salt is rejected.
pub fn derive_stream_keys(key_material: &[u8], header: &StreamHeader) -> Result<StreamKeys, CryptoError> {
    if header.salt.iter().all(|&b| b == 0) {
        return Err(CryptoError::ZeroSalt);
    }
    if key_material.is_empty() {
        return Err(CryptoError::EmptyInput("key material"));
    }
    let prf = header.prf().map_err(|_| CryptoError::UnsupportedPrf { prf_id: header.hkdf_prf })?;

    let mut session_key = [0u8; KEY_LEN_32];
    expand_into(prf, &header.salt, key_material, &build_info_from_header(labels::SESSION, header), &mut session_key)?;

    let mut key_check = [0u8; KEY_CHECK_LEN];
    expand_into(prf, &header.salt, key_material, &build_info_from_header(labels::KEY_CHECK, header), &mut key_check)?;

    Ok(StreamKeys { session_key, key_check })
}

/// Derive a 32-byte wrapping key for small sealed blobs (keyring entries,
/// vault references, legacy session keys). HKDF-SHA256 under `label`.
pub fn derive_wrap_key(secret: &[u8], salt: &[u8], label: &[u8]) -> Result<[u8; KEY_LEN_32], CryptoError> {
    let mut key = [0u8; KEY_LEN_32];
    expand_into(HkdfPrf::Sha256, salt, secret, label, &mut key)?;
    Ok(key)
}

/// Constant-time equality for verifiers.
#[inline]
pub fn ct_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
