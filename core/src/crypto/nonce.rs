// ## 📂 File: `src/crypto/nonce.rs`

//! Per-frame nonces.
//!
//! The first 12 bytes of the random stream salt form a base IV; bytes 4..12
//! are XORed with the little-endian frame index. One stream never repeats a
//! nonce, and distinct salts keep streams under the same key apart.

use crate::crypto::types::{CryptoError, NONCE_LEN_12};

/// Nonce of frame `frame_index` in the stream salted with `salt`.
#[inline]
pub fn frame_nonce(salt: &[u8; 16], frame_index: u64) -> Result<[u8; NONCE_LEN_12], CryptoError> {
    if salt.iter().all(|&b| b == 0) {
        return Err(CryptoError::ZeroSalt);
    }

    let mut nonce = [0u8; NONCE_LEN_12];
    nonce.copy_from_slice(&salt[..NONCE_LEN_12]);
    for (n, c) in nonce[4..].iter_mut().zip(frame_index.to_le_bytes()) {
        *n ^= c;
    }
    Ok(nonce)
}
