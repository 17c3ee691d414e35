// ## 📂 File: `src/crypto/types.rs`

use std::fmt;

use crate::headers::StreamHeader;

pub const KEY_LEN_32: usize = 32;
pub const NONCE_LEN_12: usize = 12;
pub const TAG_LEN: usize = 16;
/// Verifier stored in the stream header; tells a wrong key from bad data.
pub const KEY_CHECK_LEN: usize = 16;

/// Authenticated per-frame metadata, appended to the encoded header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameAad {
    pub frame_type: u8,
    pub frame_index: u64,
}

impl FrameAad {
    /// `frame_type` (1) + `frame_index` (8, LE).
    pub const FRAME_LEN: usize = 9;
    pub const LEN: usize = StreamHeader::LEN + FrameAad::FRAME_LEN;
}

/// Failures of the AEAD, KDF and nonce primitives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    UnsupportedCipher { cipher_id: u16 },
    UnsupportedPrf { prf_id: u16 },
    KeyLength { expected: usize, actual: usize },
    NonceLength { expected: usize, actual: usize },
    /// All-zero salt; the stream salt must be random.
    ZeroSalt,
    /// An input that must carry bytes was empty.
    EmptyInput(&'static str),
    /// Sealed payload shorter than nonce and tag.
    TooShort { what: &'static str, len: usize },
    /// AEAD tag did not verify.
    Authentication,
    /// The primitive itself reported an error.
    Primitive(&'static str),
}

impl fmt::Display for CryptoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use CryptoError::*;
        match self {
            UnsupportedCipher { cipher_id } => write!(f, "unsupported cipher suite 0x{cipher_id:04x}"),
            UnsupportedPrf { prf_id } => write!(f, "unsupported HKDF PRF 0x{prf_id:04x}"),
            KeyLength { expected, actual } => write!(f, "key is {actual} bytes, expected {expected}"),
            NonceLength { expected, actual } => write!(f, "nonce is {actual} bytes, expected {expected}"),
            ZeroSalt => write!(f, "salt is all zeros"),
            EmptyInput(what) => write!(f, "{what} must not be empty"),
            TooShort { what, len } => write!(f, "{what} too short ({len} bytes)"),
            Authentication => write!(f, "AEAD authentication failed"),
            Primitive(what) => write!(f, "{what} failed"),
        }
    }
}

impl std::error::Error for CryptoError {}
