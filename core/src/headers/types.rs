// ## 📂 File: `src/headers/types.rs`

//! headers/types.rs
//! Cipher stream header struct and typed registries.
//!
//! Industry notes:
//! - Fixed field sizes, little-endian multi-byte integers.
//! - Reserved bytes allow future fields without changing size; always zero them.
//! - The header is 64 bytes and is bound into every frame's AAD, so tampering
//!   with any field fails authentication of the first frame.

use std::fmt;
use num_enum::TryFromPrimitive;
use serde::{Deserialize, Serialize};

use crate::constants::{MAGIC_IGE1, STREAM_V1, DEFAULT_CHUNK_SIZE, MAX_CHUNK_SIZE};
use crate::constants::{cipher_ids, prf_ids};

/// Fixed header size in bytes.
pub const HEADER_LEN_V1: usize = 64;

/// Bytes covered by the header CRC32 (everything before the CRC field).
pub const HEADER_CRC_SPAN: usize = 48;

/// Header flag bits.
pub mod flags {
    /// Stream key is a session key recovered from a legacy envelope.
    pub const ARCHIVE_SESSION: u16 = 0x0001;
    pub const KNOWN: u16 = ARCHIVE_SESSION;
}

/// Cipher suites (header registry).
#[repr(u16)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, TryFromPrimitive, Serialize, Deserialize)]
pub enum CipherSuite {
    #[serde(rename = "aes-256-gcm")]
    Aes256Gcm        = cipher_ids::AES256_GCM,
    #[serde(rename = "chacha20-poly1305")]
    Chacha20Poly1305 = cipher_ids::CHACHA20_POLY1305,
}
impl CipherSuite {
    pub fn verify(raw: u16) -> Result<(), HeaderError> {
        CipherSuite::try_from(raw)
            .map(|_| ())
            .map_err(|_| HeaderError::UnknownCipherSuite { raw })
    }
}

impl Default for CipherSuite {
    fn default() -> Self {
        CipherSuite::Aes256Gcm
    }
}

/// HKDF PRF choices (header registry).
#[repr(u16)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, TryFromPrimitive)]
pub enum HkdfPrf {
    Sha256 = prf_ids::SHA256,
    Sha512 = prf_ids::SHA512,
}
impl HkdfPrf {
    pub fn verify(raw: u16) -> Result<(), HeaderError> {
        HkdfPrf::try_from(raw)
            .map(|_| ())
            .map_err(|_| HeaderError::UnknownHkdfPrf { raw })
    }
}

/// Cipher stream header.
///
/// Layout (little-endian):
/// ```text
/// 0..4   magic        "IGE1"
/// 4..6   version
/// 6..8   cipher       CipherSuite
/// 8..10  hkdf_prf     HkdfPrf
/// 10..12 flags
/// 12..16 chunk_size   plaintext bytes per DATA frame
/// 16..32 salt         random per stream
/// 32..48 key_check    HKDF-derived key verifier
/// 48..52 crc32        over bytes 0..48
/// 52..64 reserved     zero
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamHeader {
    pub magic: [u8; 4],
    pub version: u16,
    pub cipher: u16,
    pub hkdf_prf: u16,
    pub flags: u16,
    pub chunk_size: u32,
    pub salt: [u8; 16],
    pub key_check: [u8; 16],
    pub crc32: u32,
    pub reserved: [u8; 12],
}

impl StreamHeader {
    pub const LEN: usize = HEADER_LEN_V1;

    /// Fresh header for a new stream. The key check is filled in by the
    /// writer once the session key has been derived.
    pub fn new(cipher: CipherSuite, chunk_size: usize, salt: [u8; 16]) -> Self {
        Self {
            magic: MAGIC_IGE1,
            version: STREAM_V1,
            cipher: cipher as u16,
            hkdf_prf: HkdfPrf::Sha256 as u16,
            flags: 0,
            chunk_size: chunk_size as u32,
            salt,
            key_check: [0u8; 16],
            crc32: 0,
            reserved: [0u8; 12],
        }
    }

    pub fn cipher_suite(&self) -> Result<CipherSuite, HeaderError> {
        CipherSuite::try_from(self.cipher).map_err(|_| HeaderError::UnknownCipherSuite { raw: self.cipher })
    }

    pub fn prf(&self) -> Result<HkdfPrf, HeaderError> {
        HkdfPrf::try_from(self.hkdf_prf).map_err(|_| HeaderError::UnknownHkdfPrf { raw: self.hkdf_prf })
    }

    pub fn has_flag(&self, flag: u16) -> bool {
        self.flags & flag != 0
    }

    /// Validate every field except the CRC (checked by the decoder).
    pub fn validate(&self) -> Result<(), HeaderError> {
        if self.magic != MAGIC_IGE1 {
            return Err(HeaderError::InvalidMagic { have: self.magic });
        }
        if self.version != STREAM_V1 {
            return Err(HeaderError::UnsupportedVersion { have: self.version });
        }
        CipherSuite::verify(self.cipher)?;
        HkdfPrf::verify(self.hkdf_prf)?;
        if self.flags & !flags::KNOWN != 0 {
            return Err(HeaderError::UnknownFlags { raw: self.flags });
        }
        let chunk = self.chunk_size as usize;
        if chunk == 0 || chunk > MAX_CHUNK_SIZE {
            return Err(HeaderError::InvalidChunkSize { have: self.chunk_size });
        }
        if self.salt.iter().all(|&b| b == 0) {
            return Err(HeaderError::InvalidSalt);
        }
        if self.reserved.iter().any(|&b| b != 0) {
            return Err(HeaderError::ReservedNotZero);
        }
        Ok(())
    }
}

impl Default for StreamHeader {
    fn default() -> Self {
        Self::new(CipherSuite::Aes256Gcm, DEFAULT_CHUNK_SIZE, [0u8; 16])
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeaderError {
    BufferTooShort { have: usize, need: usize },
    InvalidMagic { have: [u8; 4] },
    UnsupportedVersion { have: u16 },
    UnknownCipherSuite { raw: u16 },
    UnknownHkdfPrf { raw: u16 },
    UnknownFlags { raw: u16 },
    InvalidChunkSize { have: u32 },
    InvalidSalt,
    ReservedNotZero,
    InvalidCrc32 { have: u32, need: u32 },
}

impl fmt::Display for HeaderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HeaderError::BufferTooShort { have, need } =>
                write!(f, "header buffer too short: have {have} bytes, need {need}"),
            HeaderError::InvalidMagic { have } =>
                write!(f, "invalid magic: {}", hex::encode(have)),
            HeaderError::UnsupportedVersion { have } =>
                write!(f, "unsupported header version: {have}"),
            HeaderError::UnknownCipherSuite { raw } =>
                write!(f, "unknown cipher suite: 0x{raw:04x}"),
            HeaderError::UnknownHkdfPrf { raw } =>
                write!(f, "unknown HKDF PRF: 0x{raw:04x}"),
            HeaderError::UnknownFlags { raw } =>
                write!(f, "unknown header flags: 0x{raw:04x}"),
            HeaderError::InvalidChunkSize { have } =>
                write!(f, "invalid chunk size: {have}"),
            HeaderError::InvalidSalt =>
                write!(f, "salt must not be all-zero"),
            HeaderError::ReservedNotZero =>
                write!(f, "reserved header bytes must be zero"),
            HeaderError::InvalidCrc32 { have, need } =>
                write!(f, "header CRC32 mismatch: stored 0x{have:08x}, computed 0x{need:08x}"),
        }
    }
}

impl std::error::Error for HeaderError {}
