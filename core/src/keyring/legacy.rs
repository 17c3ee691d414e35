// ## 📂 File: `src/keyring/legacy.rs`

//! Legacy envelope: archive-encrypted inputs.
//!
//! An archive-encrypted file is a fixed 112-byte envelope header followed by a
//! cipher stream keyed with a random session key. The session key is wrapped
//! to one keyring recipient with ephemeral X25519 + HKDF-SHA256 + AES-256-GCM.
//!
//! ```text
//! 0..4     magic          "IGLK"
//! 4..6     version
//! 6..8     wrap cipher    CipherSuite
//! 8..16    recipient      key fingerprint
//! 16..48   ephemeral      X25519 public key
//! 48..60   nonce          wrap nonce
//! 60..108  wrapped key    32-byte session key + 16-byte tag
//! 108..112 crc32          over bytes 0..108
//! ```
//!
//! Bytes 0..48 are the AAD of the wrap, so a swapped recipient or ephemeral
//! key fails authentication.

use std::io::{Read, Write};

use rand::RngCore;
use x25519_dalek::{PublicKey, StaticSecret};

use crate::constants::{labels, LEGACY_V1, MAGIC_IGLK};
use crate::crypto::{derive_wrap_key, AeadImpl, KEY_LEN_32, NONCE_LEN_12, TAG_LEN};
use crate::headers::{flags, CipherSuite};
use crate::keyring::ring::fingerprint;
use crate::keyring::types::{KeyRingError, FINGERPRINT_LEN};
use crate::stream::{DecryptReader, EncryptOptions, EncryptWriter};
use crate::stream::io::read_exact_or_eof;
use crate::types::CipherError;

pub const LEGACY_HEADER_LEN: usize = 112;
const AAD_SPAN: usize = 48;
const CRC_SPAN: usize = 108;
const WRAPPED_LEN: usize = KEY_LEN_32 + TAG_LEN;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegacyHeader {
    pub version: u16,
    pub wrap_cipher: u16,
    pub recipient: [u8; FINGERPRINT_LEN],
    pub ephemeral: [u8; 32],
    pub nonce: [u8; NONCE_LEN_12],
    pub wrapped_key: [u8; WRAPPED_LEN],
}

impl LegacyHeader {
    pub const LEN: usize = LEGACY_HEADER_LEN;

    pub fn encode(&self) -> [u8; LEGACY_HEADER_LEN] {
        let mut out = [0u8; LEGACY_HEADER_LEN];
        out[0..4].copy_from_slice(&MAGIC_IGLK);
        out[4..6].copy_from_slice(&self.version.to_le_bytes());
        out[6..8].copy_from_slice(&self.wrap_cipher.to_le_bytes());
        out[8..16].copy_from_slice(&self.recipient);
        out[16..48].copy_from_slice(&self.ephemeral);
        out[48..60].copy_from_slice(&self.nonce);
        out[60..108].copy_from_slice(&self.wrapped_key);
        let crc = crc32fast::hash(&out[..CRC_SPAN]);
        out[108..112].copy_from_slice(&crc.to_le_bytes());
        out
    }

    pub fn decode(buf: &[u8]) -> Result<Self, KeyRingError> {
        if buf.len() < MAGIC_IGLK.len() || buf[..MAGIC_IGLK.len()] != MAGIC_IGLK {
            return Err(KeyRingError::NotLegacy);
        }
        if buf.len() < LEGACY_HEADER_LEN {
            return Err(KeyRingError::MalformedHeader(format!(
                "have {} bytes, need {LEGACY_HEADER_LEN}",
                buf.len()
            )));
        }

        let stored_crc = u32::from_le_bytes([buf[108], buf[109], buf[110], buf[111]]);
        let computed = crc32fast::hash(&buf[..CRC_SPAN]);
        if stored_crc != computed {
            return Err(KeyRingError::MalformedHeader(format!(
                "CRC32 mismatch: stored 0x{stored_crc:08x}, computed 0x{computed:08x}"
            )));
        }

        let version = u16::from_le_bytes([buf[4], buf[5]]);
        if version != LEGACY_V1 {
            return Err(KeyRingError::MalformedHeader(format!("unsupported version {version}")));
        }
        let wrap_cipher = u16::from_le_bytes([buf[6], buf[7]]);
        CipherSuite::verify(wrap_cipher).map_err(|e| KeyRingError::MalformedHeader(e.to_string()))?;

        let mut header = LegacyHeader {
            version,
            wrap_cipher,
            recipient: [0u8; FINGERPRINT_LEN],
            ephemeral: [0u8; 32],
            nonce: [0u8; NONCE_LEN_12],
            wrapped_key: [0u8; WRAPPED_LEN],
        };
        header.recipient.copy_from_slice(&buf[8..16]);
        header.ephemeral.copy_from_slice(&buf[16..48]);
        header.nonce.copy_from_slice(&buf[48..60]);
        header.wrapped_key.copy_from_slice(&buf[60..108]);
        Ok(header)
    }

    /// Consume exactly the envelope header from `source`.
    pub fn read_from<R: Read + ?Sized>(source: &mut R) -> Result<Self, KeyRingError> {
        let buf = read_exact_or_eof(source, LEGACY_HEADER_LEN).map_err(|e| match CipherError::from_io(e) {
            CipherError::Io(io) => KeyRingError::Io(io),
            typed => KeyRingError::Cipher(typed),
        })?;
        Self::decode(&buf)
    }

    fn aad(&self) -> [u8; AAD_SPAN] {
        let mut aad = [0u8; AAD_SPAN];
        aad.copy_from_slice(&self.encode()[..AAD_SPAN]);
        aad
    }
}

fn wrap_aead(
    suite: CipherSuite,
    shared: &[u8; 32],
    ephemeral: &[u8; 32],
    recipient: &PublicKey,
) -> Result<AeadImpl, KeyRingError> {
    let mut salt = [0u8; 64];
    salt[..32].copy_from_slice(ephemeral);
    salt[32..].copy_from_slice(recipient.as_bytes());
    let key = derive_wrap_key(shared, &salt, labels::LEGACY_WRAP)?;
    Ok(AeadImpl::new(suite, &key)?)
}

/// Wrap `session_key` to `recipient`.
pub fn seal_legacy(recipient: &PublicKey, session_key: &[u8; KEY_LEN_32]) -> Result<LegacyHeader, KeyRingError> {
    let ephemeral_secret = StaticSecret::random_from_rng(rand::rngs::OsRng);
    let ephemeral = PublicKey::from(&ephemeral_secret);
    let shared = ephemeral_secret.diffie_hellman(recipient);

    let mut header = LegacyHeader {
        version: LEGACY_V1,
        wrap_cipher: CipherSuite::Aes256Gcm as u16,
        recipient: fingerprint(recipient),
        ephemeral: *ephemeral.as_bytes(),
        nonce: [0u8; NONCE_LEN_12],
        wrapped_key: [0u8; WRAPPED_LEN],
    };
    rand::rngs::OsRng.fill_bytes(&mut header.nonce);

    let aead = wrap_aead(CipherSuite::Aes256Gcm, shared.as_bytes(), &header.ephemeral, recipient)?;
    let wrapped = aead.seal(&header.nonce, &header.aad(), session_key)?;
    header.wrapped_key.copy_from_slice(&wrapped);
    Ok(header)
}

/// Unwrap the session key with the recipient's secret.
pub(crate) fn unwrap_session_key(
    header: &LegacyHeader,
    secret: &StaticSecret,
    public: &PublicKey,
) -> Result<[u8; KEY_LEN_32], KeyRingError> {
    let suite = CipherSuite::try_from(header.wrap_cipher)
        .map_err(|_| KeyRingError::MalformedHeader(format!("unknown wrap cipher 0x{:04x}", header.wrap_cipher)))?;
    let shared = secret.diffie_hellman(&PublicKey::from(header.ephemeral));
    let aead = wrap_aead(suite, shared.as_bytes(), &header.ephemeral, public)?;

    let key = aead
        .open(&header.nonce, &header.aad(), &header.wrapped_key)
        .map_err(|_| KeyRingError::WrongHeader("wrapped session key failed authentication".into()))?;
    key.try_into()
        .map_err(|_| KeyRingError::WrongHeader("session key must be 32 bytes".into()))
}

/// Start an archive-encrypted stream to `recipient`: writes the envelope
/// header and returns the cipher writer for the body.
pub fn legacy_encrypt<W: Write>(
    mut sink: W,
    recipient: &PublicKey,
    options: EncryptOptions,
) -> Result<EncryptWriter<W>, KeyRingError> {
    let mut session_key = [0u8; KEY_LEN_32];
    rand::rngs::OsRng.fill_bytes(&mut session_key);

    let header = seal_legacy(recipient, &session_key)?;
    sink.write_all(&header.encode())?;

    let writer = EncryptWriter::with_options(sink, options.with_flags(flags::ARCHIVE_SESSION), &session_key)?;
    Ok(writer)
}

/// Consume the envelope header from `source` and return a reader over the
/// decrypted body.
pub fn legacy_decrypt<R: Read>(
    mut source: R,
    ring: &crate::keyring::KeyRing,
) -> Result<DecryptReader<R>, KeyRingError> {
    let header = LegacyHeader::read_from(&mut source)?;
    let session_key = ring.open_session_key(&header)?;
    Ok(DecryptReader::new(source, &session_key))
}
