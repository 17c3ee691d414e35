// ## 📂 File: `src/keyring/ring.rs`

//! Passphrase-protected X25519 keyring.
//!
//! Design notes:
//! - Each entry is sealed independently (AES-256-GCM under
//!   HKDF-SHA256(passphrase, entry salt)); the fingerprint is the AAD.
//! - `unlock` is all-or-nothing: if any entry fails to open the passphrase is
//!   wrong. A sealed entry that opens but does not match its public key means
//!   the file is corrupt.
//! - Unlocked secrets live only in memory and are never serialized.

use std::fs;
use std::io::{Read, Write};
use std::path::Path;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use rand::RngCore;
use sha2::{Digest, Sha256};
use tracing::{debug, info};
use x25519_dalek::{PublicKey, StaticSecret};

use crate::constants::labels;
use crate::crypto::{derive_wrap_key, open_with_prefixed_nonce, seal_with_random_nonce, AeadImpl, KEY_LEN_32};
use crate::headers::CipherSuite;
use crate::keyring::legacy::{unwrap_session_key, LegacyHeader};
use crate::keyring::types::{KeyRingError, KeyRingFile, SealedKeyEntry, FINGERPRINT_LEN, KEYRING_FORMAT_V1};

/// Truncated SHA-256 of an X25519 public key.
pub fn fingerprint(public: &PublicKey) -> [u8; FINGERPRINT_LEN] {
    let digest = Sha256::digest(public.as_bytes());
    let mut out = [0u8; FINGERPRINT_LEN];
    out.copy_from_slice(&digest[..FINGERPRINT_LEN]);
    out
}

fn decode_b64(field: &str, value: &str) -> Result<Vec<u8>, KeyRingError> {
    STANDARD
        .decode(value)
        .map_err(|e| KeyRingError::Corrupt(format!("{field}: {e}")))
}

fn entry_wrap(passphrase: &str, salt: &[u8]) -> Result<AeadImpl, KeyRingError> {
    let key = derive_wrap_key(passphrase.as_bytes(), salt, labels::KEYRING)?;
    Ok(AeadImpl::new(CipherSuite::Aes256Gcm, &key)?)
}

impl KeyRingFile {
    pub fn empty() -> Self {
        Self { version: KEYRING_FORMAT_V1, keys: Vec::new() }
    }

    /// New keyring holding one freshly generated key pair.
    pub fn generate(passphrase: &str) -> Result<Self, KeyRingError> {
        let mut file = Self::empty();
        file.add_key(passphrase)?;
        Ok(file)
    }

    /// Generate a key pair, seal its secret and append it. Returns the public half.
    pub fn add_key(&mut self, passphrase: &str) -> Result<PublicKey, KeyRingError> {
        let secret = StaticSecret::random_from_rng(rand::rngs::OsRng);
        let public = PublicKey::from(&secret);
        let fp = fingerprint(&public);

        let mut salt = [0u8; 16];
        rand::rngs::OsRng.fill_bytes(&mut salt);

        let sealed = seal_with_random_nonce(&entry_wrap(passphrase, &salt)?, &fp, &secret.to_bytes())?;

        self.keys.push(SealedKeyEntry {
            fingerprint: hex::encode(fp),
            public_key: STANDARD.encode(public.as_bytes()),
            salt: STANDARD.encode(salt),
            sealed_secret: STANDARD.encode(sealed),
            created_at: chrono::Utc::now(),
        });
        info!(fingerprint = %hex::encode(fp), "keyring key generated");
        Ok(public)
    }

    /// Public keys, in file order.
    pub fn public_keys(&self) -> Result<Vec<PublicKey>, KeyRingError> {
        self.keys
            .iter()
            .map(|entry| {
                let raw = decode_b64("public_key", &entry.public_key)?;
                let raw: [u8; 32] = raw
                    .try_into()
                    .map_err(|_| KeyRingError::Corrupt("public key must be 32 bytes".into()))?;
                Ok(PublicKey::from(raw))
            })
            .collect()
    }

    pub fn read_from<R: Read>(reader: R) -> Result<Self, KeyRingError> {
        let file: KeyRingFile = serde_json::from_reader(reader)?;
        if file.version != KEYRING_FORMAT_V1 {
            return Err(KeyRingError::Corrupt(format!("unsupported keyring version {}", file.version)));
        }
        Ok(file)
    }

    pub fn write_to<W: Write>(&self, writer: W) -> Result<(), KeyRingError> {
        serde_json::to_writer_pretty(writer, self)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self, KeyRingError> {
        Self::read_from(fs::File::open(path)?)
    }

    pub fn save(&self, path: &Path) -> Result<(), KeyRingError> {
        let mut file = fs::File::create(path)?;
        self.write_to(&mut file)?;
        file.sync_all()?;
        Ok(())
    }
}

struct UnlockedKey {
    fingerprint: [u8; FINGERPRINT_LEN],
    secret: StaticSecret,
    public: PublicKey,
}

/// Unlocked keyring: recovers session keys from legacy envelope headers.
pub struct KeyRing {
    keys: Vec<UnlockedKey>,
}

impl std::fmt::Debug for KeyRing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let fps: Vec<String> = self.keys.iter().map(|k| hex::encode(k.fingerprint)).collect();
        f.debug_struct("KeyRing").field("fingerprints", &fps).finish()
    }
}

impl KeyRing {
    /// Read a keyring from `ring` and open it with `passphrase`.
    pub fn unlock<R: Read>(ring: R, passphrase: &str) -> Result<Self, KeyRingError> {
        Self::from_file(&KeyRingFile::read_from(ring)?, passphrase)
    }

    pub fn from_file(file: &KeyRingFile, passphrase: &str) -> Result<Self, KeyRingError> {
        if file.keys.is_empty() {
            return Err(KeyRingError::Corrupt("keyring holds no keys".into()));
        }

        let mut keys = Vec::with_capacity(file.keys.len());
        for entry in &file.keys {
            let fp_raw = hex::decode(&entry.fingerprint)
                .map_err(|e| KeyRingError::Corrupt(format!("fingerprint: {e}")))?;
            let fp: [u8; FINGERPRINT_LEN] = fp_raw
                .try_into()
                .map_err(|_| KeyRingError::Corrupt("fingerprint must be 8 bytes".into()))?;
            let salt = decode_b64("salt", &entry.salt)?;
            let sealed = decode_b64("sealed_secret", &entry.sealed_secret)?;

            let secret_raw = open_with_prefixed_nonce(&entry_wrap(passphrase, &salt)?, &fp, &sealed)
                .map_err(|_| KeyRingError::WrongPassword)?;
            let secret_raw: [u8; KEY_LEN_32] = secret_raw
                .try_into()
                .map_err(|_| KeyRingError::Corrupt("secret must be 32 bytes".into()))?;

            let secret = StaticSecret::from(secret_raw);
            let public = PublicKey::from(&secret);
            if fingerprint(&public) != fp {
                return Err(KeyRingError::Corrupt(format!("entry {} does not match its public key", entry.fingerprint)));
            }
            keys.push(UnlockedKey { fingerprint: fp, secret, public });
        }

        debug!(keys = keys.len(), "keyring unlocked");
        Ok(Self { keys })
    }

    /// Load from disk and unlock.
    pub fn open(path: &Path, passphrase: &str) -> Result<Self, KeyRingError> {
        Self::unlock(fs::File::open(path)?, passphrase)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn public_keys(&self) -> Vec<PublicKey> {
        self.keys.iter().map(|k| k.public).collect()
    }

    /// Recover the session key a legacy header wraps.
    ///
    /// Fails with `WrongHeader` when the header names a recipient that is not
    /// in this ring or when the wrapped key does not authenticate.
    pub fn open_session_key(&self, header: &LegacyHeader) -> Result<[u8; KEY_LEN_32], KeyRingError> {
        let key = self
            .keys
            .iter()
            .find(|k| k.fingerprint == header.recipient)
            .ok_or_else(|| KeyRingError::WrongHeader(format!("no key with fingerprint {}", hex::encode(header.recipient))))?;

        unwrap_session_key(header, &key.secret, &key.public)
    }
}
