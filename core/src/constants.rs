/// Magic number of the per-file cipher stream.
/// "IGE1" = Ingest Encrypted stream v1
pub const MAGIC_IGE1: [u8; 4] = *b"IGE1";
pub const STREAM_V1: u16 = 1;

/// Magic number of the legacy (archive keyring) envelope that precedes an
/// archive-encrypted cipher stream.
pub const MAGIC_IGLK: [u8; 4] = *b"IGLK";
pub const LEGACY_V1: u16 = 1;

/// Default AEAD frame size.
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024; // 64 KiB
/// Accepted AEAD frame sizes (in bytes).
pub const ALLOWED_CHUNK_SIZES: &[usize] = &[
    16 * 1024,   // 16 KiB
    32 * 1024,   // 32 KiB
    64 * 1024,   // 64 KiB
    128 * 1024,  // 128 KiB
    256 * 1024,  // 256 KiB
    1024 * 1024, // 1 MiB
];
/// Max chunk size sanity bound (4 MiB).
pub const MAX_CHUNK_SIZE: usize = 4 * 1024 * 1024;

/// Block size of the fan-out copy engine.
pub const DEFAULT_BUFFER_SIZE: usize = 64 * 1024;
pub const MAX_BUFFER_SIZE: usize = 16 * 1024 * 1024;

/// Suffix appended to the primary destination to name the encrypted index.
pub const DEFAULT_INDEX_SUFFIX: &str = ".bai";

/// Extension of the checksum manifest travelling with each data file.
pub const MD5_MANIFEST_EXTENSION: &str = "md5";

/// Cipher suite identifiers (mirrored in headers).
pub mod cipher_ids {
    pub const AES256_GCM: u16        = 0x0001;
    pub const CHACHA20_POLY1305: u16 = 0x0002;
}

/// HKDF PRF identifiers (mirrored in headers).
pub mod prf_ids {
    pub const SHA256: u16 = 0x0001;
    pub const SHA512: u16 = 0x0002;
}

/// Frame type tags of the cipher stream body.
pub mod frame_types {
    pub const DATA: u8  = 0x01;
    pub const FINAL: u8 = 0x02;
}

/// HKDF `info` labels. Each derived key has its own domain.
pub mod labels {
    pub const SESSION: &[u8]     = b"IGE1|session";
    pub const KEY_CHECK: &[u8]   = b"IGE1|key-check";
    pub const KEYRING: &[u8]     = b"IGK1|keyring-entry";
    pub const LEGACY_WRAP: &[u8] = b"IGLK|session-wrap";
    pub const VAULT: &[u8]       = b"IGV1|vault";
}
