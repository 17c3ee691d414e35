// ## src/crypto/mod.rs

//! Primitives under the stream layer: AEAD suites, HKDF key schedule, frame
//! nonces and AAD, and the running MD5 used for checksums.

pub mod types;
pub mod aad;
pub mod aead;
pub mod kdf;
pub mod nonce;
pub mod digest;

pub use types::*;
pub use aad::build_frame_aad;
pub use aead::{open_with_prefixed_nonce, seal_with_random_nonce, AeadImpl};
pub use kdf::{ct_eq, derive_stream_keys, derive_wrap_key, StreamKeys};
pub use nonce::frame_nonce;
pub use digest::{Checksum, DigestProbe, DigestReader, DigestWriter};
