//! keyring/mod.rs
//! Archive keyring: unlock with a passphrase, recover per-file session keys
//! from legacy envelope headers.

pub mod types;
pub mod ring;
pub mod legacy;

pub use types::*;
pub use ring::{fingerprint, KeyRing};
pub use legacy::{legacy_decrypt, legacy_encrypt, seal_legacy, LegacyHeader, LEGACY_HEADER_LEN};
