// ## src/headers/mod.rs

//! headers/mod.rs
//! Cipher stream header: layout, encoding, decoding.
//!
//! Industry notes:
//! - Fixed-size header (64 bytes) keeps I/O deterministic.
//! - Explicit registry IDs (cipher, PRF) avoid silent incompatibilities.
//! - The key check lets a reader reject a wrong key before touching any frame,
//!   which is how "wrong key" is told apart from "corrupt data".

pub mod types;
pub mod encode;
pub mod decode;

pub use types::*;
pub use encode::*;
pub use decode::*;
