// ## src/jobs/mod.rs

//! Job implementations registered with the executor.

pub mod reencrypt;

pub use reencrypt::{read_md5_manifest, ReEncryptJob};
