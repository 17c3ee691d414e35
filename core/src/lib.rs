//! ingest-core
//!
//! Re-encryption ingest engine: decrypt archive-encrypted uploads, re-encrypt
//! them under a fresh per-file key, verify MD5 end to end, and run every file
//! as a crash-resumable job.
//! Blocking I/O, no async runtime, no FFI.

#![forbid(unsafe_code)]

// Shared and top level
pub mod constants;
pub mod types;

// Wire formats and primitives
pub mod headers;
pub mod crypto;

// Stream layers
pub mod stream;
pub mod keyring;
pub mod vault;

// Processing
pub mod staging;
pub mod pipeline;

// Jobs and the worker surface
pub mod executor;
pub mod jobs;
pub mod events;
pub mod config;
pub mod service;

// -----------------------------------------------------------------------------
// Prelude (Rust users)
// -----------------------------------------------------------------------------
pub mod prelude {
    pub use crate::config::IngestConfig;
    pub use crate::crypto::Checksum;
    pub use crate::events::{CompletionEvent, InboundEvent};
    pub use crate::executor::{DelayConfiguration, JobExecutor, JobResult, JobStatus};
    pub use crate::headers::CipherSuite;
    pub use crate::keyring::{KeyRing, KeyRingFile};
    pub use crate::pipeline::{IngestionPipelineResult, PipelineJob, PipelineOptions, ReEncryptionPipeline};
    pub use crate::service::{EventOutcome, IngestionService};
    pub use crate::stream::{decrypt, encrypt, EncryptOptions};
    pub use crate::types::CipherError;
    pub use crate::vault::{FileKey, KeyVault};
}
