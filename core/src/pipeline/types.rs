// ## 📂 File: `src/pipeline/types.rs`

use std::fmt;
use std::io;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::crypto::Checksum;
use crate::keyring::KeyRingError;
use crate::stream::FanoutError;
use crate::types::CipherError;

/// Path plus the checksum of the bytes that moved through it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileChecksum {
    pub path: PathBuf,
    pub md5: String,
    pub size: u64,
}

impl FileChecksum {
    pub fn new(path: PathBuf, checksum: Checksum) -> Self {
        Self { path, md5: checksum.md5, size: checksum.size }
    }
}

/// Outcome of one successful pipeline run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestionPipelineResult {
    /// Origin ciphertext as read from disk.
    pub original_file: FileChecksum,
    /// MD5 of the decrypted plaintext.
    pub plain_md5: String,
    pub plain_size: u64,
    pub bytes_transferred: u64,
    /// Sealed reference to the per-file key (never the raw key).
    pub encryption_key: String,
    pub encrypted_file: FileChecksum,
    pub encrypted_index_file: Option<FileChecksum>,
}

/// Per-run state machine: `CreateOutputs -> Streaming -> Success | Failure`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    CreateOutputs,
    Streaming,
    Success,
    Failure,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineState::CreateOutputs => "CREATE_OUTPUTS",
            PipelineState::Streaming => "STREAMING",
            PipelineState::Success => "SUCCESS",
            PipelineState::Failure => "FAILURE",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("keyring: {0}")]
    KeyRing(#[from] KeyRingError),

    #[error("cipher: {0}")]
    Cipher(#[from] CipherError),

    #[error("checksum mismatch for {path}: manifest {expected}, computed {actual}")]
    ChecksumMismatch { path: PathBuf, expected: String, actual: String },

    #[error("invalid checksum manifest {path}: {reason}")]
    InvalidManifest { path: PathBuf, reason: String },

    #[error("indexer exited with {status}: {stderr}")]
    IndexerFailed { status: String, stderr: String },

    #[error("indexer did not exit within {0:?}")]
    IndexerTimeout(Duration),

    #[error("could not spawn indexer {program}: {source}")]
    IndexerSpawn { program: String, #[source] source: io::Error },

    #[error("{context}: {source}")]
    Io { context: String, #[source] source: io::Error },

    #[error("pipeline misconfigured: {0}")]
    Config(String),

    #[error("internal pipeline error: {0}")]
    Internal(String),
}

impl PipelineError {
    /// User errors are caused by the uploaded input (wrong key, damaged
    /// header, bad manifest, input the indexer rejects). Everything else is a
    /// system error.
    pub fn is_user_error(&self) -> bool {
        match self {
            PipelineError::KeyRing(e) => e.is_user_error(),
            PipelineError::Cipher(e) => e.is_user_error(),
            PipelineError::ChecksumMismatch { .. }
            | PipelineError::InvalidManifest { .. }
            | PipelineError::IndexerFailed { .. } => true,
            _ => false,
        }
    }

    pub fn io(context: impl Into<String>, source: io::Error) -> Self {
        PipelineError::Io { context: context.into(), source }
    }

    /// Classify an I/O error surfaced through a `Read`/`Write` boundary: a
    /// wrapped `CipherError` keeps its type, anything else is environmental.
    pub fn classify_io(context: impl Into<String>, err: io::Error) -> Self {
        match CipherError::from_io(err) {
            CipherError::Io(source) => PipelineError::Io { context: context.into(), source },
            typed => PipelineError::Cipher(typed),
        }
    }

    pub fn from_fanout(err: FanoutError) -> Self {
        let context = err.to_string();
        match err.into_io_error() {
            Ok(io) => PipelineError::classify_io(context, io),
            Err(other) => PipelineError::Internal(other.to_string()),
        }
    }
}
