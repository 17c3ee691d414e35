// ## 📂 File: `src/pipeline/mod.rs`
// ## Decrypt origin -> re-encrypt destination(s) -> checksums

//! Re-encryption pipeline.
//!
//! Design notes:
//! - One run walks `CreateOutputs -> Streaming -> Success | Failure`.
//! - Destinations are created up front and owned by an `OutputGuard`; any
//!   path out of `process` other than the final commit deletes them.
//! - The archive keyring is either handed over unlocked or unlocked at the
//!   start of each run, in which case a wrong passphrase fails that run as
//!   a user error after the outputs were created, and they are removed.
//! - Every checksum comes from the bytes in flight: origin ciphertext,
//!   decrypted plaintext and each new ciphertext. A checksum manifest, when
//!   given, is only compared against the live origin digest.
//!
//! Industry notes:
//! - Same shape as a transcoding worker: one decode, N encodes, one barrier.

pub mod types;
pub mod outputs;
pub mod source;
pub mod indexed;

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::constants::DEFAULT_BUFFER_SIZE;
use crate::crypto::{Checksum, DigestProbe};
use crate::keyring::{KeyRing, KeyRingError, KeyRingFile};
use crate::stream::{BlockSink, EncryptOptions, PipelineStream};
use crate::vault::FileKey;

pub use indexed::IndexerSettings;
pub use outputs::{EncryptedFileSink, EncryptedProbes, OutputGuard};
pub use types::{FileChecksum, IngestionPipelineResult, PipelineError, PipelineState};

use indexed::run_indexed;
use source::open_origin;

/// Tunables shared by every run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineOptions {
    pub buffer_size: usize,
    pub encrypt: EncryptOptions,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self { buffer_size: DEFAULT_BUFFER_SIZE, encrypt: EncryptOptions::default() }
    }
}

/// Inputs of one run.
#[derive(Debug, Clone, Copy)]
pub struct PipelineJob<'a> {
    pub origin: &'a Path,
    pub destination: &'a Path,
    /// Raw per-file key for the new ciphertext.
    pub key: &'a FileKey,
    /// Sealed reference to `key`, echoed into the result.
    pub encryption_key: &'a str,
    /// MD5 the uploader declared for the origin file.
    pub expected_origin_md5: Option<&'a str>,
    /// Also produce an encrypted index next to the destination.
    pub index: bool,
}

/// Where a run gets its archive keys.
#[derive(Clone)]
pub enum KeySource {
    Unlocked(Arc<KeyRing>),
    Locked { ring: Arc<KeyRingFile>, passphrase: Arc<str> },
}

impl KeySource {
    fn unlock(&self) -> Result<Arc<KeyRing>, KeyRingError> {
        match self {
            KeySource::Unlocked(ring) => Ok(Arc::clone(ring)),
            KeySource::Locked { ring, passphrase } => KeyRing::from_file(ring, passphrase).map(Arc::new),
        }
    }
}

impl fmt::Debug for KeySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeySource::Unlocked(ring) => f.debug_tuple("Unlocked").field(&ring.len()).finish(),
            KeySource::Locked { ring, .. } => {
                f.debug_struct("Locked").field("keys", &ring.keys.len()).finish_non_exhaustive()
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct ReEncryptionPipeline {
    keys: KeySource,
    options: PipelineOptions,
    indexer: Option<IndexerSettings>,
}

impl ReEncryptionPipeline {
    pub fn new(keyring: Arc<KeyRing>, options: PipelineOptions) -> Self {
        Self { keys: KeySource::Unlocked(keyring), options, indexer: None }
    }

    /// Keep the ring sealed; every run unlocks it with `passphrase`.
    pub fn locked(ring: KeyRingFile, passphrase: impl Into<String>, options: PipelineOptions) -> Self {
        let passphrase: String = passphrase.into();
        let keys = KeySource::Locked { ring: Arc::new(ring), passphrase: Arc::from(passphrase) };
        Self { keys, options, indexer: None }
    }

    pub fn with_indexer(mut self, indexer: IndexerSettings) -> Self {
        self.indexer = Some(indexer);
        self
    }

    pub fn indexer(&self) -> Option<&IndexerSettings> {
        self.indexer.as_ref()
    }

    /// `<destination><suffix>`, e.g. `x.bam.enc.bai`.
    pub fn index_destination(&self, destination: &Path) -> Option<PathBuf> {
        let indexer = self.indexer.as_ref()?;
        let mut name = destination.as_os_str().to_os_string();
        name.push(&indexer.suffix);
        Some(PathBuf::from(name))
    }

    pub fn process(&self, job: &PipelineJob<'_>) -> Result<IngestionPipelineResult, PipelineError> {
        let result = self.run(job);
        match &result {
            Ok(r) => info!(
                state = %PipelineState::Success,
                origin = %job.origin.display(),
                destination = %job.destination.display(),
                bytes = r.bytes_transferred,
                plain_md5 = %r.plain_md5,
                "re-encryption finished"
            ),
            Err(e) => warn!(
                state = %PipelineState::Failure,
                origin = %job.origin.display(),
                user_error = e.is_user_error(),
                error = %e,
                "re-encryption failed"
            ),
        }
        result
    }

    fn run(&self, job: &PipelineJob<'_>) -> Result<IngestionPipelineResult, PipelineError> {
        // ---- CreateOutputs ----
        debug!(state = %PipelineState::CreateOutputs, destination = %job.destination.display());
        let mut guard = OutputGuard::new();
        let primary_file = guard
            .create(job.destination)
            .map_err(|e| PipelineError::io(format!("creating {}", job.destination.display()), e))?;

        let index_output = if job.index {
            let indexer = self
                .indexer
                .as_ref()
                .ok_or_else(|| PipelineError::Config("indexing requested but no indexer is configured".into()))?;
            let path = self
                .index_destination(job.destination)
                .ok_or_else(|| PipelineError::Internal("no index destination".into()))?;
            let file = guard
                .create(&path)
                .map_err(|e| PipelineError::io(format!("creating {}", path.display()), e))?;
            Some((indexer, path, file))
        } else {
            None
        };

        // ---- Streaming ----
        debug!(state = %PipelineState::Streaming, origin = %job.origin.display());
        let keyring = self.keys.unlock()?;
        let mut origin = open_origin(job.origin, &keyring)?;
        let (primary, primary_probes) =
            EncryptedFileSink::new(primary_file, job.destination, self.options.encrypt, job.key)?;
        let stream = PipelineStream::new(self.options.buffer_size);

        let (bytes_transferred, index_probes) = match index_output {
            None => {
                let sinks: Vec<Box<dyn BlockSink>> = vec![Box::new(primary)];
                let total = stream.copy(&mut origin.reader, sinks).map_err(PipelineError::from_fanout)?;
                (total, None)
            }
            Some((indexer, path, file)) => {
                let (index_sink, probes) = EncryptedFileSink::new(file, &path, self.options.encrypt, job.key)?;
                let total = run_indexed(&stream, origin.reader.as_mut(), Box::new(primary), index_sink, indexer)?;
                (total, Some((path, probes)))
            }
        };

        // ---- Checksums ----
        let origin_sum = published(&origin.origin, "origin ciphertext")?;
        let plain_sum = published(&origin.plain, "plaintext")?;
        let encrypted = verify_output(&primary_probes, &plain_sum, bytes_transferred, job.destination)?;

        let encrypted_index_file = match index_probes {
            Some((path, probes)) => {
                let cipher = published(&probes.cipher, "index ciphertext")?;
                Some(FileChecksum::new(path, cipher))
            }
            None => None,
        };

        if let Some(expected) = job.expected_origin_md5 {
            if !expected.eq_ignore_ascii_case(&origin_sum.md5) {
                return Err(PipelineError::ChecksumMismatch {
                    path: job.origin.to_path_buf(),
                    expected: expected.to_string(),
                    actual: origin_sum.md5,
                });
            }
            debug!(md5 = %origin_sum.md5, "origin matches checksum manifest");
        }

        guard.commit();
        Ok(IngestionPipelineResult {
            original_file: FileChecksum::new(job.origin.to_path_buf(), origin_sum),
            plain_md5: plain_sum.md5,
            plain_size: plain_sum.size,
            bytes_transferred,
            encryption_key: job.encryption_key.to_string(),
            encrypted_file: FileChecksum::new(job.destination.to_path_buf(), encrypted),
            encrypted_index_file,
        })
    }
}

fn published(probe: &DigestProbe, what: &str) -> Result<Checksum, PipelineError> {
    probe
        .get()
        .ok_or_else(|| PipelineError::Internal(format!("{what} checksum was not published")))
}

/// The destination must have received exactly the plaintext that was read.
fn verify_output(
    probes: &EncryptedProbes,
    plain: &Checksum,
    bytes_transferred: u64,
    path: &Path,
) -> Result<Checksum, PipelineError> {
    let written = published(&probes.plain, "destination plaintext")?;
    if plain.size != bytes_transferred || written.size != bytes_transferred || written.md5 != plain.md5 {
        return Err(PipelineError::Internal(format!(
            "{} received {} bytes (md5 {}), origin yielded {} bytes (md5 {})",
            path.display(),
            written.size,
            written.md5,
            plain.size,
            plain.md5
        )));
    }
    published(&probes.cipher, "destination ciphertext")
}
