// ## 📂 File: `src/jobs/reencrypt.rs`

//! The re-encryption job: staged input -> pipeline -> staged input removed.
//!
//! Outcome mapping:
//! - input changed or vanished before staging: `Success(Skipped)`
//! - user error (key, header, checksum, indexer exit): FAILURE, data file
//!   restored to where it was uploaded; a `.md5` companion that disagreed
//!   with the data is discarded instead
//! - system error: ABORTED, files stay staged for the resumed attempt

use std::fs;
use std::path::Path;
use std::sync::Arc;

use tracing::{info, warn};

use crate::executor::{Job, JobError, JobOutput, ReEncryptParameters};
use crate::pipeline::{PipelineError, PipelineJob, ReEncryptionPipeline};
use crate::staging::{StagingError, StagingTransaction};
use crate::vault::KeyVault;

const MD5_HEX_LEN: usize = 32;

#[derive(Debug, Clone)]
pub struct ReEncryptJob {
    pipeline: Arc<ReEncryptionPipeline>,
    vault: Arc<KeyVault>,
}

impl ReEncryptJob {
    pub fn new(pipeline: Arc<ReEncryptionPipeline>, vault: Arc<KeyVault>) -> Self {
        Self { pipeline, vault }
    }
}

/// First 32 hex characters of a `.md5` manifest (`<md5>  <name>` or bare).
/// Bytes after the digest are ignored; they need not be text.
pub fn read_md5_manifest(path: &Path) -> Result<String, PipelineError> {
    let bytes = fs::read(path).map_err(|e| PipelineError::io(format!("reading {}", path.display()), e))?;
    let invalid = |reason: &str| PipelineError::InvalidManifest { path: path.to_path_buf(), reason: reason.into() };

    let start = bytes.iter().position(|b| !b.is_ascii_whitespace()).unwrap_or(bytes.len());
    let digest = match bytes.get(start..start + MD5_HEX_LEN) {
        Some(digest) => digest,
        None => return Err(invalid("shorter than an MD5 digest")),
    };
    if !digest.iter().all(u8::is_ascii_hexdigit) {
        return Err(invalid("not a hexadecimal MD5 digest"));
    }
    Ok(digest.iter().map(|b| char::from(b.to_ascii_lowercase())).collect())
}

impl Job<ReEncryptParameters> for ReEncryptJob {
    fn run(&self, job_id: &str, params: &ReEncryptParameters) -> Result<JobOutput, JobError> {
        let staging = StagingTransaction::new(params.files());
        match staging.stage() {
            Ok(()) => {}
            Err(e @ StagingError::SkipIngestion { .. }) => {
                info!(job_id, reason = %e, "input changed before staging, skipping");
                return Ok(JobOutput::Skipped { reason: e.to_string() });
            }
            Err(e) => return Err(JobError::abort("could not stage input", e)),
        }

        let expected_md5 = match &params.md5_file {
            Some(manifest) => match read_md5_manifest(&manifest.staging_path) {
                Ok(md5) => Some(md5),
                Err(e) => return Err(self.fail(job_id, &staging, params, e)),
            },
            None => None,
        };

        let key = self
            .vault
            .open(&params.encrypted_password)
            .map_err(|e| JobError::abort("could not open the per-file key", e))?;

        let job = PipelineJob {
            origin: &params.file.staging_path,
            destination: &params.result_path,
            key: &key,
            encryption_key: &params.encrypted_password,
            expected_origin_md5: expected_md5.as_deref(),
            index: params.index,
        };

        match self.pipeline.process(&job) {
            Ok(result) => {
                staging.delete();
                info!(job_id, destination = %params.result_path.display(), "input re-encrypted");
                Ok(JobOutput::ReEncrypted(Box::new(result)))
            }
            Err(e) => Err(self.fail(job_id, &staging, params, e)),
        }
    }
}

impl ReEncryptJob {
    fn fail(
        &self,
        job_id: &str,
        staging: &StagingTransaction,
        params: &ReEncryptParameters,
        err: PipelineError,
    ) -> JobError {
        if !err.is_user_error() {
            warn!(job_id, error = %err, "system error, input left staged");
            return JobError::abort("re-encryption aborted", err);
        }

        let untrusted_manifest = matches!(
            err,
            PipelineError::ChecksumMismatch { .. } | PipelineError::InvalidManifest { .. }
        );
        match (&params.md5_file, untrusted_manifest) {
            (Some(manifest), true) => {
                params.file.rollback_file_to_staging();
                manifest.delete_staging_file();
            }
            _ => staging.rollback(),
        }
        warn!(job_id, error = %err, "input rejected, returned to its upload location");
        JobError::failure("re-encryption failed", err)
    }
}
