// ## 📂 File: `src/service.rs`

//! Worker surface: inbound event -> staging -> claim -> execute -> report.
//!
//! The claim is the duplicate filter. A redelivered event finds the file
//! already staged (or gone) and the job id already claimed, and is dropped
//! without touching the staged file.

use std::fs::{self, OpenOptions};
use std::io::{self, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, error, info};

use crate::config::IngestConfig;
use crate::events::{CompletionEvent, InboundEvent};
use crate::executor::{
    ExecutorError, FileStore, JobExecutor, JobKind, JobParameters, JobResult, JobStatus, PersistenceError,
    ReEncryptParameters, RegisteredJob,
};
use crate::jobs::ReEncryptJob;
use crate::keyring::{KeyRing, KeyRingError, KeyRingFile};
use crate::pipeline::ReEncryptionPipeline;
use crate::staging::{fingerprint_of, FileToProcess, StagingError, StagingTransaction};
use crate::vault::{KeyVault, VaultError};

/// Extension of re-encrypted outputs.
pub const RESULT_EXTENSION: &str = "enc";
/// Upload extensions replaced by `RESULT_EXTENSION`.
const ARCHIVE_EXTENSIONS: &[&str] = &["gpg", "pgp", "asc"];

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("staging: {0}")]
    Staging(#[from] StagingError),

    #[error("executor: {0}")]
    Executor(#[from] ExecutorError),

    #[error("persistence: {0}")]
    Persistence(#[from] PersistenceError),

    #[error("key vault: {0}")]
    Vault(#[from] VaultError),

    #[error("keyring: {0}")]
    KeyRing(#[from] KeyRingError),

    #[error("publishing completion event: {0}")]
    Publish(#[source] io::Error),

    #[error("{context}: {source}")]
    Io { context: String, #[source] source: io::Error },
}

/// Outward channel for completion events.
pub trait CompletionPublisher: Send + Sync {
    fn publish(&self, event: &CompletionEvent) -> io::Result<()>;
}

/// Appends completion events as JSON lines, fsynced per event.
#[derive(Debug)]
pub struct OutboxPublisher {
    path: PathBuf,
    lock: Mutex<()>,
}

impl OutboxPublisher {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), lock: Mutex::new(()) }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CompletionPublisher for OutboxPublisher {
    fn publish(&self, event: &CompletionEvent) -> io::Result<()> {
        let mut line = serde_json::to_vec(event).map_err(io::Error::other)?;
        line.push(b'\n');

        let _guard = self.lock.lock();
        let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        file.write_all(&line)?;
        file.sync_data()
    }
}

/// What happened to one inbound event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventOutcome {
    /// The job ran to a terminal (or aborted) result.
    Completed(JobStatus),
    /// The input changed or vanished since discovery.
    Skipped { reason: String },
    /// Another attempt already holds this job id.
    Duplicate,
}

/// Deterministic job id of an upload: SHA-256 over its identity fields.
pub fn job_id_for(event: &InboundEvent) -> String {
    let mut hasher = Sha256::new();
    hasher.update(event.account_id.as_bytes());
    hasher.update([0]);
    hasher.update(event.location_id.as_bytes());
    hasher.update([0]);
    hasher.update(event.original_file_path.to_string_lossy().as_bytes());
    hasher.update([0]);
    hasher.update(event.size.to_le_bytes());
    hasher.update(event.last_modified.to_le_bytes());
    hex::encode(hasher.finalize())
}

/// `x.bam.gpg` -> `x.bam.enc`; `x.bam` -> `x.bam.enc`.
pub fn result_file_name(original: &Path) -> String {
    let name = original.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
    let stem = match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && ARCHIVE_EXTENSIONS.iter().any(|a| a.eq_ignore_ascii_case(ext)) => stem,
        _ => name.as_str(),
    };
    format!("{stem}.{RESULT_EXTENSION}")
}

pub struct IngestionService {
    executor: JobExecutor,
    publisher: Arc<dyn CompletionPublisher>,
    vault: Arc<KeyVault>,
    pipeline: Arc<ReEncryptionPipeline>,
    staging_dir: PathBuf,
    result_dir: Option<PathBuf>,
}

impl std::fmt::Debug for IngestionService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IngestionService")
            .field("executor", &self.executor)
            .field("staging_dir", &self.staging_dir)
            .field("result_dir", &self.result_dir)
            .finish_non_exhaustive()
    }
}

impl IngestionService {
    /// Wire a service from parts. Registers the re-encryption job.
    pub fn new(
        mut executor: JobExecutor,
        pipeline: Arc<ReEncryptionPipeline>,
        vault: Arc<KeyVault>,
        publisher: Arc<dyn CompletionPublisher>,
        staging_dir: PathBuf,
        result_dir: Option<PathBuf>,
    ) -> Self {
        let job = ReEncryptJob::new(Arc::clone(&pipeline), Arc::clone(&vault));
        executor.register_job(RegisteredJob::ReEncrypt(Arc::new(job)));
        Self { executor, publisher, vault, pipeline, staging_dir, result_dir }
    }

    pub fn from_config(config: &IngestConfig) -> Result<Self, ServiceError> {
        fs::create_dir_all(&config.staging_dir).map_err(|source| ServiceError::Io {
            context: format!("creating {}", config.staging_dir.display()),
            source,
        })?;
        if let Some(dir) = &config.result_dir {
            fs::create_dir_all(dir)
                .map_err(|source| ServiceError::Io { context: format!("creating {}", dir.display()), source })?;
        }

        // Unlocked per job: a wrong passphrase fails each upload, not startup.
        let ring = KeyRingFile::load(&config.keyring_path)?;
        match KeyRing::from_file(&ring, &config.keyring_passphrase) {
            Ok(keyring) => info!(keys = keyring.len(), path = %config.keyring_path.display(), "keyring passphrase accepted"),
            Err(e) => error!(path = %config.keyring_path.display(), error = %e, "keyring does not unlock, uploads will fail"),
        }

        let mut pipeline =
            ReEncryptionPipeline::locked(ring, config.keyring_passphrase.clone(), config.pipeline.options());
        if let Some(indexer) = &config.indexer {
            pipeline = pipeline.with_indexer(indexer.clone());
        }

        let store = FileStore::open(&config.store_dir)?;
        let executor = JobExecutor::new(config.instance_id.clone(), Arc::new(store), config.delay);

        Ok(Self::new(
            executor,
            Arc::new(pipeline),
            Arc::new(KeyVault::new(&config.vault_secret)?),
            Arc::new(OutboxPublisher::new(&config.outbox_path)),
            config.staging_dir.clone(),
            config.result_dir.clone(),
        ))
    }

    pub fn executor(&self) -> &JobExecutor {
        &self.executor
    }

    /// Re-run the claim this instance left unfinished. Call once at startup.
    pub fn resume(&self) -> Result<Option<JobResult>, ServiceError> {
        let Some(execution) = self.executor.get_assigned_execution(JobKind::ReEncrypt)? else {
            debug!("nothing to resume");
            return Ok(None);
        };
        info!(job_id = %execution.job_id, "resuming execution");
        let job_id = execution.job_id.clone();
        let result = self.executor.execute(execution)?;
        self.report(&job_id, &result)?;
        Ok(Some(result))
    }

    pub fn handle_event(&self, event: &InboundEvent) -> Result<EventOutcome, ServiceError> {
        let job_id = job_id_for(event);
        info!(job_id = %job_id, path = %event.original_file_path.display(), "event received");

        let params = match self.parameters_for(&job_id, event)? {
            Ok(params) => params,
            Err(reason) => {
                info!(job_id = %job_id, reason = %reason, "input gone, event dropped");
                return Ok(EventOutcome::Skipped { reason });
            }
        };

        let staging = StagingTransaction::new(params.files());
        let already_staged = staging.files().iter().all(FileToProcess::is_staged);
        match staging.stage() {
            Ok(()) => {}
            Err(e @ StagingError::SkipIngestion { .. }) => {
                info!(job_id = %job_id, reason = %e, "input changed since discovery, event dropped");
                return Ok(EventOutcome::Skipped { reason: e.to_string() });
            }
            Err(e) => return Err(e.into()),
        }

        let execution = match self.executor.assign_execution(&job_id, JobParameters::ReEncrypt(params)) {
            Ok(Some(execution)) => execution,
            Ok(None) => {
                if !already_staged {
                    staging.rollback();
                }
                return Ok(EventOutcome::Duplicate);
            }
            Err(e) => {
                if !already_staged {
                    staging.rollback();
                }
                return Err(e.into());
            }
        };

        let result = self.executor.execute(execution)?;
        self.report(&job_id, &result)?;
        Ok(EventOutcome::Completed(result.status()))
    }

    /// Build job parameters. The inner `Err` carries a skip reason.
    fn parameters_for(
        &self,
        job_id: &str,
        event: &InboundEvent,
    ) -> Result<Result<ReEncryptParameters, String>, ServiceError> {
        let original = &event.original_file_path;
        let file = FileToProcess::new(
            original.clone(),
            self.staging_path(job_id, original),
            event.size,
            event.last_modified,
        );

        let md5_file = match &event.md5_file_path {
            Some(path) => match fingerprint_of(path) {
                Ok((size, mtime)) => Some(FileToProcess::new(path.clone(), self.staging_path(job_id, path), size, mtime)),
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    // Already staged by an earlier delivery of this event.
                    let staged = self.staging_path(job_id, path);
                    match fingerprint_of(&staged) {
                        Ok((size, mtime)) => Some(FileToProcess::new(path.clone(), staged, size, mtime)),
                        Err(_) => return Ok(Err(format!("checksum manifest {} not found", path.display()))),
                    }
                }
                Err(source) => {
                    return Err(ServiceError::Io { context: format!("reading {}", path.display()), source })
                }
            },
            None => None,
        };

        let result_dir = match &self.result_dir {
            Some(dir) => dir.clone(),
            None => original.parent().map(Path::to_path_buf).unwrap_or_default(),
        };
        let index = self.pipeline.indexer().is_some_and(|i| i.applies_to(original));
        let (_, sealed) = self.vault.generate()?;

        Ok(Ok(ReEncryptParameters {
            file,
            md5_file,
            result_path: result_dir.join(result_file_name(original)),
            encrypted_password: sealed,
            account_id: event.account_id.clone(),
            location_id: event.location_id.clone(),
            index,
        }))
    }

    fn staging_path(&self, job_id: &str, original: &Path) -> PathBuf {
        let name = original.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
        self.staging_dir.join(format!("{job_id}-{name}"))
    }

    fn report(&self, job_id: &str, result: &JobResult) -> Result<(), ServiceError> {
        match CompletionEvent::from_result(job_id, result) {
            Some(event) => {
                self.publisher.publish(&event).map_err(ServiceError::Publish)?;
                info!(job_id, status = %event.status, "completion published");
            }
            None => info!(job_id, status = %result.status(), "nothing to publish for this result"),
        }
        Ok(())
    }
}
