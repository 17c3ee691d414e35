// ## 📂 File: `src/executor/types.rs`

use std::fmt;
use std::io;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::pipeline::IngestionPipelineResult;
use crate::staging::FileToProcess;

/// Registered job kinds. Dispatch is a `match`, not a name lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum JobKind {
    ReEncrypt,
}

impl JobKind {
    pub fn name(&self) -> &'static str {
        match self {
            JobKind::ReEncrypt => "re-encrypt",
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Input of the re-encryption job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReEncryptParameters {
    pub file: FileToProcess,
    /// Checksum manifest uploaded next to the data file.
    pub md5_file: Option<FileToProcess>,
    /// Destination of the re-encrypted file.
    pub result_path: PathBuf,
    /// Per-file key, sealed by the key vault.
    pub encrypted_password: String,
    pub account_id: String,
    pub location_id: String,
    #[serde(default)]
    pub index: bool,
}

impl ReEncryptParameters {
    /// Every file this job stages, data file first.
    pub fn files(&self) -> Vec<FileToProcess> {
        let mut files = vec![self.file.clone()];
        files.extend(self.md5_file.clone());
        files
    }
}

/// Tagged job input, immutable once assigned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "parameters", rename_all = "kebab-case")]
pub enum JobParameters {
    ReEncrypt(ReEncryptParameters),
}

impl JobParameters {
    pub fn kind(&self) -> JobKind {
        match self {
            JobParameters::ReEncrypt(_) => JobKind::ReEncrypt,
        }
    }
}

/// An assigned unit of work, consumed once by `JobExecutor::execute`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobExecution {
    pub job_id: String,
    pub job_name: String,
    pub parameters: JobParameters,
}

/// Persisted claim: this instance owns `job_id` until the result is saved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobExecutionRecord {
    pub job_id: String,
    pub job_name: String,
    pub instance_id: String,
    pub start_time: DateTime<Utc>,
}

/// Final status of one attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Success,
    Failure,
    Aborted,
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            JobStatus::Success => "SUCCESS",
            JobStatus::Failure => "FAILURE",
            JobStatus::Aborted => "ABORTED",
        };
        f.write_str(name)
    }
}

/// One line of execution history. Append-only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRun {
    pub job_id: String,
    pub instance_id: String,
    pub message_and_exception: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub status: JobStatus,
}

/// What a successful job produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum JobOutput {
    ReEncrypted(Box<IngestionPipelineResult>),
    /// The input changed or vanished before staging. Nothing to report.
    Skipped { reason: String },
    Empty,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobResult {
    Success {
        output: JobOutput,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
    Failure {
        message: String,
        cause: Option<String>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
    Aborted {
        message: String,
        cause: Option<String>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
}

impl JobResult {
    pub fn status(&self) -> JobStatus {
        match self {
            JobResult::Success { .. } => JobStatus::Success,
            JobResult::Failure { .. } => JobStatus::Failure,
            JobResult::Aborted { .. } => JobStatus::Aborted,
        }
    }

    pub fn start(&self) -> DateTime<Utc> {
        match self {
            JobResult::Success { start, .. } | JobResult::Failure { start, .. } | JobResult::Aborted { start, .. } => *start,
        }
    }

    pub fn end(&self) -> DateTime<Utc> {
        match self {
            JobResult::Success { end, .. } | JobResult::Failure { end, .. } | JobResult::Aborted { end, .. } => *end,
        }
    }

    /// `message: cause` for failures, `None` on success.
    pub fn message_and_exception(&self) -> Option<String> {
        match self {
            JobResult::Success { .. } => None,
            JobResult::Failure { message, cause, .. } | JobResult::Aborted { message, cause, .. } => Some(match cause {
                Some(cause) => format!("{message}: {cause}"),
                None => message.clone(),
            }),
        }
    }

    pub fn is_aborted(&self) -> bool {
        matches!(self, JobResult::Aborted { .. })
    }

    pub fn output(&self) -> Option<&JobOutput> {
        match self {
            JobResult::Success { output, .. } => Some(output),
            _ => None,
        }
    }
}

/// How a job reports that it did not succeed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JobError {
    /// Transient; the executor waits and runs the job again.
    #[error("retry: {0}")]
    Retry(String),

    /// Terminal, caused by the input. The claim is released.
    #[error("{message}")]
    Failure { message: String, cause: Option<String> },

    /// Terminal, caused by the environment. The claim is kept for resume.
    #[error("{message}")]
    Abort { message: String, cause: Option<String> },
}

impl JobError {
    pub fn failure(message: impl Into<String>, cause: impl fmt::Display) -> Self {
        JobError::Failure { message: message.into(), cause: Some(cause.to_string()) }
    }

    pub fn abort(message: impl Into<String>, cause: impl fmt::Display) -> Self {
        JobError::Abort { message: message.into(), cause: Some(cause.to_string()) }
    }
}

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("store I/O error at {path}: {source}")]
    Io { path: PathBuf, #[source] source: io::Error },

    #[error("corrupt store entry {path}: {source}")]
    Json { path: PathBuf, #[source] source: serde_json::Error },

    #[error("could not encode store entry: {0}")]
    Encode(#[from] serde_json::Error),
}

impl PersistenceError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        PersistenceError::Io { path: path.into(), source }
    }
}

#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("no job registered for kind {0}")]
    JobNotRegistered(JobKind),

    #[error("instance {instance_id} already holds job {job_id}")]
    InstanceBusy { instance_id: String, job_id: String },

    #[error("persistence: {0}")]
    Persistence(#[from] PersistenceError),
}
