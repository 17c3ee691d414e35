// ## 📂 File: `src/events.rs`

//! Inbound upload notifications and outbound completion reports.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::executor::{JobOutput, JobResult, JobStatus};

/// A file landed in the inbox.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundEvent {
    pub account_id: String,
    pub location_id: String,
    pub original_file_path: PathBuf,
    #[serde(default)]
    pub md5_file_path: Option<PathBuf>,
    pub size: u64,
    /// Milliseconds since the Unix epoch.
    pub last_modified: i64,
}

/// Result of one job, as published downstream. Checksums are only present
/// on SUCCESS.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionEvent {
    pub job_id: String,
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plain_md5: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plain_size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encrypted_md5: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encrypted_size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encryption_key: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl CompletionEvent {
    /// Build the report for `result`. `None` when nothing is published:
    /// ABORTED runs (they resume) and skipped inputs.
    pub fn from_result(job_id: &str, result: &JobResult) -> Option<Self> {
        let mut event = CompletionEvent {
            job_id: job_id.to_string(),
            status: result.status(),
            plain_md5: None,
            plain_size: None,
            encrypted_md5: None,
            encrypted_size: None,
            encryption_key: None,
            start_time: result.start(),
            end_time: result.end(),
            message: result.message_and_exception(),
        };

        match result {
            JobResult::Aborted { .. } => None,
            JobResult::Success { output: JobOutput::Skipped { .. }, .. } => None,
            JobResult::Success { output: JobOutput::ReEncrypted(r), .. } => {
                event.plain_md5 = Some(r.plain_md5.clone());
                event.plain_size = Some(r.plain_size);
                event.encrypted_md5 = Some(r.encrypted_file.md5.clone());
                event.encrypted_size = Some(r.encrypted_file.size);
                event.encryption_key = Some(r.encryption_key.clone());
                Some(event)
            }
            JobResult::Success { output: JobOutput::Empty, .. } | JobResult::Failure { .. } => Some(event),
        }
    }
}
