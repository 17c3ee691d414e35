// ## 📂 File: `src/staging.rs`

//! Staging protocol.
//!
//! Before a job touches a file it renames it into a private staging
//! directory on the same volume. The rename is guarded by the fingerprint
//! (size, mtime) captured when the file was first observed: a mismatch, or a
//! file that no longer exists, means the unit of work is stale and is skipped.
//!
//! Invariant: between `move_file_to_staging` and either
//! `rollback_file_to_staging` or `delete_staging_file`, the file exists at
//! exactly one of its two paths.

use std::fs;
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum StagingError {
    /// The file changed or vanished since it was observed. Not a failure:
    /// the unit of work is dropped.
    #[error("skipping {path}: {reason}")]
    SkipIngestion { path: PathBuf, reason: String },

    #[error("staging I/O error on {path}: {source}")]
    Io { path: PathBuf, #[source] source: io::Error },
}

impl StagingError {
    pub fn is_skip(&self) -> bool {
        matches!(self, StagingError::SkipIngestion { .. })
    }

    fn io(path: &Path, source: io::Error) -> Self {
        StagingError::Io { path: path.to_path_buf(), source }
    }
}

/// Size and modification time (ms since the Unix epoch) of a file.
pub fn fingerprint_of(path: &Path) -> io::Result<(u64, i64)> {
    let meta = fs::metadata(path)?;
    let modified = meta.modified()?;
    let millis = match modified.duration_since(UNIX_EPOCH) {
        Ok(d) => d.as_millis() as i64,
        Err(e) => -(e.duration().as_millis() as i64),
    };
    Ok((meta.len(), millis))
}

/// A file handed to a job together with the fingerprint observed at discovery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileToProcess {
    pub original_path: PathBuf,
    pub staging_path: PathBuf,
    pub expected_size: u64,
    pub expected_last_modified: i64,
}

impl FileToProcess {
    pub fn new(original_path: PathBuf, staging_path: PathBuf, expected_size: u64, expected_last_modified: i64) -> Self {
        Self { original_path, staging_path, expected_size, expected_last_modified }
    }

    /// Capture the current fingerprint of `original_path`.
    pub fn observe(original_path: PathBuf, staging_path: PathBuf) -> Result<Self, StagingError> {
        let (size, mtime) = fingerprint_of(&original_path).map_err(|e| StagingError::io(&original_path, e))?;
        Ok(Self::new(original_path, staging_path, size, mtime))
    }

    /// True when the file sits in staging and no longer at its original path.
    pub fn is_staged(&self) -> bool {
        self.staging_path.exists() && !self.original_path.exists()
    }

    pub fn assert_file_has_not_changed_or_moved(&self) -> Result<(), StagingError> {
        let (size, mtime) = match fingerprint_of(&self.original_path) {
            Ok(fp) => fp,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(StagingError::SkipIngestion {
                    path: self.original_path.clone(),
                    reason: "file no longer exists".into(),
                })
            }
            Err(e) => return Err(StagingError::io(&self.original_path, e)),
        };

        if size != self.expected_size || mtime != self.expected_last_modified {
            return Err(StagingError::SkipIngestion {
                path: self.original_path.clone(),
                reason: format!(
                    "fingerprint changed: size {} -> {}, mtime {} -> {}",
                    self.expected_size, size, self.expected_last_modified, mtime
                ),
            });
        }
        Ok(())
    }

    /// Rename original -> staging. No-op when already staged.
    pub fn move_file_to_staging(&self) -> Result<(), StagingError> {
        if self.is_staged() {
            debug!(path = %self.staging_path.display(), "already staged");
            return Ok(());
        }
        self.assert_file_has_not_changed_or_moved()?;

        if let Some(parent) = self.staging_path.parent() {
            fs::create_dir_all(parent).map_err(|e| StagingError::io(parent, e))?;
        }
        fs::rename(&self.original_path, &self.staging_path).map_err(|e| StagingError::io(&self.original_path, e))?;

        info!(
            from = %self.original_path.display(),
            to = %self.staging_path.display(),
            "file staged"
        );
        Ok(())
    }

    /// Rename staging -> original. Best effort: failures are logged only.
    pub fn rollback_file_to_staging(&self) {
        if !self.staging_path.exists() {
            return;
        }
        match fs::rename(&self.staging_path, &self.original_path) {
            Ok(()) => info!(path = %self.original_path.display(), "staged file restored"),
            Err(e) => warn!(
                path = %self.staging_path.display(),
                error = %e,
                "could not restore staged file"
            ),
        }
    }

    /// Remove the staged copy. Best effort.
    pub fn delete_staging_file(&self) {
        match fs::remove_file(&self.staging_path) {
            Ok(()) => debug!(path = %self.staging_path.display(), "staged file deleted"),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => warn!(path = %self.staging_path.display(), error = %e, "could not delete staged file"),
        }
    }
}

/// Stages a group of files (a data file and its checksum manifest) as one
/// unit: either every file is staged or none is.
#[derive(Debug, Clone)]
pub struct StagingTransaction {
    files: Vec<FileToProcess>,
}

impl StagingTransaction {
    pub fn new(files: Vec<FileToProcess>) -> Self {
        Self { files }
    }

    pub fn files(&self) -> &[FileToProcess] {
        &self.files
    }

    /// Stage every file in order. On failure the files already moved are
    /// restored before the error is returned.
    pub fn stage(&self) -> Result<(), StagingError> {
        for (index, file) in self.files.iter().enumerate() {
            if let Err(e) = file.move_file_to_staging() {
                for earlier in self.files[..index].iter().rev() {
                    earlier.rollback_file_to_staging();
                }
                return Err(e);
            }
        }
        Ok(())
    }

    /// Restore every staged file to its original location.
    pub fn rollback(&self) {
        for file in self.files.iter().rev() {
            file.rollback_file_to_staging();
        }
    }

    /// Discard every staged file after successful processing.
    pub fn delete(&self) {
        for file in &self.files {
            file.delete_staging_file();
        }
    }
}
