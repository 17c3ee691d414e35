// ## 📂 File: `src/executor/persist.rs`
// ## Claim table + run history

//! Design notes:
//! - A claim binds one job id to one instance. Both are unique: a job id is
//!   claimed at most once, an instance holds at most one claim.
//! - `FileStore` makes both uniqueness checks atomic with `hard_link`: the
//!   claim is fully written to a temp file, then linked to its final name.
//!   Linking fails with `AlreadyExists` if the name is taken, so a reader never
//!   sees a half-written claim and two writers never both win.
//! - History is JSON lines, flushed and fsynced per entry.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, ErrorKind, Write};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::executor::types::{JobExecutionRecord, JobParameters, JobRun, PersistenceError};

/// A persisted claim with the parameters needed to resume it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredClaim {
    pub record: JobExecutionRecord,
    pub parameters: JobParameters,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimOutcome {
    Inserted,
    /// Another claim for this job id exists.
    AlreadyAssigned,
    /// This instance already holds a claim (for the given job id).
    InstanceBusy(String),
}

pub trait ExecutorPersistence: Send + Sync {
    fn insert_claim(&self, claim: &StoredClaim) -> Result<ClaimOutcome, PersistenceError>;
    fn find_claim(&self, instance_id: &str) -> Result<Option<StoredClaim>, PersistenceError>;
    fn append_run(&self, run: &JobRun) -> Result<(), PersistenceError>;
    fn delete_claim(&self, job_id: &str, instance_id: &str) -> Result<(), PersistenceError>;
    fn runs(&self) -> Result<Vec<JobRun>, PersistenceError>;
}

// ---------------------------------------------------------------------------
// File-backed store
// ---------------------------------------------------------------------------

const CLAIMS_DIR: &str = "claims";
const INSTANCES_DIR: &str = "instances";
const TMP_DIR: &str = "tmp";
const RUNS_FILE: &str = "runs.log";

#[derive(Debug)]
pub struct FileStore {
    root: PathBuf,
    /// Serializes claim inserts of this process; the instance lock covers
    /// other processes.
    claiming: Mutex<()>,
    history: Mutex<()>,
}

impl FileStore {
    /// Open (creating if needed) a store rooted at `root`.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, PersistenceError> {
        let root = root.into();
        for dir in [CLAIMS_DIR, INSTANCES_DIR, TMP_DIR] {
            let path = root.join(dir);
            fs::create_dir_all(&path).map_err(|e| PersistenceError::io(&path, e))?;
        }
        Ok(Self { root, claiming: Mutex::new(()), history: Mutex::new(()) })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn claim_path(&self, job_id: &str) -> PathBuf {
        let digest = Sha256::digest(job_id.as_bytes());
        self.root.join(CLAIMS_DIR).join(format!("{}.json", hex::encode(digest)))
    }

    fn lock_path(&self, instance_id: &str) -> PathBuf {
        let digest = Sha256::digest(instance_id.as_bytes());
        self.root.join(INSTANCES_DIR).join(format!("{}.lock", hex::encode(digest)))
    }

    fn write_temp(&self, claim: &StoredClaim) -> Result<PathBuf, PersistenceError> {
        let path = self.root.join(TMP_DIR).join(format!("{}.json", Uuid::new_v4()));
        let bytes = serde_json::to_vec_pretty(claim)?;
        let mut file = File::create(&path).map_err(|e| PersistenceError::io(&path, e))?;
        file.write_all(&bytes).map_err(|e| PersistenceError::io(&path, e))?;
        file.sync_all().map_err(|e| PersistenceError::io(&path, e))?;
        Ok(path)
    }

    fn read_claim(path: &Path) -> Result<Option<StoredClaim>, PersistenceError> {
        match fs::read(path) {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map(Some)
                .map_err(|source| PersistenceError::Json { path: path.to_path_buf(), source }),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(PersistenceError::io(path, e)),
        }
    }

    /// Link `tmp` to the instance lock. A stale lock (no matching claim,
    /// left by a crash between the two links) is replaced once.
    fn take_instance_lock(&self, tmp: &Path, instance_id: &str) -> Result<Option<ClaimOutcome>, PersistenceError> {
        let lock = self.lock_path(instance_id);
        for _ in 0..2 {
            match fs::hard_link(tmp, &lock) {
                Ok(()) => return Ok(None),
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    if let Some(held) = self.find_claim(instance_id)? {
                        return Ok(Some(ClaimOutcome::InstanceBusy(held.record.job_id)));
                    }
                    warn!(instance_id, "removing stale instance lock");
                    remove_if_exists(&lock)?;
                }
                Err(e) => return Err(PersistenceError::io(&lock, e)),
            }
        }
        Err(PersistenceError::io(
            &lock,
            std::io::Error::new(ErrorKind::AlreadyExists, "instance lock keeps reappearing"),
        ))
    }
}

fn remove_if_exists(path: &Path) -> Result<(), PersistenceError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(PersistenceError::io(path, e)),
    }
}

impl ExecutorPersistence for FileStore {
    fn insert_claim(&self, claim: &StoredClaim) -> Result<ClaimOutcome, PersistenceError> {
        let _guard = self.claiming.lock();
        let tmp = self.write_temp(claim)?;
        let outcome = self.link_claim(&tmp, claim);
        remove_if_exists(&tmp)?;
        outcome
    }

    fn find_claim(&self, instance_id: &str) -> Result<Option<StoredClaim>, PersistenceError> {
        let dir = self.root.join(CLAIMS_DIR);
        let entries = fs::read_dir(&dir).map_err(|e| PersistenceError::io(&dir, e))?;
        for entry in entries {
            let entry = entry.map_err(|e| PersistenceError::io(&dir, e))?;
            if let Some(claim) = Self::read_claim(&entry.path())? {
                if claim.record.instance_id == instance_id {
                    return Ok(Some(claim));
                }
            }
        }
        Ok(None)
    }

    fn append_run(&self, run: &JobRun) -> Result<(), PersistenceError> {
        let path = self.root.join(RUNS_FILE);
        let mut line = serde_json::to_vec(run)?;
        line.push(b'\n');

        let _guard = self.history.lock();
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| PersistenceError::io(&path, e))?;
        file.write_all(&line).map_err(|e| PersistenceError::io(&path, e))?;
        file.flush().map_err(|e| PersistenceError::io(&path, e))?;
        file.sync_data().map_err(|e| PersistenceError::io(&path, e))?;
        Ok(())
    }

    fn delete_claim(&self, job_id: &str, instance_id: &str) -> Result<(), PersistenceError> {
        let _guard = self.claiming.lock();
        let path = self.claim_path(job_id);
        match Self::read_claim(&path)? {
            Some(claim) if claim.record.instance_id == instance_id => {
                remove_if_exists(&path)?;
                remove_if_exists(&self.lock_path(instance_id))?;
                debug!(job_id, instance_id, "claim deleted");
            }
            Some(claim) => {
                warn!(job_id, instance_id, owner = %claim.record.instance_id, "not deleting a claim held by another instance");
            }
            // Claim already gone: drop a lock it may have left behind.
            None => {
                if self.find_claim(instance_id)?.is_none() {
                    remove_if_exists(&self.lock_path(instance_id))?;
                }
            }
        }
        Ok(())
    }

    fn runs(&self) -> Result<Vec<JobRun>, PersistenceError> {
        let path = self.root.join(RUNS_FILE);
        let file = match File::open(&path) {
            Ok(f) => f,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(PersistenceError::io(&path, e)),
        };
        let mut runs = Vec::new();
        for line in BufReader::new(file).lines() {
            let line = line.map_err(|e| PersistenceError::io(&path, e))?;
            if line.trim().is_empty() {
                continue;
            }
            let run = serde_json::from_str(&line)
                .map_err(|source| PersistenceError::Json { path: path.clone(), source })?;
            runs.push(run);
        }
        Ok(runs)
    }
}

impl FileStore {
    fn link_claim(&self, tmp: &Path, claim: &StoredClaim) -> Result<ClaimOutcome, PersistenceError> {
        let record = &claim.record;
        if let Some(busy) = self.take_instance_lock(tmp, &record.instance_id)? {
            return Ok(busy);
        }

        let path = self.claim_path(&record.job_id);
        match fs::hard_link(tmp, &path) {
            Ok(()) => {
                debug!(job_id = %record.job_id, instance_id = %record.instance_id, "claim inserted");
                Ok(ClaimOutcome::Inserted)
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                remove_if_exists(&self.lock_path(&record.instance_id))?;
                Ok(ClaimOutcome::AlreadyAssigned)
            }
            Err(e) => {
                remove_if_exists(&self.lock_path(&record.instance_id))?;
                Err(PersistenceError::io(&path, e))
            }
        }
    }
}

// ---------------------------------------------------------------------------
// In-memory store
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct MemoryState {
    claims: HashMap<String, StoredClaim>,
    runs: Vec<JobRun>,
}

/// Non-durable store for tests and embedded use.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ExecutorPersistence for MemoryStore {
    fn insert_claim(&self, claim: &StoredClaim) -> Result<ClaimOutcome, PersistenceError> {
        let mut state = self.state.lock();
        if let Some(held) = state.claims.values().find(|c| c.record.instance_id == claim.record.instance_id) {
            return Ok(ClaimOutcome::InstanceBusy(held.record.job_id.clone()));
        }
        if state.claims.contains_key(&claim.record.job_id) {
            return Ok(ClaimOutcome::AlreadyAssigned);
        }
        state.claims.insert(claim.record.job_id.clone(), claim.clone());
        Ok(ClaimOutcome::Inserted)
    }

    fn find_claim(&self, instance_id: &str) -> Result<Option<StoredClaim>, PersistenceError> {
        let state = self.state.lock();
        Ok(state.claims.values().find(|c| c.record.instance_id == instance_id).cloned())
    }

    fn append_run(&self, run: &JobRun) -> Result<(), PersistenceError> {
        self.state.lock().runs.push(run.clone());
        Ok(())
    }

    fn delete_claim(&self, job_id: &str, instance_id: &str) -> Result<(), PersistenceError> {
        let mut state = self.state.lock();
        if state.claims.get(job_id).is_some_and(|c| c.record.instance_id == instance_id) {
            state.claims.remove(job_id);
        }
        Ok(())
    }

    fn runs(&self) -> Result<Vec<JobRun>, PersistenceError> {
        Ok(self.state.lock().runs.clone())
    }
}
