// ## src/executor/mod.rs

//! Persistence-backed job executor.
//!
//! Guarantees at most one in-flight attempt per job id, resumes the claim a
//! crashed instance left behind, and retries transient failures under a
//! configurable delay policy.

pub mod types;
pub mod delay;
pub mod persist;
pub mod registry;
pub mod engine;

pub use types::{
    ExecutorError, JobError, JobExecution, JobExecutionRecord, JobKind, JobOutput, JobParameters, JobResult, JobRun,
    JobStatus, PersistenceError, ReEncryptParameters,
};
pub use delay::{BackoffDelayer, DelayConfiguration, DelayKind, DelayUnit, Delayer, LinearDelayer, Shutdown};
pub use persist::{ClaimOutcome, ExecutorPersistence, FileStore, MemoryStore, StoredClaim};
pub use registry::{Job, JobRegistry, RegisteredJob};
pub use engine::JobExecutor;
