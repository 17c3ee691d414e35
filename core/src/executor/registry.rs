// ## 📂 File: `src/executor/registry.rs`

use std::sync::Arc;

use crate::executor::types::{JobError, JobExecution, JobKind, JobOutput, JobParameters, ReEncryptParameters};

/// A unit of work the executor can run. `run` may be called again for the
/// same job id after a crash or a `Retry`, so it must be safe to repeat.
pub trait Job<P>: Send + Sync {
    fn run(&self, job_id: &str, parameters: &P) -> Result<JobOutput, JobError>;
}

/// A job implementation bound to its kind.
#[derive(Clone)]
pub enum RegisteredJob {
    ReEncrypt(Arc<dyn Job<ReEncryptParameters>>),
}

impl RegisteredJob {
    pub fn kind(&self) -> JobKind {
        match self {
            RegisteredJob::ReEncrypt(_) => JobKind::ReEncrypt,
        }
    }
}

#[derive(Clone, Default)]
pub struct JobRegistry {
    re_encrypt: Option<Arc<dyn Job<ReEncryptParameters>>>,
}

impl std::fmt::Debug for JobRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobRegistry")
            .field("re_encrypt", &self.re_encrypt.is_some())
            .finish()
    }
}

impl JobRegistry {
    pub fn register(&mut self, job: RegisteredJob) {
        match job {
            RegisteredJob::ReEncrypt(job) => self.re_encrypt = Some(job),
        }
    }

    pub fn contains(&self, kind: JobKind) -> bool {
        match kind {
            JobKind::ReEncrypt => self.re_encrypt.is_some(),
        }
    }

    /// Run `execution` with the matching implementation; `None` when the
    /// kind is not registered.
    pub fn dispatch(&self, execution: &JobExecution) -> Option<Result<JobOutput, JobError>> {
        match &execution.parameters {
            JobParameters::ReEncrypt(params) => {
                let job = self.re_encrypt.as_ref()?;
                Some(job.run(&execution.job_id, params))
            }
        }
    }
}
