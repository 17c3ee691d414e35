// ## 📂 File: `src/executor/engine.rs`
// ## Assign -> execute (with retry) -> save result

//! Design notes:
//! - `assign_execution` is the only place a claim is created. A job id that
//!   is already claimed yields `Ok(None)`, which callers treat as a duplicate.
//! - `execute` loops on `JobError::Retry` with a delayer created per call, so
//!   one job's backoff never leaks into the next job.
//! - Only the shutdown signal interrupts the loop, and only while waiting.
//! - ABORTED keeps the claim: the next start of this instance resumes it.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use chrono::Utc;
use tracing::{error, info, warn};

use crate::executor::delay::{DelayConfiguration, Shutdown};
use crate::executor::persist::{ClaimOutcome, ExecutorPersistence, StoredClaim};
use crate::executor::registry::{JobRegistry, RegisteredJob};
use crate::executor::types::{
    ExecutorError, JobError, JobExecution, JobExecutionRecord, JobKind, JobParameters, JobResult, JobRun,
};

pub struct JobExecutor {
    instance_id: String,
    store: Arc<dyn ExecutorPersistence>,
    delay: DelayConfiguration,
    registry: JobRegistry,
    shutdown: Shutdown,
}

impl std::fmt::Debug for JobExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobExecutor")
            .field("instance_id", &self.instance_id)
            .field("delay", &self.delay)
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

impl JobExecutor {
    pub fn new(instance_id: impl Into<String>, store: Arc<dyn ExecutorPersistence>, delay: DelayConfiguration) -> Self {
        Self {
            instance_id: instance_id.into(),
            store,
            delay,
            registry: JobRegistry::default(),
            shutdown: Shutdown::new(),
        }
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    pub fn register_job(&mut self, job: RegisteredJob) {
        info!(kind = %job.kind(), "job registered");
        self.registry.register(job);
    }

    /// Handle that stops the retry loop of a running `execute`.
    pub fn shutdown_handle(&self) -> Shutdown {
        self.shutdown.clone()
    }

    pub fn store(&self) -> &Arc<dyn ExecutorPersistence> {
        &self.store
    }

    /// Claim `job_id` for this instance.
    pub fn assign_execution(
        &self,
        job_id: &str,
        parameters: JobParameters,
    ) -> Result<Option<JobExecution>, ExecutorError> {
        let kind = parameters.kind();
        if !self.registry.contains(kind) {
            return Err(ExecutorError::JobNotRegistered(kind));
        }

        let claim = StoredClaim {
            record: JobExecutionRecord {
                job_id: job_id.to_string(),
                job_name: kind.name().to_string(),
                instance_id: self.instance_id.clone(),
                start_time: Utc::now(),
            },
            parameters,
        };

        match self.store.insert_claim(&claim)? {
            ClaimOutcome::Inserted => {
                info!(job_id, instance_id = %self.instance_id, "execution assigned");
                Ok(Some(JobExecution {
                    job_id: claim.record.job_id,
                    job_name: claim.record.job_name,
                    parameters: claim.parameters,
                }))
            }
            ClaimOutcome::AlreadyAssigned => {
                info!(job_id, "job already assigned, dropping");
                Ok(None)
            }
            ClaimOutcome::InstanceBusy(held) if held == job_id => {
                info!(job_id, "job already assigned to this instance, dropping");
                Ok(None)
            }
            ClaimOutcome::InstanceBusy(held) => Err(ExecutorError::InstanceBusy {
                instance_id: self.instance_id.clone(),
                job_id: held,
            }),
        }
    }

    /// The execution this instance claimed and never finished, if any.
    pub fn get_assigned_execution(&self, kind: JobKind) -> Result<Option<JobExecution>, ExecutorError> {
        let Some(claim) = self.store.find_claim(&self.instance_id)? else {
            return Ok(None);
        };
        if claim.parameters.kind() != kind {
            return Ok(None);
        }
        info!(job_id = %claim.record.job_id, "found unfinished execution");
        Ok(Some(JobExecution {
            job_id: claim.record.job_id,
            job_name: claim.record.job_name,
            parameters: claim.parameters,
        }))
    }

    /// Run `execution` to a terminal result and persist it.
    pub fn execute(&self, execution: JobExecution) -> Result<JobResult, ExecutorError> {
        let start = Utc::now();
        let mut delayer = self.delay.delayer();
        let mut attempt = 0u32;
        info!(job_id = %execution.job_id, job = %execution.job_name, "execution started");

        let result = loop {
            attempt += 1;
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.registry.dispatch(&execution)));

            match outcome {
                Ok(Some(Ok(output))) => break JobResult::Success { output, start, end: Utc::now() },
                Ok(Some(Err(JobError::Retry(reason)))) => {
                    warn!(job_id = %execution.job_id, attempt, reason = %reason, "job asked for retry");
                    if !delayer.delay(&self.shutdown) {
                        break JobResult::Aborted {
                            message: "shutdown while waiting to retry".into(),
                            cause: Some(reason),
                            start,
                            end: Utc::now(),
                        };
                    }
                }
                Ok(Some(Err(JobError::Failure { message, cause }))) => {
                    break JobResult::Failure { message, cause, start, end: Utc::now() }
                }
                Ok(Some(Err(JobError::Abort { message, cause }))) => {
                    break JobResult::Aborted { message, cause, start, end: Utc::now() }
                }
                Ok(None) => {
                    return Err(ExecutorError::JobNotRegistered(execution.parameters.kind()));
                }
                Err(payload) => {
                    let cause = panic_message(payload.as_ref());
                    error!(job_id = %execution.job_id, cause = %cause, "job panicked");
                    break JobResult::Aborted {
                        message: "job panicked".into(),
                        cause: Some(cause),
                        start,
                        end: Utc::now(),
                    };
                }
            }
        };

        self.save_result(&execution, &result)?;
        Ok(result)
    }

    /// Append the run to history; release the claim unless ABORTED.
    pub fn save_result(&self, execution: &JobExecution, result: &JobResult) -> Result<(), ExecutorError> {
        let run = JobRun {
            job_id: execution.job_id.clone(),
            instance_id: self.instance_id.clone(),
            message_and_exception: result.message_and_exception(),
            start_time: result.start(),
            end_time: result.end(),
            status: result.status(),
        };
        self.store.append_run(&run)?;

        if result.is_aborted() {
            warn!(job_id = %execution.job_id, "execution aborted, claim kept for resume");
        } else {
            self.store.delete_claim(&execution.job_id, &self.instance_id)?;
        }
        info!(job_id = %execution.job_id, status = %run.status, "execution finished");
        Ok(())
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
