// Job executor:

// * one claim per job id, one claim per instance
// * retry loop, shutdown, panic and abort semantics
// * an aborted claim survives a restart and is resumed

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Barrier};
    use std::thread;

    use ingest_core::executor::{
        DelayConfiguration, DelayUnit, ExecutorError, ExecutorPersistence, FileStore, Job, JobError, JobExecutor,
        JobKind, JobOutput, JobParameters, JobResult, JobStatus, MemoryStore, ReEncryptParameters, RegisteredJob,
    };
    use ingest_core::staging::FileToProcess;

    fn params(tag: &str) -> JobParameters {
        JobParameters::ReEncrypt(ReEncryptParameters {
            file: FileToProcess::new(PathBuf::from(format!("/in/{tag}")), PathBuf::from(format!("/st/{tag}")), 1, 2),
            md5_file: None,
            result_path: PathBuf::from(format!("/out/{tag}.enc")),
            encrypted_password: "sealed".into(),
            account_id: "acc".into(),
            location_id: "loc".into(),
            index: false,
        })
    }

    type Step = fn() -> Result<JobOutput, JobError>;

    /// Plays back a script of outcomes, then succeeds.
    struct ScriptedJob {
        script: Vec<Step>,
        calls: AtomicUsize,
    }

    impl ScriptedJob {
        fn new(script: Vec<Step>) -> Arc<Self> {
            Arc::new(Self { script, calls: AtomicUsize::new(0) })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl Job<ReEncryptParameters> for ScriptedJob {
        fn run(&self, _job_id: &str, _params: &ReEncryptParameters) -> Result<JobOutput, JobError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            match self.script.get(n) {
                Some(step) => step(),
                None => Ok(JobOutput::Empty),
            }
        }
    }

    fn retry() -> Result<JobOutput, JobError> {
        Err(JobError::Retry("busy".into()))
    }

    fn abort() -> Result<JobOutput, JobError> {
        Err(JobError::Abort { message: "disk gone".into(), cause: None })
    }

    fn fail() -> Result<JobOutput, JobError> {
        Err(JobError::Failure { message: "bad input".into(), cause: Some("wrong key".into()) })
    }

    fn boom() -> Result<JobOutput, JobError> {
        panic!("job exploded")
    }

    fn fast() -> DelayConfiguration {
        DelayConfiguration::linear(1, DelayUnit::Millis)
    }

    fn executor(instance: &str, store: Arc<dyn ExecutorPersistence>, job: Arc<ScriptedJob>) -> JobExecutor {
        let mut e = JobExecutor::new(instance, store, fast());
        e.register_job(RegisteredJob::ReEncrypt(job));
        e
    }

// ## 1️⃣ Assignment

    #[test]
    fn second_assignment_of_a_job_is_a_duplicate() {
        let store: Arc<dyn ExecutorPersistence> = Arc::new(MemoryStore::new());
        let a = executor("a", Arc::clone(&store), ScriptedJob::new(vec![]));
        let b = executor("b", Arc::clone(&store), ScriptedJob::new(vec![]));

        let first = a.assign_execution("job-1", params("1")).unwrap().unwrap();
        assert_eq!(first.job_name, "re-encrypt");
        assert!(b.assign_execution("job-1", params("1")).unwrap().is_none());
        assert!(a.assign_execution("job-1", params("1")).unwrap().is_none());
    }

    #[test]
    fn unregistered_kind_is_rejected() {
        let e = JobExecutor::new("a", Arc::new(MemoryStore::new()), fast());
        let err = e.assign_execution("job-1", params("1")).unwrap_err();
        assert!(matches!(err, ExecutorError::JobNotRegistered(JobKind::ReEncrypt)));
    }

    #[test]
    fn instance_holds_one_claim_at_a_time() {
        let dir = tempfile::tempdir().unwrap();
        let store: Arc<dyn ExecutorPersistence> = Arc::new(FileStore::open(dir.path()).unwrap());
        let e = executor("a", store, ScriptedJob::new(vec![]));

        let held = e.assign_execution("job-1", params("1")).unwrap().unwrap();
        let err = e.assign_execution("job-2", params("2")).unwrap_err();
        assert!(matches!(err, ExecutorError::InstanceBusy { ref job_id, .. } if job_id == "job-1"));

        e.execute(held).unwrap();
        assert!(e.assign_execution("job-2", params("2")).unwrap().is_some());
    }

    #[test]
    fn concurrent_instances_claim_a_job_exactly_once() {
        let dir = tempfile::tempdir().unwrap();
        let store: Arc<dyn ExecutorPersistence> = Arc::new(FileStore::open(dir.path()).unwrap());
        let workers = 8;
        let barrier = Arc::new(Barrier::new(workers));

        let handles: Vec<_> = (0..workers)
            .map(|i| {
                let store = Arc::clone(&store);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    let e = executor(&format!("worker-{i}"), store, ScriptedJob::new(vec![]));
                    barrier.wait();
                    e.assign_execution("shared-job", params("shared")).unwrap().is_some()
                })
            })
            .collect();

        let winners = handles.into_iter().map(|h| h.join().unwrap()).filter(|won| *won).count();
        assert_eq!(winners, 1);
    }

    #[test]
    fn claims_are_only_deleted_by_their_owner() {
        let dir = tempfile::tempdir().unwrap();
        let stores: Vec<Arc<dyn ExecutorPersistence>> =
            vec![Arc::new(FileStore::open(dir.path()).unwrap()), Arc::new(MemoryStore::new())];

        for store in stores {
            let a = executor("a", Arc::clone(&store), ScriptedJob::new(vec![]));
            a.assign_execution("job-1", params("1")).unwrap().unwrap();

            store.delete_claim("job-1", "b").unwrap();
            let held = store.find_claim("a").unwrap().expect("claim survives a foreign delete");
            assert_eq!(held.record.job_id, "job-1");

            store.delete_claim("job-1", "a").unwrap();
            assert!(store.find_claim("a").unwrap().is_none());
            assert!(a.assign_execution("job-2", params("2")).unwrap().is_some());
        }
    }

// ## 2️⃣ Execution

    #[test]
    fn retries_until_success_with_a_fresh_delayer() {
        let store: Arc<dyn ExecutorPersistence> = Arc::new(MemoryStore::new());
        let job = ScriptedJob::new(vec![retry as Step, retry]);
        let e = executor("a", Arc::clone(&store), Arc::clone(&job));

        let exec = e.assign_execution("job-1", params("1")).unwrap().unwrap();
        let result = e.execute(exec).unwrap();
        assert_eq!(result.status(), JobStatus::Success);
        assert_eq!(job.calls(), 3);

        let runs = store.runs().unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].status, JobStatus::Success);
        assert!(store.find_claim("a").unwrap().is_none());
    }

    #[test]
    fn failure_releases_the_claim_and_records_the_cause() {
        let store: Arc<dyn ExecutorPersistence> = Arc::new(MemoryStore::new());
        let e = executor("a", Arc::clone(&store), ScriptedJob::new(vec![fail as Step]));

        let exec = e.assign_execution("job-1", params("1")).unwrap().unwrap();
        let result = e.execute(exec).unwrap();
        assert!(matches!(result, JobResult::Failure { .. }));

        let runs = store.runs().unwrap();
        assert_eq!(runs[0].status, JobStatus::Failure);
        assert_eq!(runs[0].message_and_exception.as_deref(), Some("bad input: wrong key"));
        assert!(store.find_claim("a").unwrap().is_none());
    }

    #[test]
    fn panic_becomes_aborted() {
        let store: Arc<dyn ExecutorPersistence> = Arc::new(MemoryStore::new());
        let e = executor("a", Arc::clone(&store), ScriptedJob::new(vec![boom as Step]));

        let exec = e.assign_execution("job-1", params("1")).unwrap().unwrap();
        let result = e.execute(exec).unwrap();
        assert_eq!(result.status(), JobStatus::Aborted);
        assert!(result.message_and_exception().unwrap().contains("job exploded"));
        assert!(store.find_claim("a").unwrap().is_some());
    }

    #[test]
    fn shutdown_during_retry_wait_aborts() {
        let store: Arc<dyn ExecutorPersistence> = Arc::new(MemoryStore::new());
        let job = ScriptedJob::new(vec![retry as Step, retry, retry]);
        let mut e = JobExecutor::new("a", Arc::clone(&store), DelayConfiguration::linear(60, DelayUnit::Seconds));
        e.register_job(RegisteredJob::ReEncrypt(job.clone()));
        e.shutdown_handle().trigger();

        let exec = e.assign_execution("job-1", params("1")).unwrap().unwrap();
        let result = e.execute(exec).unwrap();
        assert_eq!(result.status(), JobStatus::Aborted);
        assert_eq!(job.calls(), 1);
        assert!(store.find_claim("a").unwrap().is_some());
    }

// ## 3️⃣ Resume

    #[test]
    fn aborted_claim_is_resumed_after_restart() {
        let dir = tempfile::tempdir().unwrap();

        {
            let store: Arc<dyn ExecutorPersistence> = Arc::new(FileStore::open(dir.path()).unwrap());
            let e = executor("worker-1", store, ScriptedJob::new(vec![abort as Step]));
            let exec = e.assign_execution("job-1", params("1")).unwrap().unwrap();
            assert_eq!(e.execute(exec).unwrap().status(), JobStatus::Aborted);
        }

        // "Restart": a new store and executor over the same directory.
        let store: Arc<dyn ExecutorPersistence> = Arc::new(FileStore::open(dir.path()).unwrap());
        let e = executor("worker-1", Arc::clone(&store), ScriptedJob::new(vec![]));

        let resumed = e.get_assigned_execution(JobKind::ReEncrypt).unwrap().unwrap();
        assert_eq!(resumed.job_id, "job-1");
        assert_eq!(resumed.parameters, params("1"));

        assert_eq!(e.execute(resumed).unwrap().status(), JobStatus::Success);
        assert!(e.get_assigned_execution(JobKind::ReEncrypt).unwrap().is_none());

        let statuses: Vec<JobStatus> = store.runs().unwrap().iter().map(|r| r.status).collect();
        assert_eq!(statuses, [JobStatus::Aborted, JobStatus::Success]);
    }

    #[test]
    fn other_instances_do_not_see_foreign_claims() {
        let store: Arc<dyn ExecutorPersistence> = Arc::new(MemoryStore::new());
        let a = executor("a", Arc::clone(&store), ScriptedJob::new(vec![]));
        let b = executor("b", Arc::clone(&store), ScriptedJob::new(vec![]));
        a.assign_execution("job-1", params("1")).unwrap().unwrap();
        assert!(b.get_assigned_execution(JobKind::ReEncrypt).unwrap().is_none());
    }
}
