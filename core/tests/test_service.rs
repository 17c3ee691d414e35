// Worker surface, end to end on a temp directory:

// * event -> staging -> claim -> re-encrypt -> completion event
// * duplicates, changed inputs, user errors and resumed aborts

#[cfg(test)]
mod tests {
    use std::fs::{self, File};
    use std::io::{Read, Write};
    use std::path::{Path, PathBuf};
    use std::sync::Arc;

    use ingest_core::config::IngestConfig;
    use ingest_core::crypto::Checksum;
    use ingest_core::events::{CompletionEvent, InboundEvent};
    use ingest_core::executor::{
        DelayConfiguration, DelayUnit, ExecutorPersistence, JobExecutor, JobParameters, JobStatus, MemoryStore,
        ReEncryptParameters, RegisteredJob,
    };
    use ingest_core::jobs::{read_md5_manifest, ReEncryptJob};
    use ingest_core::keyring::{legacy_encrypt, KeyRing, KeyRingFile};
    use ingest_core::pipeline::{PipelineError, PipelineOptions, ReEncryptionPipeline};
    use ingest_core::service::{job_id_for, result_file_name, EventOutcome, IngestionService, OutboxPublisher};
    use ingest_core::staging::{fingerprint_of, FileToProcess};
    use ingest_core::stream::{decrypt, EncryptOptions};
    use ingest_core::vault::KeyVault;
    use tempfile::TempDir;

    const PASS: &str = "ring";

    struct World {
        dir: TempDir,
        ring: Arc<KeyRing>,
        vault: Arc<KeyVault>,
        store: Arc<dyn ExecutorPersistence>,
        service: IngestionService,
    }

    impl World {
        fn new(result_dir: Option<&str>) -> Self {
            let dir = tempfile::tempdir().unwrap();
            for sub in ["inbox", "staging"] {
                fs::create_dir_all(dir.path().join(sub)).unwrap();
            }
            let ring = Arc::new(KeyRing::from_file(&KeyRingFile::generate(PASS).unwrap(), PASS).unwrap());
            let vault = Arc::new(KeyVault::new("vault secret").unwrap());
            let store: Arc<dyn ExecutorPersistence> = Arc::new(MemoryStore::new());
            let pipeline = Arc::new(ReEncryptionPipeline::new(Arc::clone(&ring), PipelineOptions::default()));

            let executor =
                JobExecutor::new("worker-1", Arc::clone(&store), DelayConfiguration::linear(1, DelayUnit::Millis));
            let service = IngestionService::new(
                executor,
                pipeline,
                Arc::clone(&vault),
                Arc::new(OutboxPublisher::new(dir.path().join("outbox.jsonl"))),
                dir.path().join("staging"),
                result_dir.map(|d| dir.path().join(d)),
            );
            Self { dir, ring, vault, store, service }
        }

        fn inbox(&self, name: &str) -> PathBuf {
            self.dir.path().join("inbox").join(name)
        }

        /// Upload `plain` encrypted for `ring` (ours by default).
        fn upload(&self, name: &str, plain: &[u8], ring: Option<&KeyRing>) -> PathBuf {
            let path = self.inbox(name);
            let recipient = ring.unwrap_or(self.ring.as_ref()).public_keys()[0];
            let mut w = legacy_encrypt(File::create(&path).unwrap(), &recipient, EncryptOptions::default()).unwrap();
            w.write_all(plain).unwrap();
            w.finish().unwrap();
            path
        }

        fn event(&self, path: &Path, md5: Option<PathBuf>) -> InboundEvent {
            let (size, last_modified) = fingerprint_of(path).unwrap();
            InboundEvent {
                account_id: "acc-1".into(),
                location_id: "loc-1".into(),
                original_file_path: path.to_path_buf(),
                md5_file_path: md5,
                size,
                last_modified,
            }
        }

        fn published(&self) -> Vec<CompletionEvent> {
            match fs::read_to_string(self.dir.path().join("outbox.jsonl")) {
                Ok(text) => text.lines().map(|l| serde_json::from_str(l).unwrap()).collect(),
                Err(_) => Vec::new(),
            }
        }

        fn staging_is_empty(&self) -> bool {
            fs::read_dir(self.dir.path().join("staging")).unwrap().next().is_none()
        }
    }

    fn plain() -> Vec<u8> {
        (0..120_000u32).map(|i| (i % 97) as u8).collect()
    }

// ## 1️⃣ Success

    #[test]
    fn upload_is_re_encrypted_and_reported() {
        let world = World::new(None);
        let data = plain();
        let origin = world.upload("x.bam.gpg", &data, None);
        let md5 = world.inbox("x.bam.gpg.md5");
        let origin_md5 = Checksum::of(&fs::read(&origin).unwrap()).md5;
        fs::write(&md5, format!("{origin_md5}  x.bam.gpg\n")).unwrap();

        let outcome = world.service.handle_event(&world.event(&origin, Some(md5.clone()))).unwrap();
        assert_eq!(outcome, EventOutcome::Completed(JobStatus::Success));

        let result = world.inbox("x.bam.enc");
        assert!(!origin.exists());
        assert!(!md5.exists());
        assert!(world.staging_is_empty());

        let events = world.published();
        assert_eq!(events.len(), 1);
        let event = &events[0];
        assert_eq!(event.status, JobStatus::Success);
        assert_eq!(event.plain_md5.as_deref(), Some(Checksum::of(&data).md5.as_str()));
        assert_eq!(event.plain_size, Some(data.len() as u64));
        assert_eq!(event.encrypted_md5.as_deref(), Some(Checksum::of(&fs::read(&result).unwrap()).md5.as_str()));

        // The published reference opens to the key that encrypted the result.
        let key = world.vault.open(event.encryption_key.as_deref().unwrap()).unwrap();
        let mut round = Vec::new();
        decrypt(File::open(&result).unwrap(), key.as_bytes()).read_to_end(&mut round).unwrap();
        assert_eq!(round, data);

        assert!(world.store.find_claim("worker-1").unwrap().is_none());
    }

    #[test]
    fn result_dir_is_honored() {
        let world = World::new(Some("results"));
        fs::create_dir_all(world.dir.path().join("results")).unwrap();
        let origin = world.upload("y.cram.pgp", b"reads", None);

        let outcome = world.service.handle_event(&world.event(&origin, None)).unwrap();
        assert_eq!(outcome, EventOutcome::Completed(JobStatus::Success));
        assert!(world.dir.path().join("results/y.cram.enc").exists());
    }

// ## 2️⃣ Dropped events

    #[test]
    fn changed_input_is_skipped_and_left_alone() {
        let world = World::new(None);
        let origin = world.upload("x.gpg", b"abc", None);
        let mut event = world.event(&origin, None);
        event.last_modified -= 10_000;

        let outcome = world.service.handle_event(&event).unwrap();
        assert!(matches!(outcome, EventOutcome::Skipped { .. }), "{outcome:?}");
        assert!(origin.exists());
        assert!(world.published().is_empty());
    }

    #[test]
    fn event_for_a_claimed_job_is_a_duplicate() {
        let world = World::new(None);
        let origin = world.upload("x.gpg", b"abc", None);
        let event = world.event(&origin, None);

        // Another worker already holds this job id.
        let pipeline = Arc::new(ReEncryptionPipeline::new(Arc::clone(&world.ring), PipelineOptions::default()));
        let mut other = JobExecutor::new("worker-2", Arc::clone(&world.store), DelayConfiguration::default());
        other.register_job(RegisteredJob::ReEncrypt(Arc::new(ReEncryptJob::new(pipeline, Arc::clone(&world.vault)))));
        let params = JobParameters::ReEncrypt(ReEncryptParameters {
            file: FileToProcess::new(origin.clone(), world.dir.path().join("elsewhere"), event.size, event.last_modified),
            md5_file: None,
            result_path: world.inbox("x.enc"),
            encrypted_password: world.vault.generate().unwrap().1,
            account_id: event.account_id.clone(),
            location_id: event.location_id.clone(),
            index: false,
        });
        other.assign_execution(&job_id_for(&event), params).unwrap().unwrap();

        let outcome = world.service.handle_event(&event).unwrap();
        assert_eq!(outcome, EventOutcome::Duplicate);
        assert!(origin.exists(), "duplicate must hand the file back");
        assert!(world.staging_is_empty());
    }

// ## 3️⃣ Failures

    #[test]
    fn foreign_upload_fails_and_is_restored() {
        let world = World::new(None);
        let foreign = KeyRing::from_file(&KeyRingFile::generate(PASS).unwrap(), PASS).unwrap();
        let origin = world.upload("x.gpg", b"secret reads", Some(&foreign));

        let outcome = world.service.handle_event(&world.event(&origin, None)).unwrap();
        assert_eq!(outcome, EventOutcome::Completed(JobStatus::Failure));
        assert!(origin.exists());
        assert!(!world.inbox("x.enc").exists());
        assert!(world.staging_is_empty());

        let events = world.published();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].status, JobStatus::Failure);
        assert!(events[0].plain_md5.is_none());
        assert!(events[0].encryption_key.is_none());
        assert!(events[0].message.is_some());
    }

    #[test]
    fn disagreeing_manifest_is_discarded() {
        let world = World::new(None);
        let origin = world.upload("x.gpg", b"reads", None);
        let md5 = world.inbox("x.gpg.md5");
        fs::write(&md5, "ffffffffffffffffffffffffffffffff  x.gpg\n").unwrap();

        let outcome = world.service.handle_event(&world.event(&origin, Some(md5.clone()))).unwrap();
        assert_eq!(outcome, EventOutcome::Completed(JobStatus::Failure));
        assert!(origin.exists());
        assert!(!md5.exists());
        assert!(world.staging_is_empty());
        assert!(!world.inbox("x.enc").exists());
    }

    #[test]
    fn system_error_aborts_and_resume_finishes() {
        // Result directory does not exist yet: creating the output fails.
        let world = World::new(Some("results"));
        let origin = world.upload("x.gpg", b"reads", None);

        let outcome = world.service.handle_event(&world.event(&origin, None)).unwrap();
        assert_eq!(outcome, EventOutcome::Completed(JobStatus::Aborted));
        assert!(!origin.exists(), "input stays staged");
        assert!(!world.staging_is_empty());
        assert!(world.published().is_empty());

        fs::create_dir_all(world.dir.path().join("results")).unwrap();
        let resumed = world.service.resume().unwrap().unwrap();
        assert_eq!(resumed.status(), JobStatus::Success);
        assert!(world.dir.path().join("results/x.enc").exists());
        assert!(world.staging_is_empty());
        assert_eq!(world.published().len(), 1);

        assert!(world.service.resume().unwrap().is_none());
    }

// ## 4️⃣ Helpers

    #[test]
    fn job_id_is_stable_and_identity_bound() {
        let base = InboundEvent {
            account_id: "a".into(),
            location_id: "l".into(),
            original_file_path: PathBuf::from("/in/x.gpg"),
            md5_file_path: None,
            size: 10,
            last_modified: 1,
        };
        assert_eq!(job_id_for(&base), job_id_for(&base.clone()));
        assert_eq!(job_id_for(&base).len(), 64);

        let mut moved = base.clone();
        moved.last_modified = 2;
        assert_ne!(job_id_for(&base), job_id_for(&moved));

        let mut other_account = base.clone();
        other_account.account_id = "b".into();
        assert_ne!(job_id_for(&base), job_id_for(&other_account));
    }

    #[test]
    fn result_names_replace_archive_extensions() {
        assert_eq!(result_file_name(Path::new("/in/x.bam.gpg")), "x.bam.enc");
        assert_eq!(result_file_name(Path::new("x.vcf.ASC")), "x.vcf.enc");
        assert_eq!(result_file_name(Path::new("x.bam")), "x.bam.enc");
        assert_eq!(result_file_name(Path::new(".gpg")), ".gpg.enc");
    }

    #[test]
    fn manifest_parsing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("m.md5");

        fs::write(&path, "D41D8CD98F00B204E9800998ECF8427E  empty.bin\n").unwrap();
        assert_eq!(read_md5_manifest(&path).unwrap(), "d41d8cd98f00b204e9800998ecf8427e");

        fs::write(&path, "d41d8cd98f00b204e9800998ecf8427e").unwrap();
        assert_eq!(read_md5_manifest(&path).unwrap(), "d41d8cd98f00b204e9800998ecf8427e");

        fs::write(&path, "not-a-digest\n").unwrap();
        assert!(matches!(read_md5_manifest(&path), Err(PipelineError::InvalidManifest { .. })));

        fs::write(&path, "").unwrap();
        assert!(matches!(read_md5_manifest(&path), Err(PipelineError::InvalidManifest { .. })));
    }

    #[test]
    fn manifest_with_multibyte_text_is_rejected_cleanly() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("m.md5");

        // The 32nd byte lands inside 'é'.
        fs::write(&path, format!("{}érest  x.gpg\n", "a".repeat(31))).unwrap();
        assert!(matches!(read_md5_manifest(&path), Err(PipelineError::InvalidManifest { .. })));

        fs::write(&path, [0xff, 0xfe, 0x00, 0x41, b'\n']).unwrap();
        let err = read_md5_manifest(&path).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidManifest { .. }), "{err}");
        assert!(err.is_user_error());

        // Only the digest has to be text.
        let mut bytes = b"d41d8cd98f00b204e9800998ecf8427e  ".to_vec();
        bytes.extend_from_slice(&[0xc3, 0x28, b'\n']);
        fs::write(&path, bytes).unwrap();
        assert_eq!(read_md5_manifest(&path).unwrap(), "d41d8cd98f00b204e9800998ecf8427e");
    }

    #[test]
    fn garbled_manifest_fails_the_job_and_frees_the_instance() {
        let world = World::new(None);
        let origin = world.upload("x.gpg", b"reads", None);
        let md5 = world.inbox("x.gpg.md5");
        fs::write(&md5, [0xff; 40]).unwrap();

        let outcome = world.service.handle_event(&world.event(&origin, Some(md5.clone()))).unwrap();
        assert_eq!(outcome, EventOutcome::Completed(JobStatus::Failure));
        assert!(origin.exists());
        assert!(!md5.exists());
        assert!(world.staging_is_empty());
        assert!(world.store.find_claim("worker-1").unwrap().is_none());
        assert!(world.service.resume().unwrap().is_none());
    }

// ## 5️⃣ Configured worker

    #[test]
    fn wrong_keyring_passphrase_fails_uploads_not_startup() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("inbox")).unwrap();
        let ring_file = KeyRingFile::generate(PASS).unwrap();
        ring_file.save(&root.join("keyring.json")).unwrap();
        let ring = KeyRing::from_file(&ring_file, PASS).unwrap();

        let text = format!(
            "instance_id = \"worker-1\"\n\
             staging_dir = {:?}\n\
             store_dir = {:?}\n\
             outbox_path = {:?}\n\
             keyring_path = {:?}\n\
             keyring_passphrase = \"wrong\"\n\
             vault_secret = \"vault\"\n",
            root.join("staging").display().to_string(),
            root.join("store").display().to_string(),
            root.join("outbox.jsonl").display().to_string(),
            root.join("keyring.json").display().to_string(),
        );
        let config = IngestConfig::from_toml_str(&text).unwrap();
        let service = IngestionService::from_config(&config).unwrap();

        let origin = root.join("inbox/f.gpg");
        let recipient = ring.public_keys()[0];
        let mut w = legacy_encrypt(File::create(&origin).unwrap(), &recipient, EncryptOptions::default()).unwrap();
        w.write_all(b"reads").unwrap();
        w.finish().unwrap();

        let (size, last_modified) = fingerprint_of(&origin).unwrap();
        let event = InboundEvent {
            account_id: "acc-1".into(),
            location_id: "loc-1".into(),
            original_file_path: origin.clone(),
            md5_file_path: None,
            size,
            last_modified,
        };
        let outcome = service.handle_event(&event).unwrap();
        assert_eq!(outcome, EventOutcome::Completed(JobStatus::Failure));
        assert!(origin.exists());
        assert!(!root.join("inbox/f.enc").exists());
    }
}
