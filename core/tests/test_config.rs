#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::path::PathBuf;

    use ingest_core::config::{ConfigError, IngestConfig, ENV_INSTANCE_ID, ENV_KEYRING_PASSPHRASE, ENV_VAULT_SECRET};
    use ingest_core::executor::{DelayKind, DelayUnit};
    use ingest_core::headers::CipherSuite;

    const FULL: &str = r#"
instance_id = "worker-1"
staging_dir = "/data/staging"
result_dir = "/data/results"
store_dir = "/data/store"
outbox_path = "/data/outbox.jsonl"
keyring_path = "/etc/ingest/keyring.json"
keyring_passphrase = "ring-pass"
vault_secret = "vault-pass"

[pipeline]
cipher = "chacha20-poly1305"
chunk_size = 131072

[delay]
kind = "linear"
base_delay = 500
max_delay = 500
unit = "millis"

[indexer]
program = "samtools"
args = ["index", "-"]
extensions = ["bam"]
"#;

    const MINIMAL: &str = r#"
staging_dir = "/s"
store_dir = "/st"
outbox_path = "/o.jsonl"
keyring_path = "/k.json"
"#;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| map.get(key).cloned()
    }

// ## 1️⃣ Parsing

    #[test]
    fn full_file_parses_and_validates() {
        let config = IngestConfig::from_toml_str(FULL).unwrap();
        config.validate().unwrap();

        assert_eq!(config.instance_id, "worker-1");
        assert_eq!(config.result_dir, Some(PathBuf::from("/data/results")));
        assert_eq!(config.pipeline.cipher, CipherSuite::Chacha20Poly1305);
        assert_eq!(config.pipeline.options().encrypt.chunk_size, 128 * 1024);
        assert_eq!(config.delay.kind, DelayKind::Linear);
        assert_eq!(config.delay.unit, DelayUnit::Millis);

        let indexer = config.indexer.unwrap();
        assert_eq!(indexer.args, ["index", "-"]);
        assert_eq!(indexer.suffix, ".bai");
        assert_eq!(indexer.timeout_secs, 300);
    }

    #[test]
    fn minimal_file_takes_defaults() {
        let config = IngestConfig::from_toml_str(MINIMAL).unwrap();
        assert_eq!(config.pipeline.cipher, CipherSuite::Aes256Gcm);
        assert_eq!(config.delay.kind, DelayKind::Backoff);
        assert!(config.indexer.is_none());
        assert!(config.result_dir.is_none());
    }

    #[test]
    fn missing_required_path_fails_to_parse() {
        let err = IngestConfig::from_toml_str("staging_dir = \"/s\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)), "{err}");
    }

// ## 2️⃣ Overrides

    #[test]
    fn environment_supplies_secrets_and_instance() {
        let mut config = IngestConfig::from_toml_str(MINIMAL).unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::Missing("instance_id"))));

        config.apply_overrides(env(&[
            (ENV_INSTANCE_ID, "worker-7"),
            (ENV_KEYRING_PASSPHRASE, "p"),
            (ENV_VAULT_SECRET, "v"),
        ]));
        config.validate().unwrap();
        assert_eq!(config.instance_id, "worker-7");
    }

    #[test]
    fn environment_wins_over_file() {
        let mut config = IngestConfig::from_toml_str(FULL).unwrap();
        config.apply_overrides(env(&[(ENV_VAULT_SECRET, "from-env")]));
        assert_eq!(config.vault_secret, "from-env");
        assert_eq!(config.keyring_passphrase, "ring-pass");
    }

    #[test]
    fn load_reads_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ingest.toml");
        std::fs::write(&path, FULL).unwrap();
        let config = IngestConfig::load(&path).unwrap();
        assert_eq!(config.store_dir, PathBuf::from("/data/store"));

        let err = IngestConfig::load(&dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }), "{err}");
    }

// ## 3️⃣ Validation

    fn valid() -> IngestConfig {
        IngestConfig::from_toml_str(FULL).unwrap()
    }

    #[test]
    fn missing_secret_is_reported() {
        let mut config = valid();
        config.vault_secret.clear();
        assert!(matches!(config.validate(), Err(ConfigError::Missing("vault_secret"))));
    }

    #[test]
    fn unsupported_chunk_size_is_rejected() {
        let mut config = valid();
        config.pipeline.chunk_size = 1000;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { field: "pipeline.chunk_size", .. })
        ));
    }

    #[test]
    fn zero_buffer_is_rejected() {
        let mut config = valid();
        config.pipeline.buffer_size = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { field: "pipeline.buffer_size", .. })
        ));
    }

    #[test]
    fn delay_bounds_are_checked() {
        let mut config = valid();
        config.delay.max_delay = 10;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid { field: "delay.max_delay", .. })));

        config.delay.base_delay = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid { field: "delay.base_delay", .. })));
    }

    #[test]
    fn indexer_needs_a_program() {
        let mut config = valid();
        if let Some(indexer) = config.indexer.as_mut() {
            indexer.program = "  ".into();
        }
        assert!(matches!(config.validate(), Err(ConfigError::Missing("indexer.program"))));
    }
}
