// ## 📂 File: `src/config.rs`

//! Worker configuration.
//!
//! Loaded from a TOML file, then overridden from the environment:
//! - `INGEST_INSTANCE_ID`
//! - `INGEST_KEYRING_PASSPHRASE`
//! - `INGEST_VAULT_SECRET`
//!
//! Secrets may live only in the environment; `validate` runs after the
//! overrides so a file without them is still a valid starting point.
//!
//! ```toml
//! instance_id = "worker-1"
//! staging_dir = "/data/staging"
//! store_dir = "/data/store"
//! outbox_path = "/data/outbox.jsonl"
//! keyring_path = "/etc/ingest/keyring.json"
//!
//! [pipeline]
//! cipher = "chacha20-poly1305"
//! chunk_size = 65536
//!
//! [delay]
//! kind = "backoff"
//! base_delay = 1
//! max_delay = 60
//! unit = "seconds"
//!
//! [indexer]
//! program = "samtools"
//! args = ["index", "-"]
//! extensions = ["bam"]
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::constants::{ALLOWED_CHUNK_SIZES, DEFAULT_BUFFER_SIZE, DEFAULT_CHUNK_SIZE, MAX_BUFFER_SIZE};
use crate::executor::DelayConfiguration;
use crate::headers::CipherSuite;
use crate::pipeline::{IndexerSettings, PipelineOptions};
use crate::stream::EncryptOptions;

pub const ENV_INSTANCE_ID: &str = "INGEST_INSTANCE_ID";
pub const ENV_KEYRING_PASSPHRASE: &str = "INGEST_KEYRING_PASSPHRASE";
pub const ENV_VAULT_SECRET: &str = "INGEST_VAULT_SECRET";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config {path}: {source}")]
    Read { path: PathBuf, #[source] source: std::io::Error },

    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("missing setting `{0}`")]
    Missing(&'static str),

    #[error("invalid setting `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
}

fn default_buffer_size() -> usize {
    DEFAULT_BUFFER_SIZE
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PipelineSection {
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
    #[serde(default)]
    pub cipher: CipherSuite,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
}

impl Default for PipelineSection {
    fn default() -> Self {
        Self { buffer_size: DEFAULT_BUFFER_SIZE, cipher: CipherSuite::default(), chunk_size: DEFAULT_CHUNK_SIZE }
    }
}

impl PipelineSection {
    pub fn options(&self) -> PipelineOptions {
        PipelineOptions {
            buffer_size: self.buffer_size,
            encrypt: EncryptOptions::new(self.cipher).with_chunk_size(self.chunk_size),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct IngestConfig {
    #[serde(default)]
    pub instance_id: String,
    pub staging_dir: PathBuf,
    /// Where re-encrypted files land. Defaults to next to the upload.
    #[serde(default)]
    pub result_dir: Option<PathBuf>,
    pub store_dir: PathBuf,
    pub outbox_path: PathBuf,
    pub keyring_path: PathBuf,
    #[serde(default)]
    pub keyring_passphrase: String,
    #[serde(default)]
    pub vault_secret: String,
    #[serde(default)]
    pub pipeline: PipelineSection,
    #[serde(default)]
    pub delay: DelayConfiguration,
    #[serde(default)]
    pub indexer: Option<IndexerSettings>,
}

impl IngestConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Read `path`, apply environment overrides, validate.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read { path: path.to_path_buf(), source })?;
        let mut config = Self::from_toml_str(&text)?;
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Override settings from `lookup` (the process environment in `load`).
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup(ENV_INSTANCE_ID) {
            self.instance_id = v;
        }
        if let Some(v) = lookup(ENV_KEYRING_PASSPHRASE) {
            self.keyring_passphrase = v;
        }
        if let Some(v) = lookup(ENV_VAULT_SECRET) {
            self.vault_secret = v;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.instance_id.trim().is_empty() {
            return Err(ConfigError::Missing("instance_id"));
        }
        if self.keyring_passphrase.is_empty() {
            return Err(ConfigError::Missing("keyring_passphrase"));
        }
        if self.vault_secret.is_empty() {
            return Err(ConfigError::Missing("vault_secret"));
        }

        let p = &self.pipeline;
        if p.buffer_size == 0 || p.buffer_size > MAX_BUFFER_SIZE {
            return Err(ConfigError::Invalid {
                field: "pipeline.buffer_size",
                reason: format!("must be in 1..={MAX_BUFFER_SIZE}"),
            });
        }
        if !ALLOWED_CHUNK_SIZES.contains(&p.chunk_size) {
            return Err(ConfigError::Invalid {
                field: "pipeline.chunk_size",
                reason: format!("must be one of {ALLOWED_CHUNK_SIZES:?}"),
            });
        }

        let d = &self.delay;
        if d.base_delay == 0 {
            return Err(ConfigError::Invalid { field: "delay.base_delay", reason: "must be positive".into() });
        }
        if d.max_delay < d.base_delay {
            return Err(ConfigError::Invalid {
                field: "delay.max_delay",
                reason: format!("{} is below base_delay {}", d.max_delay, d.base_delay),
            });
        }

        if let Some(indexer) = &self.indexer {
            if indexer.program.trim().is_empty() {
                return Err(ConfigError::Missing("indexer.program"));
            }
            if indexer.timeout_secs == 0 {
                return Err(ConfigError::Invalid { field: "indexer.timeout_secs", reason: "must be positive".into() });
            }
            if indexer.suffix.is_empty() {
                return Err(ConfigError::Invalid { field: "indexer.suffix", reason: "must not be empty".into() });
            }
        }
        Ok(())
    }
}
