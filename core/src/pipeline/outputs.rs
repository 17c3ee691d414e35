// ## 📂 File: `src/pipeline/outputs.rs`

//! Destination handling.
//!
//! `OutputGuard` owns every destination created by a run and removes them on
//! drop unless the run committed. Early returns, `?` and panics all go
//! through `Drop`, so no call site does its own cleanup.

use std::fs::{self, File};
use std::io::{self, BufWriter, ErrorKind};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::crypto::{DigestProbe, DigestWriter};
use crate::stream::{BlockSink, EncryptOptions, EncryptWriter};
use crate::types::CipherError;
use crate::vault::FileKey;

#[derive(Debug, Default)]
pub struct OutputGuard {
    created: Vec<PathBuf>,
    committed: bool,
}

impl OutputGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create (or truncate) `path` and register it for cleanup.
    pub fn create(&mut self, path: &Path) -> io::Result<File> {
        let file = File::create(path)?;
        self.created.push(path.to_path_buf());
        debug!(path = %path.display(), "output created");
        Ok(file)
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.created
    }

    /// Keep every output. Returns the registered paths.
    pub fn commit(mut self) -> Vec<PathBuf> {
        self.committed = true;
        std::mem::take(&mut self.created)
    }
}

impl Drop for OutputGuard {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        for path in self.created.iter().rev() {
            match fs::remove_file(path) {
                Ok(()) => debug!(path = %path.display(), "output removed"),
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => warn!(path = %path.display(), error = %e, "could not remove output"),
            }
        }
    }
}

/// Checksum handles of one encrypted output.
#[derive(Debug, Clone)]
pub struct EncryptedProbes {
    /// Plaintext written into the cipher stream.
    pub plain: DigestProbe,
    /// Ciphertext landing on disk.
    pub cipher: DigestProbe,
}

/// File -> MD5 -> cipher stream, as a fan-out sink.
pub struct EncryptedFileSink {
    writer: EncryptWriter<DigestWriter<BufWriter<File>>>,
    path: PathBuf,
}

impl EncryptedFileSink {
    pub fn new(
        file: File,
        path: &Path,
        options: EncryptOptions,
        key: &FileKey,
    ) -> Result<(Self, EncryptedProbes), CipherError> {
        let digest = DigestWriter::new(BufWriter::new(file));
        let cipher = digest.probe();
        let writer = EncryptWriter::with_options(digest, options, key.as_bytes())?;
        let probes = EncryptedProbes { plain: writer.plaintext_probe(), cipher };
        Ok((Self { writer, path: path.to_path_buf() }, probes))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl BlockSink for EncryptedFileSink {
    fn write_block(&mut self, block: &[u8]) -> io::Result<()> {
        use std::io::Write;
        self.writer.write_all(block)
    }

    fn flush(&mut self) -> io::Result<()> {
        use std::io::Write;
        self.writer.flush()
    }

    fn close(&mut self) -> io::Result<()> {
        self.writer.finish().map_err(CipherError::into_io)?;
        let digest = self.writer.get_mut();
        digest.finish()?;
        digest.get_mut().get_ref().sync_all()?;
        debug!(path = %self.path.display(), "encrypted output closed");
        Ok(())
    }
}
