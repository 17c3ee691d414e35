// ## 📂 File: `src/crypto/digest.rs`

//! crypto/digest.rs
//! Running MD5 over bytes in flight.
//!
//! Design notes:
//! - `DigestReader` / `DigestWriter` wrap any `Read` / `Write` and hash exactly
//!   the bytes that pass through them.
//! - The result is published through a shared `DigestProbe` only once the
//!   stream is complete (EOF for readers, `finish` for writers). A probe read
//!   earlier returns `None`; MD5 over a partial payload is meaningless.
//! - MD5 is the checksum exchanged with uploaders and downstream consumers; it
//!   is an integrity check here, not a security primitive.

use std::io::{self, Read, Write};
use std::sync::Arc;

use md5::{Digest, Md5};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Finalized digest of a complete byte stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checksum {
    /// Lowercase hex MD5.
    pub md5: String,
    pub size: u64,
}

impl Checksum {
    /// Checksum of an in-memory buffer.
    pub fn of(data: &[u8]) -> Self {
        Self { md5: hex::encode(Md5::digest(data)), size: data.len() as u64 }
    }
}

/// Shared slot a digesting stream publishes its final checksum into.
#[derive(Debug, Clone, Default)]
pub struct DigestProbe(Arc<Mutex<Option<Checksum>>>);

impl DigestProbe {
    pub fn new() -> Self {
        Self::default()
    }

    /// Final checksum, or `None` while the stream is still open.
    pub fn get(&self) -> Option<Checksum> {
        self.0.lock().clone()
    }

    pub(crate) fn publish(&self, checksum: Checksum) {
        *self.0.lock() = Some(checksum);
    }
}

/// Running MD5 state with its byte count.
struct RunningMd5 {
    hasher: Md5,
    size: u64,
    done: bool,
}

impl RunningMd5 {
    fn new() -> Self {
        Self { hasher: Md5::new(), size: 0, done: false }
    }

    fn update(&mut self, data: &[u8]) {
        self.hasher.update(data);
        self.size += data.len() as u64;
    }

    fn finalize(&mut self) -> Checksum {
        let hasher = std::mem::replace(&mut self.hasher, Md5::new());
        self.done = true;
        Checksum { md5: hex::encode(hasher.finalize()), size: self.size }
    }
}

/// Reader that hashes everything read through it.
pub struct DigestReader<R> {
    inner: R,
    state: RunningMd5,
    probe: DigestProbe,
}

impl<R: Read> DigestReader<R> {
    pub fn new(inner: R) -> Self {
        Self { inner, state: RunningMd5::new(), probe: DigestProbe::new() }
    }

    /// Handle to the checksum published at EOF.
    pub fn probe(&self) -> DigestProbe {
        self.probe.clone()
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: Read> Read for DigestReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        if n == 0 {
            if !buf.is_empty() && !self.state.done {
                let checksum = self.state.finalize();
                self.probe.publish(checksum);
            }
        } else {
            self.state.update(&buf[..n]);
        }
        Ok(n)
    }
}

/// Writer that hashes everything written through it.
pub struct DigestWriter<W> {
    inner: W,
    state: RunningMd5,
    probe: DigestProbe,
}

impl<W: Write> DigestWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner, state: RunningMd5::new(), probe: DigestProbe::new() }
    }

    pub fn probe(&self) -> DigestProbe {
        self.probe.clone()
    }

    /// Flush and publish the checksum. Idempotent.
    pub fn finish(&mut self) -> io::Result<Checksum> {
        self.inner.flush()?;
        if !self.state.done {
            let checksum = self.state.finalize();
            self.probe.publish(checksum);
        }
        self.probe
            .get()
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "digest not published"))
    }

    pub fn get_mut(&mut self) -> &mut W {
        &mut self.inner
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write> Write for DigestWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.state.done {
            return Err(io::Error::new(io::ErrorKind::Other, "write after digest finish"));
        }
        let n = self.inner.write(buf)?;
        self.state.update(&buf[..n]);
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}
