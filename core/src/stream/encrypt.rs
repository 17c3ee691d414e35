// ## 📂 File: `src/stream/encrypt.rs`

//! Streaming encryption.
//!
//! Design notes:
//! - The header goes out in the constructor, before any ciphertext byte.
//! - Plaintext is buffered up to `chunk_size` and sealed as one DATA frame.
//! - `finish` seals the tail, writes the FINAL frame and publishes the
//!   plaintext MD5. Dropping the writer without `finish` leaves a stream the
//!   reader rejects as truncated.

use std::io::{self, Write};

use md5::{Digest, Md5};
use rand::RngCore;

use crate::constants::{frame_types, DEFAULT_CHUNK_SIZE};
use crate::crypto::{
    build_frame_aad, frame_nonce, derive_stream_keys, AeadImpl, Checksum, DigestProbe, FrameAad,
};
use crate::headers::{encode_header_le, CipherSuite, StreamHeader, HEADER_LEN_V1};
use crate::stream::frame::write_frame;
use crate::types::CipherError;

/// Parameters of a new cipher stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncryptOptions {
    pub suite: CipherSuite,
    pub chunk_size: usize,
    pub flags: u16,
}

impl Default for EncryptOptions {
    fn default() -> Self {
        Self { suite: CipherSuite::Aes256Gcm, chunk_size: DEFAULT_CHUNK_SIZE, flags: 0 }
    }
}

impl EncryptOptions {
    pub fn new(suite: CipherSuite) -> Self {
        Self { suite, ..Self::default() }
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn with_flags(mut self, flags: u16) -> Self {
        self.flags = flags;
        self
    }
}

/// Open an encrypting writer over `sink` with default framing.
pub fn encrypt<W: Write>(sink: W, suite: CipherSuite, key_material: &[u8]) -> Result<EncryptWriter<W>, CipherError> {
    EncryptWriter::with_options(sink, EncryptOptions::new(suite), key_material)
}

pub struct EncryptWriter<W: Write> {
    inner: W,
    aead: AeadImpl,
    header: StreamHeader,
    header_bytes: [u8; HEADER_LEN_V1],
    chunk_size: usize,
    pending: Vec<u8>,
    frame_index: u64,
    plain_md5: Md5,
    plain_size: u64,
    probe: DigestProbe,
    finished: bool,
}

impl<W: Write> EncryptWriter<W> {
    pub fn new(sink: W, suite: CipherSuite, key_material: &[u8]) -> Result<Self, CipherError> {
        Self::with_options(sink, EncryptOptions::new(suite), key_material)
    }

    pub fn with_options(mut sink: W, options: EncryptOptions, key_material: &[u8]) -> Result<Self, CipherError> {
        let mut salt = [0u8; 16];
        rand::rngs::OsRng.fill_bytes(&mut salt);

        let mut header = StreamHeader::new(options.suite, options.chunk_size, salt);
        header.flags = options.flags;
        // Validate before deriving so a bad chunk size surfaces as a header error.
        header.validate()?;

        let keys = derive_stream_keys(key_material, &header)?;
        header.key_check = keys.key_check;

        let header_bytes = encode_header_le(&header)?;
        let aead = AeadImpl::new(options.suite, &keys.session_key)?;

        sink.write_all(&header_bytes)?;

        Ok(Self {
            inner: sink,
            aead,
            header,
            header_bytes,
            chunk_size: options.chunk_size,
            pending: Vec::with_capacity(options.chunk_size),
            frame_index: 0,
            plain_md5: Md5::new(),
            plain_size: 0,
            probe: DigestProbe::new(),
            finished: false,
        })
    }

    pub fn header(&self) -> &StreamHeader {
        &self.header
    }

    /// Handle to the plaintext checksum, published by `finish`.
    pub fn plaintext_probe(&self) -> DigestProbe {
        self.probe.clone()
    }

    pub fn get_mut(&mut self) -> &mut W {
        &mut self.inner
    }

    pub fn into_inner(self) -> W {
        self.inner
    }

    fn seal_frame(&mut self, frame_type: u8, plaintext: &[u8]) -> Result<(), CipherError> {
        let nonce = frame_nonce(&self.header.salt, self.frame_index)?;
        let aad = build_frame_aad(&self.header_bytes, &FrameAad { frame_type, frame_index: self.frame_index });
        let ciphertext = self.aead.seal(&nonce, &aad, plaintext)?;
        write_frame(&mut self.inner, frame_type, &ciphertext)?;
        self.frame_index += 1;
        Ok(())
    }

    fn drain_full_chunks(&mut self) -> Result<(), CipherError> {
        while self.pending.len() >= self.chunk_size {
            let rest = self.pending.split_off(self.chunk_size);
            let chunk = std::mem::replace(&mut self.pending, rest);
            self.seal_frame(frame_types::DATA, &chunk)?;
        }
        Ok(())
    }

    /// Seal the tail and the FINAL frame, flush, and publish the plaintext
    /// checksum. Calling it again returns the same checksum.
    pub fn finish(&mut self) -> Result<Checksum, CipherError> {
        if !self.finished {
            if !self.pending.is_empty() {
                let tail = std::mem::take(&mut self.pending);
                self.seal_frame(frame_types::DATA, &tail)?;
            }
            let total = self.plain_size.to_le_bytes();
            self.seal_frame(frame_types::FINAL, &total)?;
            self.inner.flush()?;

            let md5 = std::mem::replace(&mut self.plain_md5, Md5::new());
            self.probe.publish(Checksum { md5: hex::encode(md5.finalize()), size: self.plain_size });
            self.finished = true;
        }
        self.probe
            .get()
            .ok_or_else(|| CipherError::Validation("plaintext digest missing after finish".into()))
    }
}

impl<W: Write> Write for EncryptWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.finished {
            return Err(io::Error::new(io::ErrorKind::Other, "write after finish"));
        }
        self.plain_md5.update(buf);
        self.plain_size += buf.len() as u64;
        self.pending.extend_from_slice(buf);
        self.drain_full_chunks().map_err(CipherError::into_io)?;
        Ok(buf.len())
    }

    /// Flushes the underlying sink. A partial chunk stays buffered until it
    /// fills or `finish` is called.
    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}
