// ## 📂 File: `src/stream/decrypt.rs`

//! Streaming decryption.
//!
//! Design notes:
//! - Lazy: nothing is read until the first `read` call, which parses the
//!   header, derives the keys and checks the key verifier.
//! - Error classes are kept apart so callers can classify them:
//!   `NotEncrypted` (bad magic), `Header` (damaged header), `WrongKey`
//!   (key check mismatch), `Authentication` (tampered frame), `Truncated`.
//! - Errors cross the `Read` boundary as `io::Error` wrapping `CipherError`.
//! - After the FINAL frame the source must be at EOF; trailing bytes are
//!   rejected.

use std::io::{self, Read};

use crate::constants::frame_types;
use crate::crypto::{
    build_frame_aad, ct_eq, frame_nonce, derive_stream_keys, AeadImpl, FrameAad,
};
use crate::headers::{decode_header_le, has_stream_magic, HeaderError, StreamHeader, HEADER_LEN_V1};
use crate::stream::frame::read_frame;
use crate::stream::io::read_exact_or_eof;
use crate::types::CipherError;

/// Open a decrypting reader over `source`.
pub fn decrypt<R: Read>(source: R, key_material: &[u8]) -> DecryptReader<R> {
    DecryptReader::new(source, key_material)
}

struct OpenStream {
    aead: AeadImpl,
    header: StreamHeader,
    header_bytes: [u8; HEADER_LEN_V1],
}

enum State {
    Pending,
    Open(OpenStream),
    Done(StreamHeader),
    Failed,
}

pub struct DecryptReader<R: Read> {
    inner: R,
    key_material: Vec<u8>,
    state: State,
    plain: Vec<u8>,
    pos: usize,
    frame_index: u64,
    total: u64,
}

impl<R: Read> DecryptReader<R> {
    pub fn new(source: R, key_material: &[u8]) -> Self {
        Self {
            inner: source,
            key_material: key_material.to_vec(),
            state: State::Pending,
            plain: Vec::new(),
            pos: 0,
            frame_index: 0,
            total: 0,
        }
    }

    /// Parsed header, once the first read has happened.
    pub fn header(&self) -> Option<&StreamHeader> {
        match &self.state {
            State::Open(open) => Some(&open.header),
            State::Done(header) => Some(header),
            _ => None,
        }
    }

    /// Force header parsing and key verification without consuming plaintext.
    pub fn open(&mut self) -> Result<&StreamHeader, CipherError> {
        if matches!(self.state, State::Pending) {
            match self.open_stream() {
                Ok(open) => self.state = State::Open(open),
                Err(e) => {
                    self.state = State::Failed;
                    return Err(e);
                }
            }
        }
        self.header()
            .ok_or_else(|| CipherError::Validation("stream previously failed".into()))
    }

    pub fn into_inner(self) -> R {
        self.inner
    }

    fn open_stream(&mut self) -> Result<OpenStream, CipherError> {
        let buf = read_exact_or_eof(&mut self.inner, HEADER_LEN_V1)?;
        if !has_stream_magic(&buf) {
            return Err(CipherError::NotEncrypted);
        }
        if buf.len() < HEADER_LEN_V1 {
            return Err(HeaderError::BufferTooShort { have: buf.len(), need: HEADER_LEN_V1 }.into());
        }

        let header = decode_header_le(&buf)?;
        let mut header_bytes = [0u8; HEADER_LEN_V1];
        header_bytes.copy_from_slice(&buf);

        let keys = derive_stream_keys(&self.key_material, &header)?;
        if !ct_eq(&keys.key_check, &header.key_check) {
            return Err(CipherError::WrongKey);
        }
        let aead = AeadImpl::from_header_and_key(&header, &keys.session_key)?;

        tracing::debug!(cipher = header.cipher, chunk_size = header.chunk_size, "cipher stream opened");
        Ok(OpenStream { aead, header, header_bytes })
    }

    /// Decrypt the next frame into `self.plain`. Returns `false` once the
    /// FINAL frame has been verified.
    fn next_frame(&mut self) -> Result<bool, CipherError> {
        let open = match &self.state {
            State::Open(open) => open,
            _ => return Ok(false),
        };
        let max_plaintext = (open.header.chunk_size as usize).max(8);

        let frame = read_frame(&mut self.inner, max_plaintext)?.ok_or(CipherError::Truncated)?;

        let nonce = frame_nonce(&open.header.salt, self.frame_index)?;
        let aad = build_frame_aad(
            &open.header_bytes,
            &FrameAad { frame_type: frame.frame_type, frame_index: self.frame_index },
        );
        let plaintext = open
            .aead
            .open(&nonce, &aad, &frame.ciphertext)
            .map_err(|_| CipherError::Authentication { frame_index: self.frame_index })?;
        self.frame_index += 1;

        if frame.frame_type == frame_types::DATA {
            self.total += plaintext.len() as u64;
            self.plain = plaintext;
            self.pos = 0;
            return Ok(true);
        }

        // FINAL: authenticated total length, then the source must be exhausted.
        let declared: [u8; 8] = plaintext
            .as_slice()
            .try_into()
            .map_err(|_| CipherError::MalformedFrame("final frame length".into()))?;
        let declared = u64::from_le_bytes(declared);
        if declared != self.total {
            return Err(CipherError::MalformedFrame(format!(
                "final frame declares {declared} bytes, stream carried {}",
                self.total
            )));
        }
        let mut probe = [0u8; 1];
        if self.inner.read(&mut probe)? != 0 {
            return Err(CipherError::MalformedFrame("trailing data after final frame".into()));
        }

        let header = open.header;
        self.state = State::Done(header);
        Ok(false)
    }

    fn read_inner(&mut self, buf: &mut [u8]) -> Result<usize, CipherError> {
        if matches!(self.state, State::Pending) {
            self.open()?;
        }
        loop {
            if self.pos < self.plain.len() {
                let n = buf.len().min(self.plain.len() - self.pos);
                buf[..n].copy_from_slice(&self.plain[self.pos..self.pos + n]);
                self.pos += n;
                return Ok(n);
            }
            match self.state {
                State::Done(_) => return Ok(0),
                State::Failed => return Err(CipherError::Validation("stream previously failed".into())),
                _ => {}
            }
            self.next_frame()?;
        }
    }
}

impl<R: Read> Read for DecryptReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        self.read_inner(buf).map_err(|e| {
            self.state = State::Failed;
            e.into_io()
        })
    }
}
