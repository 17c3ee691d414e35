// ## 📂 File: `src/stream/armor.rs`

//! ASCII armor (base64 between BEGIN/END lines).
//!
//! Armor is a transport wrapper, not a cipher concern: `ArmorReader` yields the
//! raw bytes and any reader stacked on top (legacy envelope, cipher stream)
//! sees exactly what it would see for a binary file.
//!
//! Accepted layout:
//! ```text
//! -----BEGIN <LABEL>-----
//! Optional: header lines
//!
//! <base64, any line width>
//! =CRC24 line (ignored)
//! -----END <LABEL>-----
//! ```

use std::io::{self, BufRead, Read, Write};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use crate::types::CipherError;

const BEGIN_PREFIX: &[u8] = b"-----BEGIN ";
const END_PREFIX: &str = "-----END ";
const LINE_WIDTH: usize = 64;
const RAW_PER_LINE: usize = LINE_WIDTH / 4 * 3;

/// Label written by `ArmorWriter`.
pub const ARMOR_LABEL: &str = "INGEST ENCRYPTED MESSAGE";

/// True when `peek` (the first bytes of an input) looks armored.
pub fn is_armored(peek: &[u8]) -> bool {
    let start = peek.iter().position(|b| !b.is_ascii_whitespace()).unwrap_or(peek.len());
    peek[start..].starts_with(BEGIN_PREFIX)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ArmorState {
    Preamble,
    Body,
    Trailer,
    Eof,
}

/// Streaming base64 unwrapping reader.
pub struct ArmorReader<R: BufRead> {
    inner: R,
    state: ArmorState,
    line: Vec<u8>,
    carry: String,
    decoded: Vec<u8>,
    pos: usize,
}

fn malformed(msg: impl Into<String>) -> io::Error {
    CipherError::MalformedArmor(msg.into()).into_io()
}

impl<R: BufRead> ArmorReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            state: ArmorState::Preamble,
            line: Vec::new(),
            carry: String::new(),
            decoded: Vec::new(),
            pos: 0,
        }
    }

    /// Read one line; `None` at EOF.
    fn next_line(&mut self) -> io::Result<Option<String>> {
        self.line.clear();
        if self.inner.read_until(b'\n', &mut self.line)? == 0 {
            return Ok(None);
        }
        let text = std::str::from_utf8(&self.line).map_err(|_| malformed("armor is not valid ASCII"))?;
        Ok(Some(text.trim().to_string()))
    }

    fn decode_carry(&mut self, final_chunk: bool) -> io::Result<()> {
        let usable = if final_chunk { self.carry.len() } else { self.carry.len() / 4 * 4 };
        if final_chunk && usable % 4 != 0 {
            return Err(malformed("base64 body is not a multiple of 4 characters"));
        }
        if usable == 0 {
            return Ok(());
        }
        let rest = self.carry.split_off(usable);
        let chunk = std::mem::replace(&mut self.carry, rest);
        self.decoded = STANDARD.decode(chunk.as_bytes()).map_err(|e| malformed(e.to_string()))?;
        self.pos = 0;
        Ok(())
    }

    /// Advance until decoded bytes are available or the armor is exhausted.
    fn fill(&mut self) -> io::Result<()> {
        while self.pos >= self.decoded.len() && self.state != ArmorState::Eof {
            let line = self.next_line()?;
            match (self.state, line) {
                (ArmorState::Preamble, None) => return Err(malformed("missing BEGIN line")),
                (ArmorState::Preamble, Some(l)) if l.is_empty() => {}
                (ArmorState::Preamble, Some(l)) => {
                    if !l.as_bytes().starts_with(BEGIN_PREFIX) {
                        return Err(malformed("missing BEGIN line"));
                    }
                    self.state = ArmorState::Body;
                }
                (ArmorState::Body, None) => return Err(malformed("missing END line")),
                (ArmorState::Body, Some(l)) => {
                    if l.starts_with(END_PREFIX) {
                        self.decode_carry(true)?;
                        self.state = ArmorState::Trailer;
                    } else if l.is_empty() || l.contains(':') || (l.starts_with('=') && l.len() == 5) {
                        // blank, armor header or checksum line
                    } else {
                        self.carry.extend(l.chars().filter(|c| !c.is_ascii_whitespace()));
                        self.decode_carry(false)?;
                    }
                }
                (ArmorState::Trailer, None) => self.state = ArmorState::Eof,
                (ArmorState::Trailer, Some(l)) if l.is_empty() => {}
                (ArmorState::Trailer, Some(_)) => return Err(malformed("data after END line")),
                (ArmorState::Eof, _) => {}
            }
        }
        Ok(())
    }
}

impl<R: BufRead> Read for ArmorReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        self.fill()?;
        let available = self.decoded.len() - self.pos;
        if available == 0 {
            return Ok(0);
        }
        let n = buf.len().min(available);
        buf[..n].copy_from_slice(&self.decoded[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}

/// Streaming base64 wrapping writer, 64 characters per line.
pub struct ArmorWriter<W: Write> {
    inner: W,
    label: String,
    pending: Vec<u8>,
}

impl<W: Write> ArmorWriter<W> {
    pub fn new(mut inner: W, label: &str) -> io::Result<Self> {
        writeln!(inner, "-----BEGIN {label}-----")?;
        writeln!(inner)?;
        Ok(Self { inner, label: label.to_string(), pending: Vec::new() })
    }

    fn emit_lines(&mut self, all: bool) -> io::Result<()> {
        let mut start = 0;
        while self.pending.len() - start >= RAW_PER_LINE || (all && start < self.pending.len()) {
            let end = (start + RAW_PER_LINE).min(self.pending.len());
            writeln!(self.inner, "{}", STANDARD.encode(&self.pending[start..end]))?;
            start = end;
        }
        self.pending.drain(..start);
        Ok(())
    }

    /// Write the remaining body and the END line.
    pub fn finish(mut self) -> io::Result<W> {
        self.emit_lines(true)?;
        writeln!(self.inner, "-----END {}-----", self.label)?;
        self.inner.flush()?;
        Ok(self.inner)
    }
}

impl<W: Write> Write for ArmorWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.pending.extend_from_slice(buf);
        self.emit_lines(false)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}
