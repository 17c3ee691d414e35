// ## 📂 File: `src/stream/frame.rs`

//! Wire framing of the cipher stream body.
//!
//! ```text
//! [frame_type u8][ciphertext_len u32 LE][ciphertext || tag]
//! ```
//!
//! DATA frames carry up to `chunk_size` plaintext bytes. Exactly one FINAL
//! frame ends the stream; its plaintext is the total plaintext length (u64 LE),
//! which makes truncation at a frame boundary detectable.

use std::io::{self, ErrorKind, Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::constants::frame_types;
use crate::crypto::TAG_LEN;
use crate::types::CipherError;

/// Frame read back from the wire, still sealed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireFrame {
    pub frame_type: u8,
    pub ciphertext: Vec<u8>,
}

pub fn write_frame<W: Write + ?Sized>(w: &mut W, frame_type: u8, ciphertext: &[u8]) -> io::Result<()> {
    w.write_u8(frame_type)?;
    w.write_u32::<LittleEndian>(ciphertext.len() as u32)?;
    w.write_all(ciphertext)
}

/// Read the next frame. `Ok(None)` means clean EOF at a frame boundary;
/// whether that is legal is up to the caller.
pub fn read_frame<R: Read + ?Sized>(r: &mut R, max_plaintext: usize) -> Result<Option<WireFrame>, CipherError> {
    let frame_type = match r.read_u8() {
        Ok(t) => t,
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(CipherError::from_io(e)),
    };
    if frame_type != frame_types::DATA && frame_type != frame_types::FINAL {
        return Err(CipherError::MalformedFrame(format!("unknown frame type 0x{frame_type:02x}")));
    }

    let len = r.read_u32::<LittleEndian>().map_err(eof_is_truncation)? as usize;
    if len < TAG_LEN + 1 || len > max_plaintext + TAG_LEN {
        return Err(CipherError::MalformedFrame(format!("ciphertext length {len} out of range")));
    }

    let mut ciphertext = vec![0u8; len];
    r.read_exact(&mut ciphertext).map_err(eof_is_truncation)?;

    Ok(Some(WireFrame { frame_type, ciphertext }))
}

fn eof_is_truncation(e: io::Error) -> CipherError {
    if e.kind() == ErrorKind::UnexpectedEof {
        CipherError::Truncated
    } else {
        CipherError::from_io(e)
    }
}
