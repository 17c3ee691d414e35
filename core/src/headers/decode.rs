// ## 📂 File: `src/headers/decode.rs`
//! Header decoding.
//!
//! Order of checks: length, magic, CRC, then field validation. Callers rely
//! on it to tell "not a cipher stream" from "damaged cipher stream".

use std::io::Read;

use byteorder::{LittleEndian, ReadBytesExt};

use crate::constants::MAGIC_IGE1;
use crate::headers::types::{HeaderError, StreamHeader, HEADER_CRC_SPAN, HEADER_LEN_V1};

/// True when `buf` starts with the cipher stream magic.
#[inline]
pub fn has_stream_magic(buf: &[u8]) -> bool {
    buf.starts_with(&MAGIC_IGE1)
}

/// Parse the first 64 bytes of `buf`.
pub fn decode_header_le(buf: &[u8]) -> Result<StreamHeader, HeaderError> {
    if buf.len() < HEADER_LEN_V1 {
        return Err(HeaderError::BufferTooShort { have: buf.len(), need: HEADER_LEN_V1 });
    }
    if !has_stream_magic(buf) {
        let mut have = [0u8; 4];
        have.copy_from_slice(&buf[..4]);
        return Err(HeaderError::InvalidMagic { have });
    }

    let h = read_fields(&buf[..HEADER_LEN_V1])
        .map_err(|_| HeaderError::BufferTooShort { have: buf.len(), need: HEADER_LEN_V1 })?;

    let computed = crc32fast::hash(&buf[..HEADER_CRC_SPAN]);
    if h.crc32 != computed {
        return Err(HeaderError::InvalidCrc32 { have: h.crc32, need: computed });
    }

    h.validate()?;
    Ok(h)
}

fn read_fields(mut r: &[u8]) -> std::io::Result<StreamHeader> {
    let mut h = StreamHeader::default();
    r.read_exact(&mut h.magic)?;
    h.version = r.read_u16::<LittleEndian>()?;
    h.cipher = r.read_u16::<LittleEndian>()?;
    h.hkdf_prf = r.read_u16::<LittleEndian>()?;
    h.flags = r.read_u16::<LittleEndian>()?;
    h.chunk_size = r.read_u32::<LittleEndian>()?;
    r.read_exact(&mut h.salt)?;
    r.read_exact(&mut h.key_check)?;
    h.crc32 = r.read_u32::<LittleEndian>()?;
    r.read_exact(&mut h.reserved)?;
    Ok(h)
}
