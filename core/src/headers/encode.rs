// ## 📂 File: `src/headers/encode.rs`
//! Header encoding: `StreamHeader` -> 64 little-endian bytes.
//!
//! The stored `crc32` field is ignored; the CRC is always recomputed over
//! bytes 0..48 after those bytes are written.

use std::io::Write;

use byteorder::{LittleEndian, WriteBytesExt};

use crate::headers::types::{HeaderError, StreamHeader, HEADER_CRC_SPAN, HEADER_LEN_V1};

/// Serialize a validated header into its wire form.
pub fn encode_header_le(h: &StreamHeader) -> Result<[u8; HEADER_LEN_V1], HeaderError> {
    h.validate()?;

    let mut out = [0u8; HEADER_LEN_V1];
    let (covered, tail) = out.split_at_mut(HEADER_CRC_SPAN);
    write_covered(covered, h).map_err(|_| short(HEADER_CRC_SPAN))?;

    let crc = crc32fast::hash(covered);
    write_tail(tail, crc, &h.reserved).map_err(|_| short(HEADER_LEN_V1))?;
    Ok(out)
}

/// Bytes 0..48: everything the CRC covers.
fn write_covered(mut w: &mut [u8], h: &StreamHeader) -> std::io::Result<()> {
    w.write_all(&h.magic)?;
    w.write_u16::<LittleEndian>(h.version)?;
    w.write_u16::<LittleEndian>(h.cipher)?;
    w.write_u16::<LittleEndian>(h.hkdf_prf)?;
    w.write_u16::<LittleEndian>(h.flags)?;
    w.write_u32::<LittleEndian>(h.chunk_size)?;
    w.write_all(&h.salt)?;
    w.write_all(&h.key_check)
}

/// Bytes 48..64: CRC then reserved.
fn write_tail(mut w: &mut [u8], crc: u32, reserved: &[u8; 12]) -> std::io::Result<()> {
    w.write_u32::<LittleEndian>(crc)?;
    w.write_all(reserved)
}

fn short(need: usize) -> HeaderError {
    HeaderError::BufferTooShort { have: 0, need }
}
