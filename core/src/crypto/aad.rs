// ## 📂 File: `src/crypto/aad.rs`

use crate::crypto::types::FrameAad;
use crate::headers::HEADER_LEN_V1;

/// Build per-frame AAD: the exact encoded header bytes followed by the frame
/// type and index. Both sides must feed the header bytes exactly as they
/// appear on the wire.
#[inline]
pub fn build_frame_aad(header_bytes: &[u8; HEADER_LEN_V1], frame: &FrameAad) -> Vec<u8> {
    let mut out = Vec::with_capacity(FrameAad::LEN);

    // 1️⃣ Stream-level invariants
    out.extend_from_slice(header_bytes);

    // 2️⃣ Frame invariants known before encryption
    out.push(frame.frame_type);
    out.extend_from_slice(&frame.frame_index.to_le_bytes());

    debug_assert_eq!(out.len(), FrameAad::LEN);
    out
}
