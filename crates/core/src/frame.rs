//! Ragnok frame codec: 17-byte frames with a 0x55-complement checksum.
//!
//! Every exchange with the mouse is a fixed 17-byte frame: a 16-byte
//! payload followed by one checksum byte. There is no length prefixing
//! beyond the fixed structure; replies may arrive concatenated or split
//! across reads and are recovered by scanning sliding windows for one
//! that checksums.
//!
//! Protocol knowledge reverse-engineered from USB captures of the
//! vendor driver.

use crate::error::{Error, Result};

/// Payload length covered by the checksum.
pub const PAYLOAD_LEN: usize = 16;
/// Full frame length (payload + checksum byte).
pub const FRAME_LEN: usize = 17;

/// Protocol checksum: 0x55 minus the byte sum, mod 256.
pub fn checksum(data: &[u8]) -> u8 {
    let sum = data.iter().fold(0u8, |acc, &b| acc.wrapping_add(b));
    0x55u8.wrapping_sub(sum)
}

/// Append the checksum to a 16-byte payload, producing a wire frame.
///
/// Fails with [`Error::InvalidLength`] if the payload is not exactly
/// 16 bytes.
pub fn pack(payload: &[u8]) -> Result<[u8; FRAME_LEN]> {
    if payload.len() != PAYLOAD_LEN {
        return Err(Error::InvalidLength {
            expected: PAYLOAD_LEN,
            actual: payload.len(),
        });
    }
    let mut fixed = [0u8; PAYLOAD_LEN];
    fixed.copy_from_slice(payload);
    Ok(pack_payload(&fixed))
}

/// Infallible variant of [`pack`] for payloads whose length is already
/// fixed by the type.
pub fn pack_payload(payload: &[u8; PAYLOAD_LEN]) -> [u8; FRAME_LEN] {
    let mut frame = [0u8; FRAME_LEN];
    frame[..PAYLOAD_LEN].copy_from_slice(payload);
    frame[PAYLOAD_LEN] = checksum(payload);
    frame
}

/// Whether a 17-byte window is a checksum-valid frame.
pub fn is_valid(window: &[u8]) -> bool {
    window.len() == FRAME_LEN && checksum(&window[..PAYLOAD_LEN]) == window[PAYLOAD_LEN]
}

/// Scan every 17-byte sliding window of `buf` and return the first
/// checksum-valid frame whose op byte (index 1) equals `expect_op`.
///
/// Corrupted or foreign windows are skipped; this is how the transport
/// resynchronizes over partial or garbage reads.
pub fn find_reply(buf: &[u8], expect_op: u8) -> Option<[u8; FRAME_LEN]> {
    if buf.len() < FRAME_LEN {
        return None;
    }
    for start in 0..=(buf.len() - FRAME_LEN) {
        let window = &buf[start..start + FRAME_LEN];
        if is_valid(window) && window[1] == expect_op {
            let mut frame = [0u8; FRAME_LEN];
            frame.copy_from_slice(window);
            return Some(frame);
        }
    }
    None
}
