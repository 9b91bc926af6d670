//! Command encoder: builds the four Ragnok frame types.
//!
//! Payload layout (16 bytes, before the frame checksum):
//!   byte 0      — 0x08, fixed family selector (doubles as HID report ID)
//!   byte 1      — op code (battery 0x04, flash read 0x08, write 0x07)
//!   bytes 3..4  — big-endian flash address (read/write ops)
//!   byte 5      — length/count field; semantics differ between the
//!                 checked and raw write styles
//!   bytes 6..   — op-specific data

use crate::error::{Error, Result};
use crate::frame::{self, FRAME_LEN, PAYLOAD_LEN};

/// Fixed family selector carried in byte 0 of every command.
pub const FAMILY: u8 = 0x08;

/// Op codes (command byte 1; replies echo the same op).
pub mod op {
    /// Battery percentage query.
    pub const BATTERY: u8 = 0x04;
    /// Flash register read.
    pub const FLASH_READ: u8 = 0x08;
    /// Flash write (both the checked and raw styles).
    pub const WRITE: u8 = 0x07;
}

/// Offset of reply data within a reply frame.
pub const REPLY_DATA_OFFSET: usize = 6;

/// Maximum data bytes in a checked write (inline checksum takes the
/// tenth slot).
pub const CHECKED_WRITE_MAX: usize = 9;
/// Maximum data bytes in a raw write.
pub const RAW_WRITE_MAX: usize = 10;
/// Maximum data bytes a single flash-read reply can carry.
pub const READ_CHUNK_MAX: usize = PAYLOAD_LEN - REPLY_DATA_OFFSET;

/// Battery read: `[0x08, 0x04, 0...]`. Reply op 0x04 carries the
/// percentage at byte 6.
pub fn read_battery() -> [u8; FRAME_LEN] {
    let mut payload = [0u8; PAYLOAD_LEN];
    payload[0] = FAMILY;
    payload[1] = op::BATTERY;
    frame::pack_payload(&payload)
}

/// Flash read of `count` bytes at `addr`. Reply op 0x08 carries the
/// data at bytes 6..6+count.
pub fn read_flash(addr: u16, count: u8) -> [u8; FRAME_LEN] {
    let mut payload = [0u8; PAYLOAD_LEN];
    payload[0] = FAMILY;
    payload[1] = op::FLASH_READ;
    payload[3] = (addr >> 8) as u8;
    payload[4] = (addr & 0xFF) as u8;
    payload[5] = count;
    frame::pack_payload(&payload)
}

/// Checked write: data followed by an inline checksum byte, count field
/// = len + 1. Used for all short-register writes.
///
/// Fails with [`Error::PayloadTooLarge`] above 9 data bytes, before any
/// I/O is attempted.
pub fn checked_write(addr: u16, data: &[u8]) -> Result<[u8; FRAME_LEN]> {
    if data.len() > CHECKED_WRITE_MAX {
        return Err(Error::PayloadTooLarge {
            limit: CHECKED_WRITE_MAX,
            actual: data.len(),
        });
    }
    let mut payload = [0u8; PAYLOAD_LEN];
    payload[0] = FAMILY;
    payload[1] = op::WRITE;
    payload[3] = (addr >> 8) as u8;
    payload[4] = (addr & 0xFF) as u8;
    payload[5] = (data.len() + 1) as u8;
    payload[6..6 + data.len()].copy_from_slice(data);
    payload[6 + data.len()] = frame::checksum(data);
    Ok(frame::pack_payload(&payload))
}

/// Raw write: data verbatim, count field = len exactly, no inline
/// checksum. Used only for macro-blob chunk streaming.
///
/// Fails with [`Error::PayloadTooLarge`] above 10 data bytes.
pub fn raw_write(addr: u16, data: &[u8]) -> Result<[u8; FRAME_LEN]> {
    if data.len() > RAW_WRITE_MAX {
        return Err(Error::PayloadTooLarge {
            limit: RAW_WRITE_MAX,
            actual: data.len(),
        });
    }
    let mut payload = [0u8; PAYLOAD_LEN];
    payload[0] = FAMILY;
    payload[1] = op::WRITE;
    payload[3] = (addr >> 8) as u8;
    payload[4] = (addr & 0xFF) as u8;
    payload[5] = data.len() as u8;
    payload[6..6 + data.len()].copy_from_slice(data);
    Ok(frame::pack_payload(&payload))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn battery_frame_layout() {
        let f = read_battery();
        assert_eq!(f[0], 0x08);
        assert_eq!(f[1], 0x04);
        assert!(f[2..PAYLOAD_LEN].iter().all(|&b| b == 0));
        assert!(frame::is_valid(&f));
    }

    #[test]
    fn flash_read_places_addr_big_endian() {
        for (addr, count) in [(0x0000u16, 0u8), (0x00A0, 10), (0x0904, 5), (0xFFFF, 255)] {
            let f = read_flash(addr, count);
            assert_eq!(f[1], op::FLASH_READ);
            assert_eq!(f[3], (addr >> 8) as u8);
            assert_eq!(f[4], (addr & 0xFF) as u8);
            assert_eq!(f[5], count);
            assert!(frame::is_valid(&f));
        }
    }

    #[test]
    fn checked_write_appends_inline_checksum() {
        let data = [0x18u8, 0x18, 0x00];
        let f = checked_write(0x000C, &data).unwrap();
        assert_eq!(f[1], op::WRITE);
        assert_eq!(f[3], 0x00);
        assert_eq!(f[4], 0x0C);
        assert_eq!(f[5], data.len() as u8 + 1);
        assert_eq!(&f[6..9], &data);
        assert_eq!(f[9], frame::checksum(&data));
        assert!(frame::is_valid(&f));
    }

    #[test]
    fn checked_write_at_limit() {
        assert!(checked_write(0x0900, &[0u8; 9]).is_ok());
    }

    #[test]
    fn checked_write_rejects_ten_bytes() {
        assert!(matches!(
            checked_write(0x0900, &[0u8; 10]),
            Err(Error::PayloadTooLarge { limit: 9, actual: 10 })
        ));
    }

    #[test]
    fn raw_write_count_is_exact_len() {
        let data = [0xAAu8, 0xBB, 0xCC, 0xDD];
        let f = raw_write(0x0910, &data).unwrap();
        assert_eq!(f[5], data.len() as u8);
        assert_eq!(&f[6..10], &data);
        // No inline checksum after the data
        assert_eq!(f[10], 0x00);
    }

    #[test]
    fn raw_write_at_limit() {
        assert!(raw_write(0x0900, &[0u8; 10]).is_ok());
    }

    #[test]
    fn raw_write_rejects_eleven_bytes() {
        assert!(matches!(
            raw_write(0x0900, &[0u8; 11]),
            Err(Error::PayloadTooLarge { limit: 10, actual: 11 })
        ));
    }
}
