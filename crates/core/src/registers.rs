//! Register map of the mouse's onboard flash, and the per-feature
//! decode/encode rules.
//!
//! Every configurable feature lives at a fixed flash address. Short
//! records carry their own inline checksum (the checked-write style
//! writes it; reads validate it). Addresses and record layouts were
//! reverse-engineered from vendor-driver captures.

use crate::error::{Error, Result};
use crate::frame::checksum;

/// Polling rate record (2 bytes: code + checksum).
pub const POLLING_RATE_ADDR: u16 = 0x0000;
/// Active DPI level index (low 7 bits).
pub const DPI_LEVEL_SELECT_ADDR: u16 = 0x0004;
/// First DPI level slot; slots are 4 bytes apart.
pub const DPI_LEVEL_BASE_ADDR: u16 = 0x000C;
pub const DPI_LEVEL_STRIDE: u16 = 0x0004;
pub const DPI_LEVEL_COUNT: u8 = 5;
/// Button-4 binding record (4 bytes).
pub const BTN4_BINDING_ADDR: u16 = 0x0070;
/// LED config block (6 meaningful bytes of 10).
pub const LED_CONFIG_ADDR: u16 = 0x00A0;
/// 1-byte trigger that makes the device apply a written LED config.
pub const LED_APPLY_ADDR: u16 = 0x00A7;
/// Motion sync toggle (2 bytes: value + checksum).
pub const MOTION_SYNC_ADDR: u16 = 0x00AB;
/// Angle snap toggle.
pub const ANGLE_SNAP_ADDR: u16 = 0x00AF;
/// Ripple control toggle.
pub const RIPPLE_CONTROL_ADDR: u16 = 0x00B1;
/// Macro slot 0 (384-byte record).
pub const MACRO_SLOT0_ADDR: u16 = 0x0900;

/// Button-4 binding states on the wire.
pub const BTN4_STATE_BOUND: u8 = 0x01;
pub const BTN4_STATE_UNBOUND: u8 = 0xFE;

/// Encode a DPI value as the device's raw byte: hundreds, rounded
/// half-to-even, clamped to [1, 255].
pub fn dpi_to_raw(dpi: u16) -> u8 {
    let quotient = dpi / 100;
    let remainder = dpi % 100;
    let raw = match remainder.cmp(&50) {
        std::cmp::Ordering::Less => quotient,
        std::cmp::Ordering::Greater => quotient + 1,
        // Exact midpoint rounds to the even hundred
        std::cmp::Ordering::Equal => quotient + (quotient & 1),
    };
    raw.clamp(1, 255) as u8
}

/// Decode a raw DPI byte back to DPI.
pub fn raw_to_dpi(raw: u8) -> u16 {
    u16::from(raw) * 100
}

/// Polling rate options supported by the mouse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[repr(u16)]
pub enum PollingRate {
    Hz125 = 125,
    Hz250 = 250,
    Hz500 = 500,
    Hz1000 = 1000,
}

impl PollingRate {
    /// Convert from raw Hz value.
    pub fn from_hz(hz: u16) -> Option<Self> {
        match hz {
            125 => Some(Self::Hz125),
            250 => Some(Self::Hz250),
            500 => Some(Self::Hz500),
            1000 => Some(Self::Hz1000),
            _ => None,
        }
    }

    /// Decode the device's rate code. Unknown codes yield None rather
    /// than a crash; callers report "unknown".
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(Self::Hz125),
            2 => Some(Self::Hz250),
            3 => Some(Self::Hz500),
            4 => Some(Self::Hz1000),
            _ => None,
        }
    }

    /// The device's rate code for this rate.
    pub fn code(&self) -> u8 {
        match self {
            Self::Hz125 => 1,
            Self::Hz250 => 2,
            Self::Hz500 => 3,
            Self::Hz1000 => 4,
        }
    }

    /// Get the Hz value.
    pub fn as_hz(&self) -> u16 {
        *self as u16
    }

    /// All supported rates.
    pub const ALL: &'static [PollingRate] = &[
        PollingRate::Hz125,
        PollingRate::Hz250,
        PollingRate::Hz500,
        PollingRate::Hz1000,
    ];
}

impl std::fmt::Display for PollingRate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} Hz", self.as_hz())
    }
}

/// Validate a 2-byte checked record `[value, checksum(value)]` and
/// return the value.
pub fn decode_checked_byte(record: &[u8], context: &'static str) -> Result<u8> {
    if record.len() < 2 || checksum(&record[..1]) != record[1] {
        return Err(Error::ChecksumMismatch { context });
    }
    Ok(record[0])
}

/// The three feature toggles stored as checked single-byte records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum Toggle {
    MotionSync,
    AngleSnap,
    RippleControl,
}

impl Toggle {
    /// Flash address of this toggle's record.
    pub fn addr(&self) -> u16 {
        match self {
            Self::MotionSync => MOTION_SYNC_ADDR,
            Self::AngleSnap => ANGLE_SNAP_ADDR,
            Self::RippleControl => RIPPLE_CONTROL_ADDR,
        }
    }

    /// Human-readable label.
    pub fn label(&self) -> &'static str {
        match self {
            Self::MotionSync => "Motion Sync",
            Self::AngleSnap => "Angle Snap",
            Self::RippleControl => "Ripple Control",
        }
    }

    /// Parse a toggle from a CLI-friendly string.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "motion" | "motion-sync" | "motionsync" => Some(Self::MotionSync),
            "angle" | "angle-snap" | "anglesnap" => Some(Self::AngleSnap),
            "ripple" | "ripple-control" | "ripplecontrol" => Some(Self::RippleControl),
            _ => None,
        }
    }

    pub const ALL: &'static [Toggle] = &[
        Toggle::MotionSync,
        Toggle::AngleSnap,
        Toggle::RippleControl,
    ];
}

impl std::fmt::Display for Toggle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Number of LED config bytes the device actually honors. The block
/// reads back as 10 bytes; the tail is ignored.
pub const LED_CONFIG_LEN: usize = 6;

/// LED configuration block in raw (wire) form.
///
/// `speed` and `brightness` are the raw 0–9 values; the UI-facing scale
/// is 1–10 (see [`LedConfig::speed_reported`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct LedConfig {
    /// Lighting mode, 1–5. Mode 2 is the custom-color mode.
    pub mode: u8,
    pub red: u8,
    pub green: u8,
    pub blue: u8,
    /// Effect speed, raw 0–9.
    pub speed: u8,
    /// Brightness, raw 0–9.
    pub brightness: u8,
}

impl LedConfig {
    /// Decode from a flash read of at least 6 bytes.
    pub fn decode(raw: &[u8]) -> Result<Self> {
        if raw.len() < LED_CONFIG_LEN {
            return Err(Error::InvalidLength {
                expected: LED_CONFIG_LEN,
                actual: raw.len(),
            });
        }
        Ok(Self {
            mode: raw[0],
            red: raw[1],
            green: raw[2],
            blue: raw[3],
            speed: raw[4],
            brightness: raw[5],
        })
    }

    /// Encode the 6 authoritative bytes for a checked write.
    pub fn encode(&self) -> [u8; LED_CONFIG_LEN] {
        [
            self.mode,
            self.red,
            self.green,
            self.blue,
            self.speed,
            self.brightness,
        ]
    }

    /// Effect speed on the reported 1–10 scale. Out-of-range raw
    /// bytes (unprogrammed flash reads back 0xFF) clamp to 10.
    pub fn speed_reported(&self) -> u8 {
        self.speed.min(9) + 1
    }

    /// Brightness on the reported 1–10 scale, clamped like
    /// [`LedConfig::speed_reported`].
    pub fn brightness_reported(&self) -> u8 {
        self.brightness.min(9) + 1
    }
}

/// Convert a reported 1–10 value to the raw 0–9 byte, clamping.
pub fn led_raw_from_reported(reported: u8) -> u8 {
    (reported.max(1) - 1).min(9)
}

/// Encode the button-4 binding record body (the inline checksum is
/// appended by the checked-write style, completing the 4-byte record).
pub fn encode_btn4_binding(bound: bool) -> [u8; 3] {
    let state = if bound {
        BTN4_STATE_BOUND
    } else {
        BTN4_STATE_UNBOUND
    };
    [0x06, 0x04, state]
}

/// Decode a 4-byte button-4 binding record, validating its checksum.
///
/// Unknown state bytes decode as "not bound".
pub fn decode_btn4_binding(record: &[u8]) -> Result<bool> {
    if record.len() < 4 || checksum(&record[..3]) != record[3] {
        return Err(Error::ChecksumMismatch {
            context: "button-4 binding",
        });
    }
    Ok(record[2] == BTN4_STATE_BOUND)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dpi_to_raw_boundaries() {
        assert_eq!(dpi_to_raw(50), 1);
        assert_eq!(dpi_to_raw(25500), 255);
        assert_eq!(dpi_to_raw(0), 1); // clamped up
        assert_eq!(dpi_to_raw(65535), 255); // clamped down
        assert_eq!(dpi_to_raw(2400), 24);
    }

    #[test]
    fn dpi_midpoint_rounds_to_even_hundred() {
        assert_eq!(dpi_to_raw(150), 2); // 1.5 → 2
        assert_eq!(dpi_to_raw(250), 2); // 2.5 → 2
        assert_eq!(dpi_to_raw(350), 4); // 3.5 → 4
        assert_eq!(dpi_to_raw(2450), 24); // 24.5 → 24
        assert_eq!(dpi_to_raw(2550), 26); // 25.5 → 26
        // Off the midpoint, plain nearest
        assert_eq!(dpi_to_raw(249), 2);
        assert_eq!(dpi_to_raw(251), 3);
    }

    #[test]
    fn dpi_roundtrip_lands_on_hundreds() {
        for dpi in [1u16, 100, 149, 150, 2450, 18000, 25500] {
            let decoded = raw_to_dpi(dpi_to_raw(dpi));
            assert_eq!(decoded % 100, 0);
            assert!((100..=25500).contains(&decoded));
        }
    }

    #[test]
    fn polling_code_hz_bijection() {
        for rate in PollingRate::ALL {
            assert_eq!(PollingRate::from_code(rate.code()), Some(*rate));
            assert_eq!(PollingRate::from_hz(rate.as_hz()), Some(*rate));
        }
        assert_eq!(
            PollingRate::from_code(1).map(|r| r.as_hz()),
            Some(125)
        );
        assert_eq!(
            PollingRate::from_code(4).map(|r| r.as_hz()),
            Some(1000)
        );
    }

    #[test]
    fn polling_unknown_code_is_none() {
        assert_eq!(PollingRate::from_code(0), None);
        assert_eq!(PollingRate::from_code(5), None);
        assert_eq!(PollingRate::from_code(0xFF), None);
        assert_eq!(PollingRate::from_hz(200), None);
    }

    #[test]
    fn checked_byte_accepts_valid_record() {
        let record = [0x03, checksum(&[0x03])];
        assert_eq!(decode_checked_byte(&record, "polling").unwrap(), 0x03);
    }

    #[test]
    fn checked_byte_rejects_corruption() {
        let record = [0x03, checksum(&[0x03]) ^ 0x01];
        assert!(matches!(
            decode_checked_byte(&record, "polling"),
            Err(Error::ChecksumMismatch { .. })
        ));
        assert!(decode_checked_byte(&[0x03], "polling").is_err());
    }

    #[test]
    fn toggle_addresses_are_distinct() {
        assert_eq!(Toggle::MotionSync.addr(), 0x00AB);
        assert_eq!(Toggle::AngleSnap.addr(), 0x00AF);
        assert_eq!(Toggle::RippleControl.addr(), 0x00B1);
    }

    #[test]
    fn toggle_from_name_variants() {
        assert_eq!(Toggle::from_name("motion"), Some(Toggle::MotionSync));
        assert_eq!(Toggle::from_name("Angle-Snap"), Some(Toggle::AngleSnap));
        assert_eq!(Toggle::from_name("RIPPLE"), Some(Toggle::RippleControl));
        assert_eq!(Toggle::from_name("turbo"), None);
    }

    #[test]
    fn led_config_decode_uses_first_six_bytes() {
        let raw = [2, 0x10, 0x20, 0x30, 4, 7, 0xAA, 0xBB, 0xCC, 0xDD];
        let cfg = LedConfig::decode(&raw).unwrap();
        assert_eq!(cfg.mode, 2);
        assert_eq!((cfg.red, cfg.green, cfg.blue), (0x10, 0x20, 0x30));
        assert_eq!(cfg.speed, 4);
        assert_eq!(cfg.brightness, 7);
        assert_eq!(cfg.encode(), [2, 0x10, 0x20, 0x30, 4, 7]);
    }

    #[test]
    fn led_config_decode_rejects_short_block() {
        assert!(LedConfig::decode(&[1, 2, 3]).is_err());
    }

    #[test]
    fn led_reported_scale() {
        let cfg = LedConfig::decode(&[1, 0, 0, 0, 0, 9]).unwrap();
        assert_eq!(cfg.speed_reported(), 1);
        assert_eq!(cfg.brightness_reported(), 10);
        assert_eq!(led_raw_from_reported(1), 0);
        assert_eq!(led_raw_from_reported(10), 9);
        assert_eq!(led_raw_from_reported(0), 0); // clamped
        assert_eq!(led_raw_from_reported(200), 9); // clamped
    }

    #[test]
    fn led_reported_scale_clamps_blank_flash() {
        // Unprogrammed flash reads back 0xFF everywhere; the reported
        // scale must stay within 1-10 instead of overflowing.
        let cfg = LedConfig::decode(&[0xFF; 10]).unwrap();
        assert_eq!(cfg.speed_reported(), 10);
        assert_eq!(cfg.brightness_reported(), 10);
    }

    #[test]
    fn btn4_binding_roundtrip() {
        for bound in [true, false] {
            let body = encode_btn4_binding(bound);
            let mut record = body.to_vec();
            record.push(checksum(&body));
            assert_eq!(decode_btn4_binding(&record).unwrap(), bound);
        }
    }

    #[test]
    fn btn4_binding_rejects_bad_checksum() {
        let body = encode_btn4_binding(true);
        let mut record = body.to_vec();
        record.push(checksum(&body) ^ 0xFF);
        assert!(decode_btn4_binding(&record).is_err());
    }

    #[test]
    fn btn4_unknown_state_is_unbound() {
        let body = [0x06u8, 0x04, 0x42];
        let mut record = body.to_vec();
        record.push(checksum(&body));
        assert_eq!(decode_btn4_binding(&record).unwrap(), false);
    }
}
