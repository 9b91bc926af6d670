//! Fixed 384-byte macro record: a named sequence of keyboard
//! press/release events bound to a physical button.
//!
//! Record layout:
//!   byte 0        — name length
//!   bytes 1..=29  — name (up to 29 bytes)
//!   byte 31       — event count
//!   bytes 32..    — up to 70 events of 5 bytes each:
//!                   (flag, keycode, modifier, delay-hi, delay-lo)
//!   + 1 byte      — checksum over [event-count byte ..= last event byte]
//! All unused bytes are 0xFF.
//!
//! Text is mapped through a fixed US-layout table to USB HID usage
//! codes; characters the table does not cover are skipped and consume
//! no event budget.

use crate::frame::checksum;

/// Total record size as stored in flash.
pub const MACRO_RECORD_LEN: usize = 384;
/// Maximum stored name bytes.
pub const MACRO_NAME_MAX: usize = 29;
/// Event budget per record (35 characters as press/release pairs).
pub const MACRO_MAX_EVENTS: usize = 70;
/// Bytes per event.
pub const EVENT_LEN: usize = 5;

/// Offset of the event-count byte.
pub const EVENT_COUNT_OFFSET: usize = 31;
/// Offset of the first event.
pub const EVENTS_OFFSET: usize = 32;

/// Event flag: key press.
pub const FLAG_PRESS: u8 = 0x80;
/// Event flag: key release.
pub const FLAG_RELEASE: u8 = 0x40;

/// Left-shift modifier bit in the event's modifier byte.
const MOD_SHIFT: u8 = 0x02;

/// Map a character to (HID keycode, modifier) via the fixed US layout.
///
/// Uppercase letters and shifted symbols add the shift modifier.
/// Returns None for characters the table does not cover; the encoder
/// skips those silently.
pub fn lookup_key(c: char) -> Option<(u8, u8)> {
    // Letters
    if c.is_ascii_lowercase() {
        return Some((0x04 + (c as u8 - b'a'), 0));
    }
    if c.is_ascii_uppercase() {
        return Some((0x04 + (c.to_ascii_lowercase() as u8 - b'a'), MOD_SHIFT));
    }
    // Digits: 1..9 then 0
    if c.is_ascii_digit() {
        let code = if c == '0' { 0x27 } else { 0x1E + (c as u8 - b'1') };
        return Some((code, 0));
    }
    let (code, shifted) = match c {
        '\n' => (0x28, false),
        '\t' => (0x2B, false),
        ' ' => (0x2C, false),
        '-' => (0x2D, false),
        '_' => (0x2D, true),
        '=' => (0x2E, false),
        '+' => (0x2E, true),
        '[' => (0x2F, false),
        '{' => (0x2F, true),
        ']' => (0x30, false),
        '}' => (0x30, true),
        '\\' => (0x31, false),
        '|' => (0x31, true),
        ';' => (0x33, false),
        ':' => (0x33, true),
        '\'' => (0x34, false),
        '"' => (0x34, true),
        '`' => (0x35, false),
        '~' => (0x35, true),
        ',' => (0x36, false),
        '<' => (0x36, true),
        '.' => (0x37, false),
        '>' => (0x37, true),
        '/' => (0x38, false),
        '?' => (0x38, true),
        '!' => (0x1E, true),
        '@' => (0x1F, true),
        '#' => (0x20, true),
        '$' => (0x21, true),
        '%' => (0x22, true),
        '^' => (0x23, true),
        '&' => (0x24, true),
        '*' => (0x25, true),
        '(' => (0x26, true),
        ')' => (0x27, true),
        _ => return None,
    };
    Some((code, if shifted { MOD_SHIFT } else { 0 }))
}

/// Build the 384-byte record from macro text.
///
/// Each mapped character becomes a press event (press delay) and a
/// release event (inter-key delay, 0 on the final character). Encoding
/// stops once the 70-event budget is full.
pub fn encode(name: &str, text: &str, press_delay_ms: u16, inter_key_delay_ms: u16) -> [u8; MACRO_RECORD_LEN] {
    let mut record = [0xFFu8; MACRO_RECORD_LEN];

    let name_bytes = name.as_bytes();
    let name_len = name_bytes.len().min(MACRO_NAME_MAX);
    record[0] = name_len as u8;
    record[1..1 + name_len].copy_from_slice(&name_bytes[..name_len]);

    let keys: Vec<(u8, u8)> = text
        .chars()
        .filter_map(lookup_key)
        .take(MACRO_MAX_EVENTS / 2)
        .collect();

    let mut cursor = EVENTS_OFFSET;
    for (i, &(keycode, modifier)) in keys.iter().enumerate() {
        let release_delay = if i + 1 == keys.len() {
            0
        } else {
            inter_key_delay_ms
        };
        for (flag, delay) in [(FLAG_PRESS, press_delay_ms), (FLAG_RELEASE, release_delay)] {
            record[cursor] = flag;
            record[cursor + 1] = keycode;
            record[cursor + 2] = modifier;
            record[cursor + 3] = (delay >> 8) as u8;
            record[cursor + 4] = (delay & 0xFF) as u8;
            cursor += EVENT_LEN;
        }
    }

    record[EVENT_COUNT_OFFSET] = (keys.len() * 2) as u8;
    record[cursor] = checksum(&record[EVENT_COUNT_OFFSET..cursor]);
    record
}

/// Header fields recovered from a record read back out of flash.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct MacroHeader {
    pub name: String,
    pub event_count: u8,
    /// Whether the trailing checksum over the event region validated.
    pub checksum_ok: bool,
}

/// Parse the header and verify the event-region checksum of a record
/// prefix. `record` must cover at least the composed region
/// (header + events + checksum byte); extra tail bytes are ignored.
pub fn parse_header(record: &[u8]) -> Option<MacroHeader> {
    if record.len() < EVENTS_OFFSET {
        return None;
    }
    let name_len = (record[0] as usize).min(MACRO_NAME_MAX);
    let name = String::from_utf8_lossy(&record[1..1 + name_len]).into_owned();

    let event_count = record[EVENT_COUNT_OFFSET];
    let end = EVENTS_OFFSET + event_count as usize * EVENT_LEN;
    if record.len() <= end {
        return None;
    }
    let checksum_ok = checksum(&record[EVENT_COUNT_OFFSET..end]) == record[end];

    Some(MacroHeader {
        name,
        event_count,
        checksum_ok,
    })
}

/// Byte length of the composed region for a given event count: header,
/// events, and the trailing checksum byte.
pub fn composed_len(event_count: u8) -> usize {
    EVENTS_OFFSET + event_count as usize * EVENT_LEN + 1
}
