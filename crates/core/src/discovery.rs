//! Device discovery: enumerate candidate raw-HID devices.
//!
//! The mouse is found by probing, not by VID/PID filtering: discovery
//! returns every raw HID entry (sorted by path for a deterministic
//! order) and the session probes each with a battery read until one
//! answers.

use crate::error::{Error, Result};
use tracing::debug;

/// A candidate device: its OS path and a best-effort display name.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct DeviceEntry {
    pub path: String,
    /// Product string when resolvable, empty otherwise.
    pub name: String,
}

/// Enumerate candidate HID devices, sorted by path.
///
/// Name resolution is best-effort: an entry whose product string is
/// missing gets an empty name, and never fails enumeration overall.
pub fn list_devices() -> Result<Vec<DeviceEntry>> {
    debug!("starting HID device enumeration");
    let api = hidapi::HidApi::new().map_err(|e| Error::Hid(format!("hidapi init: {e}")))?;

    let mut devices: Vec<DeviceEntry> = api
        .device_list()
        .map(|info| DeviceEntry {
            path: info.path().to_string_lossy().into_owned(),
            name: info.product_string().unwrap_or("").to_string(),
        })
        .collect();

    devices.sort_by(|a, b| a.path.cmp(&b.path));
    devices.dedup_by(|a, b| a.path == b.path);

    debug!(count = devices.len(), "device enumeration complete");
    Ok(devices)
}
