//! HID transport: owns one device handle and serializes full
//! send/await-reply exchanges.
//!
//! The device speaks strict half-duplex per transaction: one 17-byte
//! frame out, then poll for readable bytes until a checksum-valid frame
//! with the expected op code appears in some 17-byte sliding window of
//! a read. Replies can arrive concatenated with input reports or split
//! across reads; the window scan resynchronizes.
//!
//! A mutex serializes exchanges so overlapping callers can never
//! interleave frames; there is no queueing beyond blocking on the lock.

use std::ffi::CString;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use tracing::trace;

use crate::error::{Error, Result};
use crate::frame::{self, FRAME_LEN};

/// Per-poll wait while awaiting a reply.
const POLL_INTERVAL: Duration = Duration::from_millis(50);
/// Read buffer size per poll; more than enough for a few frames.
const READ_BUF_LEN: usize = 64;

/// Abstraction over a raw HID handle so the hidapi device and test
/// fakes share one interface.
pub trait RawHid: Send {
    /// Write one complete report.
    fn write_report(&self, data: &[u8]) -> Result<()>;

    /// Wait up to `timeout` for readable bytes; an empty Vec means
    /// nothing arrived in time.
    fn read_report(&self, timeout: Duration) -> Result<Vec<u8>>;
}

impl RawHid for hidapi::HidDevice {
    fn write_report(&self, data: &[u8]) -> Result<()> {
        let written = self
            .write(data)
            .map_err(|e| Error::Hid(format!("write: {e}")))?;
        if written < data.len() {
            return Err(Error::Hid(format!(
                "short write: {written} of {} bytes",
                data.len()
            )));
        }
        Ok(())
    }

    fn read_report(&self, timeout: Duration) -> Result<Vec<u8>> {
        let mut buf = [0u8; READ_BUF_LEN];
        let n = self
            .read_timeout(&mut buf, timeout.as_millis() as i32)
            .map_err(|e| Error::Hid(format!("read: {e}")))?;
        Ok(buf[..n].to_vec())
    }
}

/// One open device handle plus the lock serializing exchanges.
pub struct Transport {
    path: String,
    dev: Mutex<Box<dyn RawHid>>,
}

impl Transport {
    /// Open the raw HID device at `path`.
    pub fn open(path: &str) -> Result<Self> {
        let api = hidapi::HidApi::new().map_err(|e| Error::Hid(format!("hidapi init: {e}")))?;
        let cpath =
            CString::new(path).map_err(|e| Error::Hid(format!("device path {path:?}: {e}")))?;
        let dev = api
            .open_path(&cpath)
            .map_err(|e| Error::Hid(format!("open {path}: {e}")))?;
        Ok(Self::from_raw(Box::new(dev), path))
    }

    /// Wrap an already-open handle (used by tests with a fake device).
    pub fn from_raw(dev: Box<dyn RawHid>, path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            dev: Mutex::new(dev),
        }
    }

    /// Device path this transport was opened on.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Send one frame and await the matching reply.
    ///
    /// Holds the exchange lock for the whole send/await cycle. Returns
    /// [`Error::NoReply`] when `timeout` elapses without a valid frame
    /// carrying `expect_op`; corrupted or foreign windows are skipped.
    /// I/O errors propagate as [`Error::Hid`] and are fatal for the
    /// connection.
    pub fn transceive(
        &self,
        tx: &[u8; FRAME_LEN],
        expect_op: u8,
        timeout: Duration,
    ) -> Result<[u8; FRAME_LEN]> {
        let dev = self.dev.lock().unwrap();

        trace!(
            path = %self.path,
            expect_op = format_args!("0x{expect_op:02X}"),
            tx_hex = format_args!("{tx:02X?}"),
            "frame TX"
        );
        dev.write_report(tx)?;

        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            let chunk = dev.read_report(POLL_INTERVAL)?;
            if chunk.is_empty() {
                continue;
            }
            if let Some(rx) = frame::find_reply(&chunk, expect_op) {
                trace!(
                    path = %self.path,
                    rx_hex = format_args!("{rx:02X?}"),
                    "frame RX"
                );
                return Ok(rx);
            }
            trace!(
                path = %self.path,
                chunk_hex = format_args!("{chunk:02X?}"),
                "no matching window, resyncing"
            );
        }

        Err(Error::NoReply)
    }
}
