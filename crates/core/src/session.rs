//! Session: connection lifecycle, cached feature state, synchronous
//! register reads and asynchronous mutating operations.
//!
//! One `Session` is created per process and owns at most one connected
//! [`Transport`]. Reads run on the caller's thread; every mutating
//! operation runs on a short-lived worker thread and reports exactly
//! one boolean outcome through a completion queue that the owning
//! thread drains ([`Session::dispatch_completions`] /
//! [`Session::wait_idle`]) — callbacks never run on the worker.
//!
//! Cached values start as `None` ("never read") and are refreshed by
//! each successful operation independently; one register's failure
//! never invalidates another's cached value.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::command::{self, op, RAW_WRITE_MAX, READ_CHUNK_MAX, REPLY_DATA_OFFSET};
use crate::discovery;
use crate::error::{Error, Result};
use crate::frame::FRAME_LEN;
use crate::macro_record::{self, MacroHeader, EVENTS_OFFSET, MACRO_MAX_EVENTS};
use crate::registers::{self, LedConfig, PollingRate, Toggle};
use crate::transport::Transport;

/// Probe timeout used while auto-connecting.
const PROBE_TIMEOUT: Duration = Duration::from_millis(200);
/// Per-transaction timeout for battery reads and register writes.
const WRITE_TIMEOUT: Duration = Duration::from_millis(200);
/// Per-transaction timeout for flash reads.
const READ_TIMEOUT: Duration = Duration::from_millis(300);
/// Pacing between macro chunk writes.
const CHUNK_PACING: Duration = Duration::from_millis(5);

/// Elapsed time without a successful reply after which the mouse is
/// reported as sleeping. Advisory only; never triggers disconnection.
pub const SLEEP_TIMEOUT: Duration = Duration::from_secs(5);

/// Decoded LED state on the reported scales (speed/brightness 1–10).
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct LedState {
    pub mode: u8,
    pub red: u8,
    pub green: u8,
    pub blue: u8,
    pub speed: u8,
    pub brightness: u8,
}

impl LedState {
    fn from_config(cfg: &LedConfig) -> Self {
        Self {
            mode: cfg.mode,
            red: cfg.red,
            green: cfg.green,
            blue: cfg.blue,
            speed: cfg.speed_reported(),
            brightness: cfg.brightness_reported(),
        }
    }
}

/// Cached decoded register values. `None` means never successfully
/// read; a field may be one update stale but is never torn.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Snapshot {
    pub dpi: Option<u16>,
    pub battery_percent: Option<u8>,
    pub polling_rate: Option<PollingRate>,
    pub motion_sync: Option<bool>,
    pub angle_snap: Option<bool>,
    pub ripple_control: Option<bool>,
    pub led: Option<LedState>,
    pub btn4_macro_bound: Option<bool>,
    pub btn4_macro: Option<MacroHeader>,
}

impl Snapshot {
    /// Cached value of one feature toggle.
    pub fn toggle(&self, toggle: Toggle) -> Option<bool> {
        match toggle {
            Toggle::MotionSync => self.motion_sync,
            Toggle::AngleSnap => self.angle_snap,
            Toggle::RippleControl => self.ripple_control,
        }
    }

    fn set_toggle(&mut self, toggle: Toggle, value: bool) {
        match toggle {
            Toggle::MotionSync => self.motion_sync = Some(value),
            Toggle::AngleSnap => self.angle_snap = Some(value),
            Toggle::RippleControl => self.ripple_control = Some(value),
        }
    }
}

struct Completion {
    on_done: Box<dyn FnOnce(bool) + Send>,
    ok: bool,
}

/// State shared between the session and its worker threads.
struct Inner {
    transport: Mutex<Option<Arc<Transport>>>,
    state: Mutex<Snapshot>,
    last_rx: Mutex<Option<Instant>>,
    pending: AtomicUsize,
}

/// The stateful driver session. Create once, inject where needed.
pub struct Session {
    inner: Arc<Inner>,
    completion_tx: Sender<Completion>,
    completion_rx: Receiver<Completion>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    pub fn new() -> Self {
        let (completion_tx, completion_rx) = channel();
        Self {
            inner: Arc::new(Inner {
                transport: Mutex::new(None),
                state: Mutex::new(Snapshot::default()),
                last_rx: Mutex::new(None),
                pending: AtomicUsize::new(0),
            }),
            completion_tx,
            completion_rx,
        }
    }

    // ----------------------------------------------------------------
    // Connection lifecycle
    // ----------------------------------------------------------------

    pub fn is_connected(&self) -> bool {
        self.inner.transport.lock().unwrap().is_some()
    }

    /// Path of the active device, if connected.
    pub fn connected_path(&self) -> Option<String> {
        self.inner
            .transport
            .lock()
            .unwrap()
            .as_ref()
            .map(|t| t.path().to_string())
    }

    /// Enumerate candidates and adopt the first one that answers a
    /// battery probe. No-op success when already connected; exhausting
    /// the candidate list returns false and leaves the session
    /// disconnected.
    pub fn auto_connect(&self) -> bool {
        if self.is_connected() {
            return true;
        }
        let entries = match discovery::list_devices() {
            Ok(entries) => entries,
            Err(e) => {
                warn!(error = %e, "device enumeration failed");
                return false;
            }
        };
        debug!(count = entries.len(), "probing candidate devices");
        for entry in entries {
            let transport = match Transport::open(&entry.path) {
                Ok(t) => t,
                Err(e) => {
                    debug!(path = %entry.path, error = %e, "open failed, skipping");
                    continue;
                }
            };
            if self.adopt_if_responding(transport) {
                return true;
            }
        }
        false
    }

    /// Probe pre-opened candidate transports in order, adopting the
    /// first responder. Same contract as [`Session::auto_connect`];
    /// also the seam tests use to connect against fakes.
    pub fn connect_candidates(&self, candidates: Vec<Transport>) -> bool {
        if self.is_connected() {
            return true;
        }
        for transport in candidates {
            if self.adopt_if_responding(transport) {
                return true;
            }
        }
        false
    }

    fn adopt_if_responding(&self, transport: Transport) -> bool {
        match transport.transceive(&command::read_battery(), op::BATTERY, PROBE_TIMEOUT) {
            Ok(rx) => {
                info!(path = %transport.path(), "mouse connected");
                let percent = rx[REPLY_DATA_OFFSET].min(100);
                *self.inner.transport.lock().unwrap() = Some(Arc::new(transport));
                *self.inner.last_rx.lock().unwrap() = Some(Instant::now());
                self.inner.state.lock().unwrap().battery_percent = Some(percent);
                true
            }
            Err(e) => {
                // Dropping the transport closes the handle.
                debug!(path = %transport.path(), error = %e, "probe failed");
                false
            }
        }
    }

    /// Close and drop the active transport, if any.
    pub fn disconnect(&self) {
        if self.inner.transport.lock().unwrap().take().is_some() {
            debug!("disconnected");
        }
    }

    /// Whether the mouse appears to be asleep: connected but silent for
    /// longer than [`SLEEP_TIMEOUT`]. Advisory; the session stays
    /// nominally connected.
    pub fn is_sleeping(&self) -> bool {
        if !self.is_connected() {
            return false;
        }
        match *self.inner.last_rx.lock().unwrap() {
            Some(at) => at.elapsed() > SLEEP_TIMEOUT,
            None => false,
        }
    }

    /// Clone of the cached state.
    pub fn snapshot(&self) -> Snapshot {
        self.inner.state.lock().unwrap().clone()
    }

    // ----------------------------------------------------------------
    // Synchronous reads
    // ----------------------------------------------------------------

    /// Read the battery percentage into the cache.
    pub fn read_battery(&self) -> Result<()> {
        self.inner.read_battery()
    }

    /// Read the active DPI level and its slot value into the cache.
    pub fn read_current_dpi(&self) -> Result<()> {
        self.inner.read_current_dpi()
    }

    /// Read and validate the polling-rate record into the cache.
    pub fn read_polling_rate(&self) -> Result<()> {
        self.inner.read_polling_rate()
    }

    /// Read one feature toggle into the cache.
    pub fn read_toggle(&self, toggle: Toggle) -> Result<()> {
        self.inner.read_toggle(toggle)
    }

    /// Read all three feature toggles. Each is independently fallible;
    /// the first error is returned after all have been attempted.
    pub fn read_toggles(&self) -> Result<()> {
        let mut first_err = None;
        for &toggle in Toggle::ALL {
            if let Err(e) = self.inner.read_toggle(toggle) {
                first_err.get_or_insert(e);
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Read the LED config block into the cache.
    pub fn read_led(&self) -> Result<()> {
        self.inner.read_led()
    }

    /// Read and validate the button-4 binding record into the cache.
    pub fn read_btn4_binding(&self) -> Result<()> {
        self.inner.read_btn4_binding()
    }

    /// Read the macro slot header (name, event count) and verify the
    /// event-region checksum, caching the result.
    pub fn read_btn4_macro_header(&self) -> Result<()> {
        self.inner.read_btn4_macro_header()
    }

    // ----------------------------------------------------------------
    // Asynchronous mutating operations
    // ----------------------------------------------------------------

    /// Write a DPI value (encoded to the device's hundreds scale,
    /// clamped to [100, 25500]).
    pub fn set_dpi_async(&self, dpi: u16, on_done: impl FnOnce(bool) + Send + 'static) {
        self.spawn("set-dpi", on_done, move |inner| inner.set_dpi(dpi));
    }

    pub fn set_polling_rate_async(
        &self,
        rate: PollingRate,
        on_done: impl FnOnce(bool) + Send + 'static,
    ) {
        self.spawn("set-rate", on_done, move |inner| inner.set_polling_rate(rate));
    }

    pub fn set_toggle_async(
        &self,
        toggle: Toggle,
        enabled: bool,
        on_done: impl FnOnce(bool) + Send + 'static,
    ) {
        self.spawn("set-toggle", on_done, move |inner| {
            inner.set_toggle(toggle, enabled)
        });
    }

    /// Set the LED mode (1–5) and, for the custom-color mode, the RGB
    /// color. Preserves speed and brightness via read-modify-write and
    /// issues the apply trigger as a second transaction.
    pub fn set_led_mode_color_async(
        &self,
        mode: u8,
        rgb: Option<(u8, u8, u8)>,
        on_done: impl FnOnce(bool) + Send + 'static,
    ) {
        self.spawn("set-led-mode", on_done, move |inner| {
            inner.set_led_mode_color(mode, rgb)
        });
    }

    /// Set LED brightness and/or speed on the reported 1–10 scale; an
    /// argument of 0 leaves that field unchanged.
    pub fn set_led_brightness_speed_async(
        &self,
        brightness: u8,
        speed: u8,
        on_done: impl FnOnce(bool) + Send + 'static,
    ) {
        self.spawn("set-led", on_done, move |inner| {
            inner.set_led_brightness_speed(brightness, speed)
        });
    }

    /// Bind physical button 4 to the macro slot.
    pub fn bind_btn4_macro_async(&self, on_done: impl FnOnce(bool) + Send + 'static) {
        self.spawn("bind-macro", on_done, |inner| inner.set_btn4_binding(true));
    }

    /// Unbind button 4 from the macro slot.
    pub fn unbind_btn4_macro_async(&self, on_done: impl FnOnce(bool) + Send + 'static) {
        self.spawn("unbind-macro", on_done, |inner| inner.set_btn4_binding(false));
    }

    /// Encode `text` as a macro record, stream it into the macro slot,
    /// then bind button 4 to it.
    ///
    /// A chunk failure aborts the stream and reports failure; the
    /// device flash may be left partially written (no rollback).
    pub fn program_btn4_macro_async(
        &self,
        name: &str,
        text: &str,
        press_delay_ms: u16,
        inter_key_delay_ms: u16,
        on_done: impl FnOnce(bool) + Send + 'static,
    ) {
        let name = name.to_string();
        let text = text.to_string();
        self.spawn("program-macro", on_done, move |inner| {
            inner.program_btn4_macro(&name, &text, press_delay_ms, inter_key_delay_ms)
        });
    }

    // ----------------------------------------------------------------
    // Completion delivery
    // ----------------------------------------------------------------

    /// Invoke completion callbacks for any finished async operations.
    /// Call from the owning thread/loop; returns how many were
    /// delivered.
    pub fn dispatch_completions(&self) -> usize {
        let mut delivered = 0;
        while let Ok(c) = self.completion_rx.try_recv() {
            (c.on_done)(c.ok);
            delivered += 1;
        }
        delivered
    }

    /// Block dispatching completions until no async operations remain
    /// in flight, or until `timeout` elapses. Returns true when idle.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            self.dispatch_completions();
            if self.inner.pending.load(Ordering::SeqCst) == 0 {
                // Workers send before decrementing, so a final drain
                // cannot miss a completion.
                self.dispatch_completions();
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            if let Ok(c) = self.completion_rx.recv_timeout(deadline - now) {
                (c.on_done)(c.ok);
            }
        }
    }

    /// One short-lived worker per call; no pool.
    fn spawn(
        &self,
        name: &'static str,
        on_done: impl FnOnce(bool) + Send + 'static,
        job: impl FnOnce(&Inner) -> Result<()> + Send + 'static,
    ) {
        let inner = Arc::clone(&self.inner);
        let tx = self.completion_tx.clone();
        inner.pending.fetch_add(1, Ordering::SeqCst);
        thread::spawn(move || {
            let ok = match job(&inner) {
                Ok(()) => true,
                Err(e) => {
                    warn!(op = name, error = %e, "async operation failed");
                    false
                }
            };
            let _ = tx.send(Completion {
                on_done: Box::new(on_done),
                ok,
            });
            inner.pending.fetch_sub(1, Ordering::SeqCst);
        });
    }
}

impl Inner {
    /// Run one transaction against the active transport.
    ///
    /// NoReply is a normal failure; any other transport error is fatal
    /// and drops the connection.
    fn transact(
        &self,
        tx: &[u8; FRAME_LEN],
        expect_op: u8,
        timeout: Duration,
    ) -> Result<[u8; FRAME_LEN]> {
        let transport = self
            .transport
            .lock()
            .unwrap()
            .clone()
            .ok_or(Error::NotConnected)?;
        match transport.transceive(tx, expect_op, timeout) {
            Ok(rx) => {
                *self.last_rx.lock().unwrap() = Some(Instant::now());
                Ok(rx)
            }
            Err(Error::NoReply) => Err(Error::NoReply),
            Err(e) => {
                warn!(error = %e, "fatal I/O failure, dropping connection");
                self.transport.lock().unwrap().take();
                Err(e)
            }
        }
    }

    /// Read `count` (≤ 10) bytes of flash at `addr`.
    fn read_flash(&self, addr: u16, count: usize) -> Result<Vec<u8>> {
        debug_assert!(count <= READ_CHUNK_MAX);
        let rx = self.transact(
            &command::read_flash(addr, count as u8),
            op::FLASH_READ,
            READ_TIMEOUT,
        )?;
        Ok(rx[REPLY_DATA_OFFSET..REPLY_DATA_OFFSET + count].to_vec())
    }

    /// Read an arbitrary span of flash as a sequence of ≤10-byte reads.
    fn read_flash_span(&self, addr: u16, len: usize) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(len);
        let mut offset = 0usize;
        while offset < len {
            let n = (len - offset).min(READ_CHUNK_MAX);
            out.extend_from_slice(&self.read_flash(addr + offset as u16, n)?);
            offset += n;
        }
        Ok(out)
    }

    fn checked_write(&self, addr: u16, data: &[u8]) -> Result<()> {
        let tx = command::checked_write(addr, data)?;
        self.transact(&tx, op::WRITE, WRITE_TIMEOUT)?;
        Ok(())
    }

    fn read_battery(&self) -> Result<()> {
        let rx = self.transact(&command::read_battery(), op::BATTERY, WRITE_TIMEOUT)?;
        let percent = rx[REPLY_DATA_OFFSET].min(100);
        self.state.lock().unwrap().battery_percent = Some(percent);
        Ok(())
    }

    fn read_current_dpi(&self) -> Result<()> {
        let level = self.read_flash(registers::DPI_LEVEL_SELECT_ADDR, 1)?[0] & 0x7F;
        let slot_addr =
            registers::DPI_LEVEL_BASE_ADDR + u16::from(level) * registers::DPI_LEVEL_STRIDE;
        let slot = self.read_flash(slot_addr, 3)?;
        self.state.lock().unwrap().dpi = Some(registers::raw_to_dpi(slot[0]));
        Ok(())
    }

    fn read_polling_rate(&self) -> Result<()> {
        let record = self.read_flash(registers::POLLING_RATE_ADDR, 2)?;
        let code = registers::decode_checked_byte(&record, "polling rate")?;
        // Unknown codes decode to "unknown" rather than failing.
        self.state.lock().unwrap().polling_rate = PollingRate::from_code(code);
        Ok(())
    }

    fn read_toggle(&self, toggle: Toggle) -> Result<()> {
        let record = self.read_flash(toggle.addr(), 2)?;
        let value = registers::decode_checked_byte(&record, toggle.label())?;
        self.state.lock().unwrap().set_toggle(toggle, value != 0);
        Ok(())
    }

    fn read_led(&self) -> Result<()> {
        let raw = self.read_flash(registers::LED_CONFIG_ADDR, 10)?;
        let cfg = LedConfig::decode(&raw)?;
        self.state.lock().unwrap().led = Some(LedState::from_config(&cfg));
        Ok(())
    }

    fn read_btn4_binding(&self) -> Result<()> {
        let record = self.read_flash(registers::BTN4_BINDING_ADDR, 4)?;
        let bound = registers::decode_btn4_binding(&record)?;
        self.state.lock().unwrap().btn4_macro_bound = Some(bound);
        Ok(())
    }

    fn read_btn4_macro_header(&self) -> Result<()> {
        let mut record = self.read_flash_span(registers::MACRO_SLOT0_ADDR, EVENTS_OFFSET)?;
        let event_count = record[EVENTS_OFFSET - 1] as usize;
        if event_count > MACRO_MAX_EVENTS {
            // Unprogrammed flash reads back 0xFF; no record present.
            return Err(Error::ChecksumMismatch {
                context: "macro record",
            });
        }
        let tail_len = macro_record::composed_len(event_count as u8) - EVENTS_OFFSET;
        let tail = self.read_flash_span(
            registers::MACRO_SLOT0_ADDR + EVENTS_OFFSET as u16,
            tail_len,
        )?;
        record.extend_from_slice(&tail);

        let header = macro_record::parse_header(&record).ok_or(Error::ChecksumMismatch {
            context: "macro record",
        })?;
        self.state.lock().unwrap().btn4_macro = Some(header);
        Ok(())
    }

    fn set_dpi(&self, dpi: u16) -> Result<()> {
        let raw = registers::dpi_to_raw(dpi);
        self.checked_write(registers::DPI_LEVEL_BASE_ADDR, &[raw, raw, 0x00])?;
        self.state.lock().unwrap().dpi = Some(registers::raw_to_dpi(raw));
        Ok(())
    }

    fn set_polling_rate(&self, rate: PollingRate) -> Result<()> {
        self.checked_write(registers::POLLING_RATE_ADDR, &[rate.code()])?;
        self.state.lock().unwrap().polling_rate = Some(rate);
        Ok(())
    }

    fn set_toggle(&self, toggle: Toggle, enabled: bool) -> Result<()> {
        self.checked_write(toggle.addr(), &[u8::from(enabled)])?;
        self.state.lock().unwrap().set_toggle(toggle, enabled);
        Ok(())
    }

    /// Fetch the current 6-byte LED config, apply `patch`, write it
    /// back, and fire the apply trigger. Both transactions must succeed.
    fn update_led(&self, patch: impl FnOnce(&mut LedConfig)) -> Result<()> {
        let raw = self.read_flash(registers::LED_CONFIG_ADDR, 10)?;
        let mut cfg = LedConfig::decode(&raw)?;
        patch(&mut cfg);
        self.checked_write(registers::LED_CONFIG_ADDR, &cfg.encode())?;
        self.checked_write(registers::LED_APPLY_ADDR, &[0x01])?;
        self.state.lock().unwrap().led = Some(LedState::from_config(&cfg));
        Ok(())
    }

    fn set_led_mode_color(&self, mode: u8, rgb: Option<(u8, u8, u8)>) -> Result<()> {
        let mode = mode.clamp(1, 5);
        self.update_led(|cfg| {
            cfg.mode = mode;
            if let Some((r, g, b)) = rgb {
                cfg.red = r;
                cfg.green = g;
                cfg.blue = b;
            }
        })
    }

    fn set_led_brightness_speed(&self, brightness: u8, speed: u8) -> Result<()> {
        self.update_led(|cfg| {
            if speed != 0 {
                cfg.speed = registers::led_raw_from_reported(speed);
            }
            if brightness != 0 {
                cfg.brightness = registers::led_raw_from_reported(brightness);
            }
        })
    }

    fn set_btn4_binding(&self, bound: bool) -> Result<()> {
        self.checked_write(
            registers::BTN4_BINDING_ADDR,
            &registers::encode_btn4_binding(bound),
        )?;
        self.state.lock().unwrap().btn4_macro_bound = Some(bound);
        Ok(())
    }

    fn program_btn4_macro(
        &self,
        name: &str,
        text: &str,
        press_delay_ms: u16,
        inter_key_delay_ms: u16,
    ) -> Result<()> {
        let record = macro_record::encode(name, text, press_delay_ms, inter_key_delay_ms);
        info!(
            events = record[EVENTS_OFFSET - 1],
            "programming macro slot 0"
        );

        for (index, chunk) in record.chunks(RAW_WRITE_MAX).enumerate() {
            let offset = index * RAW_WRITE_MAX;
            let tx = command::raw_write(registers::MACRO_SLOT0_ADDR + offset as u16, chunk)?;
            if let Err(e) = self.transact(&tx, op::WRITE, WRITE_TIMEOUT) {
                warn!(offset, error = %e, "macro chunk write failed, aborting");
                return Err(Error::PartialProgramming { offset });
            }
            thread::sleep(CHUNK_PACING);
        }

        self.set_btn4_binding(true)?;

        let mut state = self.state.lock().unwrap();
        state.btn4_macro = macro_record::parse_header(&record);
        Ok(())
    }
}
