//! Integration tests: exercise the full flow against a simulated mouse.
//!
//! These tests register every expected request/reply exchange on a fake
//! HID handle, connect a session to it, and then drive the complete
//! read→decode→cache and encode→write→ack pipeline through multiple
//! modules at once.

#[cfg(test)]
mod tests {
    use std::sync::mpsc::channel;
    use std::time::Duration;

    use crate::command::{self, op, RAW_WRITE_MAX};
    use crate::frame::checksum;
    use crate::macro_record;
    use crate::registers::{self, PollingRate, Toggle};
    use crate::session::Session;
    use crate::transport::mock::{
        expect_checked_write, expect_flash_read, reply_frame, FakeHid,
    };
    use crate::transport::Transport;

    const IDLE: Duration = Duration::from_secs(10);

    /// A fake mouse with the probe exchange and a plausible full set of
    /// register contents registered.
    fn simulated_mouse() -> FakeHid {
        let fake = FakeHid::new();

        // Battery probe during connect, then one explicit read
        fake.on_request(
            &command::read_battery(),
            &reply_frame(op::BATTERY, &[91]),
        );
        fake.on_request(
            &command::read_battery(),
            &reply_frame(op::BATTERY, &[88]),
        );

        // Active DPI level 1 → slot at 0x0010, raw 16 = 1600 DPI
        expect_flash_read(&fake, registers::DPI_LEVEL_SELECT_ADDR, &[0x01]);
        expect_flash_read(&fake, 0x0010, &[16, 16, 0]);

        // 1000 Hz polling
        expect_flash_read(
            &fake,
            registers::POLLING_RATE_ADDR,
            &[0x04, checksum(&[0x04])],
        );

        // Toggles: motion sync on, angle snap off, ripple control off
        expect_flash_read(&fake, registers::MOTION_SYNC_ADDR, &[1, checksum(&[1])]);
        expect_flash_read(&fake, registers::ANGLE_SNAP_ADDR, &[0, checksum(&[0])]);
        expect_flash_read(
            &fake,
            registers::RIPPLE_CONTROL_ADDR,
            &[0, checksum(&[0])],
        );

        // LED: mode 2, orange, speed raw 3, brightness raw 9
        expect_flash_read(
            &fake,
            registers::LED_CONFIG_ADDR,
            &[2, 0xFF, 0x80, 0x00, 3, 9, 0, 0, 0, 0],
        );

        // Button 4 bound to the macro slot
        let body = registers::encode_btn4_binding(true);
        let mut record = body.to_vec();
        record.push(checksum(&body));
        expect_flash_read(&fake, registers::BTN4_BINDING_ADDR, &record);

        fake
    }

    fn connect(fake: &FakeHid) -> Session {
        let session = Session::new();
        let transport = Transport::from_raw(Box::new(fake.clone()), "/dev/hidraw3");
        assert!(session.connect_candidates(vec![transport]));
        session
    }

    /// Full status poll: every register read lands in the snapshot.
    #[test]
    fn full_status_poll() {
        let fake = simulated_mouse();
        let session = connect(&fake);

        session.read_battery().unwrap();
        session.read_current_dpi().unwrap();
        session.read_polling_rate().unwrap();
        session.read_toggles().unwrap();
        session.read_led().unwrap();
        session.read_btn4_binding().unwrap();

        let snap = session.snapshot();
        assert_eq!(snap.battery_percent, Some(88));
        assert_eq!(snap.dpi, Some(1600));
        assert_eq!(snap.polling_rate, Some(PollingRate::Hz1000));
        assert_eq!(snap.motion_sync, Some(true));
        assert_eq!(snap.angle_snap, Some(false));
        assert_eq!(snap.ripple_control, Some(false));
        let led = snap.led.unwrap();
        assert_eq!(led.mode, 2);
        assert_eq!((led.red, led.green, led.blue), (0xFF, 0x80, 0x00));
        assert_eq!(led.speed, 4);
        assert_eq!(led.brightness, 10);
        assert_eq!(snap.btn4_macro_bound, Some(true));
    }

    /// A batch of queued async writes all complete and update the cache.
    #[test]
    fn batched_async_writes() {
        let fake = simulated_mouse();
        let session = connect(&fake);

        expect_checked_write(&fake, registers::DPI_LEVEL_BASE_ADDR, &[32, 32, 0]);
        expect_checked_write(&fake, registers::POLLING_RATE_ADDR, &[0x03]);
        expect_checked_write(&fake, registers::ANGLE_SNAP_ADDR, &[1]);

        let (tx, rx) = channel();
        let tx_dpi = tx.clone();
        session.set_dpi_async(3200, move |ok| {
            let _ = tx_dpi.send(("dpi", ok));
        });
        let tx_rate = tx.clone();
        session.set_polling_rate_async(PollingRate::Hz500, move |ok| {
            let _ = tx_rate.send(("rate", ok));
        });
        session.set_toggle_async(Toggle::AngleSnap, true, move |ok| {
            let _ = tx.send(("toggle", ok));
        });

        assert!(session.wait_idle(IDLE));
        let mut outcomes: Vec<(&str, bool)> = rx.try_iter().collect();
        outcomes.sort();
        assert_eq!(
            outcomes,
            vec![("dpi", true), ("rate", true), ("toggle", true)]
        );

        let snap = session.snapshot();
        assert_eq!(snap.dpi, Some(3200));
        assert_eq!(snap.polling_rate, Some(PollingRate::Hz500));
        assert_eq!(snap.angle_snap, Some(true));
    }

    /// Program a macro, bind it, and read the header back out of flash.
    #[test]
    fn macro_program_then_read_back() {
        let fake = simulated_mouse();
        let session = connect(&fake);

        let name = "hello-world";
        let text = "Hello, world!";
        let record = macro_record::encode(name, text, 15, 25);

        for (index, chunk) in record.chunks(RAW_WRITE_MAX).enumerate() {
            let addr = registers::MACRO_SLOT0_ADDR + (index * RAW_WRITE_MAX) as u16;
            let req = command::raw_write(addr, chunk).unwrap();
            fake.on_request(&req, &reply_frame(op::WRITE, &[]));
        }
        expect_checked_write(
            &fake,
            registers::BTN4_BINDING_ADDR,
            &registers::encode_btn4_binding(true),
        );

        let (tx, rx) = channel();
        session.program_btn4_macro_async(name, text, 15, 25, move |ok| {
            let _ = tx.send(ok);
        });
        assert!(session.wait_idle(IDLE));
        assert!(rx.try_recv().unwrap());

        // Now serve the written record back as chunked flash reads
        let total = macro_record::composed_len(record[31]);
        let mut offset = 0usize;
        while offset < total {
            let n = if offset < 32 {
                (32 - offset).min(10)
            } else {
                (total - offset).min(10)
            };
            expect_flash_read(
                &fake,
                registers::MACRO_SLOT0_ADDR + offset as u16,
                &record[offset..offset + n],
            );
            offset += n;
        }

        session.read_btn4_macro_header().unwrap();
        let header = session.snapshot().btn4_macro.unwrap();
        assert_eq!(header.name, name);
        // 13 characters, all mapped: 26 events
        assert_eq!(header.event_count, 26);
        assert!(header.checksum_ok);
    }

    /// Sequence: unbind, verify, rebind.
    #[test]
    fn unbind_then_rebind() {
        let fake = simulated_mouse();
        let session = connect(&fake);

        expect_checked_write(
            &fake,
            registers::BTN4_BINDING_ADDR,
            &registers::encode_btn4_binding(false),
        );
        expect_checked_write(
            &fake,
            registers::BTN4_BINDING_ADDR,
            &registers::encode_btn4_binding(true),
        );

        let (tx, rx) = channel();
        let tx2 = tx.clone();
        session.unbind_btn4_macro_async(move |ok| {
            let _ = tx2.send(ok);
        });
        assert!(session.wait_idle(IDLE));
        assert!(rx.try_recv().unwrap());
        assert_eq!(session.snapshot().btn4_macro_bound, Some(false));

        session.bind_btn4_macro_async(move |ok| {
            let _ = tx.send(ok);
        });
        assert!(session.wait_idle(IDLE));
        assert!(rx.try_recv().unwrap());
        assert_eq!(session.snapshot().btn4_macro_bound, Some(true));
    }

    /// An unresponsive device fails cleanly: the set reports failure,
    /// the session stays connected, and the cache keeps prior values.
    #[test]
    fn unacknowledged_write_reports_failure() {
        let fake = simulated_mouse();
        let session = connect(&fake);
        session.read_current_dpi().unwrap();
        assert_eq!(session.snapshot().dpi, Some(1600));

        // No ack registered for the DPI write
        let (tx, rx) = channel();
        session.set_dpi_async(800, move |ok| {
            let _ = tx.send(ok);
        });
        assert!(session.wait_idle(IDLE));
        assert!(!rx.try_recv().unwrap());

        assert!(session.is_connected());
        assert_eq!(session.snapshot().dpi, Some(1600));
    }
}
