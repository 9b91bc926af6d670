//! ragnokctl: command-line configuration tool for the Ragnok mouse.

use std::sync::mpsc::channel;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::debug;

use ragnok_core::registers::{PollingRate, Toggle};
use ragnok_core::session::Session;

/// Generous bound on how long one queued operation may take; macro
/// programming streams 39 paced chunks and is the slowest.
const OP_DEADLINE: Duration = Duration::from_secs(30);

#[derive(Parser)]
#[command(
    name = "ragnokctl",
    version,
    about = "Open-source Ragnok mouse configuration"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List candidate HID devices.
    ListDevices {
        /// Emit machine-readable JSON.
        #[arg(long)]
        json: bool,
    },
    /// Read and display the full device status.
    Status {
        /// Emit machine-readable JSON.
        #[arg(long)]
        json: bool,
    },
    /// Set DPI (100-25500, rounded to the nearest 100).
    SetDpi {
        /// DPI value to set.
        value: u16,
    },
    /// Set polling rate (125, 250, 500, or 1000 Hz).
    SetRate {
        /// Polling rate in Hz.
        value: u16,
    },
    /// Switch a feature toggle on or off.
    Toggle {
        /// Toggle name: motion-sync, angle-snap, or ripple-control.
        name: String,
        /// New state: on or off.
        state: String,
    },
    /// Set the lighting mode, optionally with a custom color.
    SetLedMode {
        /// Lighting mode, 1-5. Mode 2 honors the custom color.
        mode: u8,
        /// Custom color as RRGGBB hex.
        #[arg(long)]
        color: Option<String>,
    },
    /// Adjust LED brightness and/or effect speed (1-10).
    SetLed {
        #[arg(long, default_value_t = 0)]
        brightness: u8,
        #[arg(long, default_value_t = 0)]
        speed: u8,
    },
    /// Bind physical button 4 to the stored macro.
    BindMacro,
    /// Restore button 4 to its default function.
    UnbindMacro,
    /// Program a typed-text macro into the device and bind button 4 to it.
    ProgramMacro {
        /// Text the macro types (up to 35 mapped characters).
        text: String,
        /// Stored macro name.
        #[arg(long, default_value = "ragnokctl macro")]
        name: String,
        /// Delay in ms between key press and release.
        #[arg(long, default_value_t = 20)]
        press_delay: u16,
        /// Delay in ms between consecutive keys.
        #[arg(long, default_value_t = 30)]
        key_delay: u16,
    },
    /// Show the macro currently stored in the device.
    MacroInfo {
        /// Emit machine-readable JSON.
        #[arg(long)]
        json: bool,
    },
}

fn connect() -> Result<Session> {
    let session = Session::new();
    if !session.auto_connect() {
        bail!("no responding Ragnok mouse found (is it connected and awake?)");
    }
    debug!(path = ?session.connected_path(), "session established");
    Ok(session)
}

/// Queue one async operation via `start` and block until its callback
/// reports the outcome.
fn run_async(session: &Session, start: impl FnOnce(Box<dyn FnOnce(bool) + Send>)) -> Result<()> {
    let (tx, rx) = channel();
    start(Box::new(move |ok| {
        let _ = tx.send(ok);
    }));
    if !session.wait_idle(OP_DEADLINE) {
        bail!("operation did not complete in time");
    }
    match rx.try_recv() {
        Ok(true) => Ok(()),
        _ => bail!("the device rejected or did not acknowledge the operation"),
    }
}

fn parse_color(hex: &str) -> Result<(u8, u8, u8)> {
    let hex = hex.trim_start_matches('#');
    if hex.len() != 6 {
        bail!("color must be RRGGBB hex, got '{hex}'");
    }
    let byte = |range| {
        u8::from_str_radix(&hex[range], 16).with_context(|| format!("invalid hex color '{hex}'"))
    };
    Ok((byte(0..2)?, byte(2..4)?, byte(4..6)?))
}

fn opt<T: std::fmt::Display>(value: Option<T>) -> String {
    match value {
        Some(v) => v.to_string(),
        None => "unknown".to_string(),
    }
}

fn print_status(session: &Session, json: bool) -> Result<()> {
    // Each read is independently fallible; a corrupt or silent register
    // shows as unknown instead of aborting the whole status.
    let _ = session.read_battery();
    let _ = session.read_current_dpi();
    let _ = session.read_polling_rate();
    let _ = session.read_toggles();
    let _ = session.read_led();
    let _ = session.read_btn4_binding();

    let snap = session.snapshot();
    if json {
        println!("{}", serde_json::to_string_pretty(&snap)?);
        return Ok(());
    }

    println!("Device: {}", opt(session.connected_path()));
    println!("Battery: {}", opt(snap.battery_percent.map(|p| format!("{p}%"))));
    println!("DPI: {}", opt(snap.dpi));
    println!("Polling rate: {}", opt(snap.polling_rate));
    println!("Motion sync: {}", opt(snap.motion_sync.map(on_off)));
    println!("Angle snap: {}", opt(snap.angle_snap.map(on_off)));
    println!("Ripple control: {}", opt(snap.ripple_control.map(on_off)));
    match snap.led {
        Some(led) => println!(
            "LED: mode {} color #{:02X}{:02X}{:02X} brightness {}/10 speed {}/10",
            led.mode, led.red, led.green, led.blue, led.brightness, led.speed
        ),
        None => println!("LED: unknown"),
    }
    println!(
        "Button 4 macro: {}",
        opt(snap.btn4_macro_bound.map(|b| if b { "bound" } else { "not bound" }))
    );
    Ok(())
}

fn on_off(enabled: bool) -> &'static str {
    if enabled {
        "on"
    } else {
        "off"
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::ListDevices { json } => {
            let devices = ragnok_core::discovery::list_devices()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&devices)?);
            } else if devices.is_empty() {
                println!("No HID devices found.");
            } else {
                for dev in &devices {
                    let name = if dev.name.is_empty() {
                        "(unnamed)"
                    } else {
                        &dev.name
                    };
                    println!("{}  {}", dev.path, name);
                }
            }
        }
        Commands::Status { json } => {
            let session = connect()?;
            print_status(&session, json)?;
        }
        Commands::SetDpi { value } => {
            if !(100..=25500).contains(&value) {
                bail!("DPI must be between 100 and 25500");
            }
            let session = connect()?;
            run_async(&session, |done| session.set_dpi_async(value, done))?;
            let applied = session.snapshot().dpi.unwrap_or(value);
            println!("DPI set to {applied}");
        }
        Commands::SetRate { value } => {
            let rate = PollingRate::from_hz(value)
                .with_context(|| format!("unsupported rate {value} Hz (use 125/250/500/1000)"))?;
            let session = connect()?;
            run_async(&session, |done| session.set_polling_rate_async(rate, done))?;
            println!("Polling rate set to {rate}");
        }
        Commands::Toggle { name, state } => {
            let toggle = Toggle::from_name(&name).with_context(|| {
                format!("unknown toggle '{name}' (use motion-sync, angle-snap, or ripple-control)")
            })?;
            let enabled = match state.to_lowercase().as_str() {
                "on" | "true" | "1" => true,
                "off" | "false" | "0" => false,
                other => bail!("state must be 'on' or 'off', got '{other}'"),
            };
            let session = connect()?;
            run_async(&session, |done| {
                session.set_toggle_async(toggle, enabled, done)
            })?;
            println!("{toggle} switched {}", on_off(enabled));
        }
        Commands::SetLedMode { mode, color } => {
            if !(1..=5).contains(&mode) {
                bail!("LED mode must be between 1 and 5");
            }
            let rgb = color.as_deref().map(parse_color).transpose()?;
            let session = connect()?;
            run_async(&session, |done| {
                session.set_led_mode_color_async(mode, rgb, done)
            })?;
            println!("LED mode set to {mode}");
        }
        Commands::SetLed { brightness, speed } => {
            if brightness == 0 && speed == 0 {
                bail!("give at least one of --brightness or --speed (1-10)");
            }
            if brightness > 10 || speed > 10 {
                bail!("brightness and speed are 1-10");
            }
            let session = connect()?;
            run_async(&session, |done| {
                session.set_led_brightness_speed_async(brightness, speed, done)
            })?;
            println!("LED settings applied");
        }
        Commands::BindMacro => {
            let session = connect()?;
            run_async(&session, |done| session.bind_btn4_macro_async(done))?;
            println!("Button 4 bound to the stored macro");
        }
        Commands::UnbindMacro => {
            let session = connect()?;
            run_async(&session, |done| session.unbind_btn4_macro_async(done))?;
            println!("Button 4 restored to its default function");
        }
        Commands::ProgramMacro {
            text,
            name,
            press_delay,
            key_delay,
        } => {
            let session = connect()?;
            run_async(&session, |done| {
                session.program_btn4_macro_async(&name, &text, press_delay, key_delay, done)
            })?;
            println!("Macro '{name}' programmed and bound to button 4");
        }
        Commands::MacroInfo { json } => {
            let session = connect()?;
            session
                .read_btn4_macro_header()
                .context("no valid macro record in the device")?;
            let _ = session.read_btn4_binding();
            let snap = session.snapshot();
            if json {
                println!("{}", serde_json::to_string_pretty(&snap.btn4_macro)?);
            } else if let Some(header) = snap.btn4_macro {
                println!("Name: {}", header.name);
                println!("Events: {}", header.event_count);
                println!(
                    "Checksum: {}",
                    if header.checksum_ok { "ok" } else { "INVALID" }
                );
                println!(
                    "Button 4: {}",
                    opt(snap
                        .btn4_macro_bound
                        .map(|b| if b { "bound" } else { "not bound" }))
                );
            }
        }
    }

    Ok(())
}
