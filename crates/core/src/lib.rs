//! ragnok-core: wire protocol, device discovery, and configuration
//! driver for the Ragnok wireless gaming mouse.
//!
//! This crate provides the cross-platform core logic for reading and
//! writing the mouse's flash-resident configuration over its raw HID
//! channel: framing, the command vocabulary, the register map, macro
//! records, and a stateful [`session::Session`] on top.

pub mod command;
pub mod discovery;
pub mod error;
pub mod frame;
#[cfg(test)]
mod integration_tests;
pub mod macro_record;
pub mod registers;
pub mod session;
pub mod transport;
