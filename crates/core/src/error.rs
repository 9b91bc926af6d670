//! Error types for ragnok-core.

use thiserror::Error;

/// Core library error type.
#[derive(Debug, Error)]
pub enum Error {
    /// HID device I/O failure (device vanished, permission denied, ...).
    ///
    /// Fatal for the current connection: the session drops to
    /// Disconnected and the caller must re-run auto-connect.
    #[error("HID error: {0}")]
    Hid(String),

    /// Operation attempted without an active connection. No I/O is
    /// performed.
    #[error("not connected")]
    NotConnected,

    /// Transaction timed out without a matching valid reply frame.
    ///
    /// A normal failure outcome, not fatal for the connection.
    #[error("no reply from device")]
    NoReply,

    /// A record's inline checksum did not validate.
    ///
    /// Local to the affected read; the cached field keeps its prior
    /// value.
    #[error("checksum mismatch in {context}")]
    ChecksumMismatch { context: &'static str },

    /// Frame payload had the wrong length for packing.
    #[error("invalid payload length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    /// Write data exceeded the wire limit for its write style.
    /// Rejected before any I/O.
    #[error("payload too large: {actual} bytes (limit {limit})")]
    PayloadTooLarge { limit: usize, actual: usize },

    /// A macro chunk write failed mid-stream at the given byte offset.
    ///
    /// The device flash may be left partially written; there is no
    /// rollback or resume.
    #[error("macro programming failed at chunk offset {offset}")]
    PartialProgramming { offset: usize },
}

/// Convenience Result alias.
pub type Result<T> = std::result::Result<T, Error>;
