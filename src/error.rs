//! # Error Types
//!
//! Error handling for the peer transport core.
//!
//! This module defines every error variant that can occur while framing,
//! handshaking or searching for proof-of-work nonces.
//!
//! ## Error Categories
//! - **I/O Errors**: socket and file system failures
//! - **Framing Errors**: bad magic, checksum mismatches, oversized frames
//! - **Handshake Errors**: short or malformed version payloads, clock skew,
//!   self-connections, timeouts
//! - **Proof-of-Work Errors**: invalid difficulty, exhausted nonce space,
//!   crashed workers
//!
//! Frame faults that leave the connection open are reported by the codec as
//! [`crate::core::codec::Inbound::Dropped`] rather than as errors.
//!
//! ## Example Usage
//! ```rust
//! use speak_protocol::error::{ProtocolError, Result};
//! use speak_protocol::core::version::VersionPayload;
//! use tracing::warn;
//!
//! fn parse(bytes: &[u8]) -> Result<VersionPayload> {
//!     VersionPayload::decode(bytes)
//! }
//!
//! match parse(&[0u8; 4]) {
//!     Err(ProtocolError::VersionTooShort(len)) => warn!(len, "short version payload"),
//!     other => panic!("unexpected: {other:?}"),
//! }
//! ```

use std::io;
use thiserror::Error;

/// Error message constants to reduce allocations in error paths.
pub mod constants {
    /// Dispatcher-related error messages
    pub const ERR_DISPATCHER_WRITE_LOCK: &str = "Failed to acquire write lock on dispatcher";
    pub const ERR_DISPATCHER_READ_LOCK: &str = "Failed to acquire read lock on dispatcher";

    /// Registry and cache errors
    pub const ERR_LOCK_POISONED: &str = "Synchronization primitive poisoned";

    /// Handshake-specific errors
    pub const ERR_SYSTEM_TIME: &str = "System time error: time went backwards";
    pub const ERR_UNEXPECTED_VERSION: &str = "Version received after handshake completed";
    pub const ERR_UNEXPECTED_VERSIONACK: &str = "Versionack received by inbound session";

    /// Height codec errors
    pub const ERR_HEIGHT_PREFIX_MISSING: &str = "Height length prefix past end of payload";
    pub const ERR_HEIGHT_TRUNCATED: &str = "Height magnitude truncated";
    pub const ERR_HEIGHT_TOO_LONG: &str = "Height magnitude longer than 255 bytes";
    pub const ERR_TRAILING_BYTES: &str = "Trailing bytes after data heights";

    /// Proof-of-work errors
    pub const ERR_WORKER_PANICKED: &str = "Proof-of-work worker panicked";
    pub const ERR_BLOCKING_TASK: &str = "Proof-of-work blocking task failed";
    pub const ERR_HMAC_KEY: &str = "HMAC rejected nonce key";
}

/// Primary error type for all transport and proof-of-work operations
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Checksum mismatch: expected {expected:02x?}, got {actual:02x?}")]
    ChecksumMismatch { expected: [u8; 4], actual: [u8; 4] },

    #[error("Unknown command byte: 0x{0:02x}")]
    UnknownCommand(u8),

    #[error("Packet too large: {0} bytes")]
    OversizedPacket(usize),

    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    #[error("Version payload too short: {0} bytes")]
    VersionTooShort(usize),

    #[error("Clock skew of {0} seconds exceeds limit")]
    ClockSkew(i64),

    #[error("Connection to self detected")]
    SelfConnection,

    #[error("Unexpected message type")]
    UnexpectedMessage,

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Connection timed out (no activity)")]
    ConnectionTimeout,

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Difficulty must be greater than zero")]
    InvalidDifficulty,

    #[error("Nonce space exhausted without a solution")]
    PowExhausted,

    #[error("Proof-of-work worker failed: {0}")]
    PowWorkerFailed(String),

    #[error("Proof-of-work search cancelled")]
    PowCancelled,

    #[error("Custom error: {0}")]
    Custom(String),
}

/// Type alias for Results using ProtocolError
pub type Result<T> = std::result::Result<T, ProtocolError>;
