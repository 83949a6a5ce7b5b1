//! # Core Protocol Components
//!
//! Low-level frame handling, the stream codec and payload encodings.
//!
//! ## Components
//! - **Frame**: header layout, command bytes, checksum, pure decoding
//! - **Codec**: Tokio codec for framing over byte streams
//! - **Heights**: variable-length big-endian height counters
//! - **Version**: the `version` handshake payload
//!
//! ## Wire Format
//! ```text
//! [Magic(4)] [Command(1)] [Length(4)] [Checksum(4)] [Payload(N)]
//! ```
//!
//! ## Safety Limits
//! - Declared payload length is checked against the configured maximum before
//!   the buffer grows
//! - Frames with a bad checksum or unknown command are skipped, not fatal

pub mod codec;
pub mod frame;
pub mod heights;
pub mod version;
