//! Wire frame: a fixed 13-byte header followed by the payload.
//!
//! ```text
//! offset  size  field
//! 0       4     magic, big-endian 0xD6EE2BE9
//! 4       1     command byte
//! 5       4     payload length, big-endian
//! 9       4     first 4 bytes of SHA-256(payload)
//! 13      N     payload
//! ```

use bytes::{BufMut, BytesMut};
use sha2::{Digest, Sha256};
use std::fmt;

use crate::error::{ProtocolError, Result};

/// Magic number opening every frame.
pub const MAGIC: u32 = 0xD6EE_2BE9;

/// Magic number as it appears on the wire.
pub const MAGIC_BYTES: [u8; 4] = MAGIC.to_be_bytes();

/// Size of the fixed frame header.
pub const HEADER_LEN: usize = 13;

const COMMAND_OFFSET: usize = 4;
const LENGTH_OFFSET: usize = 5;
const CHECKSUM_OFFSET: usize = 9;

/// Command byte carried in the frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Command {
    Version = 0x01,
    VersionAck = 0x02,
    Addresses = 0x03,
    Inventory = 0x04,
    GetData = 0x05,
}

impl Command {
    /// Wire name, used in logs.
    pub fn name(self) -> &'static str {
        match self {
            Command::Version => "version",
            Command::VersionAck => "versionack",
            Command::Addresses => "addresses",
            Command::Inventory => "inventory",
            Command::GetData => "getdata",
        }
    }
}

impl TryFrom<u8> for Command {
    type Error = u8;

    fn try_from(byte: u8) -> std::result::Result<Self, u8> {
        match byte {
            0x01 => Ok(Command::Version),
            0x02 => Ok(Command::VersionAck),
            0x03 => Ok(Command::Addresses),
            0x04 => Ok(Command::Inventory),
            0x05 => Ok(Command::GetData),
            other => Err(other),
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One complete protocol message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub command: Command,
    pub payload: Vec<u8>,
}

impl Frame {
    pub fn new(command: Command, payload: Vec<u8>) -> Self {
        Self { command, payload }
    }

    /// A `versionack` frame (always empty).
    pub fn version_ack() -> Self {
        Self::new(Command::VersionAck, Vec::new())
    }

    /// Total encoded size, header included.
    pub fn encoded_len(&self) -> usize {
        HEADER_LEN + self.payload.len()
    }

    /// Append the encoded frame to `dst`.
    ///
    /// Fails with `OversizedPacket` when the payload length does not fit the
    /// 32-bit length field; `dst` is left untouched in that case.
    pub fn encode_into(&self, dst: &mut BytesMut) -> Result<()> {
        let len = length_field(self.payload.len())?;
        dst.reserve(self.encoded_len());
        dst.put_u32(MAGIC);
        dst.put_u8(self.command as u8);
        dst.put_u32(len);
        dst.put_slice(&checksum(&self.payload));
        dst.put_slice(&self.payload);
        Ok(())
    }

    /// Encode into a fresh buffer.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        self.encode_into(&mut buf)?;
        Ok(buf.to_vec())
    }
}

/// Payload length as it goes on the wire.
fn length_field(len: usize) -> Result<u32> {
    u32::try_from(len).map_err(|_| ProtocolError::OversizedPacket(len))
}

/// First four bytes of SHA-256 over `payload`.
pub fn checksum(payload: &[u8]) -> [u8; 4] {
    let digest = Sha256::digest(payload);
    let mut out = [0u8; 4];
    out.copy_from_slice(&digest[..4]);
    out
}

/// Why a frame was discarded. None of these close the connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameFault {
    /// Magic number did not match; `skipped` bytes were discarded to resync.
    BadHeader { skipped: usize },
    ChecksumMismatch { expected: [u8; 4], actual: [u8; 4] },
    UnknownCommand(u8),
}

impl fmt::Display for FrameFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameFault::BadHeader { skipped } => {
                write!(f, "invalid header ({skipped} bytes skipped)")
            }
            FrameFault::ChecksumMismatch { .. } => f.write_str("corrupted or missing data"),
            FrameFault::UnknownCommand(byte) => write!(f, "invalid command (0x{byte:02x})"),
        }
    }
}

/// Outcome of [`try_decode`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded {
    /// A verified frame occupying the first `consumed` bytes.
    Frame { frame: Frame, consumed: usize },
    /// More bytes are needed; nothing may be discarded.
    Incomplete,
    /// The first `consumed` bytes must be discarded.
    Invalid { fault: FrameFault, consumed: usize },
}

/// Declared payload length, if a full header with valid magic is buffered.
pub fn declared_payload_len(buf: &[u8]) -> Option<usize> {
    if buf.len() < HEADER_LEN || buf[..4] != MAGIC_BYTES {
        return None;
    }
    let mut len = [0u8; 4];
    len.copy_from_slice(&buf[LENGTH_OFFSET..LENGTH_OFFSET + 4]);
    Some(u32::from_be_bytes(len) as usize)
}

/// Try to take one frame off the front of `buf`.
pub fn try_decode(buf: &[u8]) -> Decoded {
    let magic_checked = buf.len().min(MAGIC_BYTES.len());
    if buf[..magic_checked] != MAGIC_BYTES[..magic_checked] {
        let skipped = resync_offset(buf);
        return Decoded::Invalid {
            fault: FrameFault::BadHeader { skipped },
            consumed: skipped,
        };
    }

    let payload_len = match declared_payload_len(buf) {
        Some(len) => len,
        None => return Decoded::Incomplete,
    };
    let total = HEADER_LEN + payload_len;
    if buf.len() < total {
        return Decoded::Incomplete;
    }

    let command_byte = buf[COMMAND_OFFSET];
    let command = match Command::try_from(command_byte) {
        Ok(command) => command,
        Err(byte) => {
            return Decoded::Invalid {
                fault: FrameFault::UnknownCommand(byte),
                consumed: total,
            }
        }
    };

    let payload = &buf[HEADER_LEN..total];
    let mut expected = [0u8; 4];
    expected.copy_from_slice(&buf[CHECKSUM_OFFSET..HEADER_LEN]);
    let actual = checksum(payload);
    if actual != expected {
        return Decoded::Invalid {
            fault: FrameFault::ChecksumMismatch { expected, actual },
            consumed: total,
        };
    }

    Decoded::Frame {
        frame: Frame::new(command, payload.to_vec()),
        consumed: total,
    }
}

/// Bytes to discard so the buffer starts at the next possible magic number.
///
/// Searches from offset 1; a trailing partial magic prefix is kept.
fn resync_offset(buf: &[u8]) -> usize {
    (1..buf.len())
        .find(|&start| {
            let tail = &buf[start..];
            let n = tail.len().min(MAGIC_BYTES.len());
            tail[..n] == MAGIC_BYTES[..n]
        })
        .unwrap_or(buf.len())
}
