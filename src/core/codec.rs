//! Tokio codec that turns a byte stream into frames.
//!
//! TCP gives no message boundaries, so a frame may arrive in any number of
//! reads, and one read may hold several frames. `Framed` keeps unconsumed
//! bytes in its `BytesMut` between calls; this decoder only ever advances the
//! buffer past bytes it has fully judged.

use bytes::{Buf, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::config::MAX_PAYLOAD_SIZE;
use crate::core::frame::{self, Decoded, Frame, FrameFault, HEADER_LEN};
use crate::error::{ProtocolError, Result};

/// Most the decoder pre-allocates for a payload that has not arrived yet.
pub const RESERVE_CHUNK: usize = 64 * 1024;

/// Item produced by [`FrameCodec`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// A complete, checksum-verified frame.
    Frame(Frame),
    /// Bytes that were discarded; the connection stays open.
    Dropped(FrameFault),
}

#[derive(Debug, Clone, Copy)]
pub struct FrameCodec {
    max_payload_size: usize,
}

impl FrameCodec {
    pub fn new(max_payload_size: usize) -> Self {
        Self { max_payload_size }
    }

    pub fn max_payload_size(&self) -> usize {
        self.max_payload_size
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new(MAX_PAYLOAD_SIZE)
    }
}

impl Decoder for FrameCodec {
    type Item = Inbound;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        if let Some(len) = frame::declared_payload_len(src) {
            if len > self.max_payload_size {
                return Err(ProtocolError::OversizedPacket(len));
            }
            // Grow ahead of the payload, but never by more than one chunk on
            // the strength of an unauthenticated header alone
            let missing = (HEADER_LEN + len).saturating_sub(src.len());
            src.reserve(missing.min(RESERVE_CHUNK));
        }

        match frame::try_decode(src) {
            Decoded::Frame { frame, consumed } => {
                src.advance(consumed);
                Ok(Some(Inbound::Frame(frame)))
            }
            Decoded::Incomplete => Ok(None),
            Decoded::Invalid { fault, consumed } => {
                src.advance(consumed);
                Ok(Some(Inbound::Dropped(fault)))
            }
        }
    }
}

impl Encoder<Frame> for FrameCodec {
    type Error = ProtocolError;

    fn encode(&mut self, item: Frame, dst: &mut BytesMut) -> Result<()> {
        if item.payload.len() > self.max_payload_size {
            return Err(ProtocolError::OversizedPacket(item.payload.len()));
        }
        item.encode_into(dst)
    }
}
