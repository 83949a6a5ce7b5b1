//! `version` payload: software version, clock, connection nonce and,
//! optionally, the sender's data heights.
//!
//! ```text
//! [major][minor][patch][revision] [unix_time u32 BE] [nonce 4]
//! [len][users] [len][submissions] [len][comments] [len][votes] [len][messages]
//! ```

use std::fmt;

use rand::Rng;
use tracing::warn;

use crate::core::frame::{Command, Frame};
use crate::core::heights::DataHeights;
use crate::error::{constants, ProtocolError, Result};

/// Size of the fixed part of a version payload.
pub const MIN_VERSION_PAYLOAD: usize = 12;

/// Smallest payload that carries data heights.
pub const MIN_HEIGHTS_PAYLOAD: usize = MIN_VERSION_PAYLOAD + DataHeights::MIN_ENCODED_LEN;

/// Random value used to recognise connections that loop back to this node.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionNonce(pub [u8; 4]);

impl ConnectionNonce {
    pub fn random() -> Self {
        Self(rand::rng().random())
    }
}

impl fmt::Debug for ConnectionNonce {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ConnectionNonce({})", hex::encode(self.0))
    }
}

impl fmt::Display for ConnectionNonce {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

/// What a peer declared about itself in its `version` frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeerVersion {
    pub major: u8,
    pub minor: u8,
    pub patch: u8,
    pub revision: u8,
    pub timestamp: u32,
    pub nonce: ConnectionNonce,
}

impl PeerVersion {
    /// Seconds the peer's clock is ahead of `local_now` (negative if behind).
    pub fn clock_skew(&self, local_now: u64) -> i64 {
        self.timestamp as i64 - local_now as i64
    }
}

impl fmt::Display for PeerVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}.{}-{}",
            self.major, self.minor, self.patch, self.revision
        )
    }
}

/// Decoded `version` payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionPayload {
    pub peer: PeerVersion,
    pub heights: Option<DataHeights>,
}

impl VersionPayload {
    pub fn encoded_len(&self) -> usize {
        MIN_VERSION_PAYLOAD + self.heights.as_ref().map_or(0, DataHeights::encoded_len)
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.encoded_len());
        let p = &self.peer;
        out.extend_from_slice(&[p.major, p.minor, p.patch, p.revision]);
        out.extend_from_slice(&p.timestamp.to_be_bytes());
        out.extend_from_slice(&p.nonce.0);
        if let Some(heights) = &self.heights {
            heights.encode_into(&mut out);
        }
        out
    }

    pub fn to_frame(&self) -> Frame {
        Frame::new(Command::Version, self.encode())
    }

    /// Parse a version payload.
    ///
    /// A payload of exactly 12 bytes is the basic variant. Anything longer must
    /// hold all five heights and nothing after them.
    pub fn decode(payload: &[u8]) -> Result<Self> {
        if payload.len() < MIN_VERSION_PAYLOAD {
            return Err(ProtocolError::VersionTooShort(payload.len()));
        }

        let mut timestamp = [0u8; 4];
        timestamp.copy_from_slice(&payload[4..8]);
        let mut nonce = [0u8; 4];
        nonce.copy_from_slice(&payload[8..12]);
        let peer = PeerVersion {
            major: payload[0],
            minor: payload[1],
            patch: payload[2],
            revision: payload[3],
            timestamp: u32::from_be_bytes(timestamp),
            nonce: ConnectionNonce(nonce),
        };

        let rest = &payload[MIN_VERSION_PAYLOAD..];
        if rest.is_empty() {
            return Ok(Self {
                peer,
                heights: None,
            });
        }

        let (heights, used) = DataHeights::decode(rest)?;
        if used != rest.len() {
            return Err(ProtocolError::MalformedPayload(
                constants::ERR_TRAILING_BYTES.into(),
            ));
        }
        if !heights.is_canonical() {
            warn!(nonce = %peer.nonce, "Peer announced non-canonical data heights");
        }

        Ok(Self {
            peer,
            heights: Some(heights),
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::core::heights::Height;

    fn sample(heights: Option<DataHeights>) -> VersionPayload {
        VersionPayload {
            peer: PeerVersion {
                major: 0,
                minor: 0,
                patch: 1,
                revision: 0,
                timestamp: 1_700_000_000,
                nonce: ConnectionNonce([1, 2, 3, 4]),
            },
            heights,
        }
    }

    #[test]
    fn test_basic_variant_layout() {
        let bytes = sample(None).encode();
        assert_eq!(bytes.len(), MIN_VERSION_PAYLOAD);
        assert_eq!(&bytes[..4], &[0, 0, 1, 0]);
        assert_eq!(&bytes[4..8], &1_700_000_000u32.to_be_bytes());
        assert_eq!(&bytes[8..], &[1, 2, 3, 4]);
        assert_eq!(VersionPayload::decode(&bytes).unwrap(), sample(None));
    }

    #[test]
    fn test_heights_variant_roundtrip() {
        let heights = DataHeights {
            users: Height::from(3),
            messages: Height::from(70_000),
            ..DataHeights::default()
        };
        let payload = sample(Some(heights));
        let bytes = payload.encode();
        assert_eq!(VersionPayload::decode(&bytes).unwrap(), payload);

        let zeros = sample(Some(DataHeights::default())).encode();
        assert_eq!(zeros.len(), MIN_HEIGHTS_PAYLOAD);
    }

    #[test]
    fn test_too_short() {
        assert!(matches!(
            VersionPayload::decode(&[0; 11]),
            Err(ProtocolError::VersionTooShort(11))
        ));
    }

    #[test]
    fn test_partial_heights_rejected() {
        for extra in 1..DataHeights::MIN_ENCODED_LEN {
            let bytes = vec![0u8; MIN_VERSION_PAYLOAD + extra];
            assert!(matches!(
                VersionPayload::decode(&bytes),
                Err(ProtocolError::MalformedPayload(_))
            ));
        }
    }

    #[test]
    fn test_trailing_bytes_rejected() {
        let mut bytes = sample(Some(DataHeights::default())).encode();
        bytes.push(0xFF);
        assert!(VersionPayload::decode(&bytes).is_err());
    }

    #[test]
    fn test_clock_skew_sign() {
        let peer = sample(None).peer;
        assert_eq!(peer.clock_skew(1_700_000_100), -100);
        assert_eq!(peer.clock_skew(1_699_999_000), 1000);
    }
}
