//! Variable-length big-endian height counters.
//!
//! Each height is an unsigned magnitude of 0 to 255 bytes, written as one
//! length byte followed by the magnitude. The canonical form has no leading
//! zero byte. Zero is written either as the empty magnitude or as a single
//! `0x00`, which is what older nodes send. Non-canonical encodings are kept
//! byte-for-byte: `[0x00, 0x05]` and `[0x05]` are different heights.

use std::fmt;

use crate::error::{constants, ProtocolError, Result};

/// Largest magnitude a single length byte can describe.
pub const MAX_HEIGHT_LEN: usize = u8::MAX as usize;

/// Number of height classes carried in a version payload.
pub const HEIGHT_CLASSES: usize = 5;

/// Unsigned big-endian magnitude.
#[derive(Clone, Default, PartialEq, Eq, Hash)]
pub struct Height(Vec<u8>);

impl Height {
    pub fn zero() -> Self {
        Self(Vec::new())
    }

    /// Wrap raw magnitude bytes exactly as given.
    pub fn from_be_bytes(bytes: Vec<u8>) -> Result<Self> {
        if bytes.len() > MAX_HEIGHT_LEN {
            return Err(ProtocolError::MalformedPayload(
                constants::ERR_HEIGHT_TOO_LONG.into(),
            ));
        }
        Ok(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// True unless a zero byte pads a longer magnitude. A lone `0x00` is an
    /// accepted spelling of zero.
    pub fn is_canonical(&self) -> bool {
        !matches!(self.0.as_slice(), [0, _, ..])
    }

    /// Numeric value, if it fits in 128 bits.
    pub fn to_u128(&self) -> Option<u128> {
        let significant = match self.0.iter().position(|&b| b != 0) {
            Some(start) => &self.0[start..],
            None => return Some(0),
        };
        if significant.len() > 16 {
            return None;
        }
        Some(significant.iter().fold(0u128, |acc, &b| (acc << 8) | b as u128))
    }

    /// Append the length prefix and magnitude to `out`.
    pub fn encode_into(&self, out: &mut Vec<u8>) {
        out.push(self.0.len() as u8);
        out.extend_from_slice(&self.0);
    }

    /// Read one length-prefixed height from the front of `input`.
    ///
    /// Returns the height and the number of bytes it occupied.
    pub fn decode(input: &[u8]) -> Result<(Self, usize)> {
        let len = *input.first().ok_or_else(|| {
            ProtocolError::MalformedPayload(constants::ERR_HEIGHT_PREFIX_MISSING.into())
        })? as usize;
        let magnitude = input.get(1..1 + len).ok_or_else(|| {
            ProtocolError::MalformedPayload(constants::ERR_HEIGHT_TRUNCATED.into())
        })?;
        Ok((Self(magnitude.to_vec()), 1 + len))
    }
}

impl From<u64> for Height {
    fn from(value: u64) -> Self {
        let bytes = value.to_be_bytes();
        let start = bytes.iter().position(|&b| b != 0).unwrap_or(bytes.len());
        Self(bytes[start..].to_vec())
    }
}

impl fmt::Debug for Height {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Height(0x{})", hex::encode(&self.0))
    }
}

/// Synchronisation progress for the five data classes, in wire order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DataHeights {
    pub users: Height,
    pub submissions: Height,
    pub comments: Height,
    pub votes: Height,
    pub messages: Height,
}

impl DataHeights {
    fn fields(&self) -> [&Height; HEIGHT_CLASSES] {
        [
            &self.users,
            &self.submissions,
            &self.comments,
            &self.votes,
            &self.messages,
        ]
    }

    /// Smallest possible encoding: five zero-length heights.
    pub const MIN_ENCODED_LEN: usize = HEIGHT_CLASSES;

    pub fn encoded_len(&self) -> usize {
        self.fields().iter().map(|h| 1 + h.as_bytes().len()).sum()
    }

    pub fn encode_into(&self, out: &mut Vec<u8>) {
        for height in self.fields() {
            height.encode_into(out);
        }
    }

    /// Decode all five heights from the front of `input`.
    ///
    /// Returns the heights and the number of bytes consumed.
    pub fn decode(input: &[u8]) -> Result<(Self, usize)> {
        let mut offset = 0;
        let mut next = || -> Result<Height> {
            let (height, used) = Height::decode(&input[offset..])?;
            offset += used;
            Ok(height)
        };
        let heights = Self {
            users: next()?,
            submissions: next()?,
            comments: next()?,
            votes: next()?,
            messages: next()?,
        };
        Ok((heights, offset))
    }

    /// True when every height is canonically encoded.
    pub fn is_canonical(&self) -> bool {
        self.fields().iter().all(|h| h.is_canonical())
    }
}
