//! Property-based tests using proptest
//!
//! These tests check framing and payload invariants across randomly generated
//! inputs: round trips, independence from how the stream is split, checksum
//! sensitivity and panic-freedom on arbitrary bytes.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use bytes::BytesMut;
use proptest::prelude::*;
use speak_protocol::core::codec::{FrameCodec, Inbound};
use speak_protocol::core::frame::{try_decode, Command, Decoded, Frame, FrameFault, HEADER_LEN};
use speak_protocol::core::heights::{DataHeights, Height};
use speak_protocol::core::version::VersionPayload;
use tokio_util::codec::Decoder;

fn command() -> impl Strategy<Value = Command> {
    prop_oneof![
        Just(Command::Version),
        Just(Command::VersionAck),
        Just(Command::Addresses),
        Just(Command::Inventory),
        Just(Command::GetData),
    ]
}

fn frame() -> impl Strategy<Value = Frame> {
    (command(), prop::collection::vec(any::<u8>(), 0..2048))
        .prop_map(|(command, payload)| Frame::new(command, payload))
}

fn height() -> impl Strategy<Value = Height> {
    prop::collection::vec(any::<u8>(), 0..=255).prop_map(|bytes| Height::from_be_bytes(bytes).unwrap())
}

fn data_heights() -> impl Strategy<Value = DataHeights> {
    (height(), height(), height(), height(), height()).prop_map(
        |(users, submissions, comments, votes, messages)| DataHeights {
            users,
            submissions,
            comments,
            votes,
            messages,
        },
    )
}

// Property: any frame decodes back to itself and consumes exactly its bytes
proptest! {
    #[test]
    fn prop_frame_roundtrip(frame in frame()) {
        let bytes = frame.to_bytes().unwrap();
        prop_assert_eq!(bytes.len(), HEADER_LEN + frame.payload.len());

        match try_decode(&bytes) {
            Decoded::Frame { frame: decoded, consumed } => {
                prop_assert_eq!(decoded, frame);
                prop_assert_eq!(consumed, bytes.len());
            }
            other => prop_assert!(false, "unexpected decode result: {:?}", other),
        }
    }
}

// Property: how the stream is chopped into reads never changes what is decoded
proptest! {
    #[test]
    fn prop_fragmentation_invariance(
        frames in prop::collection::vec(frame(), 1..6),
        chunk in 1usize..64,
    ) {
        let wire: Vec<u8> = frames.iter().flat_map(|f| f.to_bytes().unwrap()).collect();
        let mut codec = FrameCodec::default();
        let mut buffer = BytesMut::new();
        let mut decoded = Vec::new();

        for piece in wire.chunks(chunk) {
            buffer.extend_from_slice(piece);
            while let Some(item) = codec.decode(&mut buffer).unwrap() {
                match item {
                    Inbound::Frame(frame) => decoded.push(frame),
                    Inbound::Dropped(fault) => prop_assert!(false, "unexpected fault: {}", fault),
                }
            }
        }

        prop_assert!(buffer.is_empty());
        prop_assert_eq!(decoded, frames);
    }
}

// Property: flipping any payload bit is caught by the checksum
proptest! {
    #[test]
    fn prop_checksum_detects_bit_flip(
        payload in prop::collection::vec(any::<u8>(), 1..512),
        position in any::<prop::sample::Index>(),
        bit in 0u8..8,
    ) {
        let mut bytes = Frame::new(Command::Inventory, payload.clone()).to_bytes().unwrap();
        let target = HEADER_LEN + position.index(payload.len());
        bytes[target] ^= 1 << bit;

        match try_decode(&bytes) {
            Decoded::Invalid { fault: FrameFault::ChecksumMismatch { .. }, consumed } => {
                prop_assert_eq!(consumed, bytes.len());
            }
            other => prop_assert!(false, "corruption not detected: {:?}", other),
        }
    }
}

// Property: arbitrary bytes never panic the decoder and never over-consume
proptest! {
    #[test]
    fn prop_try_decode_total(bytes in prop::collection::vec(any::<u8>(), 0..256)) {
        match try_decode(&bytes) {
            Decoded::Frame { consumed, .. } | Decoded::Invalid { consumed, .. } => {
                prop_assert!(consumed > 0);
                prop_assert!(consumed <= bytes.len());
            }
            Decoded::Incomplete => {}
        }
    }
}

// Property: heights survive a round trip byte-for-byte, canonical or not
proptest! {
    #[test]
    fn prop_height_roundtrip(height in height(), trailing in prop::collection::vec(any::<u8>(), 0..8)) {
        let mut encoded = Vec::new();
        height.encode_into(&mut encoded);
        encoded.extend_from_slice(&trailing);

        let (decoded, consumed) = Height::decode(&encoded).unwrap();
        prop_assert_eq!(consumed, height.as_bytes().len() + 1);
        prop_assert_eq!(decoded.as_bytes(), height.as_bytes());
    }

    #[test]
    fn prop_u64_heights_are_canonical(value in any::<u64>()) {
        let height = Height::from(value);
        prop_assert!(height.is_canonical());
        prop_assert_eq!(height.to_u128(), Some(value as u128));
    }
}

// Property: a version payload with heights decodes to what was encoded
proptest! {
    #[test]
    fn prop_version_payload_roundtrip(
        header in prop::collection::vec(any::<u8>(), 12),
        heights in data_heights(),
    ) {
        let mut payload = header.clone();
        heights.encode_into(&mut payload);

        let decoded = VersionPayload::decode(&payload).unwrap();
        prop_assert_eq!(decoded.heights.clone(), Some(heights));
        prop_assert_eq!(decoded.encode(), payload);
    }

    #[test]
    fn prop_version_decode_total(bytes in prop::collection::vec(any::<u8>(), 0..64)) {
        let result = VersionPayload::decode(&bytes);
        match bytes.len() {
            0..=11 | 13..=16 => prop_assert!(result.is_err()),
            12 => prop_assert!(result.is_ok()),
            _ => {}
        }
    }
}
