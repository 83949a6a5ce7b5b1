#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
//! Edge-case tests for payload parsing and shared state
//! Boundary sizes, malformed heights, dispatcher and registry corner cases

use speak_protocol::core::frame::{try_decode, Command, Decoded, Frame, HEADER_LEN, MAGIC_BYTES};
use speak_protocol::core::heights::{DataHeights, Height, MAX_HEIGHT_LEN};
use speak_protocol::core::version::{ConnectionNonce, PeerVersion, VersionPayload};
use speak_protocol::error::ProtocolError;
use speak_protocol::protocol::dispatcher::Dispatcher;
use speak_protocol::protocol::handshake::Direction;
use speak_protocol::transport::registry::ConnectionRegistry;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn basic_version() -> Vec<u8> {
    VersionPayload {
        peer: PeerVersion {
            major: 1,
            minor: 2,
            patch: 3,
            revision: 4,
            timestamp: 0x6553_f100,
            nonce: ConnectionNonce([0xde, 0xad, 0xbe, 0xef]),
        },
        heights: None,
    }
    .encode()
}

// ============================================================================
// FRAME EDGE CASES
// ============================================================================

#[test]
fn test_empty_payload_frame() {
    let bytes = Frame::version_ack().to_bytes().unwrap();
    assert_eq!(bytes.len(), HEADER_LEN);
    match try_decode(&bytes) {
        Decoded::Frame { frame, consumed } => {
            assert_eq!(frame.command, Command::VersionAck);
            assert!(frame.payload.is_empty());
            assert_eq!(consumed, HEADER_LEN);
        }
        other => panic!("Unexpected: {other:?}"),
    }
}

#[test]
fn test_partial_magic_is_incomplete() {
    for n in 0..=MAGIC_BYTES.len() {
        assert_eq!(try_decode(&MAGIC_BYTES[..n]), Decoded::Incomplete, "prefix {n}");
    }
}

#[test]
fn test_trailing_magic_prefix_kept_during_resync() {
    let mut bytes = vec![0x00, 0x11, 0x22];
    bytes.extend_from_slice(&MAGIC_BYTES[..2]);

    match try_decode(&bytes) {
        Decoded::Invalid { consumed, .. } => assert_eq!(consumed, 3),
        other => panic!("Unexpected: {other:?}"),
    }
}

#[test]
fn test_large_payload_roundtrip() {
    let payload = vec![0x42; 5 * 1024 * 1024];
    let bytes = Frame::new(Command::Inventory, payload.clone()).to_bytes().unwrap();
    match try_decode(&bytes) {
        Decoded::Frame { frame, .. } => assert_eq!(frame.payload, payload),
        other => panic!("Unexpected: {other:?}"),
    }
}

// ============================================================================
// VERSION PAYLOAD EDGE CASES
// ============================================================================

#[test]
fn test_version_exactly_twelve_bytes() {
    let version = VersionPayload::decode(&basic_version()).unwrap();
    assert_eq!(version.peer.to_string(), "1.2.3-4");
    assert_eq!(version.peer.timestamp, 0x6553_f100);
    assert!(version.heights.is_none());
}

#[test]
fn test_version_between_basic_and_heights_is_malformed() {
    for extra in 1..DataHeights::MIN_ENCODED_LEN {
        let mut payload = basic_version();
        payload.extend(std::iter::repeat(0).take(extra));
        assert!(
            matches!(
                VersionPayload::decode(&payload),
                Err(ProtocolError::MalformedPayload(_))
            ),
            "{} bytes should be malformed",
            payload.len()
        );
    }
}

#[test]
fn test_version_with_zero_heights() {
    let mut payload = basic_version();
    payload.extend_from_slice(&[0; 5]);

    let version = VersionPayload::decode(&payload).unwrap();
    assert_eq!(version.heights, Some(DataHeights::default()));
}

#[test]
fn test_version_with_single_byte_zero_heights() {
    // Older nodes write each zero height as one 0x00 byte: 12 + 5 * 2 bytes
    let mut payload = basic_version();
    for _ in 0..5 {
        payload.extend_from_slice(&[1, 0x00]);
    }
    assert_eq!(payload.len(), 22);

    let heights = VersionPayload::decode(&payload).unwrap().heights.unwrap();
    assert!(heights.is_canonical());
    assert_eq!(heights.users.as_bytes(), &[0x00]);
    assert_eq!(heights.messages.to_u128(), Some(0));
}

#[test]
fn test_version_trailing_bytes_rejected() {
    let mut payload = basic_version();
    payload.extend_from_slice(&[0, 0, 0, 0, 0, 0xff]);
    assert!(matches!(
        VersionPayload::decode(&payload),
        Err(ProtocolError::MalformedPayload(_))
    ));
}

#[test]
fn test_non_canonical_heights_kept_byte_exact() {
    let mut payload = basic_version();
    // users = 0x0005 with a redundant leading zero
    payload.extend_from_slice(&[2, 0x00, 0x05, 0, 0, 0, 0]);

    let version = VersionPayload::decode(&payload).unwrap();
    let heights = version.heights.unwrap();
    assert_eq!(heights.users.as_bytes(), &[0x00, 0x05]);
    assert!(!heights.is_canonical());
    assert_ne!(heights.users, Height::from(5));
    assert_eq!(heights.users.to_u128(), Some(5));
}

#[test]
fn test_max_length_height() {
    let bytes = vec![0xff; MAX_HEIGHT_LEN];
    let height = Height::from_be_bytes(bytes.clone()).unwrap();
    assert_eq!(height.as_bytes(), &bytes[..]);
    assert!(height.to_u128().is_none());

    assert!(Height::from_be_bytes(vec![1; MAX_HEIGHT_LEN + 1]).is_err());
}

#[test]
fn test_height_prefix_past_end() {
    assert!(Height::decode(&[]).is_err());
    assert!(Height::decode(&[3, 1, 2]).is_err());
}

// ============================================================================
// DISPATCHER EDGE CASES
// ============================================================================

#[test]
fn test_dispatcher_handler_replacement() {
    let dispatcher = Dispatcher::new();
    dispatcher
        .register(Command::Inventory, |_| Ok(Some(Frame::new(Command::GetData, vec![1]))))
        .unwrap();
    dispatcher
        .register(Command::Inventory, |_| Ok(Some(Frame::new(Command::GetData, vec![2]))))
        .unwrap();

    let reply = dispatcher
        .dispatch(&Frame::new(Command::Inventory, vec![]))
        .unwrap();
    assert_eq!(reply.unwrap().payload, vec![2]);
}

#[test]
fn test_dispatcher_handler_error_propagates() {
    let dispatcher = Dispatcher::new();
    dispatcher
        .register(Command::Addresses, |_| {
            Err(ProtocolError::MalformedPayload("bad address list".into()))
        })
        .unwrap();

    assert!(matches!(
        dispatcher.dispatch(&Frame::new(Command::Addresses, vec![])),
        Err(ProtocolError::MalformedPayload(_))
    ));
}

#[test]
fn test_dispatcher_shared_across_clones() {
    let calls = Arc::new(AtomicUsize::new(0));
    let dispatcher = Dispatcher::new();
    let clone = dispatcher.clone();

    let counter = Arc::clone(&calls);
    dispatcher
        .register(Command::GetData, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(None)
        })
        .unwrap();

    assert!(clone.has_handler(Command::GetData));
    clone.dispatch(&Frame::new(Command::GetData, vec![])).unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

// ============================================================================
// REGISTRY EDGE CASES
// ============================================================================

#[test]
fn test_registry_deregister_unknown_id() {
    let registry = ConnectionRegistry::new();
    assert!(!registry.deregister(12345));
    assert_eq!(registry.reap_dead(), 0);
    assert!(registry.is_empty());
}

#[test]
fn test_registry_kill_all_on_empty() {
    let registry = ConnectionRegistry::new();
    registry.kill_all();
    assert!(registry.is_empty());
}

#[test]
fn test_registry_ids_are_unique() {
    let registry = ConnectionRegistry::new();
    let addr = SocketAddr::from(([10, 0, 0, 1], 8555));
    let ids: Vec<u64> = (0..100)
        .map(|i| {
            let direction = if i % 2 == 0 {
                Direction::Inbound
            } else {
                Direction::Outbound
            };
            registry.register(addr, direction).id()
        })
        .collect();

    let mut unique = ids.clone();
    unique.sort_unstable();
    unique.dedup();
    assert_eq!(unique.len(), ids.len());
    assert_eq!(registry.inbound_count(), 50);
    assert_eq!(registry.outbound_count(), 50);
}
