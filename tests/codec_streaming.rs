//! Integration tests for the frame codec over byte streams
//!
//! These tests exercise reassembly across partial reads, resynchronisation
//! after garbage and the non-fatal handling of corrupt frames.

#![allow(clippy::expect_used, clippy::unwrap_used, clippy::panic)]

use bytes::BytesMut;
use futures::StreamExt;
use speak_protocol::core::codec::{FrameCodec, Inbound};
use speak_protocol::core::frame::{Command, Frame, FrameFault, HEADER_LEN};
use speak_protocol::error::ProtocolError;
use tokio::io::AsyncWriteExt;
use tokio_util::codec::{Decoder, Encoder, FramedRead};

fn expect_frame(item: Option<Inbound>) -> Frame {
    match item {
        Some(Inbound::Frame(frame)) => frame,
        other => panic!("expected frame, got {other:?}"),
    }
}

#[test]
fn test_decode_consumes_exactly_one_frame() {
    let mut codec = FrameCodec::default();
    let first = Frame::new(Command::Inventory, vec![1, 2, 3]);
    let second = Frame::new(Command::GetData, vec![4, 5]);

    let mut buffer = BytesMut::new();
    first.encode_into(&mut buffer).unwrap();
    second.encode_into(&mut buffer).unwrap();

    assert_eq!(expect_frame(codec.decode(&mut buffer).unwrap()), first);
    assert_eq!(buffer.len(), second.encoded_len());
    assert_eq!(expect_frame(codec.decode(&mut buffer).unwrap()), second);
    assert!(buffer.is_empty());
    assert!(codec.decode(&mut buffer).unwrap().is_none());
}

#[test]
fn test_partial_decode_preserves_buffer() {
    let mut codec = FrameCodec::default();
    let bytes = Frame::new(Command::Addresses, vec![7; 40]).to_bytes().unwrap();

    for cut in [1, 4, HEADER_LEN - 1, HEADER_LEN, bytes.len() - 1] {
        let mut buffer = BytesMut::from(&bytes[..cut]);
        assert!(codec.decode(&mut buffer).unwrap().is_none(), "cut at {cut}");
        assert_eq!(buffer.len(), cut, "buffer must be kept at cut {cut}");
    }
}

#[test]
fn test_encode_writes_header_and_payload() {
    let mut codec = FrameCodec::default();
    let mut buffer = BytesMut::new();

    codec
        .encode(Frame::new(Command::Inventory, vec![0u8; 100]), &mut buffer)
        .unwrap();

    assert_eq!(buffer.len(), HEADER_LEN + 100);
}

#[test]
fn test_garbage_prefix_is_skipped() {
    let mut codec = FrameCodec::default();
    let frame = Frame::new(Command::GetData, vec![42]);

    let mut buffer = BytesMut::from(&b"noise!"[..]);
    frame.encode_into(&mut buffer).unwrap();

    match codec.decode(&mut buffer).unwrap() {
        Some(Inbound::Dropped(FrameFault::BadHeader { skipped })) => assert_eq!(skipped, 6),
        other => panic!("expected bad header, got {other:?}"),
    }
    assert_eq!(expect_frame(codec.decode(&mut buffer).unwrap()), frame);
}

#[test]
fn test_checksum_mismatch_drops_only_that_frame() {
    let mut codec = FrameCodec::default();
    let mut corrupt = Frame::new(Command::Inventory, vec![1, 2, 3, 4]).to_bytes().unwrap();
    *corrupt.last_mut().unwrap() ^= 0x01;
    let good = Frame::new(Command::Inventory, vec![9]);

    let mut buffer = BytesMut::from(&corrupt[..]);
    good.encode_into(&mut buffer).unwrap();

    assert!(matches!(
        codec.decode(&mut buffer).unwrap(),
        Some(Inbound::Dropped(FrameFault::ChecksumMismatch { .. }))
    ));
    assert_eq!(expect_frame(codec.decode(&mut buffer).unwrap()), good);
}

#[test]
fn test_unknown_command_is_skipped() {
    let mut codec = FrameCodec::default();
    let mut bytes = Frame::new(Command::Inventory, vec![5, 5]).to_bytes().unwrap();
    bytes[4] = 0x7f;

    let mut buffer = BytesMut::from(&bytes[..]);
    assert_eq!(
        codec.decode(&mut buffer).unwrap(),
        Some(Inbound::Dropped(FrameFault::UnknownCommand(0x7f)))
    );
    assert!(buffer.is_empty());
}

#[test]
fn test_oversized_declaration_rejected_before_payload_arrives() {
    let mut codec = FrameCodec::new(1024);
    let bytes = Frame::new(Command::Inventory, vec![0; 4096]).to_bytes().unwrap();
    let mut buffer = BytesMut::from(&bytes[..HEADER_LEN]);

    assert!(matches!(
        codec.decode(&mut buffer),
        Err(ProtocolError::OversizedPacket(4096))
    ));
}

#[test]
fn test_encode_rejects_oversized_frame() {
    let mut codec = FrameCodec::new(1024);
    let mut buffer = BytesMut::new();

    assert!(matches!(
        codec.encode(Frame::new(Command::Inventory, vec![0; 1025]), &mut buffer),
        Err(ProtocolError::OversizedPacket(1025))
    ));
    assert!(buffer.is_empty());
}

#[tokio::test]
async fn test_framed_read_reassembles_trickled_bytes() {
    let frames = vec![
        Frame::new(Command::Addresses, (0..=255).collect()),
        Frame::version_ack(),
        Frame::new(Command::GetData, vec![3; 17]),
    ];
    let wire: Vec<u8> = frames.iter().flat_map(|f| f.to_bytes().unwrap()).collect();

    let (mut writer, reader) = tokio::io::duplex(64);
    let feeder = tokio::spawn(async move {
        for chunk in wire.chunks(5) {
            writer.write_all(chunk).await.unwrap();
            tokio::task::yield_now().await;
        }
    });

    let mut framed = FramedRead::new(reader, FrameCodec::default());
    let mut received = Vec::new();
    while let Some(item) = framed.next().await {
        received.push(expect_frame(Some(item.unwrap())));
    }
    feeder.await.unwrap();

    assert_eq!(received, frames);
}
