use bytes::BytesMut;
use speak_protocol::core::codec::{FrameCodec, Inbound};
use speak_protocol::core::frame::{Command, Frame};
use tokio_util::codec::{Decoder, Encoder};

#[test]
fn stress_frame_encode_decode_large_series() {
    // Heavy burst of frames through one codec; no panics, nothing left behind
    let mut codec = FrameCodec::default();
    let mut buf = BytesMut::new();

    for size in [0usize, 1, 64, 512, 4096, 65536, 1_048_576] {
        let iterations = if size >= 65536 { 200 } else { 5_000 };
        for i in 0..iterations {
            let frame = Frame::new(Command::Inventory, vec![(i & 0xff) as u8; size]);
            codec.encode(frame.clone(), &mut buf).unwrap();
            match codec.decode(&mut buf).unwrap() {
                Some(Inbound::Frame(decoded)) => assert_eq!(decoded, frame),
                other => panic!("unexpected decode result: {other:?}"),
            }
            assert!(buf.is_empty());
        }
    }
}
