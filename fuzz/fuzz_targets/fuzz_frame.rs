#![no_main]

use bytes::BytesMut;
use libfuzzer_sys::fuzz_target;
use speak_protocol::core::codec::FrameCodec;
use speak_protocol::core::frame::try_decode;
use tokio_util::codec::Decoder;

fuzz_target!(|data: &[u8]| {
    // Pure decoder: no panics, never consumes more than it was given
    let _ = try_decode(data);

    // Streaming decoder: drain everything it will take
    let mut codec = FrameCodec::new(64 * 1024);
    let mut buf = BytesMut::from(data);
    while let Ok(Some(_)) = codec.decode(&mut buf) {}
});
