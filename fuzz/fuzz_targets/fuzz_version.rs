#![no_main]

use libfuzzer_sys::fuzz_target;
use speak_protocol::core::version::VersionPayload;

fuzz_target!(|data: &[u8]| {
    // Accepted payloads must re-encode to exactly the bytes received
    if let Ok(version) = VersionPayload::decode(data) {
        assert_eq!(version.encode(), data);
    }
});
