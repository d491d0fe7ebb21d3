#![no_main]

use libfuzzer_sys::fuzz_target;
use libtrail_pipeline::keypair::{KeyPairDecoder, LegacyDecoder};

fuzz_target!(|data: &[u8]| {
    if let Ok(payload) = std::str::from_utf8(data) {
        let _ = LegacyDecoder.decode(payload);
    }
});
