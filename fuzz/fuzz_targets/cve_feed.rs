#![no_main]

use libfuzzer_sys::fuzz_target;
use libtrail_pipeline::feed::parse_feed;

fuzz_target!(|data: &[u8]| {
    if let Ok(json) = std::str::from_utf8(data) {
        if let Ok(records) = parse_feed(json) {
            assert!(records.iter().all(|r| !r.cve_id.is_empty()));
        }
    }
});
