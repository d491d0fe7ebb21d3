#![no_main]

use libfuzzer_sys::fuzz_target;
use libtrail_pipeline::RecordParser;

fuzz_target!(|data: &[u8]| {
    let parser = RecordParser::with_defaults();
    let payload = String::from_utf8_lossy(data);
    let _ = parser.parse(&payload);
});
