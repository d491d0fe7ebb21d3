#![no_main]

use libfuzzer_sys::fuzz_target;
use libtrail_pipeline::naming::{coordinates, display_name};

fuzz_target!(|data: &[u8]| {
    if let Ok(path) = std::str::from_utf8(data) {
        let _ = display_name(path);
        let (artifact, version) = coordinates(path);
        if let Some(artifact) = artifact {
            assert!(!artifact.is_empty());
        }
        if let Some(version) = version {
            assert!(!version.is_empty());
        }
    }
});
