#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use libtrail_pipeline::vuln::pattern::glob_to_regex;

/// 퍼저용 구조적 입력
#[derive(Arbitrary, Debug)]
struct FuzzInput {
    pattern: String,
    library_name: String,
    jar_path: String,
}

fuzz_target!(|input: FuzzInput| {
    if input.pattern.len() > 256 {
        return;
    }
    if let Ok(re) = glob_to_regex(&input.pattern) {
        let _ = re.is_match(&input.library_name.to_lowercase());
        let _ = re.is_match(&input.jar_path.to_lowercase());
    }
});
