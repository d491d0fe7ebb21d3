//! 레거시 구분자 keypair 디코더
//!
//! ```text
//! {jarPath=/lib/a.jar, loadMethod=URLClassLoader, sha256=ff00}
//! jarPath=/lib/a.jar, note=x\, y\=z
//! ```
//!
//! 감싸는 중괄호는 선택입니다. 엔트리는 이스케이프되지 않은 `", "`로,
//! key/value는 이스케이프되지 않은 첫 `=`로 나눕니다. `=`가 없는 엔트리는 버립니다.

use libtrail_core::types::KeyPairs;

use super::KeyPairDecoder;
use super::message::{find_unescaped, unescape};
use crate::error::PipelineError;

/// 레거시 keypair 디코더
#[derive(Debug, Default, Clone, Copy)]
pub struct LegacyDecoder;

/// 이스케이프되지 않은 `", "`로 엔트리를 나눕니다.
fn split_entries(input: &str) -> Vec<&str> {
    let bytes = input.as_bytes();
    let mut entries = Vec::new();
    let mut start = 0;
    let mut idx = 0;
    let mut escaped = false;

    while idx < bytes.len() {
        let b = bytes[idx];
        if escaped {
            escaped = false;
        } else if b == b'\\' {
            escaped = true;
        } else if b == b',' && bytes.get(idx + 1) == Some(&b' ') {
            entries.push(&input[start..idx]);
            idx += 2;
            start = idx;
            continue;
        }
        idx += 1;
    }
    entries.push(&input[start..]);
    entries
}

impl KeyPairDecoder for LegacyDecoder {
    fn format_name(&self) -> &str {
        "legacy"
    }

    fn decode(&self, raw: &str) -> Result<KeyPairs, PipelineError> {
        let mut body = raw.trim();
        if let Some(inner) = body.strip_prefix('{').and_then(|b| b.strip_suffix('}')) {
            body = inner.trim();
        }

        let mut pairs = KeyPairs::new();
        for entry in split_entries(body) {
            let Some(eq) = find_unescaped(entry, '=') else {
                continue;
            };
            let key = entry[..eq].trim();
            if key.is_empty() {
                continue;
            }
            pairs.insert(unescape(key), unescape(&entry[eq + 1..]));
        }

        if pairs.is_empty() && !body.is_empty() {
            return Err(PipelineError::Decode {
                format: "legacy".to_owned(),
                offset: 0,
                reason: "no key=value entries found".to_owned(),
            });
        }
        Ok(pairs)
    }
}
