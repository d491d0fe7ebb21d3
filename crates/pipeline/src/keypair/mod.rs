//! 레코드 파서 -- 이기종 keypair 인코딩을 균일한 매핑으로 디코딩
//!
//! [`RecordParser`]는 등록된 [`KeyPairDecoder`]를 순서대로 시도하고
//! 첫 번째 성공 결과에 `message` 2차 추출을 적용합니다.
//!
//! # 지원 형식
//! - 구조화 JSON 객체 ([`JsonDecoder`])
//! - 레거시 `key=value, key=value` ([`LegacyDecoder`])
//!
//! # 사용 예시
//! ```
//! use libtrail_pipeline::keypair::RecordParser;
//!
//! let parser = RecordParser::with_defaults();
//! let pairs = parser.parse(r#"{"user":"alice","message":"Environment Setting: PATH=/usr/bin"}"#);
//! assert_eq!(pairs.get("PATH").map(String::as_str), Some("/usr/bin"));
//! assert!(!pairs.contains_key("message"));
//! ```

pub mod json;
pub mod legacy;
pub mod message;

pub use json::JsonDecoder;
pub use legacy::LegacyDecoder;

use metrics::counter;
use tracing::{debug, warn};

use libtrail_core::metrics as m;
use libtrail_core::types::KeyPairs;

use crate::error::PipelineError;

/// 최대 허용 페이로드 크기 (1 MiB)
pub const MAX_PAYLOAD_SIZE: usize = 1024 * 1024;

/// keypair 페이로드 디코더
///
/// 각 인코딩 형식은 이 trait을 구현하여 [`RecordParser`]에 등록됩니다.
pub trait KeyPairDecoder: Send + Sync {
    /// 형식 이름 (예: `"json"`, `"legacy"`)
    fn format_name(&self) -> &str;

    /// 페이로드를 디코딩합니다.
    fn decode(&self, raw: &str) -> Result<KeyPairs, PipelineError>;
}

/// 디코더 라우터
///
/// 등록된 디코더를 순서대로 시도하여 첫 번째 성공 결과를 사용합니다.
pub struct RecordParser {
    decoders: Vec<Box<dyn KeyPairDecoder>>,
    max_payload_size: usize,
}

impl RecordParser {
    /// 디코더가 없는 파서를 생성합니다.
    pub fn new() -> Self {
        Self {
            decoders: Vec::new(),
            max_payload_size: MAX_PAYLOAD_SIZE,
        }
    }

    /// 기본 디코더 세트 (JSON → 레거시)로 파서를 생성합니다.
    pub fn with_defaults() -> Self {
        Self::new()
            .register(Box::new(JsonDecoder))
            .register(Box::new(LegacyDecoder))
    }

    /// 디코더를 등록합니다. 등록 순서대로 시도됩니다.
    pub fn register(mut self, decoder: Box<dyn KeyPairDecoder>) -> Self {
        self.decoders.push(decoder);
        self
    }

    /// 최대 페이로드 크기를 설정합니다.
    pub fn with_max_payload_size(mut self, size: usize) -> Self {
        self.max_payload_size = size;
        self
    }

    /// 등록된 디코더 형식 이름 목록
    pub fn registered_formats(&self) -> Vec<&str> {
        self.decoders.iter().map(|d| d.format_name()).collect()
    }

    /// 페이로드를 디코딩합니다. 실패하면 빈 매핑을 반환하며 절대 에러를 내지 않습니다.
    pub fn parse(&self, raw: &str) -> KeyPairs {
        match self.try_parse(raw) {
            Ok(pairs) => pairs,
            Err(e) => {
                warn!(error = %e, len = raw.len(), "keypair payload could not be decoded, using empty metadata");
                counter!(m::PARSER_DECODE_FAILURES_TOTAL, m::LABEL_FORMAT => "all").increment(1);
                KeyPairs::new()
            }
        }
    }

    /// 페이로드를 디코딩하고 실패 원인을 반환합니다.
    ///
    /// 빈 페이로드는 실패가 아니라 빈 매핑입니다.
    pub fn try_parse(&self, raw: &str) -> Result<KeyPairs, PipelineError> {
        if raw.len() > self.max_payload_size {
            return Err(PipelineError::InputTooLarge {
                size: raw.len(),
                max: self.max_payload_size,
            });
        }
        if raw.trim().is_empty() {
            return Ok(KeyPairs::new());
        }
        if self.decoders.is_empty() {
            return Err(PipelineError::UnsupportedFormat(
                "no decoders registered".to_owned(),
            ));
        }

        let mut last_error = None;
        for decoder in &self.decoders {
            match decoder.decode(raw) {
                Ok(mut pairs) => {
                    apply_message_extraction(&mut pairs);
                    return Ok(pairs);
                }
                Err(e) => {
                    debug!(format = decoder.format_name(), error = %e, "decoder rejected payload");
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            PipelineError::UnsupportedFormat("all decoders failed".to_owned())
        }))
    }
}

impl Default for RecordParser {
    fn default() -> Self {
        Self::with_defaults()
    }
}

/// `message` 엔트리에 내장된 key-value 쌍이 있으면 원래 메시지를 대체합니다.
fn apply_message_extraction(pairs: &mut KeyPairs) {
    let Some(msg) = pairs.get(message::MESSAGE_KEY) else {
        return;
    };
    if let Some((key, value)) = message::extract_pair(msg) {
        pairs.remove(message::MESSAGE_KEY);
        pairs.insert(key, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn with_defaults_has_decoders() {
        let parser = RecordParser::with_defaults();
        assert_eq!(parser.registered_formats(), vec!["json", "legacy"]);
    }

    #[test]
    fn message_pair_supersedes_raw_message() {
        let parser = RecordParser::with_defaults();
        let pairs =
            parser.parse(r#"{"user":"alice","message":"Environment Setting: PATH=/usr/bin"}"#);
        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs.get("user").map(String::as_str), Some("alice"));
        assert_eq!(pairs.get("PATH").map(String::as_str), Some("/usr/bin"));
    }

    #[test]
    fn message_without_pair_is_kept() {
        let parser = RecordParser::with_defaults();
        let pairs = parser.parse(r#"{"message":"Application started"}"#);
        assert_eq!(
            pairs.get("message").map(String::as_str),
            Some("Application started")
        );
    }

    #[test]
    fn malformed_json_falls_back_to_legacy() {
        let parser = RecordParser::with_defaults();
        let pairs = parser.parse("{jarPath=/lib/a.jar, sha256=ff}");
        assert_eq!(pairs.get("jarPath").map(String::as_str), Some("/lib/a.jar"));
        assert_eq!(pairs.get("sha256").map(String::as_str), Some("ff"));
    }

    #[test]
    fn message_extraction_applies_to_legacy() {
        let parser = RecordParser::with_defaults();
        let pairs = parser.parse(r"message=Env: HOME\=/root");
        assert_eq!(pairs.get("HOME").map(String::as_str), Some("/root"));
        assert!(!pairs.contains_key("message"));
    }

    #[test]
    fn total_failure_yields_empty_mapping() {
        let parser = RecordParser::with_defaults();
        assert!(parser.parse("just some words").is_empty());
        assert!(parser.try_parse("just some words").is_err());
    }

    #[test]
    fn empty_payload_is_not_a_failure() {
        let parser = RecordParser::with_defaults();
        assert!(parser.try_parse("   ").unwrap().is_empty());
    }

    #[test]
    fn oversized_payload_rejected() {
        let parser = RecordParser::with_defaults().with_max_payload_size(8);
        let err = parser.try_parse("a=1, b=2, c=3").unwrap_err();
        assert!(matches!(err, PipelineError::InputTooLarge { .. }));
        assert!(parser.parse("a=1, b=2, c=3").is_empty());
    }

    #[test]
    fn empty_router_fails() {
        let parser = RecordParser::new();
        assert!(parser.try_parse("a=b").is_err());
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn parse_arbitrary_input_does_not_panic(input in ".{0,512}") {
                let parser = RecordParser::with_defaults();
                let _ = parser.parse(&input);
            }

            #[test]
            fn legacy_roundtrip_simple_pairs(
                entries in prop::collection::btree_map("[a-zA-Z][a-zA-Z0-9_]{0,15}", "[a-zA-Z0-9/._-]{0,20}", 1..8)
            ) {
                let raw = entries
                    .iter()
                    .map(|(k, v)| format!("{k}={v}"))
                    .collect::<Vec<_>>()
                    .join(", ");
                let parser = RecordParser::with_defaults();
                let pairs = parser.parse(&raw);
                prop_assert_eq!(pairs, entries);
            }
        }
    }
}
