//! 구조화(JSON 객체) keypair 디코더
//!
//! 최상위가 JSON 객체여야 합니다. 문자열 값은 그대로, 숫자/불리언은 문자열로,
//! 중첩 객체와 배열은 compact JSON으로 저장하며 `null`은 버립니다.

use libtrail_core::types::KeyPairs;

use super::KeyPairDecoder;
use crate::error::PipelineError;

/// JSON keypair 디코더
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonDecoder;

impl JsonDecoder {
    fn value_to_string(value: &serde_json::Value) -> Option<String> {
        match value {
            serde_json::Value::Null => None,
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Number(n) => Some(n.to_string()),
            serde_json::Value::Bool(b) => Some(b.to_string()),
            nested => Some(nested.to_string()),
        }
    }
}

impl KeyPairDecoder for JsonDecoder {
    fn format_name(&self) -> &str {
        "json"
    }

    fn decode(&self, raw: &str) -> Result<KeyPairs, PipelineError> {
        let trimmed = raw.trim();
        if !trimmed.starts_with('{') {
            return Err(PipelineError::UnsupportedFormat(
                "json: payload is not brace-delimited".to_owned(),
            ));
        }

        let value: serde_json::Value =
            serde_json::from_str(trimmed).map_err(|e| PipelineError::Decode {
                format: "json".to_owned(),
                offset: e.column(),
                reason: e.to_string(),
            })?;

        let obj = value.as_object().ok_or_else(|| PipelineError::Decode {
            format: "json".to_owned(),
            offset: 0,
            reason: "expected JSON object at top level".to_owned(),
        })?;

        Ok(obj
            .iter()
            .filter_map(|(k, v)| Self::value_to_string(v).map(|s| (k.clone(), s)))
            .collect())
    }
}
