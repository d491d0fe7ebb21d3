//! 파이프라인 에러 타입
//!
//! [`PipelineError`]는 stage processor, 파서, 취약점 엔진에서 발생하는 에러를 표현합니다.
//! `From<PipelineError> for LibtrailError` 변환이 구현되어 있어
//! 스케줄러까지 `?` 연산자로 전파할 수 있습니다.

use libtrail_core::error::{LibtrailError, ParseError, ProcessorError};
use libtrail_store::StoreError;

/// 파이프라인 도메인 에러
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// 저장소 에러
    #[error(transparent)]
    Store(#[from] StoreError),

    /// 외부 취약점 엔진 에러
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// keypair 페이로드 디코딩 실패
    #[error("decode error: {format} at offset {offset}: {reason}")]
    Decode {
        /// 디코더 형식 (json, legacy)
        format: String,
        /// 실패 위치
        offset: usize,
        /// 실패 사유
        reason: String,
    },

    /// 지원하지 않는 페이로드 형식
    #[error("unsupported keypair format: {0}")]
    UnsupportedFormat(String),

    /// 입력 크기 초과
    #[error("input too large: {size} bytes (max: {max})")]
    InputTooLarge { size: usize, max: usize },

    /// `initialize()` 전에 배치 처리 호출
    #[error("processor '{0}' is not initialized")]
    NotInitialized(String),

    /// 배치 처리 실패 (전체 롤백)
    #[error("batch failed in '{processor}': {reason}")]
    BatchFailed { processor: String, reason: String },

    /// 레지스트리에 같은 이름이 이미 등록됨
    #[error("processor already registered: {0}")]
    DuplicateProcessor(String),

    /// 레지스트리에 없는 이름
    #[error("unknown processor: {0}")]
    UnknownProcessor(String),

    /// 취약점 DB 로딩 실패
    #[error("vuln db load error: {path}: {reason}")]
    VulnDbLoad { path: String, reason: String },

    /// 취약점 DB/피드 파싱 실패
    #[error("vuln db parse error: {0}")]
    VulnDbParse(String),

    /// glob 패턴 컴파일 실패
    #[error("invalid pattern '{pattern}': {reason}")]
    Pattern { pattern: String, reason: String },
}

/// 외부 취약점 엔진 에러
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// 엔진이 비활성화됨
    #[error("vulnerability engine '{0}' is disabled")]
    Disabled(String),

    /// 엔진 호출 실패
    #[error("vulnerability engine query failed: {0}")]
    Query(String),
}

impl From<PipelineError> for LibtrailError {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::Store(e) => e.into(),
            PipelineError::Engine(e) => {
                LibtrailError::Processor(ProcessorError::Engine(e.to_string()))
            }
            PipelineError::Decode {
                format,
                offset,
                reason,
            } => LibtrailError::Parse(ParseError::Failed {
                offset,
                reason: format!("{format}: {reason}"),
            }),
            PipelineError::UnsupportedFormat(msg) => {
                LibtrailError::Parse(ParseError::UnsupportedFormat(msg))
            }
            PipelineError::InputTooLarge { size, max } => {
                LibtrailError::Parse(ParseError::TooLarge { size, max })
            }
            PipelineError::NotInitialized(name) => {
                LibtrailError::Processor(ProcessorError::NotInitialized(name))
            }
            PipelineError::BatchFailed { processor, reason } => {
                LibtrailError::Processor(ProcessorError::BatchFailed { processor, reason })
            }
            PipelineError::DuplicateProcessor(name) => {
                LibtrailError::Processor(ProcessorError::AlreadyRegistered(name))
            }
            PipelineError::UnknownProcessor(name) => {
                LibtrailError::Processor(ProcessorError::UnknownProcessor(name))
            }
            PipelineError::VulnDbLoad { path, reason } => LibtrailError::Processor(
                ProcessorError::Engine(format!("vuln db load error: {path}: {reason}")),
            ),
            PipelineError::VulnDbParse(msg) => {
                LibtrailError::Processor(ProcessorError::Engine(msg))
            }
            PipelineError::Pattern { pattern, reason } => LibtrailError::Parse(
                ParseError::Failed {
                    offset: 0,
                    reason: format!("pattern '{pattern}': {reason}"),
                },
            ),
        }
    }
}
