//! 에러 타입 -- 도메인별 에러 정의
//!
//! 각 크레이트는 자체 에러 타입을 가지고 `From` 구현으로 [`LibtrailError`]로 변환됩니다.
//! 스케줄러는 `LibtrailError`만 다룹니다.

/// libtrail 최상위 에러 타입
#[derive(Debug, thiserror::Error)]
pub enum LibtrailError {
    /// 설정 관련 에러
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// 스토리지 에러
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// stage processor 에러
    #[error("processor error: {0}")]
    Processor(#[from] ProcessorError),

    /// 파싱 에러
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// 설정 관련 에러
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// 설정 파일을 찾을 수 없음
    #[error("config file not found: {path}")]
    FileNotFound { path: String },

    /// 설정 파싱 실패
    #[error("failed to parse config: {reason}")]
    ParseFailed { reason: String },

    /// 유효하지 않은 설정 값
    #[error("invalid config value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

/// 스토리지 에러
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// 연결 실패
    #[error("connection failed: {0}")]
    Connection(String),

    /// 쿼리 실패
    #[error("query failed: {0}")]
    Query(String),

    /// 트랜잭션 실패 (롤백됨)
    #[error("transaction failed: {0}")]
    Transaction(String),

    /// 스키마 마이그레이션 실패
    #[error("migration failed: {0}")]
    Migration(String),
}

/// stage processor 에러
#[derive(Debug, thiserror::Error)]
pub enum ProcessorError {
    /// `initialize()` 호출 전 사용
    #[error("processor '{0}' is not initialized")]
    NotInitialized(String),

    /// 배치 처리 실패 (배치 전체 롤백)
    #[error("batch failed in '{processor}': {reason}")]
    BatchFailed { processor: String, reason: String },

    /// 레지스트리에 없는 processor 이름
    #[error("unknown processor: {0}")]
    UnknownProcessor(String),

    /// 같은 이름의 processor가 이미 등록됨
    #[error("processor already registered: {0}")]
    AlreadyRegistered(String),

    /// 외부 취약점 엔진 에러
    #[error("vulnerability engine error: {0}")]
    Engine(String),
}

/// 파싱 에러
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    /// 지원하지 않는 형식
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    /// 파싱 실패
    #[error("parse failed at offset {offset}: {reason}")]
    Failed { offset: usize, reason: String },

    /// 입력 데이터 초과
    #[error("input too large: {size} bytes (max: {max})")]
    TooLarge { size: usize, max: usize },
}
