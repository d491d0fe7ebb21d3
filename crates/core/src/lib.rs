//! libtrail 공통 크레이트
//!
//! 모든 stage가 공유하는 레코드 타입, 에러 계층, 설정, 메트릭 상수를 제공합니다.
//! 저장소 구현과 processor 로직은 `libtrail-store`, `libtrail-pipeline`에 있습니다.

pub mod config;
pub mod error;
pub mod metrics;
pub mod types;

// --- 주요 타입 re-export ---

// 에러
pub use error::{ConfigError, LibtrailError, ParseError, ProcessorError, StorageError};

// 설정
pub use config::LibtrailConfig;

// 도메인 타입
pub use types::{
    CveMatch, CveRecord, KeyPairs, LibraryMetadata, LibraryObservation, LibraryRecord,
    ParsedEvent, RawRecord, Severity,
};
