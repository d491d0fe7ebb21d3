//! libtrail 파이프라인 -- 텔레메트리를 라이브러리 카탈로그로 정제하는 stage processor
//!
//! # 모듈 구성
//! - [`keypair`]: 이기종 keypair 페이로드 디코더와 라우터 ([`RecordParser`])
//! - [`processor`]: [`StageProcessor`] 계약, 세 processor, 레지스트리
//! - [`vuln`]: 외부 취약점 엔진 계약, 로컬 JSON 엔진, glob 패턴 매처
//! - [`feed`]: CVE 피드 가져오기
//! - [`temporal`]: 애플리케이션별 라이브러리 시간 추적기
//! - [`naming`]: 아티팩트 경로 → 표시 이름/좌표

pub mod error;
pub mod feed;
pub mod keypair;
pub mod naming;
pub mod processor;
pub mod temporal;
pub mod vuln;

pub use error::{EngineError, PipelineError};
pub use keypair::{KeyPairDecoder, RecordParser};
pub use processor::{
    CatalogEnrichmentProcessor, ParsedToCatalogProcessor, ProcessorRegistry,
    RawToParsedProcessor, StageProcessor,
};
pub use temporal::{LibraryTemporalTracker, TemporalInfo, TrackerStats};
pub use vuln::{JsonVulnEngine, PatternMatcher, VulnerabilityEngine};
