//! Stage processor -- 계층 간 배치 이전
//!
//! 세 processor가 [`StageProcessor`] 계약을 구현합니다.
//!
//! ```text
//! STAGE0_EVENT ──raw-to-parsed──▶ STAGE1_EVENT(+KEYPAIR) ──parsed-to-catalog──▶ STAGE2_LIBRARY
//!                                                                                   │
//!                                                        catalog-enrichment ◀───────┘
//!                                                        (엔진 → 패턴 fallback → STAGE2_LIBRARY_CVE)
//! ```
//!
//! 스케줄러는 processor를 순서대로 하나의 워커에서 호출합니다.
//! processor 내부에는 병렬성이 없습니다.

pub mod enrichment;
pub mod parsed_to_catalog;
pub mod raw_to_parsed;
pub mod registry;

pub use enrichment::CatalogEnrichmentProcessor;
pub use parsed_to_catalog::ParsedToCatalogProcessor;
pub use raw_to_parsed::RawToParsedProcessor;
pub use registry::{ProcessorFactory, ProcessorRegistry};

use std::time::Instant;

use metrics::histogram;

use libtrail_core::config::LibtrailConfig;
use libtrail_core::metrics as m;
use libtrail_store::Store;

use crate::error::PipelineError;

/// Stage0 → Stage1 processor 이름
pub const RAW_TO_PARSED: &str = "raw-to-parsed";
/// Stage1 → Stage2 processor 이름
pub const PARSED_TO_CATALOG: &str = "parsed-to-catalog";
/// Stage2 보강 processor 이름
pub const CATALOG_ENRICHMENT: &str = "catalog-enrichment";

/// 스케줄러가 호출하는 stage processor 계약
///
/// # 생명주기
/// ```text
/// 생성 → initialize(config) → process_batch(store, n) 반복
/// ```
pub trait StageProcessor: Send {
    /// processor 이름 (레지스트리 키)
    fn name(&self) -> &'static str;

    /// 설정에서 자신의 섹션을 읽어 초기화합니다.
    fn initialize(&mut self, config: &LibtrailConfig) -> Result<(), PipelineError>;

    /// 활성화 여부
    fn is_enabled(&self) -> bool;

    /// 설정된 배치 크기
    fn batch_size(&self) -> usize;

    /// 최대 `batch_size`개 레코드를 처리하고 처리한 수를 반환합니다.
    fn process_batch(&mut self, store: &mut Store, batch_size: usize)
    -> Result<usize, PipelineError>;
}

/// 배치 처리 시간을 processor 라벨로 기록합니다.
pub(crate) fn record_batch_duration(processor: &'static str, started: Instant) {
    histogram!(m::PROCESSOR_BATCH_DURATION_SECONDS, m::LABEL_PROCESSOR => processor)
        .record(started.elapsed().as_secs_f64());
}
