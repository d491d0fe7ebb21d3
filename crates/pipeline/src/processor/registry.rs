//! Processor 레지스트리
//!
//! 이름 → 팩토리 매핑을 등록 순서대로 보관합니다. 스케줄러는 시작 시
//! [`ProcessorRegistry::build_all`]로 processor 인스턴스를 만들고 초기화합니다.
//!
//! # 사용 예시
//! ```
//! use libtrail_core::config::LibtrailConfig;
//! use libtrail_pipeline::processor::ProcessorRegistry;
//!
//! let registry = ProcessorRegistry::with_builtin(None);
//! assert_eq!(
//!     registry.names(),
//!     vec!["raw-to-parsed", "parsed-to-catalog", "catalog-enrichment"]
//! );
//! let processors = registry.build_all(&LibtrailConfig::default()).unwrap();
//! assert_eq!(processors.len(), 3);
//! ```

use std::sync::Arc;

use tracing::debug;

use libtrail_core::config::LibtrailConfig;

use super::{
    CATALOG_ENRICHMENT, CatalogEnrichmentProcessor, PARSED_TO_CATALOG, ParsedToCatalogProcessor,
    RAW_TO_PARSED, RawToParsedProcessor, StageProcessor,
};
use crate::error::PipelineError;
use crate::temporal::LibraryTemporalTracker;

/// processor 생성 함수
pub type ProcessorFactory = Box<dyn Fn() -> Box<dyn StageProcessor> + Send + Sync>;

/// processor 레지스트리
pub struct ProcessorRegistry {
    factories: Vec<(String, ProcessorFactory)>,
}

impl ProcessorRegistry {
    pub fn new() -> Self {
        Self {
            factories: Vec::new(),
        }
    }

    /// 기본 세 processor를 파이프라인 순서대로 등록합니다.
    ///
    /// `tracker`가 있으면 카탈로그 processor가 관찰을 기록합니다.
    pub fn with_builtin(tracker: Option<Arc<LibraryTemporalTracker>>) -> Self {
        let raw_to_parsed: ProcessorFactory =
            Box::new(|| Box::new(RawToParsedProcessor::new()) as Box<dyn StageProcessor>);
        let parsed_to_catalog: ProcessorFactory = Box::new(move || {
            let processor = ParsedToCatalogProcessor::new();
            let processor = match &tracker {
                Some(t) => processor.with_tracker(Arc::clone(t)),
                None => processor,
            };
            Box::new(processor) as Box<dyn StageProcessor>
        });
        let enrichment: ProcessorFactory =
            Box::new(|| Box::new(CatalogEnrichmentProcessor::new()) as Box<dyn StageProcessor>);

        let mut registry = Self::new();
        registry.factories.push((RAW_TO_PARSED.to_owned(), raw_to_parsed));
        registry
            .factories
            .push((PARSED_TO_CATALOG.to_owned(), parsed_to_catalog));
        registry
            .factories
            .push((CATALOG_ENRICHMENT.to_owned(), enrichment));
        registry
    }

    /// 팩토리를 등록합니다. 같은 이름이 이미 있으면 에러입니다.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        factory: ProcessorFactory,
    ) -> Result<(), PipelineError> {
        let name = name.into();
        if self.contains(&name) {
            return Err(PipelineError::DuplicateProcessor(name));
        }
        debug!(processor = %name, "processor factory registered");
        self.factories.push((name, factory));
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.iter().any(|(n, _)| n == name)
    }

    /// 이름으로 processor를 생성합니다. 초기화는 하지 않습니다.
    pub fn create(&self, name: &str) -> Result<Box<dyn StageProcessor>, PipelineError> {
        self.factories
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, factory)| factory())
            .ok_or_else(|| PipelineError::UnknownProcessor(name.to_owned()))
    }

    /// 등록 순서대로 모든 processor를 생성하고 초기화합니다.
    ///
    /// 첫 번째 초기화 실패 시 즉시 반환합니다.
    pub fn build_all(
        &self,
        config: &LibtrailConfig,
    ) -> Result<Vec<Box<dyn StageProcessor>>, PipelineError> {
        let mut processors = Vec::with_capacity(self.factories.len());
        for (_, factory) in &self.factories {
            let mut processor = factory();
            processor.initialize(config)?;
            processors.push(processor);
        }
        Ok(processors)
    }

    /// 등록된 이름 목록 (등록 순서)
    pub fn names(&self) -> Vec<&str> {
        self.factories.iter().map(|(n, _)| n.as_str()).collect()
    }

    pub fn count(&self) -> usize {
        self.factories.len()
    }
}

impl Default for ProcessorRegistry {
    fn default() -> Self {
        Self::new()
    }
}
