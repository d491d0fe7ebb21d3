//! Stage2 카탈로그 보강 processor
//!
//! 보강 마커(`GROUP_ID`)가 비어 있는 라이브러리를 오래된 순으로 읽어
//!
//! 1. 파일 이름에서 좌표(artifact id, version)를 유도해 메타데이터를 만들고
//! 2. 외부 취약점 엔진에 질의하고, 엔진이 없거나/비활성이거나/실패하거나/결과가 없으면
//!    패턴 매처로 대체하고
//! 3. 찾은 CVE를 upsert하고 라이브러리와 연결한 뒤
//! 4. 메타데이터를 기록합니다 (그룹 ID를 모르면 빈 센티널).
//!
//! 트랜잭션이 아닌 best-effort 처리입니다. 한 라이브러리의 실패는 경고로 남기고
//! 배치를 계속합니다. 실패한 라이브러리는 마커가 비어 있으므로 다음 폴링에서 다시 선택되고,
//! [`MAX_ENRICHMENT_ATTEMPTS`]번 연속 실패하면 빈 센티널을 기록해 선택 대상에서 빠집니다.

use std::collections::HashMap;
use std::path::Path;
use std::time::{Duration, Instant};

use metrics::counter;
use rusqlite::Connection;
use tracing::{debug, info, warn};

use libtrail_core::config::{EnrichmentConfig, LibtrailConfig};
use libtrail_core::metrics as m;
use libtrail_core::types::{CveMatch, CveRecord, LibraryMetadata, LibraryRecord, now_millis};
use libtrail_store::{Store, cve, stage2};

use super::{CATALOG_ENRICHMENT, StageProcessor, record_batch_duration};
use crate::error::PipelineError;
use crate::naming::coordinates;
use crate::vuln::{JsonVulnEngine, PatternMatcher, VulnerabilityEngine};

/// 한 라이브러리의 연속 보강 실패 허용 횟수
pub const MAX_ENRICHMENT_ATTEMPTS: u32 = 3;

/// 카탈로그 레코드에서 엔진에 전달할 메타데이터를 만듭니다.
///
/// 아티팩트 바이트는 읽지 않으므로 그룹 ID와 매니페스트 정보는 비어 있습니다.
pub fn metadata_for(library: &LibraryRecord) -> LibraryMetadata {
    let (artifact_id, version) = coordinates(&library.jar_path);
    LibraryMetadata {
        artifact_id,
        version,
        ..LibraryMetadata::default()
    }
}

/// Stage2 보강 processor
pub struct CatalogEnrichmentProcessor {
    enabled: bool,
    batch_size: usize,
    initialized: bool,
    engine: Option<Box<dyn VulnerabilityEngine>>,
    matcher: PatternMatcher,
    /// library id -> 연속 실패 횟수
    failures: HashMap<String, u32>,
}

impl CatalogEnrichmentProcessor {
    pub fn new() -> Self {
        let defaults = EnrichmentConfig::default();
        Self {
            enabled: defaults.enabled,
            batch_size: defaults.batch_size,
            initialized: false,
            engine: None,
            matcher: PatternMatcher::new(Duration::from_secs(defaults.pattern_cache_ttl_secs)),
            failures: HashMap::new(),
        }
    }

    /// 외부 엔진을 주입합니다. 주입된 엔진은 `initialize`가 교체하지 않습니다.
    pub fn with_engine(mut self, engine: Box<dyn VulnerabilityEngine>) -> Self {
        self.engine = Some(engine);
        self
    }

    pub fn engine_name(&self) -> Option<&str> {
        self.engine.as_ref().map(|e| e.name())
    }

    /// 엔진 질의 후 필요하면 패턴 매처로 대체합니다.
    fn find_cves(
        &mut self,
        conn: &Connection,
        library: &LibraryRecord,
        meta: &LibraryMetadata,
    ) -> Result<Vec<CveMatch>, PipelineError> {
        if let Some(engine) = &self.engine
            && engine.is_enabled()
        {
            match engine.find_vulnerabilities(meta) {
                Ok(found) if !found.is_empty() => return Ok(found),
                Ok(_) => {
                    debug!(library_id = %library.library_id, engine = engine.name(), "engine returned no matches");
                }
                Err(e) => {
                    warn!(
                        library_id = %library.library_id,
                        engine = engine.name(),
                        error = %e,
                        "vulnerability engine failed, falling back to pattern matcher"
                    );
                }
            }
        }

        counter!(m::ENRICHMENT_ENGINE_FALLBACKS_TOTAL).increment(1);
        self.matcher.match_library(
            conn,
            &library.library_name,
            &library.jar_path,
            &library.method,
        )
    }

    fn enrich_one(
        &mut self,
        conn: &Connection,
        library: &LibraryRecord,
    ) -> Result<usize, PipelineError> {
        let meta = metadata_for(library);
        let matches = self.find_cves(conn, library, &meta)?;

        let now = now_millis();
        for found in &matches {
            cve::upsert_cve(conn, &CveRecord::from(found))?;
            stage2::link_cve(conn, &library.library_id, &found.cve_id, &found.source, now)?;
            counter!(
                m::ENRICHMENT_CVE_MATCHES_TOTAL,
                m::LABEL_SEVERITY => found.severity.as_db_str(),
                m::LABEL_SOURCE => found.source.clone()
            )
            .increment(1);
        }

        stage2::update_enrichment(conn, &library.library_id, &meta)?;
        Ok(matches.len())
    }

    fn run_batch(&mut self, store: &mut Store, batch_size: usize) -> Result<usize, PipelineError> {
        let libraries = stage2::fetch_unenriched(store.conn(), batch_size)?;

        let mut enriched = 0;
        for library in &libraries {
            match self.enrich_one(store.conn(), library) {
                Ok(cves) => {
                    self.failures.remove(&library.library_id);
                    enriched += 1;
                    if cves > 0 {
                        info!(
                            library_id = %library.library_id,
                            library = %library.library_name,
                            cves,
                            "vulnerabilities linked to library"
                        );
                    }
                }
                Err(e) => {
                    counter!(m::ENRICHMENT_FAILURES_TOTAL).increment(1);
                    warn!(library_id = %library.library_id, error = %e, "library enrichment failed");
                    self.record_failure(store.conn(), &library.library_id);
                }
            }
        }
        Ok(enriched)
    }

    /// 연속 실패 횟수를 올리고, 한도에 도달하면 빈 센티널을 기록합니다.
    fn record_failure(&mut self, conn: &Connection, library_id: &str) {
        let attempts = self.failures.entry(library_id.to_owned()).or_insert(0);
        *attempts += 1;
        if *attempts < MAX_ENRICHMENT_ATTEMPTS {
            return;
        }

        match stage2::mark_no_metadata(conn, library_id) {
            Ok(_) => {
                self.failures.remove(library_id);
                counter!(m::ENRICHMENT_ABANDONED_TOTAL).increment(1);
                warn!(
                    library_id,
                    attempts = MAX_ENRICHMENT_ATTEMPTS,
                    "library enrichment abandoned, marked without metadata"
                );
            }
            Err(e) => {
                warn!(library_id, error = %e, "failed to mark library without metadata");
            }
        }
    }
}

impl Default for CatalogEnrichmentProcessor {
    fn default() -> Self {
        Self::new()
    }
}

impl StageProcessor for CatalogEnrichmentProcessor {
    fn name(&self) -> &'static str {
        CATALOG_ENRICHMENT
    }

    fn initialize(&mut self, config: &LibtrailConfig) -> Result<(), PipelineError> {
        let section = &config.enrichment;
        self.enabled = section.enabled;
        self.batch_size = section.batch_size;
        self.matcher = PatternMatcher::new(Duration::from_secs(section.pattern_cache_ttl_secs));

        if self.engine.is_none() && !section.vuln_db_path.is_empty() {
            match JsonVulnEngine::load_from_dir(Path::new(&section.vuln_db_path)) {
                Ok(engine) => {
                    info!(
                        path = %section.vuln_db_path,
                        entries = engine.entry_count(),
                        "local vulnerability engine loaded"
                    );
                    self.engine = Some(Box::new(engine));
                }
                Err(e) => {
                    warn!(
                        path = %section.vuln_db_path,
                        error = %e,
                        "local vulnerability engine unavailable, using pattern matcher only"
                    );
                }
            }
        }

        self.initialized = true;
        info!(
            enabled = self.enabled,
            batch_size = self.batch_size,
            engine = self.engine_name().unwrap_or("none"),
            pattern_ttl_secs = section.pattern_cache_ttl_secs,
            "catalog-enrichment processor initialized"
        );
        Ok(())
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn batch_size(&self) -> usize {
        self.batch_size
    }

    fn process_batch(
        &mut self,
        store: &mut Store,
        batch_size: usize,
    ) -> Result<usize, PipelineError> {
        if !self.initialized {
            return Err(PipelineError::NotInitialized(CATALOG_ENRICHMENT.to_owned()));
        }

        let started = Instant::now();
        let result = self.run_batch(store, batch_size);
        record_batch_duration(CATALOG_ENRICHMENT, started);

        let enriched = result?;
        counter!(m::ENRICHMENT_LIBRARIES_TOTAL).increment(enriched as u64);
        Ok(enriched)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EngineError;
    use libtrail_core::types::{LibraryObservation, Severity};

    struct FailingEngine;

    impl VulnerabilityEngine for FailingEngine {
        fn name(&self) -> &str {
            "failing"
        }
        fn is_enabled(&self) -> bool {
            true
        }
        fn find_vulnerabilities(&self, _: &LibraryMetadata) -> Result<Vec<CveMatch>, EngineError> {
            Err(EngineError::Query("connection refused".to_owned()))
        }
    }

    struct FixedEngine;

    impl VulnerabilityEngine for FixedEngine {
        fn name(&self) -> &str {
            "fixed"
        }
        fn is_enabled(&self) -> bool {
            true
        }
        fn find_vulnerabilities(&self, meta: &LibraryMetadata) -> Result<Vec<CveMatch>, EngineError> {
            if meta.artifact_id.as_deref() != Some("log4j-core") {
                return Ok(Vec::new());
            }
            Ok(vec![CveMatch {
                cve_id: "CVE-2021-44228".to_owned(),
                name: "Log4Shell".to_owned(),
                severity: Severity::Critical,
                cvss_score: Some(10.0),
                description: "JNDI lookup RCE".to_owned(),
                cwe_ids: vec!["CWE-502".to_owned()],
                source: "fixed".to_owned(),
            }])
        }
    }

    fn library(store: &Store, sha: &str, path: &str, seen_at: i64) {
        stage2::upsert_library(
            store.conn(),
            &LibraryObservation {
                sha256: sha.to_owned(),
                event_id: format!("evt-{sha}"),
                aid: "app".to_owned(),
                cid: "prod".to_owned(),
                jar_path: path.to_owned(),
                library_name: crate::naming::display_name(path),
                method: "URLClassLoader".to_owned(),
                seen_at,
            },
        )
        .unwrap();
    }

    fn pattern_cve(store: &Store) {
        cve::upsert_cve(
            store.conn(),
            &CveRecord {
                cve_id: "CVE-2022-42889".to_owned(),
                cve_name: "Text4Shell".to_owned(),
                severity: Severity::Critical,
                cvss_v3: Some(9.8),
                description: "string interpolation RCE".to_owned(),
                affected_libraries: vec!["commons-text*".to_owned()],
                fixed_versions: vec!["1.10.0".to_owned()],
                cwe_ids: Vec::new(),
            },
        )
        .unwrap();
    }

    fn initialized(p: CatalogEnrichmentProcessor) -> CatalogEnrichmentProcessor {
        let mut config = LibtrailConfig::default();
        config.enrichment.vuln_db_path = String::new();
        let mut p = p;
        p.initialize(&config).unwrap();
        p
    }

    #[test]
    fn metadata_uses_file_name_coordinates() {
        let store = Store::open_in_memory().unwrap();
        library(&store, "aa", "/opt/lib/log4j-core-2.14.1.jar", 1);
        let lib = stage2::get_library(store.conn(), "aa").unwrap().unwrap();
        let meta = metadata_for(&lib);
        assert_eq!(meta.artifact_id.as_deref(), Some("log4j-core"));
        assert_eq!(meta.version.as_deref(), Some("2.14.1"));
        assert!(meta.group_id.is_none());
    }

    #[test]
    fn engine_matches_are_stored_and_linked() {
        let mut store = Store::open_in_memory().unwrap();
        library(&store, "aa", "/opt/lib/log4j-core-2.14.1.jar", 1);

        let mut p = initialized(CatalogEnrichmentProcessor::new().with_engine(Box::new(FixedEngine)));
        assert_eq!(p.engine_name(), Some("fixed"));
        assert_eq!(p.process_batch(&mut store, 10).unwrap(), 1);

        let cves = stage2::library_cves(store.conn(), "aa").unwrap();
        assert_eq!(cves.len(), 1);
        assert_eq!(cves[0].cve_id, "CVE-2021-44228");

        let lib = stage2::get_library(store.conn(), "aa").unwrap().unwrap();
        assert_eq!(lib.group_id.as_deref(), Some(""));
        assert_eq!(lib.artifact_id.as_deref(), Some("log4j-core"));

        // 보강된 레코드는 다시 선택되지 않음
        assert_eq!(p.process_batch(&mut store, 10).unwrap(), 0);
    }

    #[test]
    fn failing_engine_falls_back_to_patterns() {
        let mut store = Store::open_in_memory().unwrap();
        pattern_cve(&store);
        library(&store, "bb", "/srv/lib/commons-text-1.9.jar", 1);

        let mut p =
            initialized(CatalogEnrichmentProcessor::new().with_engine(Box::new(FailingEngine)));
        assert_eq!(p.process_batch(&mut store, 10).unwrap(), 1);

        let cves = stage2::library_cves(store.conn(), "bb").unwrap();
        assert_eq!(cves.len(), 1);
        assert_eq!(cves[0].cve_id, "CVE-2022-42889");
        // 패턴 매칭 upsert가 영향 패턴 목록을 지우지 않음
        assert_eq!(cves[0].affected_libraries, vec!["commons-text*"]);
    }

    #[test]
    fn empty_engine_result_falls_back_to_patterns() {
        let mut store = Store::open_in_memory().unwrap();
        pattern_cve(&store);
        library(&store, "bb", "/srv/lib/commons-text-1.9.jar", 1);

        let mut p = initialized(CatalogEnrichmentProcessor::new().with_engine(Box::new(FixedEngine)));
        p.process_batch(&mut store, 10).unwrap();
        assert_eq!(stage2::library_cves(store.conn(), "bb").unwrap().len(), 1);
    }

    #[test]
    fn no_matches_still_sets_sentinel() {
        let mut store = Store::open_in_memory().unwrap();
        library(&store, "cc", "/lib/tools.jar", 1);

        let mut p = initialized(CatalogEnrichmentProcessor::new());
        assert_eq!(p.engine_name(), None);
        assert_eq!(p.process_batch(&mut store, 10).unwrap(), 1);

        let lib = stage2::get_library(store.conn(), "cc").unwrap().unwrap();
        assert!(lib.is_enriched());
        assert!(stage2::library_cves(store.conn(), "cc").unwrap().is_empty());
    }

    #[test]
    fn oldest_first_and_bounded() {
        let mut store = Store::open_in_memory().unwrap();
        library(&store, "new", "/lib/b-1.0.jar", 200);
        library(&store, "old", "/lib/a-1.0.jar", 100);

        let mut p = initialized(CatalogEnrichmentProcessor::new());
        assert_eq!(p.process_batch(&mut store, 1).unwrap(), 1);
        assert!(
            stage2::get_library(store.conn(), "old")
                .unwrap()
                .unwrap()
                .is_enriched()
        );
        assert!(
            !stage2::get_library(store.conn(), "new")
                .unwrap()
                .unwrap()
                .is_enriched()
        );
    }

    #[test]
    fn failing_library_does_not_block_batch_and_is_eventually_abandoned() {
        let mut store = Store::open_in_memory().unwrap();
        library(&store, "bad", "/lib/broken-1.0.jar", 100);
        library(&store, "good", "/lib/tools-2.0.jar", 200);
        // "bad"의 메타데이터 기록만 실패시킴 (센티널만 쓰는 UPDATE는 통과)
        store
            .conn()
            .execute_batch(
                "CREATE TRIGGER fail_bad BEFORE UPDATE ON STAGE2_LIBRARY \
                 WHEN NEW.LIBRARY_ID = 'bad' AND NEW.ARTIFACT_ID IS NOT NULL \
                 BEGIN SELECT RAISE(ABORT, 'disk I/O error'); END;",
            )
            .unwrap();

        let mut p = initialized(CatalogEnrichmentProcessor::new());
        assert_eq!(p.process_batch(&mut store, 10).unwrap(), 1);
        assert!(
            stage2::get_library(store.conn(), "good")
                .unwrap()
                .unwrap()
                .is_enriched()
        );
        let bad = stage2::get_library(store.conn(), "bad").unwrap().unwrap();
        assert!(bad.group_id.is_none());

        // 한도 직전까지는 계속 재선택됨
        for _ in 1..MAX_ENRICHMENT_ATTEMPTS {
            assert_eq!(stage2::fetch_unenriched(store.conn(), 10).unwrap().len(), 1);
            assert_eq!(p.process_batch(&mut store, 10).unwrap(), 0);
        }

        let bad = stage2::get_library(store.conn(), "bad").unwrap().unwrap();
        assert_eq!(bad.group_id.as_deref(), Some(""));
        assert!(bad.artifact_id.is_none());
        assert!(stage2::fetch_unenriched(store.conn(), 10).unwrap().is_empty());
        assert!(p.failures.is_empty());
    }

    #[test]
    fn success_resets_failure_count() {
        let mut store = Store::open_in_memory().unwrap();
        library(&store, "flaky", "/lib/flaky-1.0.jar", 100);
        store
            .conn()
            .execute_batch(
                "CREATE TRIGGER fail_flaky BEFORE UPDATE ON STAGE2_LIBRARY \
                 WHEN NEW.LIBRARY_ID = 'flaky' AND NEW.ARTIFACT_ID IS NOT NULL \
                 BEGIN SELECT RAISE(ABORT, 'locked'); END;",
            )
            .unwrap();

        let mut p = initialized(CatalogEnrichmentProcessor::new());
        for _ in 1..MAX_ENRICHMENT_ATTEMPTS {
            assert_eq!(p.process_batch(&mut store, 10).unwrap(), 0);
        }
        assert_eq!(p.failures.get("flaky"), Some(&(MAX_ENRICHMENT_ATTEMPTS - 1)));

        store.conn().execute_batch("DROP TRIGGER fail_flaky;").unwrap();
        assert_eq!(p.process_batch(&mut store, 10).unwrap(), 1);
        assert!(p.failures.is_empty());
        let lib = stage2::get_library(store.conn(), "flaky").unwrap().unwrap();
        assert_eq!(lib.artifact_id.as_deref(), Some("flaky"));
    }

    #[test]
    fn missing_vuln_db_is_tolerated() {
        let mut config = LibtrailConfig::default();
        config.enrichment.vuln_db_path = "/nonexistent/libtrail/vuln-db".to_owned();
        let mut p = CatalogEnrichmentProcessor::new();
        p.initialize(&config).unwrap();
        assert_eq!(p.engine_name(), None);
    }

    #[test]
    fn loads_engine_from_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("apache.json"),
            r#"[{"cve_id":"CVE-2021-44228","artifact_id":"log4j-core",
                 "affected_ranges":[{"introduced":"2.0.0","fixed":"2.15.0"}],
                 "severity":"Critical"}]"#,
        )
        .unwrap();
        let mut config = LibtrailConfig::default();
        config.enrichment.vuln_db_path = dir.path().display().to_string();

        let mut p = CatalogEnrichmentProcessor::new();
        p.initialize(&config).unwrap();
        assert_eq!(p.engine_name(), Some(crate::vuln::JSON_ENGINE_NAME));

        let mut store = Store::open_in_memory().unwrap();
        library(&store, "aa", "/opt/lib/log4j-core-2.14.1.jar", 1);
        p.process_batch(&mut store, 10).unwrap();
        let cves = stage2::library_cves(store.conn(), "aa").unwrap();
        assert_eq!(cves.len(), 1);
        assert_eq!(cves[0].severity, Severity::Critical);
    }
}
