//! 메트릭 상수 및 설명 등록
//!
//! 모든 Prometheus 메트릭의 이름과 설명을 중앙에서 정의합니다.
//! 각 모듈은 이 상수를 사용하여 `metrics::counter!()`, `metrics::gauge!()`,
//! `metrics::histogram!()` 매크로를 호출합니다.
//!
//! # 네이밍 컨벤션
//!
//! - 접두어: `libtrail_`
//! - 모듈명: `raw_to_parsed_`, `parsed_to_catalog_`, `enrichment_`, `tracker_`, `daemon_`
//! - 접미어: `_total` (counter), `_seconds` (histogram/latency), 없음 (gauge)
//!
//! # 사용 예시
//!
//! ```ignore
//! use metrics::counter;
//!
//! counter!(libtrail_core::metrics::RAW_TO_PARSED_RECORDS_TOTAL).increment(1);
//! ```

// ─── 레이블 키 상수 ────────────────────────────────────────────────

/// processor 이름 레이블 키 (raw-to-parsed, parsed-to-catalog, catalog-enrichment)
pub const LABEL_PROCESSOR: &str = "processor";

/// 디코더 형식 레이블 키 (json, legacy)
pub const LABEL_FORMAT: &str = "format";

/// CVE 매칭 출처 레이블 키 (engine, pattern)
pub const LABEL_SOURCE: &str = "source";

/// 심각도 레이블 키
pub const LABEL_SEVERITY: &str = "severity";

/// 결과 레이블 키 (success, failure)
pub const LABEL_RESULT: &str = "result";

// ─── Record Parser 메트릭 ──────────────────────────────────────────

/// Parser: 디코딩 실패로 빈 매핑을 반환한 횟수 (counter, label: format)
pub const PARSER_DECODE_FAILURES_TOTAL: &str = "libtrail_parser_decode_failures_total";

// ─── Stage processor 공통 메트릭 ───────────────────────────────────

/// 배치 처리 시간 (histogram, 초, labels: processor, result)
pub const PROCESSOR_BATCH_DURATION_SECONDS: &str = "libtrail_processor_batch_duration_seconds";

// ─── Raw → Parsed 메트릭 ──────────────────────────────────────────

/// Raw → Parsed: 이전 완료된 레코드 수 (counter)
pub const RAW_TO_PARSED_RECORDS_TOTAL: &str = "libtrail_raw_to_parsed_records_total";

/// Raw → Parsed: 롤백된 배치 수 (counter)
pub const RAW_TO_PARSED_BATCH_FAILURES_TOTAL: &str =
    "libtrail_raw_to_parsed_batch_failures_total";

// ─── Parsed → Catalog 메트릭 ──────────────────────────────────────

/// Parsed → Catalog: 카탈로그에 반영된 이벤트 수 (counter)
pub const PARSED_TO_CATALOG_EVENTS_TOTAL: &str = "libtrail_parsed_to_catalog_events_total";

/// Parsed → Catalog: 필수 필드 누락으로 건너뛴 이벤트 수 (counter)
pub const PARSED_TO_CATALOG_SKIPPED_TOTAL: &str = "libtrail_parsed_to_catalog_skipped_total";

/// Parsed → Catalog: 이벤트 단위 트랜잭션 실패 수 (counter)
pub const PARSED_TO_CATALOG_FAILURES_TOTAL: &str = "libtrail_parsed_to_catalog_failures_total";

// ─── Enrichment 메트릭 ────────────────────────────────────────────

/// Enrichment: 보강 처리된 라이브러리 수 (counter)
pub const ENRICHMENT_LIBRARIES_TOTAL: &str = "libtrail_enrichment_libraries_total";

/// Enrichment: 연결된 CVE 수 (counter, label: source)
pub const ENRICHMENT_CVE_MATCHES_TOTAL: &str = "libtrail_enrichment_cve_matches_total";

/// Enrichment: 외부 엔진 대신 패턴 매처를 사용한 횟수 (counter)
pub const ENRICHMENT_ENGINE_FALLBACKS_TOTAL: &str = "libtrail_enrichment_engine_fallbacks_total";

/// Enrichment: 레코드 단위 실패 수 (counter)
pub const ENRICHMENT_FAILURES_TOTAL: &str = "libtrail_enrichment_failures_total";

/// Enrichment: 연속 실패로 보강을 포기하고 센티널을 기록한 항목 수 (counter)
pub const ENRICHMENT_ABANDONED_TOTAL: &str = "libtrail_enrichment_abandoned_total";

/// Enrichment: 패턴 캐시 재적재 횟수 (counter)
pub const ENRICHMENT_PATTERN_CACHE_REFRESHES_TOTAL: &str =
    "libtrail_enrichment_pattern_cache_refreshes_total";

/// Enrichment: 캐시에 적재된 CVE 패턴 수 (gauge)
pub const ENRICHMENT_PATTERN_CACHE_SIZE: &str = "libtrail_enrichment_pattern_cache_size";

// ─── Temporal Tracker 메트릭 ──────────────────────────────────────

/// Tracker: 활성 라이브러리 수 (gauge)
pub const TRACKER_ACTIVE_LIBRARIES: &str = "libtrail_tracker_active_libraries";

/// Tracker: 추적 중인 애플리케이션 수 (gauge)
pub const TRACKER_APPLICATIONS: &str = "libtrail_tracker_applications";

// ─── Daemon 메트릭 ────────────────────────────────────────────────

/// Daemon: 가동 시간 (gauge, 초)
pub const DAEMON_UPTIME_SECONDS: &str = "libtrail_daemon_uptime_seconds";

/// Daemon: 등록된 processor 수 (gauge)
pub const DAEMON_PROCESSORS_REGISTERED: &str = "libtrail_daemon_processors_registered";

/// Daemon: 빌드 정보 (gauge, 항상 1, label: version)
pub const DAEMON_BUILD_INFO: &str = "libtrail_daemon_build_info";

// ─── 히스토그램 버킷 정의 ────────────────────────────────────────────

/// 배치 처리 시간 히스토그램 버킷 (초)
///
/// 1ms ~ 60s 범위 (SQLite 트랜잭션 포함)
pub const BATCH_DURATION_BUCKETS: [f64; 10] =
    [0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0, 60.0];

// ─── 설명 등록 함수 ─────────────────────────────────────────────────

/// 모든 메트릭의 설명(description)을 등록합니다.
///
/// 전역 레코더 설치 후 한 번만 호출해야 합니다.
pub fn describe_all() {
    use metrics::{describe_counter, describe_gauge, describe_histogram};

    describe_counter!(
        PARSER_DECODE_FAILURES_TOTAL,
        "Keypair payloads that failed to decode and produced an empty mapping"
    );
    describe_histogram!(
        PROCESSOR_BATCH_DURATION_SECONDS,
        "Time to run a single stage processor batch in seconds"
    );

    // Raw → Parsed
    describe_counter!(
        RAW_TO_PARSED_RECORDS_TOTAL,
        "Total number of raw records promoted to stable parsed events"
    );
    describe_counter!(
        RAW_TO_PARSED_BATCH_FAILURES_TOTAL,
        "Total number of raw-to-parsed batches rolled back"
    );

    // Parsed → Catalog
    describe_counter!(
        PARSED_TO_CATALOG_EVENTS_TOTAL,
        "Total number of library-load events upserted into the catalog"
    );
    describe_counter!(
        PARSED_TO_CATALOG_SKIPPED_TOTAL,
        "Total number of library-load events skipped for missing fields"
    );
    describe_counter!(
        PARSED_TO_CATALOG_FAILURES_TOTAL,
        "Total number of per-event catalog transactions that failed"
    );

    // Enrichment
    describe_counter!(
        ENRICHMENT_LIBRARIES_TOTAL,
        "Total number of catalog entries enriched"
    );
    describe_counter!(
        ENRICHMENT_CVE_MATCHES_TOTAL,
        "Total number of CVE links written per match source"
    );
    describe_counter!(
        ENRICHMENT_ENGINE_FALLBACKS_TOTAL,
        "Total number of lookups served by the local pattern matcher"
    );
    describe_counter!(
        ENRICHMENT_FAILURES_TOTAL,
        "Total number of catalog entries that failed enrichment"
    );
    describe_counter!(
        ENRICHMENT_ABANDONED_TOTAL,
        "Total number of catalog entries marked enriched after repeated failures"
    );
    describe_counter!(
        ENRICHMENT_PATTERN_CACHE_REFRESHES_TOTAL,
        "Total number of vulnerability pattern cache reloads"
    );
    describe_gauge!(
        ENRICHMENT_PATTERN_CACHE_SIZE,
        "Number of CVE entries held by the pattern cache"
    );

    // Tracker
    describe_gauge!(
        TRACKER_ACTIVE_LIBRARIES,
        "Number of libraries currently active across all applications"
    );
    describe_gauge!(
        TRACKER_APPLICATIONS,
        "Number of applications tracked by the temporal tracker"
    );

    // Daemon
    describe_gauge!(DAEMON_UPTIME_SECONDS, "libtrail daemon uptime in seconds");
    describe_gauge!(
        DAEMON_PROCESSORS_REGISTERED,
        "Number of stage processors registered in the daemon"
    );
    describe_gauge!(
        DAEMON_BUILD_INFO,
        "Build information (always 1, with version label)"
    );
}
