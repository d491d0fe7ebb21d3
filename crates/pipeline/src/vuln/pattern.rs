//! 취약점 패턴 매처 -- 로컬 CVE 레코드의 glob 패턴 캐시
//!
//! CVE 테이블의 `AFFECTED_LIBRARIES` glob 패턴(`log4j*`, `commons-text-1.?`)을
//! 대소문자 무시 정규식으로 컴파일해 보관하고, TTL이 지나면 통째로 다시 읽습니다.
//! 외부 엔진이 비활성/실패/무결과일 때 보강 processor가 사용하는 fallback입니다.
//!
//! # 매칭 규칙
//! - `*` → `.*`, `?` → `.`, 나머지 문자는 리터럴
//! - 패턴은 문자열 시작 또는 경로 구분자(`/`, `\`) 직후에서 시작해야 합니다.
//!   끝은 고정하지 않습니다 (find 의미).
//! - 소문자화한 표시 이름 또는 전체 경로 중 하나라도 매칭되면 영향받음

use std::time::{Duration, Instant};

use metrics::{counter, gauge};
use regex::Regex;
use rusqlite::Connection;
use tracing::{debug, info, warn};

use libtrail_core::metrics as m;
use libtrail_core::types::{CveMatch, CveRecord};
use libtrail_store::cve;

use crate::error::PipelineError;

/// 기본 캐시 TTL (1시간)
pub const DEFAULT_PATTERN_TTL: Duration = Duration::from_secs(3600);

/// `CveMatch::source`에 기록되는 출처 이름
pub const PATTERN_SOURCE: &str = "pattern";

/// glob 패턴을 정규식으로 변환합니다.
pub fn glob_to_regex(pattern: &str) -> Result<Regex, PipelineError> {
    let trimmed = pattern.trim();
    if trimmed.is_empty() {
        return Err(PipelineError::Pattern {
            pattern: pattern.to_owned(),
            reason: "empty pattern".to_owned(),
        });
    }

    let mut body = String::with_capacity(trimmed.len() * 2);
    for ch in trimmed.chars() {
        match ch {
            '*' => body.push_str(".*"),
            '?' => body.push('.'),
            other => body.push_str(&regex::escape(other.encode_utf8(&mut [0u8; 4]))),
        }
    }

    Regex::new(&format!(r"(?i)(?:^|[/\\]){body}")).map_err(|e| PipelineError::Pattern {
        pattern: pattern.to_owned(),
        reason: e.to_string(),
    })
}

struct CompiledCve {
    record: CveRecord,
    matchers: Vec<Regex>,
}

impl CompiledCve {
    fn matches(&self, name: &str, path: &str) -> bool {
        self.matchers
            .iter()
            .any(|re| re.is_match(name) || re.is_match(path))
    }

    fn to_match(&self) -> CveMatch {
        CveMatch {
            cve_id: self.record.cve_id.clone(),
            name: self.record.cve_name.clone(),
            severity: self.record.severity,
            cvss_score: self.record.cvss_v3,
            description: self.record.description.clone(),
            cwe_ids: self.record.cwe_ids.clone(),
            source: PATTERN_SOURCE.to_owned(),
        }
    }
}

/// TTL 기반 패턴 캐시
///
/// processor 인스턴스가 소유합니다. 캐시 순서는 저장소 조회 순서
/// (CRITICAL → HIGH → MEDIUM, CVE ID)를 그대로 따릅니다.
pub struct PatternMatcher {
    ttl: Duration,
    cache: Vec<CompiledCve>,
    loaded_at: Option<Instant>,
}

impl PatternMatcher {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            cache: Vec::new(),
            loaded_at: None,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// 캐시된 CVE 수
    pub fn cached_cves(&self) -> usize {
        self.cache.len()
    }

    /// 한 번도 로드되지 않았거나 TTL이 지났으면 `true`
    pub fn is_stale(&self) -> bool {
        self.loaded_at
            .is_none_or(|loaded| loaded.elapsed() >= self.ttl)
    }

    /// 다음 매칭 때 캐시를 다시 읽도록 합니다.
    pub fn invalidate(&mut self) {
        self.loaded_at = None;
    }

    /// 저장소에서 패턴 CVE를 읽어 캐시를 통째로 교체합니다.
    ///
    /// 컴파일할 수 없는 패턴은 경고 후 건너뜁니다.
    pub fn refresh(&mut self, conn: &Connection) -> Result<usize, PipelineError> {
        let records = cve::fetch_pattern_cves(conn)?;
        let mut cache = Vec::with_capacity(records.len());

        for record in records {
            let matchers: Vec<Regex> = record
                .affected_libraries
                .iter()
                .filter_map(|pattern| match glob_to_regex(pattern) {
                    Ok(re) => Some(re),
                    Err(e) => {
                        warn!(cve_id = %record.cve_id, error = %e, "skipping invalid affected-library pattern");
                        None
                    }
                })
                .collect();
            if !matchers.is_empty() {
                cache.push(CompiledCve { record, matchers });
            }
        }

        self.cache = cache;
        self.loaded_at = Some(Instant::now());
        counter!(m::ENRICHMENT_PATTERN_CACHE_REFRESHES_TOTAL).increment(1);
        gauge!(m::ENRICHMENT_PATTERN_CACHE_SIZE).set(self.cache.len() as f64);
        info!(cves = self.cache.len(), "vulnerability pattern cache refreshed");
        Ok(self.cache.len())
    }

    /// 라이브러리 이름/경로에 매칭되는 CVE를 반환합니다. 캐시가 오래되었으면 먼저 갱신합니다.
    pub fn match_library(
        &mut self,
        conn: &Connection,
        library_name: &str,
        jar_path: &str,
        method: &str,
    ) -> Result<Vec<CveMatch>, PipelineError> {
        if self.is_stale() {
            self.refresh(conn)?;
        }

        let name = library_name.to_lowercase();
        let path = jar_path.to_lowercase();
        let matches: Vec<CveMatch> = self
            .cache
            .iter()
            .filter(|c| c.matches(&name, &path))
            .map(CompiledCve::to_match)
            .collect();

        debug!(
            library = library_name,
            path = jar_path,
            method,
            matches = matches.len(),
            "pattern matcher lookup"
        );
        Ok(matches)
    }
}

impl Default for PatternMatcher {
    fn default() -> Self {
        Self::new(DEFAULT_PATTERN_TTL)
    }
}
