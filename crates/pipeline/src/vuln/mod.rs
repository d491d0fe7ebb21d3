//! 취약점 매칭
//!
//! - [`VulnerabilityEngine`]: 메타데이터를 받아 CVE 목록을 돌려주는 외부 엔진 계약
//! - [`JsonVulnEngine`]: 로컬 JSON 권고 디렉토리 기반 구현
//! - [`PatternMatcher`]: 로컬 CVE 테이블의 glob 패턴 fallback

pub mod db;
pub mod pattern;
pub mod version;

pub use db::{AdvisoryEntry, JSON_ENGINE_NAME, JsonVulnEngine};
pub use pattern::{DEFAULT_PATTERN_TTL, PATTERN_SOURCE, PatternMatcher, glob_to_regex};
pub use version::{VersionRange, is_affected};

use libtrail_core::types::{CveMatch, LibraryMetadata};

use crate::error::EngineError;

/// 외부 취약점 엔진
///
/// 보강 processor는 엔진이 없거나, 비활성이거나, 에러를 내는 경우를 모두 허용하고
/// 그때는 [`PatternMatcher`]로 대체합니다.
pub trait VulnerabilityEngine: Send {
    /// 엔진 이름
    fn name(&self) -> &str;

    /// 엔진 활성화 여부
    fn is_enabled(&self) -> bool;

    /// 라이브러리 메타데이터에 해당하는 CVE를 조회합니다.
    fn find_vulnerabilities(&self, meta: &LibraryMetadata) -> Result<Vec<CveMatch>, EngineError>;
}
