//! 버전 범위 매칭 -- Maven 스타일 버전을 SemVer로 비교
//!
//! `2.17`처럼 구성요소가 부족한 버전은 `2.17.0`으로 보정해 비교합니다.
//! SemVer로 해석할 수 없는 버전(`2.13.4.2`, `5.3.20.RELEASE`)은 문자열 비교로 fallback합니다.

use serde::{Deserialize, Serialize};

/// 영향받는 버전 범위
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionRange {
    /// 도입 버전 (이 버전부터 영향)
    #[serde(default)]
    pub introduced: Option<String>,
    /// 수정 버전 (이 버전에서 수정됨, None이면 미수정)
    #[serde(default)]
    pub fixed: Option<String>,
}

/// 버전이 범위 목록 중 하나라도 포함되면 `true`를 반환합니다.
///
/// 범위가 비어 있으면 매칭하지 않습니다.
pub fn is_affected(version: &str, ranges: &[VersionRange]) -> bool {
    ranges.iter().any(|range| is_in_range(version, range))
}

/// SemVer 파싱. 숫자 구성요소가 1~2개면 0으로 채웁니다.
fn parse_lenient(s: &str) -> Option<semver::Version> {
    let s = s.trim();
    if let Ok(v) = semver::Version::parse(s) {
        return Some(v);
    }
    let parts: Vec<&str> = s.split('.').collect();
    if parts.is_empty()
        || parts.len() > 2
        || parts
            .iter()
            .any(|p| p.is_empty() || !p.bytes().all(|b| b.is_ascii_digit()))
    {
        return None;
    }
    let padded = match parts.len() {
        1 => format!("{}.0.0", parts[0]),
        _ => format!("{}.{}.0", parts[0], parts[1]),
    };
    semver::Version::parse(&padded).ok()
}

fn is_in_range(version_str: &str, range: &VersionRange) -> bool {
    if let Some(version) = parse_lenient(version_str) {
        return is_in_range_semver(&version, range);
    }
    is_in_range_string(version_str, range)
}

fn is_in_range_semver(version: &semver::Version, range: &VersionRange) -> bool {
    if let Some(ref introduced) = range.introduced
        && let Some(intro_ver) = parse_lenient(introduced)
        && version < &intro_ver
    {
        return false;
    }

    if let Some(ref fixed) = range.fixed
        && let Some(fix_ver) = parse_lenient(fixed)
        && version >= &fix_ver
    {
        return false;
    }

    true
}

fn is_in_range_string(version: &str, range: &VersionRange) -> bool {
    if let Some(ref introduced) = range.introduced
        && version < introduced.as_str()
    {
        return false;
    }

    if let Some(ref fixed) = range.fixed
        && version >= fixed.as_str()
    {
        return false;
    }

    true
}
