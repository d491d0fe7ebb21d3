//! 도메인 타입 -- 파이프라인 전 단계에서 사용되는 공통 타입
//!
//! 각 stage(Stage0 원시 레코드, Stage1 파싱 이벤트, Stage2 라이브러리 카탈로그)의
//! 레코드와 취약점 관련 타입을 정의합니다.
//! 모든 타임스탬프는 Unix epoch 밀리초(`i64`)입니다.

use std::collections::BTreeMap;
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// 디코딩된 key-value 메타데이터
///
/// 키 순서가 결정적이어야 Stage1 keypair 행의 삽입 순서가 재현 가능하므로
/// `BTreeMap`을 사용합니다.
pub type KeyPairs = BTreeMap<String, String>;

/// 현재 시각을 epoch 밀리초로 반환합니다.
pub fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}

/// Stage0 원시 텔레메트리 레코드
///
/// 계측 레이어가 기록한 그대로의 행입니다. Stage1로 이전된 뒤 삭제됩니다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawRecord {
    /// 이벤트 식별자 (고유)
    pub event_id: String,
    /// 이벤트를 생성한 설정 파일
    pub config_file: String,
    /// 이벤트 발생 시각 (epoch ms)
    pub timestamp: i64,
    /// 스레드 ID
    pub thread_id: String,
    /// 우선순위
    pub priority: String,
    /// 이벤트 네임스페이스
    pub namespace: String,
    /// 애플리케이션 식별자
    pub aid: String,
    /// 카테고리/상관관계 식별자
    pub cid: String,
    /// 인코딩된 key-value 페이로드 (구조화/레거시 형식)
    pub keypairs: String,
}

/// Stage1 파싱 이벤트
///
/// `stable == false`인 행은 쓰기 진행 중이며 하위 stage에서 절대 읽지 않습니다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedEvent {
    pub event_id: String,
    pub config_file: String,
    pub timestamp: i64,
    pub thread_id: String,
    pub priority: String,
    pub namespace: String,
    pub aid: String,
    pub cid: String,
    /// 안정성 플래그
    pub stable: bool,
}

impl ParsedEvent {
    /// 원시 레코드에서 불안정 상태의 파싱 이벤트를 생성합니다.
    pub fn unstable_from(raw: &RawRecord) -> Self {
        Self {
            event_id: raw.event_id.clone(),
            config_file: raw.config_file.clone(),
            timestamp: raw.timestamp,
            thread_id: raw.thread_id.clone(),
            priority: raw.priority.clone(),
            namespace: raw.namespace.clone(),
            aid: raw.aid.clone(),
            cid: raw.cid.clone(),
            stable: false,
        }
    }
}

/// 라이브러리 관찰 -- Stage1 이벤트에서 추출되어 카탈로그 upsert에 사용됩니다.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LibraryObservation {
    /// 콘텐츠 해시 (SHA-256, 센서가 제공)
    pub sha256: String,
    /// 원본 이벤트 ID
    pub event_id: String,
    pub aid: String,
    pub cid: String,
    /// 아티팩트 경로
    pub jar_path: String,
    /// 표시 이름 (경로, 확장자, 버전 접미사 제거)
    pub library_name: String,
    /// 로딩 방식 (예: URLClassLoader)
    pub method: String,
    /// 관찰 시각 (epoch ms)
    pub seen_at: i64,
}

/// Stage2 라이브러리 카탈로그 엔트리
///
/// 식별자는 콘텐츠 해시입니다. 같은 바이트를 가진 서로 다른 경로는
/// 하나의 레코드로 합쳐집니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LibraryRecord {
    pub library_id: String,
    pub event_id: String,
    pub aid: String,
    pub cid: String,
    pub jar_path: String,
    pub library_name: String,
    pub sha256_hash: String,
    pub method: String,
    pub first_seen: i64,
    pub last_seen: i64,
    pub is_active: bool,
    /// 보강 마커 -- `None`이면 아직 보강되지 않음, `Some("")`은 "메타데이터 없음"
    pub group_id: Option<String>,
    pub artifact_id: Option<String>,
    pub version: Option<String>,
    pub impl_title: Option<String>,
    pub impl_vendor: Option<String>,
    pub package_names: Option<Vec<String>>,
}

impl LibraryRecord {
    /// 보강이 완료(또는 빈 센티널로 표시)되었는지 반환합니다.
    pub fn is_enriched(&self) -> bool {
        self.group_id.is_some()
    }
}

/// 취약점 엔진에 전달되는 라이브러리 메타데이터 디스크립터
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LibraryMetadata {
    pub group_id: Option<String>,
    pub artifact_id: Option<String>,
    pub version: Option<String>,
    pub impl_title: Option<String>,
    pub impl_vendor: Option<String>,
    #[serde(default)]
    pub package_names: Vec<String>,
}

impl LibraryMetadata {
    /// 알려진 좌표/벤더 정보가 하나도 없으면 `true`를 반환합니다.
    pub fn is_empty(&self) -> bool {
        self.group_id.is_none()
            && self.artifact_id.is_none()
            && self.version.is_none()
            && self.impl_title.is_none()
            && self.impl_vendor.is_none()
            && self.package_names.is_empty()
    }
}

/// 취약점 엔진이 반환하는 CVE 매칭 결과
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CveMatch {
    pub cve_id: String,
    pub name: String,
    pub severity: Severity,
    pub cvss_score: Option<f64>,
    pub description: String,
    #[serde(default)]
    pub cwe_ids: Vec<String>,
    /// 매칭 출처 (엔진 이름 또는 "pattern")
    pub source: String,
}

/// 로컬에 저장된 CVE 레코드
///
/// 식별자는 불변이며 upsert 시 심각도/점수/설명만 갱신됩니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CveRecord {
    pub cve_id: String,
    pub cve_name: String,
    pub severity: Severity,
    pub cvss_v3: Option<f64>,
    pub description: String,
    /// 영향받는 라이브러리 glob 패턴 (예: `log4j*`)
    #[serde(default)]
    pub affected_libraries: Vec<String>,
    #[serde(default)]
    pub fixed_versions: Vec<String>,
    #[serde(default)]
    pub cwe_ids: Vec<String>,
}

impl From<&CveMatch> for CveRecord {
    fn from(m: &CveMatch) -> Self {
        Self {
            cve_id: m.cve_id.clone(),
            cve_name: m.name.clone(),
            severity: m.severity,
            cvss_v3: m.cvss_score,
            description: m.description.clone(),
            affected_libraries: Vec::new(),
            fixed_versions: Vec::new(),
            cwe_ids: m.cwe_ids.clone(),
        }
    }
}

/// 심각도 레벨
///
/// `Ord` 구현으로 심각도 비교가 가능합니다 (`Info < Low < Medium < High < Critical`).
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum Severity {
    /// 정보성
    #[default]
    Info,
    /// 낮은 심각도
    Low,
    /// 중간 심각도
    Medium,
    /// 높은 심각도
    High,
    /// 치명적 -- 즉시 대응 필요
    Critical,
}

impl Severity {
    /// 문자열에서 심각도를 파싱합니다.
    ///
    /// 대소문자를 구분하지 않습니다.
    pub fn from_str_loose(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "info" | "informational" | "none" => Some(Self::Info),
            "low" => Some(Self::Low),
            "medium" | "med" | "moderate" => Some(Self::Medium),
            "high" | "important" => Some(Self::High),
            "critical" | "crit" => Some(Self::Critical),
            _ => None,
        }
    }

    /// CVSS v3 점수에서 심각도 등급을 계산합니다.
    pub fn from_cvss(score: f64) -> Self {
        if score >= 9.0 {
            Self::Critical
        } else if score >= 7.0 {
            Self::High
        } else if score >= 4.0 {
            Self::Medium
        } else if score > 0.0 {
            Self::Low
        } else {
            Self::Info
        }
    }

    /// `CVSS_SEVERITY` 컬럼에 저장되는 대문자 표기
    pub fn as_db_str(&self) -> &'static str {
        match self {
            Self::Info => "INFO",
            Self::Low => "LOW",
            Self::Medium => "MEDIUM",
            Self::High => "HIGH",
            Self::Critical => "CRITICAL",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Info => write!(f, "Info"),
            Self::Low => write!(f, "Low"),
            Self::Medium => write!(f, "Medium"),
            Self::High => write!(f, "High"),
            Self::Critical => write!(f, "Critical"),
        }
    }
}
