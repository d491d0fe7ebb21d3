//! CVE 피드 가져오기
//!
//! 영향 라이브러리 glob 패턴을 포함한 CVE 목록(JSON 배열)을 `STAGE2_LIBRARY_CVE`에
//! upsert합니다. 패턴 매처는 이 테이블을 읽습니다.
//!
//! ```json
//! [
//!   {
//!     "cve_id": "CVE-2021-44228",
//!     "name": "Log4Shell",
//!     "severity": "CRITICAL",
//!     "cvss_v3": 10.0,
//!     "description": "JNDI lookup remote code execution",
//!     "affected_libraries": ["log4j-core*", "log4j-api*"],
//!     "fixed_versions": ["2.17.1"],
//!     "cwe_ids": ["CWE-502"]
//!   }
//! ]
//! ```
//!
//! `severity`는 대소문자를 가리지 않으며, 없거나 알 수 없으면 `cvss_v3`에서 계산합니다.

use std::path::Path;

use serde::Deserialize;
use tracing::{info, warn};

use libtrail_core::types::{CveRecord, Severity};
use libtrail_store::{Store, cve};

use crate::error::PipelineError;

/// 피드 파일 최대 크기 (50 MB)
const MAX_FEED_FILE_SIZE: u64 = 50 * 1024 * 1024;

/// 피드 엔트리
#[derive(Debug, Clone, Deserialize)]
pub struct FeedEntry {
    pub cve_id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub severity: Option<String>,
    #[serde(default)]
    pub cvss_v3: Option<f64>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub affected_libraries: Vec<String>,
    #[serde(default)]
    pub fixed_versions: Vec<String>,
    #[serde(default)]
    pub cwe_ids: Vec<String>,
}

impl FeedEntry {
    fn severity(&self) -> Severity {
        self.severity
            .as_deref()
            .and_then(Severity::from_str_loose)
            .or_else(|| self.cvss_v3.map(Severity::from_cvss))
            .unwrap_or_default()
    }

    pub fn into_record(self) -> CveRecord {
        let severity = self.severity();
        CveRecord {
            cve_name: self.name.unwrap_or_else(|| self.cve_id.clone()),
            cve_id: self.cve_id,
            severity,
            cvss_v3: self.cvss_v3,
            description: self.description,
            affected_libraries: self.affected_libraries,
            fixed_versions: self.fixed_versions,
            cwe_ids: self.cwe_ids,
        }
    }
}

/// 피드 JSON을 파싱합니다. CVE ID가 빈 엔트리는 경고 후 버립니다.
pub fn parse_feed(json: &str) -> Result<Vec<CveRecord>, PipelineError> {
    let entries: Vec<FeedEntry> = serde_json::from_str(json)
        .map_err(|e| PipelineError::VulnDbParse(format!("failed to parse CVE feed: {e}")))?;

    Ok(entries
        .into_iter()
        .filter(|entry| {
            let keep = !entry.cve_id.trim().is_empty();
            if !keep {
                warn!("dropping CVE feed entry without cve_id");
            }
            keep
        })
        .map(FeedEntry::into_record)
        .collect())
}

/// 피드 파일을 읽어 파싱합니다.
pub fn load_feed_file(path: &Path) -> Result<Vec<CveRecord>, PipelineError> {
    let load_err = |reason: String| PipelineError::VulnDbLoad {
        path: path.display().to_string(),
        reason,
    };

    let metadata = std::fs::metadata(path).map_err(|e| load_err(e.to_string()))?;
    if metadata.len() > MAX_FEED_FILE_SIZE {
        return Err(load_err(format!(
            "file size {} bytes exceeds maximum {} bytes",
            metadata.len(),
            MAX_FEED_FILE_SIZE
        )));
    }
    let content = std::fs::read_to_string(path).map_err(|e| load_err(e.to_string()))?;
    parse_feed(&content)
}

/// 레코드를 한 트랜잭션으로 upsert하고 개수를 반환합니다.
pub fn import_records(store: &mut Store, records: &[CveRecord]) -> Result<usize, PipelineError> {
    let tx = store.transaction()?;
    for record in records {
        cve::upsert_cve(&tx, record)?;
    }
    tx.commit().map_err(libtrail_store::StoreError::from)?;
    Ok(records.len())
}

/// 피드 파일을 가져옵니다.
pub fn import_file(store: &mut Store, path: &Path) -> Result<usize, PipelineError> {
    let records = load_feed_file(path)?;
    let imported = import_records(store, &records)?;
    info!(path = %path.display(), cves = imported, "CVE feed imported");
    Ok(imported)
}
