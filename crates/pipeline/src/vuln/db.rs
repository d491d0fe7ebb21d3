//! 로컬 JSON 취약점 엔진
//!
//! [`JsonVulnEngine`]은 디렉토리의 `*.json` 권고(advisory) 파일을 로드하여
//! [`VulnerabilityEngine`] 계약을 구현합니다.
//!
//! # DB 디렉토리 구조
//!
//! ```text
//! /var/lib/libtrail/vuln-db/
//!   apache.json
//!   fasterxml.json
//! ```
//!
//! # JSON 형식
//!
//! ```json
//! [
//!   {
//!     "cve_id": "CVE-2021-44228",
//!     "name": "Log4Shell",
//!     "group_id": "org.apache.logging.log4j",
//!     "artifact_id": "log4j-core",
//!     "affected_ranges": [{ "introduced": "2.0.0", "fixed": "2.15.0" }],
//!     "severity": "Critical",
//!     "cvss_score": 10.0,
//!     "description": "JNDI lookup remote code execution",
//!     "cwe_ids": ["CWE-502"]
//!   }
//! ]
//! ```
//!
//! `affected_ranges`가 비어 있으면 모든 버전이 영향받는 것으로 봅니다.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use libtrail_core::types::{CveMatch, LibraryMetadata, Severity};

use super::VulnerabilityEngine;
use super::version::{VersionRange, is_affected};
use crate::error::{EngineError, PipelineError};

/// 권고 파일 최대 크기 (50 MB)
const MAX_VULN_DB_FILE_SIZE: u64 = 50 * 1024 * 1024;

/// 전체 권고 엔트리 최대 개수
const MAX_VULN_DB_ENTRIES: usize = 1_000_000;

/// 엔진 이름. `CveMatch::source`와 CVE 링크의 출처로 기록됩니다.
pub const JSON_ENGINE_NAME: &str = "json-db";

/// 권고 엔트리
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdvisoryEntry {
    pub cve_id: String,
    #[serde(default)]
    pub name: String,
    /// 그룹 ID (없으면 artifact id만으로 매칭)
    #[serde(default)]
    pub group_id: Option<String>,
    pub artifact_id: String,
    #[serde(default)]
    pub affected_ranges: Vec<VersionRange>,
    pub severity: Severity,
    #[serde(default)]
    pub cvss_score: Option<f64>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub cwe_ids: Vec<String>,
}

impl AdvisoryEntry {
    fn to_match(&self) -> CveMatch {
        CveMatch {
            cve_id: self.cve_id.clone(),
            name: if self.name.is_empty() {
                self.cve_id.clone()
            } else {
                self.name.clone()
            },
            severity: self.severity,
            cvss_score: self.cvss_score,
            description: self.description.clone(),
            cwe_ids: self.cwe_ids.clone(),
            source: JSON_ENGINE_NAME.to_owned(),
        }
    }

    fn applies_to(&self, meta: &LibraryMetadata) -> bool {
        if let (Some(want), Some(have)) = (&self.group_id, &meta.group_id)
            && !have.is_empty()
            && !want.eq_ignore_ascii_case(have)
        {
            return false;
        }
        if self.affected_ranges.is_empty() {
            return true;
        }
        match meta.version.as_deref() {
            Some(version) => is_affected(version, &self.affected_ranges),
            // 버전을 모르면 배제할 수 없음
            None => true,
        }
    }
}

/// 로컬 JSON 취약점 엔진
///
/// 소문자 artifact id로 인덱싱된 HashMap으로 조회합니다.
pub struct JsonVulnEngine {
    entries: Vec<AdvisoryEntry>,
    index: HashMap<String, Vec<usize>>,
    enabled: bool,
}

impl JsonVulnEngine {
    fn build_index(entries: &[AdvisoryEntry]) -> HashMap<String, Vec<usize>> {
        let mut index: HashMap<String, Vec<usize>> = HashMap::new();
        for (idx, entry) in entries.iter().enumerate() {
            index
                .entry(entry.artifact_id.to_ascii_lowercase())
                .or_default()
                .push(idx);
        }
        index
    }

    pub fn from_entries(entries: Vec<AdvisoryEntry>) -> Self {
        let index = Self::build_index(&entries);
        Self {
            entries,
            index,
            enabled: true,
        }
    }

    /// JSON 문자열(`AdvisoryEntry` 배열)에서 엔진을 생성합니다.
    pub fn from_json(json: &str) -> Result<Self, PipelineError> {
        let entries: Vec<AdvisoryEntry> = serde_json::from_str(json).map_err(|e| {
            PipelineError::VulnDbParse(format!("failed to parse advisory JSON: {e}"))
        })?;
        Ok(Self::from_entries(entries))
    }

    /// 디렉토리의 모든 `*.json` 파일을 파일 이름 순으로 로드합니다.
    ///
    /// # 보안 제한
    ///
    /// - 파일당 최대 50MB
    /// - 전체 엔트리 최대 1,000,000개 (초과분은 잘라냄)
    ///
    /// 동기 I/O입니다. async 컨텍스트에서는 `spawn_blocking`으로 감싸세요.
    pub fn load_from_dir(dir_path: &Path) -> Result<Self, PipelineError> {
        let load_err = |path: &Path, reason: String| PipelineError::VulnDbLoad {
            path: path.display().to_string(),
            reason,
        };

        let mut files: Vec<_> = std::fs::read_dir(dir_path)
            .map_err(|e| load_err(dir_path, e.to_string()))?
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| {
                path.is_file() && path.extension().is_some_and(|ext| ext == "json")
            })
            .collect();
        files.sort();

        let mut all_entries = Vec::new();
        for file_path in files {
            let metadata =
                std::fs::metadata(&file_path).map_err(|e| load_err(&file_path, e.to_string()))?;
            if metadata.len() > MAX_VULN_DB_FILE_SIZE {
                return Err(load_err(
                    &file_path,
                    format!(
                        "file size {} bytes exceeds maximum {} bytes",
                        metadata.len(),
                        MAX_VULN_DB_FILE_SIZE
                    ),
                ));
            }

            let content = std::fs::read_to_string(&file_path)
                .map_err(|e| load_err(&file_path, e.to_string()))?;
            let entries: Vec<AdvisoryEntry> = serde_json::from_str(&content).map_err(|e| {
                PipelineError::VulnDbParse(format!("failed to parse {}: {e}", file_path.display()))
            })?;

            if all_entries.len() + entries.len() > MAX_VULN_DB_ENTRIES {
                warn!(
                    current = all_entries.len(),
                    new = entries.len(),
                    max = MAX_VULN_DB_ENTRIES,
                    "advisory entry limit reached, truncating"
                );
                let remaining = MAX_VULN_DB_ENTRIES.saturating_sub(all_entries.len());
                all_entries.extend(entries.into_iter().take(remaining));
                break;
            }

            info!(path = %file_path.display(), entries = entries.len(), "loaded advisory file");
            all_entries.extend(entries);
        }

        Ok(Self::from_entries(all_entries))
    }

    /// 엔진 활성화 여부를 설정합니다.
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    /// artifact id(대소문자 무시)로 권고를 조회합니다.
    pub fn lookup(&self, artifact_id: &str) -> Vec<&AdvisoryEntry> {
        self.index
            .get(&artifact_id.to_ascii_lowercase())
            .map(|indices| indices.iter().filter_map(|&i| self.entries.get(i)).collect())
            .unwrap_or_default()
    }
}

impl VulnerabilityEngine for JsonVulnEngine {
    fn name(&self) -> &str {
        JSON_ENGINE_NAME
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn find_vulnerabilities(&self, meta: &LibraryMetadata) -> Result<Vec<CveMatch>, EngineError> {
        if !self.enabled {
            return Err(EngineError::Disabled(JSON_ENGINE_NAME.to_owned()));
        }
        let Some(artifact_id) = meta.artifact_id.as_deref() else {
            return Ok(Vec::new());
        };

        let matches: Vec<CveMatch> = self
            .lookup(artifact_id)
            .into_iter()
            .filter(|entry| entry.applies_to(meta))
            .map(AdvisoryEntry::to_match)
            .collect();
        debug!(
            artifact_id,
            version = meta.version.as_deref().unwrap_or(""),
            matches = matches.len(),
            "json engine lookup"
        );
        Ok(matches)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LOG4J_JSON: &str = r#"[
        {
            "cve_id": "CVE-2021-44228",
            "name": "Log4Shell",
            "group_id": "org.apache.logging.log4j",
            "artifact_id": "log4j-core",
            "affected_ranges": [{ "introduced": "2.0.0", "fixed": "2.15.0" }],
            "severity": "Critical",
            "cvss_score": 10.0,
            "description": "JNDI lookup RCE",
            "cwe_ids": ["CWE-502"]
        },
        {
            "cve_id": "CVE-2021-45046",
            "artifact_id": "log4j-core",
            "affected_ranges": [{ "introduced": "2.0.0", "fixed": "2.16.0" }],
            "severity": "Critical"
        },
        {
            "cve_id": "CVE-2099-0001",
            "artifact_id": "everything-broken",
            "severity": "Low"
        }
    ]"#;

    fn meta(artifact: &str, version: Option<&str>) -> LibraryMetadata {
        LibraryMetadata {
            artifact_id: Some(artifact.to_owned()),
            version: version.map(str::to_owned),
            ..LibraryMetadata::default()
        }
    }

    #[test]
    fn matches_vulnerable_version() {
        let engine = JsonVulnEngine::from_json(LOG4J_JSON).unwrap();
        let found = engine
            .find_vulnerabilities(&meta("log4j-core", Some("2.14.1")))
            .unwrap();
        let ids: Vec<_> = found.iter().map(|m| m.cve_id.as_str()).collect();
        assert_eq!(ids, vec!["CVE-2021-44228", "CVE-2021-45046"]);
        assert_eq!(found[0].source, JSON_ENGINE_NAME);
        assert_eq!(found[0].name, "Log4Shell");
        assert_eq!(found[1].name, "CVE-2021-45046");
    }

    #[test]
    fn fixed_version_is_not_matched() {
        let engine = JsonVulnEngine::from_json(LOG4J_JSON).unwrap();
        let found = engine
            .find_vulnerabilities(&meta("log4j-core", Some("2.15.0")))
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].cve_id, "CVE-2021-45046");
        assert!(
            engine
                .find_vulnerabilities(&meta("log4j-core", Some("2.17.1")))
                .unwrap()
                .is_empty()
        );
    }

    #[test]
    fn lookup_is_case_insensitive() {
        let engine = JsonVulnEngine::from_json(LOG4J_JSON).unwrap();
        assert_eq!(engine.lookup("LOG4J-Core").len(), 2);
    }

    #[test]
    fn group_mismatch_excludes_entry() {
        let engine = JsonVulnEngine::from_json(LOG4J_JSON).unwrap();
        let mut m = meta("log4j-core", Some("2.14.1"));
        m.group_id = Some("com.example.fork".to_owned());
        let found = engine.find_vulnerabilities(&m).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].cve_id, "CVE-2021-45046");
    }

    #[test]
    fn unknown_version_and_empty_ranges_match() {
        let engine = JsonVulnEngine::from_json(LOG4J_JSON).unwrap();
        assert_eq!(
            engine
                .find_vulnerabilities(&meta("log4j-core", None))
                .unwrap()
                .len(),
            2
        );
        assert_eq!(
            engine
                .find_vulnerabilities(&meta("everything-broken", Some("0.0.1")))
                .unwrap()
                .len(),
            1
        );
    }

    #[test]
    fn missing_artifact_yields_nothing() {
        let engine = JsonVulnEngine::from_json(LOG4J_JSON).unwrap();
        assert!(
            engine
                .find_vulnerabilities(&LibraryMetadata::default())
                .unwrap()
                .is_empty()
        );
    }

    #[test]
    fn disabled_engine_errors() {
        let engine = JsonVulnEngine::from_json(LOG4J_JSON)
            .unwrap()
            .with_enabled(false);
        assert!(!engine.is_enabled());
        let err = engine
            .find_vulnerabilities(&meta("log4j-core", Some("2.14.1")))
            .unwrap_err();
        assert!(matches!(err, EngineError::Disabled(_)));
    }

    #[test]
    fn from_json_invalid() {
        assert!(matches!(
            JsonVulnEngine::from_json("not json"),
            Err(PipelineError::VulnDbParse(_))
        ));
    }

    #[test]
    fn load_from_dir_reads_json_files_only() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("apache.json"), LOG4J_JSON).unwrap();
        std::fs::write(dir.path().join("README.txt"), "not an advisory").unwrap();
        std::fs::write(dir.path().join("empty.json"), "[]").unwrap();

        let engine = JsonVulnEngine::load_from_dir(dir.path()).unwrap();
        assert_eq!(engine.entry_count(), 3);
    }

    #[test]
    fn load_from_dir_invalid_json_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("broken.json"), "{").unwrap();
        assert!(matches!(
            JsonVulnEngine::load_from_dir(dir.path()),
            Err(PipelineError::VulnDbParse(_))
        ));
    }

    #[test]
    fn load_from_missing_dir_fails() {
        let result = JsonVulnEngine::load_from_dir(Path::new("/nonexistent/libtrail/vuln-db"));
        assert!(matches!(result, Err(PipelineError::VulnDbLoad { .. })));
    }
}
