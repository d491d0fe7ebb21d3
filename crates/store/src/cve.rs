//! CVE 레코드 테이블 (`STAGE2_LIBRARY_CVE`)
//!
//! 목록 컬럼(`AFFECTED_LIBRARIES`, `FIXED_VERSIONS`, `CWE_IDS`)은 JSON 배열로 저장되며
//! 빈 목록은 NULL입니다.

use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row, params};

use libtrail_core::types::{CveRecord, Severity};

use crate::error::StoreError;

const SELECT_COLUMNS: &str = "CVE_ID, CVE_NAME, CVSS_SEVERITY, CVSS_V3, DESCRIPTION, \
     AFFECTED_LIBRARIES, FIXED_VERSIONS, CWE_IDS";

fn json_list(row: &Row<'_>, idx: usize) -> rusqlite::Result<Vec<String>> {
    let raw: Option<String> = row.get(idx)?;
    match raw {
        Some(json) => serde_json::from_str(&json)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))),
        None => Ok(Vec::new()),
    }
}

pub(crate) fn row_to_cve(row: &Row<'_>) -> rusqlite::Result<CveRecord> {
    let severity: String = row.get(2)?;
    Ok(CveRecord {
        cve_id: row.get(0)?,
        cve_name: row.get(1)?,
        severity: Severity::from_str_loose(&severity).unwrap_or_default(),
        cvss_v3: row.get(3)?,
        description: row.get(4)?,
        affected_libraries: json_list(row, 5)?,
        fixed_versions: json_list(row, 6)?,
        cwe_ids: json_list(row, 7)?,
    })
}

fn to_json_column(column: &str, values: &[String]) -> Result<Option<String>, StoreError> {
    if values.is_empty() {
        return Ok(None);
    }
    serde_json::to_string(values)
        .map(Some)
        .map_err(|e| StoreError::Corrupt {
            column: column.to_owned(),
            reason: e.to_string(),
        })
}

/// CVE 레코드를 upsert합니다.
///
/// 충돌 시 심각도, CVSS 점수, 설명만 갱신합니다. 목록 컬럼은 기존 값이
/// NULL일 때만 채워집니다.
pub fn upsert_cve(conn: &Connection, cve: &CveRecord) -> Result<(), StoreError> {
    let affected = to_json_column("AFFECTED_LIBRARIES", &cve.affected_libraries)?;
    let fixed = to_json_column("FIXED_VERSIONS", &cve.fixed_versions)?;
    let cwes = to_json_column("CWE_IDS", &cve.cwe_ids)?;

    conn.execute(
        "INSERT INTO STAGE2_LIBRARY_CVE \
         (CVE_ID, CVE_NAME, CVSS_SEVERITY, CVSS_V3, DESCRIPTION, AFFECTED_LIBRARIES, \
          FIXED_VERSIONS, CWE_IDS) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8) \
         ON CONFLICT(CVE_ID) DO UPDATE SET \
            CVSS_SEVERITY = excluded.CVSS_SEVERITY, \
            CVSS_V3 = excluded.CVSS_V3, \
            DESCRIPTION = excluded.DESCRIPTION, \
            AFFECTED_LIBRARIES = COALESCE(STAGE2_LIBRARY_CVE.AFFECTED_LIBRARIES, excluded.AFFECTED_LIBRARIES), \
            FIXED_VERSIONS = COALESCE(STAGE2_LIBRARY_CVE.FIXED_VERSIONS, excluded.FIXED_VERSIONS), \
            CWE_IDS = COALESCE(STAGE2_LIBRARY_CVE.CWE_IDS, excluded.CWE_IDS)",
        params![
            cve.cve_id,
            cve.cve_name,
            cve.severity.as_db_str(),
            cve.cvss_v3,
            cve.description,
            affected,
            fixed,
            cwes,
        ],
    )?;
    Ok(())
}

pub fn get_cve(conn: &Connection, cve_id: &str) -> Result<Option<CveRecord>, StoreError> {
    Ok(conn
        .query_row(
            &format!("SELECT {SELECT_COLUMNS} FROM STAGE2_LIBRARY_CVE WHERE CVE_ID = ?1"),
            params![cve_id],
            row_to_cve,
        )
        .optional()?)
}

pub fn count_cves(conn: &Connection) -> Result<u64, StoreError> {
    let n: i64 = conn.query_row("SELECT COUNT(*) FROM STAGE2_LIBRARY_CVE", [], |row| row.get(0))?;
    Ok(u64::try_from(n).unwrap_or(0))
}

/// 패턴 매칭 대상 CVE를 읽습니다.
///
/// 영향 라이브러리 패턴이 있고 심각도가 CRITICAL/HIGH/MEDIUM인 레코드만
/// 심각도 높은 순으로 반환합니다.
pub fn fetch_pattern_cves(conn: &Connection) -> Result<Vec<CveRecord>, StoreError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {SELECT_COLUMNS} FROM STAGE2_LIBRARY_CVE \
         WHERE AFFECTED_LIBRARIES IS NOT NULL \
           AND CVSS_SEVERITY IN ('CRITICAL', 'HIGH', 'MEDIUM') \
         ORDER BY CASE CVSS_SEVERITY \
                    WHEN 'CRITICAL' THEN 0 \
                    WHEN 'HIGH' THEN 1 \
                    ELSE 2 END, \
                  CVE_ID ASC"
    ))?;
    let rows = stmt
        .query_map([], row_to_cve)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}
