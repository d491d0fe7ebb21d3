//! Stage2 라이브러리 카탈로그 (`STAGE2_LIBRARY`, `STAGE2_LIBRARY_CVE_MAP`)
//!
//! 카탈로그 식별자는 콘텐츠 해시입니다. 쓰기 경로는 [`upsert_library`]와
//! 보강 결과 기록([`update_enrichment`])뿐입니다.

use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row, params};

use libtrail_core::types::{CveRecord, LibraryMetadata, LibraryObservation, LibraryRecord};

use crate::cve::row_to_cve;
use crate::error::StoreError;

const SELECT_COLUMNS: &str = "LIBRARY_ID, EVENT_ID, AID, CID, JARPATH, LIBRARY_NAME, SHA256_HASH, \
     METHOD, FIRST_SEEN, LAST_SEEN, IS_ACTIVE, GROUP_ID, ARTIFACT_ID, VERSION, IMPL_TITLE, \
     IMPL_VENDOR, PACKAGE_NAMES";

fn row_to_library(row: &Row<'_>) -> rusqlite::Result<LibraryRecord> {
    let package_names: Option<String> = row.get(16)?;
    let package_names = package_names
        .map(|json| {
            serde_json::from_str::<Vec<String>>(&json)
                .map_err(|e| rusqlite::Error::FromSqlConversionFailure(16, Type::Text, Box::new(e)))
        })
        .transpose()?;

    Ok(LibraryRecord {
        library_id: row.get(0)?,
        event_id: row.get(1)?,
        aid: row.get(2)?,
        cid: row.get(3)?,
        jar_path: row.get(4)?,
        library_name: row.get(5)?,
        sha256_hash: row.get(6)?,
        method: row.get(7)?,
        first_seen: row.get(8)?,
        last_seen: row.get(9)?,
        is_active: row.get(10)?,
        group_id: row.get(11)?,
        artifact_id: row.get(12)?,
        version: row.get(13)?,
        impl_title: row.get(14)?,
        impl_vendor: row.get(15)?,
        package_names,
    })
}

/// 콘텐츠 해시를 키로 라이브러리를 upsert합니다.
///
/// 충돌 시 `FIRST_SEEN`은 더 이른 값으로만, `LAST_SEEN`은 더 늦은 값으로만
/// 움직이고 `IS_ACTIVE`는 1이 됩니다. 관찰 순서와 무관하게 두 값은 전체 관찰의
/// 최소/최대 시각이 됩니다. 경로/이름 등 나머지 컬럼은 처음 기록된 값을 유지합니다.
pub fn upsert_library(conn: &Connection, obs: &LibraryObservation) -> Result<(), StoreError> {
    conn.execute(
        "INSERT INTO STAGE2_LIBRARY \
         (LIBRARY_ID, EVENT_ID, AID, CID, JARPATH, LIBRARY_NAME, SHA256_HASH, METHOD, \
          FIRST_SEEN, LAST_SEEN, IS_ACTIVE) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?1, ?7, ?8, ?8, 1) \
         ON CONFLICT(LIBRARY_ID) DO UPDATE SET \
            FIRST_SEEN = MIN(STAGE2_LIBRARY.FIRST_SEEN, excluded.FIRST_SEEN), \
            LAST_SEEN = MAX(STAGE2_LIBRARY.LAST_SEEN, excluded.LAST_SEEN), \
            IS_ACTIVE = 1",
        params![
            obs.sha256,
            obs.event_id,
            obs.aid,
            obs.cid,
            obs.jar_path,
            obs.library_name,
            obs.method,
            obs.seen_at,
        ],
    )?;
    Ok(())
}

/// 보강 마커(`GROUP_ID`)가 비어 있는 라이브러리를 오래된 순으로 읽습니다.
pub fn fetch_unenriched(conn: &Connection, limit: usize) -> Result<Vec<LibraryRecord>, StoreError> {
    let limit = i64::try_from(limit).unwrap_or(i64::MAX);
    let mut stmt = conn.prepare(&format!(
        "SELECT {SELECT_COLUMNS} FROM STAGE2_LIBRARY \
         WHERE GROUP_ID IS NULL ORDER BY FIRST_SEEN ASC, LIBRARY_ID ASC LIMIT ?1"
    ))?;
    let rows = stmt
        .query_map(params![limit], row_to_library)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// 보강 결과를 기록합니다.
///
/// 그룹 ID를 모르면 빈 문자열 센티널을 기록해 다음 폴링에서 다시 선택되지 않게 합니다.
pub fn update_enrichment(
    conn: &Connection,
    library_id: &str,
    meta: &LibraryMetadata,
) -> Result<usize, StoreError> {
    let package_names = if meta.package_names.is_empty() {
        None
    } else {
        Some(serde_json::to_string(&meta.package_names).map_err(|e| StoreError::Corrupt {
            column: "PACKAGE_NAMES".to_owned(),
            reason: e.to_string(),
        })?)
    };

    Ok(conn.execute(
        "UPDATE STAGE2_LIBRARY SET \
            GROUP_ID = ?2, ARTIFACT_ID = ?3, VERSION = ?4, IMPL_TITLE = ?5, \
            IMPL_VENDOR = ?6, PACKAGE_NAMES = ?7 \
         WHERE LIBRARY_ID = ?1",
        params![
            library_id,
            meta.group_id.as_deref().unwrap_or(""),
            meta.artifact_id,
            meta.version,
            meta.impl_title,
            meta.impl_vendor,
            package_names,
        ],
    )?)
}

/// 메타데이터를 찾지 못한 라이브러리에 빈 센티널을 기록합니다.
pub fn mark_no_metadata(conn: &Connection, library_id: &str) -> Result<usize, StoreError> {
    Ok(conn.execute(
        "UPDATE STAGE2_LIBRARY SET GROUP_ID = '' WHERE LIBRARY_ID = ?1",
        params![library_id],
    )?)
}

pub fn get_library(conn: &Connection, library_id: &str) -> Result<Option<LibraryRecord>, StoreError> {
    Ok(conn
        .query_row(
            &format!("SELECT {SELECT_COLUMNS} FROM STAGE2_LIBRARY WHERE LIBRARY_ID = ?1"),
            params![library_id],
            row_to_library,
        )
        .optional()?)
}

pub fn count_libraries(conn: &Connection) -> Result<u64, StoreError> {
    let n: i64 = conn.query_row("SELECT COUNT(*) FROM STAGE2_LIBRARY", [], |row| row.get(0))?;
    Ok(u64::try_from(n).unwrap_or(0))
}

/// 애플리케이션의 활성 라이브러리 ID 목록
pub fn active_library_ids(conn: &Connection, aid: &str) -> Result<Vec<String>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT LIBRARY_ID FROM STAGE2_LIBRARY WHERE AID = ?1 AND IS_ACTIVE = 1 ORDER BY LIBRARY_ID",
    )?;
    let ids = stmt
        .query_map(params![aid], |row| row.get(0))?
        .collect::<Result<Vec<String>, _>>()?;
    Ok(ids)
}

/// 라이브러리와 CVE를 연결합니다. 이미 연결되어 있으면 아무것도 하지 않습니다.
///
/// 새로 연결되었으면 `true`를 반환합니다.
pub fn link_cve(
    conn: &Connection,
    library_id: &str,
    cve_id: &str,
    source: &str,
    matched_at: i64,
) -> Result<bool, StoreError> {
    let inserted = conn.execute(
        "INSERT INTO STAGE2_LIBRARY_CVE_MAP (LIBRARY_ID, CVE_ID, MATCH_SOURCE, MATCHED_AT) \
         VALUES (?1, ?2, ?3, ?4) ON CONFLICT(LIBRARY_ID, CVE_ID) DO NOTHING",
        params![library_id, cve_id, source, matched_at],
    )?;
    Ok(inserted > 0)
}

/// 라이브러리에 연결된 CVE 목록 (심각도 높은 순)
pub fn library_cves(conn: &Connection, library_id: &str) -> Result<Vec<CveRecord>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT c.CVE_ID, c.CVE_NAME, c.CVSS_SEVERITY, c.CVSS_V3, c.DESCRIPTION, \
                c.AFFECTED_LIBRARIES, c.FIXED_VERSIONS, c.CWE_IDS \
         FROM STAGE2_LIBRARY_CVE_MAP m \
         JOIN STAGE2_LIBRARY_CVE c ON c.CVE_ID = m.CVE_ID \
         WHERE m.LIBRARY_ID = ?1 \
         ORDER BY c.CVSS_V3 DESC, c.CVE_ID ASC",
    )?;
    let rows = stmt
        .query_map(params![library_id], row_to_cve)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}
