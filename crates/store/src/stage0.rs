//! Stage0 원시 레코드 테이블 (`STAGE0_EVENT`)

use rusqlite::{Connection, Row, params};

use libtrail_core::types::RawRecord;

use crate::error::StoreError;

const SELECT_COLUMNS: &str = "EVENT_ID, CONFIG_FILE, TIMESTAMP, THREAD_ID, PRIORITY, NAMESPACE, AID, CID, KEYPAIRS";

fn row_to_raw(row: &Row<'_>) -> rusqlite::Result<RawRecord> {
    Ok(RawRecord {
        event_id: row.get(0)?,
        config_file: row.get(1)?,
        timestamp: row.get(2)?,
        thread_id: row.get(3)?,
        priority: row.get(4)?,
        namespace: row.get(5)?,
        aid: row.get(6)?,
        cid: row.get(7)?,
        keypairs: row.get(8)?,
    })
}

/// 원시 레코드를 삽입합니다. 계측 레이어(및 테스트)가 사용합니다.
pub fn insert_raw(conn: &Connection, raw: &RawRecord) -> Result<(), StoreError> {
    conn.execute(
        "INSERT INTO STAGE0_EVENT \
         (EVENT_ID, CONFIG_FILE, TIMESTAMP, THREAD_ID, PRIORITY, NAMESPACE, AID, CID, KEYPAIRS) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            raw.event_id,
            raw.config_file,
            raw.timestamp,
            raw.thread_id,
            raw.priority,
            raw.namespace,
            raw.aid,
            raw.cid,
            raw.keypairs,
        ],
    )?;
    Ok(())
}

/// 삽입 순서대로 최대 `limit`개의 원시 레코드를 읽습니다.
pub fn fetch_raw_batch(conn: &Connection, limit: usize) -> Result<Vec<RawRecord>, StoreError> {
    let limit = i64::try_from(limit).unwrap_or(i64::MAX);
    let mut stmt = conn.prepare(&format!(
        "SELECT {SELECT_COLUMNS} FROM STAGE0_EVENT ORDER BY rowid LIMIT ?1"
    ))?;
    let rows = stmt
        .query_map(params![limit], row_to_raw)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// 원시 레코드를 삭제하고 삭제된 행 수를 반환합니다.
pub fn delete_raw(conn: &Connection, event_id: &str) -> Result<usize, StoreError> {
    Ok(conn.execute(
        "DELETE FROM STAGE0_EVENT WHERE EVENT_ID = ?1",
        params![event_id],
    )?)
}

pub fn count_raw(conn: &Connection) -> Result<u64, StoreError> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM STAGE0_EVENT", [], |row| row.get(0))?;
    Ok(u64::try_from(count).unwrap_or(0))
}
