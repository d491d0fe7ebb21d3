//! Stage1 파싱 이벤트 테이블 (`STAGE1_EVENT`, `STAGE1_EVENT_KEYPAIR`)
//!
//! 쓰기 순서는 불안정 행 삽입 → keypair 삽입 → 안정화입니다.
//! 하위 stage용 조회 함수는 모두 `IS_STABLE = 1` 조건을 포함합니다.

use rusqlite::{Connection, OptionalExtension, Row, params};

use libtrail_core::types::{KeyPairs, ParsedEvent};

use crate::error::StoreError;

const SELECT_COLUMNS: &str = "EVENT_ID, CONFIG_FILE, TIMESTAMP, THREAD_ID, PRIORITY, NAMESPACE, AID, CID, IS_STABLE";

fn row_to_event(row: &Row<'_>) -> rusqlite::Result<ParsedEvent> {
    Ok(ParsedEvent {
        event_id: row.get(0)?,
        config_file: row.get(1)?,
        timestamp: row.get(2)?,
        thread_id: row.get(3)?,
        priority: row.get(4)?,
        namespace: row.get(5)?,
        aid: row.get(6)?,
        cid: row.get(7)?,
        stable: row.get(8)?,
    })
}

/// 같은 ID의 불안정 행(이전 시도의 잔여물)과 그 keypair를 제거합니다.
///
/// 안정 행은 건드리지 않습니다. 제거된 이벤트 행 수를 반환합니다.
pub fn purge_unstable(conn: &Connection, event_id: &str) -> Result<usize, StoreError> {
    conn.execute(
        "DELETE FROM STAGE1_EVENT_KEYPAIR WHERE EVENT_ID IN \
         (SELECT EVENT_ID FROM STAGE1_EVENT WHERE EVENT_ID = ?1 AND IS_STABLE = 0)",
        params![event_id],
    )?;
    Ok(conn.execute(
        "DELETE FROM STAGE1_EVENT WHERE EVENT_ID = ?1 AND IS_STABLE = 0",
        params![event_id],
    )?)
}

/// 이벤트를 `IS_STABLE = 0` 상태로 삽입합니다.
pub fn insert_unstable(conn: &Connection, event: &ParsedEvent) -> Result<(), StoreError> {
    conn.execute(
        "INSERT INTO STAGE1_EVENT \
         (EVENT_ID, CONFIG_FILE, TIMESTAMP, THREAD_ID, PRIORITY, NAMESPACE, AID, CID, IS_STABLE) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 0)",
        params![
            event.event_id,
            event.config_file,
            event.timestamp,
            event.thread_id,
            event.priority,
            event.namespace,
            event.aid,
            event.cid,
        ],
    )?;
    Ok(())
}

/// 디코딩된 key-value 쌍을 삽입하고 삽입된 행 수를 반환합니다.
pub fn insert_keypairs(
    conn: &Connection,
    event_id: &str,
    pairs: &KeyPairs,
) -> Result<usize, StoreError> {
    let mut stmt = conn.prepare_cached(
        "INSERT INTO STAGE1_EVENT_KEYPAIR (EVENT_ID, KEY, VALUE) VALUES (?1, ?2, ?3)",
    )?;
    let mut inserted = 0;
    for (key, value) in pairs {
        inserted += stmt.execute(params![event_id, key, value])?;
    }
    Ok(inserted)
}

/// 불안정 행을 안정 상태로 전환합니다. 전환된 행 수(0 또는 1)를 반환합니다.
pub fn mark_stable(conn: &Connection, event_id: &str) -> Result<usize, StoreError> {
    Ok(conn.execute(
        "UPDATE STAGE1_EVENT SET IS_STABLE = 1 WHERE EVENT_ID = ?1 AND IS_STABLE = 0",
        params![event_id],
    )?)
}

/// 주어진 네임스페이스의 안정 이벤트를 오래된 순으로 읽습니다.
pub fn fetch_stable_by_namespace(
    conn: &Connection,
    namespace: &str,
    limit: usize,
) -> Result<Vec<ParsedEvent>, StoreError> {
    fetch_stable_by_namespace_after(conn, namespace, None, limit)
}

/// `(TIMESTAMP, EVENT_ID)` 순서에서 `after` 다음 위치부터 안정 이벤트를 읽습니다.
///
/// `after`가 `None`이면 처음부터 읽습니다. 건너뛴 행을 다시 읽지 않고
/// 페이지를 넘기는 keyset 커서로 사용합니다.
pub fn fetch_stable_by_namespace_after(
    conn: &Connection,
    namespace: &str,
    after: Option<(i64, &str)>,
    limit: usize,
) -> Result<Vec<ParsedEvent>, StoreError> {
    let limit = i64::try_from(limit).unwrap_or(i64::MAX);
    let (ts, id) = match after {
        Some((ts, id)) => (Some(ts), Some(id)),
        None => (None, None),
    };
    let mut stmt = conn.prepare(&format!(
        "SELECT {SELECT_COLUMNS} FROM STAGE1_EVENT \
         WHERE IS_STABLE = 1 AND NAMESPACE = ?1 \
           AND (?3 IS NULL OR (TIMESTAMP, EVENT_ID) > (?3, ?4)) \
         ORDER BY TIMESTAMP ASC, EVENT_ID ASC LIMIT ?2"
    ))?;
    let rows = stmt
        .query_map(params![namespace, limit, ts, id], row_to_event)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// 이벤트 행을 안정 여부와 관계없이 조회합니다.
pub fn get_event(conn: &Connection, event_id: &str) -> Result<Option<ParsedEvent>, StoreError> {
    Ok(conn
        .query_row(
            &format!("SELECT {SELECT_COLUMNS} FROM STAGE1_EVENT WHERE EVENT_ID = ?1"),
            params![event_id],
            row_to_event,
        )
        .optional()?)
}

/// 이벤트의 key-value 쌍을 읽습니다.
pub fn keypairs(conn: &Connection, event_id: &str) -> Result<KeyPairs, StoreError> {
    let mut stmt = conn.prepare_cached(
        "SELECT KEY, VALUE FROM STAGE1_EVENT_KEYPAIR WHERE EVENT_ID = ?1 ORDER BY KEY",
    )?;
    let pairs = stmt
        .query_map(params![event_id], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?
        .collect::<Result<KeyPairs, _>>()?;
    Ok(pairs)
}

/// 이벤트와 keypair 행을 삭제하고 삭제된 이벤트 행 수를 반환합니다.
pub fn delete_event(conn: &Connection, event_id: &str) -> Result<usize, StoreError> {
    conn.execute(
        "DELETE FROM STAGE1_EVENT_KEYPAIR WHERE EVENT_ID = ?1",
        params![event_id],
    )?;
    Ok(conn.execute(
        "DELETE FROM STAGE1_EVENT WHERE EVENT_ID = ?1",
        params![event_id],
    )?)
}

/// 안정 이벤트 수
pub fn count_stable(conn: &Connection) -> Result<u64, StoreError> {
    count(conn, "SELECT COUNT(*) FROM STAGE1_EVENT WHERE IS_STABLE = 1")
}

/// 불안정 이벤트 수
pub fn count_unstable(conn: &Connection) -> Result<u64, StoreError> {
    count(conn, "SELECT COUNT(*) FROM STAGE1_EVENT WHERE IS_STABLE = 0")
}

pub fn count_keypairs(conn: &Connection) -> Result<u64, StoreError> {
    count(conn, "SELECT COUNT(*) FROM STAGE1_EVENT_KEYPAIR")
}

fn count(conn: &Connection, sql: &str) -> Result<u64, StoreError> {
    let n: i64 = conn.query_row(sql, [], |row| row.get(0))?;
    Ok(u64::try_from(n).unwrap_or(0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::migrate;

    fn conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn).unwrap();
        conn
    }

    fn event(id: &str, namespace: &str, ts: i64) -> ParsedEvent {
        ParsedEvent {
            event_id: id.to_owned(),
            config_file: String::new(),
            timestamp: ts,
            thread_id: "t1".to_owned(),
            priority: "INFO".to_owned(),
            namespace: namespace.to_owned(),
            aid: "app".to_owned(),
            cid: "prod".to_owned(),
            stable: false,
        }
    }

    fn pairs(entries: &[(&str, &str)]) -> KeyPairs {
        entries
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect()
    }

    #[test]
    fn unstable_rows_are_invisible_to_stable_reads() {
        let conn = conn();
        insert_unstable(&conn, &event("e1", "library_load", 1)).unwrap();
        insert_keypairs(&conn, "e1", &pairs(&[("sha256", "abc")])).unwrap();

        assert!(
            fetch_stable_by_namespace(&conn, "library_load", 10)
                .unwrap()
                .is_empty()
        );
        assert_eq!(count_unstable(&conn).unwrap(), 1);

        assert_eq!(mark_stable(&conn, "e1").unwrap(), 1);
        let stable = fetch_stable_by_namespace(&conn, "library_load", 10).unwrap();
        assert_eq!(stable.len(), 1);
        assert!(stable[0].stable);
    }

    #[test]
    fn mark_stable_twice_is_noop() {
        let conn = conn();
        insert_unstable(&conn, &event("e1", "ns", 1)).unwrap();
        assert_eq!(mark_stable(&conn, "e1").unwrap(), 1);
        assert_eq!(mark_stable(&conn, "e1").unwrap(), 0);
    }

    #[test]
    fn purge_removes_only_unstable() {
        let conn = conn();
        insert_unstable(&conn, &event("stale", "ns", 1)).unwrap();
        insert_keypairs(&conn, "stale", &pairs(&[("k", "v")])).unwrap();
        insert_unstable(&conn, &event("done", "ns", 2)).unwrap();
        mark_stable(&conn, "done").unwrap();

        assert_eq!(purge_unstable(&conn, "stale").unwrap(), 1);
        assert_eq!(purge_unstable(&conn, "done").unwrap(), 0);
        assert!(get_event(&conn, "stale").unwrap().is_none());
        assert!(get_event(&conn, "done").unwrap().is_some());
        assert_eq!(count_keypairs(&conn).unwrap(), 0);
    }

    #[test]
    fn fetch_filters_namespace_and_orders_by_timestamp() {
        let conn = conn();
        for (id, ns, ts) in [("late", "lib", 30), ("other", "http", 5), ("early", "lib", 10)] {
            insert_unstable(&conn, &event(id, ns, ts)).unwrap();
            mark_stable(&conn, id).unwrap();
        }
        let rows = fetch_stable_by_namespace(&conn, "lib", 10).unwrap();
        let ids: Vec<_> = rows.iter().map(|e| e.event_id.as_str()).collect();
        assert_eq!(ids, vec!["early", "late"]);
    }

    #[test]
    fn fetch_after_pages_past_cursor() {
        let conn = conn();
        for (id, ts) in [("b", 10), ("a", 10), ("c", 20), ("d", 30)] {
            insert_unstable(&conn, &event(id, "lib", ts)).unwrap();
            mark_stable(&conn, id).unwrap();
        }

        let ids = |rows: Vec<ParsedEvent>| -> Vec<String> {
            rows.into_iter().map(|e| e.event_id).collect()
        };
        assert_eq!(
            ids(fetch_stable_by_namespace_after(&conn, "lib", None, 2).unwrap()),
            vec!["a", "b"]
        );
        // 같은 TIMESTAMP 안에서는 EVENT_ID로 구분
        assert_eq!(
            ids(fetch_stable_by_namespace_after(&conn, "lib", Some((10, "a")), 2).unwrap()),
            vec!["b", "c"]
        );
        assert_eq!(
            ids(fetch_stable_by_namespace_after(&conn, "lib", Some((20, "c")), 10).unwrap()),
            vec!["d"]
        );
        assert!(
            fetch_stable_by_namespace_after(&conn, "lib", Some((30, "d")), 10)
                .unwrap()
                .is_empty()
        );
    }

    #[test]
    fn keypairs_roundtrip_and_delete() {
        let conn = conn();
        insert_unstable(&conn, &event("e1", "ns", 1)).unwrap();
        let kp = pairs(&[("jarPath", "/lib/a.jar"), ("sha256", "ff")]);
        assert_eq!(insert_keypairs(&conn, "e1", &kp).unwrap(), 2);
        assert_eq!(keypairs(&conn, "e1").unwrap(), kp);

        assert_eq!(delete_event(&conn, "e1").unwrap(), 1);
        assert!(keypairs(&conn, "e1").unwrap().is_empty());
    }

    #[test]
    fn duplicate_key_for_event_rejected() {
        let conn = conn();
        insert_unstable(&conn, &event("e1", "ns", 1)).unwrap();
        insert_keypairs(&conn, "e1", &pairs(&[("k", "v")])).unwrap();
        assert!(insert_keypairs(&conn, "e1", &pairs(&[("k", "w")])).is_err());
    }
}
