//! 스키마 마이그레이션
//!
//! `PRAGMA user_version`으로 적용된 버전을 기록합니다. 모든 DDL은
//! `IF NOT EXISTS`라 같은 버전을 다시 적용해도 안전합니다.

use rusqlite::Connection;
use tracing::{debug, info};

use crate::error::StoreError;

/// 현재 스키마 버전
pub const SCHEMA_VERSION: i32 = 1;

const SCHEMA_V1: &str = r#"
CREATE TABLE IF NOT EXISTS STAGE0_EVENT (
    EVENT_ID    TEXT PRIMARY KEY,
    CONFIG_FILE TEXT NOT NULL DEFAULT '',
    TIMESTAMP   INTEGER NOT NULL,
    THREAD_ID   TEXT NOT NULL DEFAULT '',
    PRIORITY    TEXT NOT NULL DEFAULT '',
    NAMESPACE   TEXT NOT NULL DEFAULT '',
    AID         TEXT NOT NULL DEFAULT '',
    CID         TEXT NOT NULL DEFAULT '',
    KEYPAIRS    TEXT NOT NULL DEFAULT ''
);

CREATE TABLE IF NOT EXISTS STAGE1_EVENT (
    EVENT_ID    TEXT PRIMARY KEY,
    CONFIG_FILE TEXT NOT NULL DEFAULT '',
    TIMESTAMP   INTEGER NOT NULL,
    THREAD_ID   TEXT NOT NULL DEFAULT '',
    PRIORITY    TEXT NOT NULL DEFAULT '',
    NAMESPACE   TEXT NOT NULL DEFAULT '',
    AID         TEXT NOT NULL DEFAULT '',
    CID         TEXT NOT NULL DEFAULT '',
    IS_STABLE   INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS IDX_STAGE1_NS_STABLE_TS
    ON STAGE1_EVENT(NAMESPACE, IS_STABLE, TIMESTAMP);

CREATE TABLE IF NOT EXISTS STAGE1_EVENT_KEYPAIR (
    EVENT_ID TEXT NOT NULL REFERENCES STAGE1_EVENT(EVENT_ID),
    KEY      TEXT NOT NULL,
    VALUE    TEXT NOT NULL,
    PRIMARY KEY (EVENT_ID, KEY)
);

CREATE TABLE IF NOT EXISTS STAGE2_LIBRARY (
    LIBRARY_ID    TEXT PRIMARY KEY,
    EVENT_ID      TEXT NOT NULL,
    AID           TEXT NOT NULL DEFAULT '',
    CID           TEXT NOT NULL DEFAULT '',
    JARPATH       TEXT NOT NULL,
    LIBRARY_NAME  TEXT NOT NULL,
    SHA256_HASH   TEXT NOT NULL,
    METHOD        TEXT NOT NULL DEFAULT '',
    FIRST_SEEN    INTEGER NOT NULL,
    LAST_SEEN     INTEGER NOT NULL,
    IS_ACTIVE     INTEGER NOT NULL DEFAULT 1,
    GROUP_ID      TEXT,
    ARTIFACT_ID   TEXT,
    VERSION       TEXT,
    IMPL_TITLE    TEXT,
    IMPL_VENDOR   TEXT,
    PACKAGE_NAMES TEXT
);

CREATE INDEX IF NOT EXISTS IDX_STAGE2_LIBRARY_UNENRICHED
    ON STAGE2_LIBRARY(GROUP_ID, FIRST_SEEN);
CREATE INDEX IF NOT EXISTS IDX_STAGE2_LIBRARY_AID
    ON STAGE2_LIBRARY(AID, IS_ACTIVE);

CREATE TABLE IF NOT EXISTS STAGE2_LIBRARY_CVE (
    CVE_ID             TEXT PRIMARY KEY,
    CVE_NAME           TEXT NOT NULL DEFAULT '',
    CVSS_SEVERITY      TEXT NOT NULL,
    CVSS_V3            REAL,
    DESCRIPTION        TEXT NOT NULL DEFAULT '',
    AFFECTED_LIBRARIES TEXT,
    FIXED_VERSIONS     TEXT,
    CWE_IDS            TEXT
);

CREATE TABLE IF NOT EXISTS STAGE2_LIBRARY_CVE_MAP (
    LIBRARY_ID   TEXT NOT NULL REFERENCES STAGE2_LIBRARY(LIBRARY_ID),
    CVE_ID       TEXT NOT NULL REFERENCES STAGE2_LIBRARY_CVE(CVE_ID),
    MATCH_SOURCE TEXT NOT NULL,
    MATCHED_AT   INTEGER NOT NULL,
    PRIMARY KEY (LIBRARY_ID, CVE_ID)
);
"#;

/// 스키마를 최신 버전으로 올립니다.
pub fn migrate(conn: &Connection) -> Result<(), StoreError> {
    let current: i32 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;

    if current > SCHEMA_VERSION {
        return Err(StoreError::Migration(format!(
            "database schema version {current} is newer than supported version {SCHEMA_VERSION}"
        )));
    }

    if current == SCHEMA_VERSION {
        debug!(version = current, "schema up to date");
        return Ok(());
    }

    conn.execute_batch(SCHEMA_V1)
        .map_err(|e| StoreError::Migration(format!("v1: {e}")))?;
    conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;

    info!(from = current, to = SCHEMA_VERSION, "schema migrated");
    Ok(())
}
