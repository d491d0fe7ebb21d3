//! libtrail 계층 저장소
//!
//! SQLite 한 파일에 네 개의 stage 테이블과 CVE 연결 테이블을 둡니다.
//! 테이블 연산은 `&Connection`을 받는 자유 함수로 제공되므로
//! [`Store::transaction`]이 돌려주는 트랜잭션 위에서도 그대로 사용할 수 있습니다.
//!
//! # 사용 예시
//! ```no_run
//! use libtrail_store::{Store, stage0};
//!
//! # fn example() -> Result<(), libtrail_store::StoreError> {
//! let mut store = Store::open_in_memory()?;
//! let tx = store.transaction()?;
//! let batch = stage0::fetch_raw_batch(&tx, 100)?;
//! // ... batch 처리
//! tx.commit()?;
//! # Ok(())
//! # }
//! ```

pub mod cve;
pub mod error;
pub mod schema;
pub mod stage0;
pub mod stage1;
pub mod stage2;

use std::path::Path;
use std::time::Duration;

use rusqlite::{Connection, Transaction};
use tracing::{info, warn};

use libtrail_core::config::StoreConfig;

pub use error::StoreError;

/// 인메모리 경로 표기
pub const MEMORY_PATH: &str = ":memory:";

/// SQLite 기반 계층 저장소
///
/// 연결 하나를 소유하며 `Send`이지만 `Sync`는 아닙니다.
/// 스케줄러는 저장소를 하나의 워커에 넘겨 순차적으로 사용합니다.
pub struct Store {
    conn: Connection,
}

impl Store {
    /// 파일 저장소를 열고 마이그레이션을 적용합니다.
    pub fn open(path: impl AsRef<Path>, busy_timeout: Duration) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let conn = Connection::open(path).map_err(|e| StoreError::Open {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        conn.busy_timeout(busy_timeout)?;
        let mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        if !mode.eq_ignore_ascii_case("wal") {
            warn!(path = %path.display(), mode = %mode, "store is not in WAL mode");
        }
        conn.pragma_update(None, "synchronous", "NORMAL")?;

        schema::migrate(&conn)?;
        info!(path = %path.display(), "store opened");
        Ok(Self { conn })
    }

    /// 인메모리 저장소를 엽니다 (테스트/일회성 실행용).
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        schema::migrate(&conn)?;
        Ok(Self { conn })
    }

    /// `[store]` 설정으로 저장소를 엽니다.
    pub fn from_config(config: &StoreConfig) -> Result<Self, StoreError> {
        if config.path == MEMORY_PATH {
            return Self::open_in_memory();
        }
        if let Some(parent) = Path::new(&config.path).parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| StoreError::Open {
                path: config.path.clone(),
                reason: e.to_string(),
            })?;
        }
        Self::open(&config.path, Duration::from_millis(config.busy_timeout_ms))
    }

    /// 읽기 전용 작업용 연결 참조
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// 새 트랜잭션을 시작합니다. `commit()` 없이 drop되면 롤백됩니다.
    pub fn transaction(&mut self) -> Result<Transaction<'_>, StoreError> {
        Ok(self.conn.transaction()?)
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("path", &self.conn.path())
            .finish()
    }
}
