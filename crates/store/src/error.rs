//! 저장소 에러 타입
//!
//! [`StoreError`]는 저장소 크레이트 내부 에러이며,
//! `From<StoreError> for LibtrailError` 변환으로 스케줄러까지 전파됩니다.

use libtrail_core::error::{LibtrailError, StorageError};

/// 저장소 에러
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// SQLite 에러
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// 데이터베이스 열기 실패
    #[error("failed to open store '{path}': {reason}")]
    Open { path: String, reason: String },

    /// 스키마 마이그레이션 실패
    #[error("schema migration failed: {0}")]
    Migration(String),

    /// 컬럼에 저장된 JSON 값이 손상됨
    #[error("corrupt value in column '{column}': {reason}")]
    Corrupt { column: String, reason: String },
}

impl From<StoreError> for LibtrailError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Sqlite(e) => LibtrailError::Storage(StorageError::Query(e.to_string())),
            StoreError::Open { path, reason } => LibtrailError::Storage(StorageError::Connection(
                format!("{path}: {reason}"),
            )),
            StoreError::Migration(msg) => LibtrailError::Storage(StorageError::Migration(msg)),
            StoreError::Corrupt { column, reason } => LibtrailError::Storage(
                StorageError::Query(format!("corrupt value in {column}: {reason}")),
            ),
        }
    }
}
