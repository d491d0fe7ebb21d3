//! Stage0 → Stage1 이전 processor
//!
//! 배치 하나를 트랜잭션 하나로 처리합니다. 레코드마다
//!
//! 1. 같은 ID의 불안정 잔여 행 제거
//! 2. `IS_STABLE = 0`으로 이벤트 삽입
//! 3. 페이로드 파싱 후 keypair 행 삽입
//! 4. 안정화 (정확히 1행이 전환되어야 함)
//! 5. 원시 레코드 삭제
//!
//! 어느 레코드에서든 실패하면 트랜잭션 전체가 롤백되어 배치의 모든 레코드가
//! Stage0에 그대로 남고 다음 폴링에서 재시도됩니다.

use std::time::Instant;

use metrics::counter;
use rusqlite::Connection;
use tracing::{debug, error, info};

use libtrail_core::config::LibtrailConfig;
use libtrail_core::metrics as m;
use libtrail_core::types::{ParsedEvent, RawRecord};
use libtrail_store::{Store, StoreError, stage0, stage1};

use super::{RAW_TO_PARSED, StageProcessor, record_batch_duration};
use crate::error::PipelineError;
use crate::keypair::RecordParser;

/// Stage0 → Stage1 이전 processor
pub struct RawToParsedProcessor {
    parser: RecordParser,
    enabled: bool,
    batch_size: usize,
    initialized: bool,
}

impl RawToParsedProcessor {
    pub fn new() -> Self {
        Self::with_parser(RecordParser::with_defaults())
    }

    /// 사용자 지정 파서로 생성합니다.
    pub fn with_parser(parser: RecordParser) -> Self {
        let defaults = libtrail_core::config::RawToParsedConfig::default();
        Self {
            parser,
            enabled: defaults.enabled,
            batch_size: defaults.batch_size,
            initialized: false,
        }
    }

    fn migrate_record(&self, conn: &Connection, raw: &RawRecord) -> Result<(), PipelineError> {
        let purged = stage1::purge_unstable(conn, &raw.event_id)?;
        if purged > 0 {
            debug!(event_id = %raw.event_id, "purged leftover unstable event");
        }

        stage1::insert_unstable(conn, &ParsedEvent::unstable_from(raw))?;

        let pairs = self.parser.parse(&raw.keypairs);
        stage1::insert_keypairs(conn, &raw.event_id, &pairs)?;

        let flipped = stage1::mark_stable(conn, &raw.event_id)?;
        if flipped != 1 {
            return Err(PipelineError::BatchFailed {
                processor: RAW_TO_PARSED.to_owned(),
                reason: format!(
                    "event {} stability flip touched {flipped} rows",
                    raw.event_id
                ),
            });
        }

        stage0::delete_raw(conn, &raw.event_id)?;
        Ok(())
    }

    fn migrate_batch(&self, store: &mut Store, batch_size: usize) -> Result<usize, PipelineError> {
        let tx = store.transaction()?;
        let batch = stage0::fetch_raw_batch(&tx, batch_size)?;
        if batch.is_empty() {
            return Ok(0);
        }

        for raw in &batch {
            self.migrate_record(&tx, raw).map_err(|e| PipelineError::BatchFailed {
                processor: RAW_TO_PARSED.to_owned(),
                reason: format!("event {}: {e}", raw.event_id),
            })?;
        }

        tx.commit().map_err(StoreError::from)?;
        Ok(batch.len())
    }
}

impl Default for RawToParsedProcessor {
    fn default() -> Self {
        Self::new()
    }
}

impl StageProcessor for RawToParsedProcessor {
    fn name(&self) -> &'static str {
        RAW_TO_PARSED
    }

    fn initialize(&mut self, config: &LibtrailConfig) -> Result<(), PipelineError> {
        self.enabled = config.raw_to_parsed.enabled;
        self.batch_size = config.raw_to_parsed.batch_size;
        self.initialized = true;
        info!(
            enabled = self.enabled,
            batch_size = self.batch_size,
            formats = ?self.parser.registered_formats(),
            "raw-to-parsed processor initialized"
        );
        Ok(())
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn batch_size(&self) -> usize {
        self.batch_size
    }

    fn process_batch(
        &mut self,
        store: &mut Store,
        batch_size: usize,
    ) -> Result<usize, PipelineError> {
        if !self.initialized {
            return Err(PipelineError::NotInitialized(RAW_TO_PARSED.to_owned()));
        }

        let started = Instant::now();
        let result = self.migrate_batch(store, batch_size);
        record_batch_duration(RAW_TO_PARSED, started);

        match result {
            Ok(migrated) => {
                counter!(m::RAW_TO_PARSED_RECORDS_TOTAL).increment(migrated as u64);
                if migrated > 0 {
                    info!(migrated, "raw records migrated to stage1");
                }
                Ok(migrated)
            }
            Err(e) => {
                counter!(m::RAW_TO_PARSED_BATCH_FAILURES_TOTAL).increment(1);
                error!(error = %e, "raw-to-parsed batch rolled back");
                Err(e)
            }
        }
    }
}
