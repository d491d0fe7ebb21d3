//! Stage1 → Stage2 카탈로그 processor
//!
//! 라이브러리 로딩 네임스페이스의 안정 이벤트를 읽어 콘텐츠 해시로
//! `STAGE2_LIBRARY`에 upsert하고, upsert가 커밋된 뒤에만 원본 이벤트를 삭제합니다.
//! 이벤트마다 별도 트랜잭션이므로 한 이벤트의 실패가 나머지를 막지 않습니다.
//!
//! 필수 keypair: `artifactPath`(또는 `jarPath`), `loadMethod`(또는 `method`), `sha256`.
//! 하나라도 없으면 경고 후 건너뛰고 Stage1에 남겨 둡니다. 건너뛴 이벤트는
//! 프로세스 수명 동안 격리 목록에 올라가 경고가 반복되지 않습니다.
//!
//! 배치는 `(TIMESTAMP, EVENT_ID)` keyset 커서 다음부터 읽으므로 남아 있는 이벤트가
//! 다음 배치를 막지 않습니다. 끝에 도달하면(페이지가 덜 차면) 커서를 처음으로 되돌립니다.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use metrics::counter;
use tracing::{debug, info, warn};

use libtrail_core::config::{LibtrailConfig, ParsedToCatalogConfig};
use libtrail_core::metrics as m;
use libtrail_core::types::{KeyPairs, LibraryObservation, ParsedEvent};
use libtrail_store::{Store, StoreError, stage1, stage2};

use super::{PARSED_TO_CATALOG, StageProcessor, record_batch_duration};
use crate::error::PipelineError;
use crate::naming::display_name;
use crate::temporal::LibraryTemporalTracker;

/// 아티팩트 경로 키 (우선순위 순)
pub const ARTIFACT_PATH_KEYS: [&str; 2] = ["artifactPath", "jarPath"];
/// 로딩 방식 키 (우선순위 순)
pub const LOAD_METHOD_KEYS: [&str; 2] = ["loadMethod", "method"];
/// 콘텐츠 해시 키
pub const SHA256_KEY: &str = "sha256";

/// 격리 목록 상한. 넘으면 비우고 다시 경고합니다.
const MAX_QUARANTINED: usize = 100_000;

fn first_present<'a>(pairs: &'a KeyPairs, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .filter_map(|k| pairs.get(*k))
        .map(|v| v.trim())
        .find(|v| !v.is_empty())
}

/// 이벤트와 keypair에서 라이브러리 관찰을 추출합니다.
///
/// 누락된 필수 키 이름 목록을 에러로 반환합니다.
pub fn extract_observation(
    event: &ParsedEvent,
    pairs: &KeyPairs,
) -> Result<LibraryObservation, Vec<&'static str>> {
    let path = first_present(pairs, &ARTIFACT_PATH_KEYS);
    let method = first_present(pairs, &LOAD_METHOD_KEYS);
    let sha256 = first_present(pairs, &[SHA256_KEY]);

    match (path, method, sha256) {
        (Some(path), Some(method), Some(sha256)) => Ok(LibraryObservation {
            sha256: sha256.to_ascii_lowercase(),
            event_id: event.event_id.clone(),
            aid: event.aid.clone(),
            cid: event.cid.clone(),
            jar_path: path.to_owned(),
            library_name: display_name(path),
            method: method.to_owned(),
            seen_at: event.timestamp,
        }),
        _ => {
            let mut missing = Vec::new();
            if path.is_none() {
                missing.push(ARTIFACT_PATH_KEYS[0]);
            }
            if method.is_none() {
                missing.push(LOAD_METHOD_KEYS[0]);
            }
            if sha256.is_none() {
                missing.push(SHA256_KEY);
            }
            Err(missing)
        }
    }
}

/// Stage1 → Stage2 카탈로그 processor
pub struct ParsedToCatalogProcessor {
    enabled: bool,
    batch_size: usize,
    namespace: String,
    initialized: bool,
    quarantined: HashSet<String>,
    /// 마지막으로 읽은 `(TIMESTAMP, EVENT_ID)`
    cursor: Option<(i64, String)>,
    tracker: Option<Arc<LibraryTemporalTracker>>,
}

impl ParsedToCatalogProcessor {
    pub fn new() -> Self {
        let defaults = ParsedToCatalogConfig::default();
        Self {
            enabled: defaults.enabled,
            batch_size: defaults.batch_size,
            namespace: defaults.library_namespace,
            initialized: false,
            quarantined: HashSet::new(),
            cursor: None,
            tracker: None,
        }
    }

    /// 카탈로그에 기록할 때마다 시간 추적기를 갱신합니다.
    pub fn with_tracker(mut self, tracker: Arc<LibraryTemporalTracker>) -> Self {
        self.tracker = Some(tracker);
        self
    }

    /// 건너뛴 이벤트 ID 수
    pub fn quarantined_count(&self) -> usize {
        self.quarantined.len()
    }

    fn quarantine(&mut self, event_id: &str) {
        if self.quarantined.len() >= MAX_QUARANTINED {
            warn!(
                max = MAX_QUARANTINED,
                "skipped-event list is full, clearing it"
            );
            self.quarantined.clear();
        }
        self.quarantined.insert(event_id.to_owned());
    }

    fn catalog_event(store: &mut Store, obs: &LibraryObservation) -> Result<(), PipelineError> {
        let tx = store.transaction()?;
        stage2::upsert_library(&tx, obs)?;
        stage1::delete_event(&tx, &obs.event_id)?;
        tx.commit().map_err(StoreError::from)?;
        Ok(())
    }

    fn run_batch(&mut self, store: &mut Store, batch_size: usize) -> Result<usize, PipelineError> {
        let after = self.cursor.as_ref().map(|(ts, id)| (*ts, id.as_str()));
        let events =
            stage1::fetch_stable_by_namespace_after(store.conn(), &self.namespace, after, batch_size)?;

        self.cursor = if events.len() < batch_size {
            None
        } else {
            events.last().map(|e| (e.timestamp, e.event_id.clone()))
        };

        let mut cataloged = 0;
        for event in events {
            if self.quarantined.contains(&event.event_id) {
                continue;
            }

            let pairs = stage1::keypairs(store.conn(), &event.event_id)?;
            let obs = match extract_observation(&event, &pairs) {
                Ok(obs) => obs,
                Err(missing) => {
                    warn!(
                        event_id = %event.event_id,
                        aid = %event.aid,
                        missing = ?missing,
                        "library event lacks required keys, leaving it in stage1"
                    );
                    counter!(m::PARSED_TO_CATALOG_SKIPPED_TOTAL).increment(1);
                    self.quarantine(&event.event_id);
                    continue;
                }
            };

            match Self::catalog_event(store, &obs) {
                Ok(()) => {
                    cataloged += 1;
                    debug!(
                        event_id = %obs.event_id,
                        library_id = %obs.sha256,
                        library = %obs.library_name,
                        "library cataloged"
                    );
                    if let Some(tracker) = &self.tracker {
                        tracker.update_timestamp(&obs.aid, &obs.sha256, obs.seen_at);
                    }
                }
                Err(e) => {
                    counter!(m::PARSED_TO_CATALOG_FAILURES_TOTAL).increment(1);
                    warn!(event_id = %obs.event_id, error = %e, "failed to catalog library event");
                }
            }
        }

        Ok(cataloged)
    }
}

impl Default for ParsedToCatalogProcessor {
    fn default() -> Self {
        Self::new()
    }
}

impl StageProcessor for ParsedToCatalogProcessor {
    fn name(&self) -> &'static str {
        PARSED_TO_CATALOG
    }

    fn initialize(&mut self, config: &LibtrailConfig) -> Result<(), PipelineError> {
        let section = &config.parsed_to_catalog;
        self.enabled = section.enabled;
        self.batch_size = section.batch_size;
        self.namespace = section.library_namespace.clone();
        self.initialized = true;
        info!(
            enabled = self.enabled,
            batch_size = self.batch_size,
            namespace = %self.namespace,
            "parsed-to-catalog processor initialized"
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
            return Err(PipelineError::NotInitialized(PARSED_TO_CATALOG.to_owned()));
        }

        let started = Instant::now();
        let result = self.run_batch(store, batch_size);
        record_batch_duration(PARSED_TO_CATALOG, started);

        let cataloged = result?;
        counter!(m::PARSED_TO_CATALOG_EVENTS_TOTAL).increment(cataloged as u64);
        if let Some(tracker) = &self.tracker {
            tracker.publish_metrics();
        }
        if cataloged > 0 {
            info!(cataloged, "library events cataloged");
        }
        Ok(cataloged)
    }
}
