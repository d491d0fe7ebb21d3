//! 폴링 스케줄러
//!
//! 고정 주기로 활성 processor를 등록 순서대로 실행합니다. 저장소 연결은
//! `Sync`가 아니므로 [`PipelineWorker`]가 저장소와 processor를 함께 소유하고,
//! 한 주기는 `spawn_blocking` 워커 하나에서 순차 실행됩니다.
//!
//! 배치가 가득 차서 돌아오면(`processed == batch_size`) 같은 processor를
//! 즉시 재실행합니다. 재실행 횟수는 `max_drain_rounds`로 제한됩니다.
//! 배치 실패는 로그만 남기고 다음 주기에 재시도합니다.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

use libtrail_pipeline::StageProcessor;
use libtrail_store::Store;

/// 스케줄러 태스크와 공유되는 워커
pub type SharedWorker = Arc<Mutex<PipelineWorker>>;

/// processor 한 개의 주기 실행 결과
#[derive(Debug, Clone, Serialize)]
pub struct ProcessorRun {
    pub name: String,
    /// `process_batch` 호출 횟수
    pub rounds: u32,
    pub processed: usize,
    /// 마지막 라운드의 에러 메시지
    pub error: Option<String>,
}

/// 한 주기 실행 결과
#[derive(Debug, Clone, Default, Serialize)]
pub struct CycleReport {
    pub processors: Vec<ProcessorRun>,
}

impl CycleReport {
    pub fn total_processed(&self) -> usize {
        self.processors.iter().map(|p| p.processed).sum()
    }

    pub fn failures(&self) -> usize {
        self.processors.iter().filter(|p| p.error.is_some()).count()
    }

    /// 이름으로 실행 결과를 찾습니다.
    pub fn get(&self, name: &str) -> Option<&ProcessorRun> {
        self.processors.iter().find(|p| p.name == name)
    }
}

/// 저장소와 processor 목록을 소유하는 실행 단위
pub struct PipelineWorker {
    store: Store,
    processors: Vec<Box<dyn StageProcessor>>,
    max_drain_rounds: u32,
}

impl PipelineWorker {
    /// `max_drain_rounds`가 0이면 1로 취급합니다.
    pub fn new(
        store: Store,
        processors: Vec<Box<dyn StageProcessor>>,
        max_drain_rounds: u32,
    ) -> Self {
        Self {
            store,
            processors,
            max_drain_rounds: max_drain_rounds.max(1),
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut Store {
        &mut self.store
    }

    pub fn processor_names(&self) -> Vec<&'static str> {
        self.processors.iter().map(|p| p.name()).collect()
    }

    /// 활성 processor를 순서대로 한 번씩 실행하고, 가득 찬 배치는 재실행합니다.
    ///
    /// 한 processor의 실패는 뒤따르는 processor 실행을 막지 않습니다.
    pub fn run_cycle(&mut self) -> CycleReport {
        let mut report = CycleReport::default();

        for processor in self.processors.iter_mut() {
            if !processor.is_enabled() {
                continue;
            }

            let batch_size = processor.batch_size();
            let mut run = ProcessorRun {
                name: processor.name().to_owned(),
                rounds: 0,
                processed: 0,
                error: None,
            };

            loop {
                run.rounds += 1;
                match processor.process_batch(&mut self.store, batch_size) {
                    Ok(processed) => {
                        run.processed += processed;
                        if processed < batch_size || run.rounds >= self.max_drain_rounds {
                            break;
                        }
                        debug!(
                            processor = %run.name,
                            round = run.rounds,
                            "batch was full, draining"
                        );
                    }
                    Err(e) => {
                        error!(
                            processor = %run.name,
                            error = %e,
                            "batch failed, retrying next cycle"
                        );
                        run.error = Some(e.to_string());
                        break;
                    }
                }
            }

            report.processors.push(run);
        }

        report
    }
}

/// 블로킹 워커에서 한 주기를 실행합니다.
///
/// 워커 태스크가 패닉하면 `None`을 반환합니다.
pub async fn run_cycle_blocking(worker: &SharedWorker) -> Option<CycleReport> {
    let worker = Arc::clone(worker);
    let result = tokio::task::spawn_blocking(move || {
        let mut guard = worker.lock().unwrap_or_else(PoisonError::into_inner);
        guard.run_cycle()
    })
    .await;

    match result {
        Ok(report) => Some(report),
        Err(e) => {
            error!(error = %e, "pipeline worker task failed");
            None
        }
    }
}

/// 폴링 루프를 백그라운드 태스크로 시작합니다.
///
/// 진행 중인 주기는 끝까지 실행된 뒤 종료 신호를 확인합니다.
pub fn spawn_scheduler(
    worker: SharedWorker,
    poll_interval: Duration,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let Some(report) = run_cycle_blocking(&worker).await else {
                        continue;
                    };
                    if report.total_processed() > 0 || report.failures() > 0 {
                        info!(
                            processed = report.total_processed(),
                            failures = report.failures(),
                            "pipeline cycle completed"
                        );
                    } else {
                        debug!("pipeline cycle idle");
                    }
                }
                _ = shutdown_rx.recv() => {
                    debug!("scheduler shutting down");
                    break;
                }
            }
        }
    })
}
