//! 라이브러리 시간 추적기 -- 애플리케이션별 라이브러리 관찰 이력
//!
//! [`LibraryTemporalTracker`]는 AID → 라이브러리 ID → [`TemporalInfo`] 2단계
//! 동시성 맵입니다. 프로세스 로컬이며 영속화하지 않습니다. 제거 여부의 원천은
//! 저장소이고, 이 추적기는 런타임 분석/모니터링용입니다.
//!
//! # 상태 전환
//! ```text
//! (없음) --update--> 활성 --mark_removed/sweep--> 제거됨 --reactivate--> 활성
//! ```
//!
//! 제거된 엔트리에 대한 `update_timestamp`는 `last_seen`만 전진시키며
//! 제거 상태를 해제하지 않습니다. 재활성화는 [`LibraryTemporalTracker::reactivate`]로만 가능합니다.

use std::collections::HashSet;

use dashmap::DashMap;
use metrics::gauge;

use libtrail_core::metrics as m;

/// 라이브러리 한 개의 시간 정보
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TemporalInfo {
    /// 최초 관찰 시각 (생성 후 불변)
    pub first_seen: i64,
    /// 마지막 관찰 시각 (단조 증가)
    pub last_seen: i64,
    /// 제거 여부
    pub removed: bool,
    /// 제거 시각
    pub removed_at: Option<i64>,
}

impl TemporalInfo {
    fn new(ts: i64) -> Self {
        Self {
            first_seen: ts,
            last_seen: ts,
            removed: false,
            removed_at: None,
        }
    }
}

/// 애플리케이션 단위 통계 스냅샷
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrackerStats {
    pub total: usize,
    pub active: usize,
    pub removed: usize,
    pub earliest_first_seen: Option<i64>,
    pub latest_last_seen: Option<i64>,
}

/// 라이브러리 시간 추적기
#[derive(Debug, Default)]
pub struct LibraryTemporalTracker {
    apps: DashMap<String, DashMap<String, TemporalInfo>>,
}

impl LibraryTemporalTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// 관찰을 기록합니다. 엔트리가 없으면 생성하고, 있으면 `last_seen`을 전진시킵니다.
    pub fn update_timestamp(&self, aid: &str, library_id: &str, ts: i64) {
        let app = self.apps.entry(aid.to_owned()).or_default();
        app.entry(library_id.to_owned())
            .and_modify(|info| {
                if ts > info.last_seen {
                    info.last_seen = ts;
                }
            })
            .or_insert_with(|| TemporalInfo::new(ts));
    }

    /// 라이브러리를 제거 상태로 표시합니다.
    ///
    /// 상태가 바뀌었으면 `true`를 반환합니다. 이미 제거되었거나 추적되지 않는
    /// 라이브러리에는 아무 효과가 없습니다.
    pub fn mark_removed(&self, aid: &str, library_id: &str, ts: i64) -> bool {
        let Some(app) = self.apps.get(aid) else {
            return false;
        };
        let Some(mut info) = app.get_mut(library_id) else {
            return false;
        };
        if info.removed {
            return false;
        }
        info.removed = true;
        info.removed_at = Some(ts);
        true
    }

    /// 제거된 라이브러리를 명시적으로 재활성화합니다.
    pub fn reactivate(&self, aid: &str, library_id: &str, ts: i64) -> bool {
        let Some(app) = self.apps.get(aid) else {
            return false;
        };
        let Some(mut info) = app.get_mut(library_id) else {
            return false;
        };
        if !info.removed {
            return false;
        }
        info.removed = false;
        info.removed_at = None;
        if ts > info.last_seen {
            info.last_seen = ts;
        }
        true
    }

    /// `current`에 없는 활성 라이브러리를 모두 제거 상태로 표시하고 그 수를 반환합니다.
    pub fn sweep(&self, aid: &str, current: &HashSet<String>, ts: i64) -> usize {
        let Some(app) = self.apps.get(aid) else {
            return 0;
        };
        let mut removed = 0;
        for mut entry in app.iter_mut() {
            if !entry.removed && !current.contains(entry.key()) {
                entry.removed = true;
                entry.removed_at = Some(ts);
                removed += 1;
            }
        }
        removed
    }

    /// 애플리케이션의 활성 라이브러리 ID 목록 (정렬됨)
    pub fn get_active_libraries(&self, aid: &str) -> Vec<String> {
        let Some(app) = self.apps.get(aid) else {
            return Vec::new();
        };
        let mut ids: Vec<String> = app
            .iter()
            .filter(|e| !e.removed)
            .map(|e| e.key().clone())
            .collect();
        ids.sort();
        ids
    }

    pub fn get_info(&self, aid: &str, library_id: &str) -> Option<TemporalInfo> {
        self.apps
            .get(aid)
            .and_then(|app| app.get(library_id).map(|info| *info))
    }

    /// 애플리케이션 통계 스냅샷
    pub fn get_stats(&self, aid: &str) -> TrackerStats {
        let Some(app) = self.apps.get(aid) else {
            return TrackerStats::default();
        };
        let mut stats = TrackerStats::default();
        for entry in app.iter() {
            stats.total += 1;
            if entry.removed {
                stats.removed += 1;
            } else {
                stats.active += 1;
            }
            stats.earliest_first_seen = Some(
                stats
                    .earliest_first_seen
                    .map_or(entry.first_seen, |t| t.min(entry.first_seen)),
            );
            stats.latest_last_seen = Some(
                stats
                    .latest_last_seen
                    .map_or(entry.last_seen, |t| t.max(entry.last_seen)),
            );
        }
        stats
    }

    /// 추적 중인 애플리케이션 ID 목록 (정렬됨)
    pub fn tracked_applications(&self) -> Vec<String> {
        let mut aids: Vec<String> = self.apps.iter().map(|e| e.key().clone()).collect();
        aids.sort();
        aids
    }

    /// 전체 애플리케이션의 활성 라이브러리 수
    pub fn total_active(&self) -> usize {
        self.apps
            .iter()
            .map(|app| app.iter().filter(|e| !e.removed).count())
            .sum()
    }

    /// 추적기 게이지를 갱신합니다.
    pub fn publish_metrics(&self) {
        gauge!(m::TRACKER_ACTIVE_LIBRARIES).set(self.total_active() as f64);
        gauge!(m::TRACKER_APPLICATIONS).set(self.apps.len() as f64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn update_creates_then_advances() {
        let tracker = LibraryTemporalTracker::new();
        tracker.update_timestamp("app", "lib", 100);
        tracker.update_timestamp("app", "lib", 50);
        tracker.update_timestamp("app", "lib", 200);

        let info = tracker.get_info("app", "lib").unwrap();
        assert_eq!(info.first_seen, 100);
        assert_eq!(info.last_seen, 200);
        assert!(!info.removed);
    }

    #[test]
    fn removal_lifecycle_does_not_implicitly_reactivate() {
        let tracker = LibraryTemporalTracker::new();
        tracker.update_timestamp("app", "lib", 10);
        assert!(tracker.mark_removed("app", "lib", 20));

        let info = tracker.get_info("app", "lib").unwrap();
        assert!(info.removed);
        assert_eq!(info.last_seen, 10);
        assert_eq!(info.removed_at, Some(20));

        tracker.update_timestamp("app", "lib", 30);
        let info = tracker.get_info("app", "lib").unwrap();
        assert!(info.removed);
        assert_eq!(info.removed_at, Some(20));
        assert_eq!(info.last_seen, 30);
        assert!(tracker.get_active_libraries("app").is_empty());
    }

    #[test]
    fn mark_removed_is_idempotent() {
        let tracker = LibraryTemporalTracker::new();
        tracker.update_timestamp("app", "lib", 10);
        assert!(tracker.mark_removed("app", "lib", 20));
        assert!(!tracker.mark_removed("app", "lib", 40));
        assert_eq!(
            tracker.get_info("app", "lib").unwrap().removed_at,
            Some(20)
        );
        assert!(!tracker.mark_removed("app", "unknown", 40));
        assert!(!tracker.mark_removed("other", "lib", 40));
    }

    #[test]
    fn explicit_reactivation() {
        let tracker = LibraryTemporalTracker::new();
        tracker.update_timestamp("app", "lib", 10);
        assert!(!tracker.reactivate("app", "lib", 15));
        tracker.mark_removed("app", "lib", 20);
        assert!(tracker.reactivate("app", "lib", 30));

        let info = tracker.get_info("app", "lib").unwrap();
        assert!(!info.removed);
        assert_eq!(info.removed_at, None);
        assert_eq!(info.last_seen, 30);
        assert_eq!(info.first_seen, 10);
    }

    #[test]
    fn sweep_marks_missing_libraries() {
        let tracker = LibraryTemporalTracker::new();
        for lib in ["a", "b", "c"] {
            tracker.update_timestamp("app", lib, 1);
        }
        let current: HashSet<String> = ["a".to_owned()].into_iter().collect();
        assert_eq!(tracker.sweep("app", &current, 5), 2);
        assert_eq!(tracker.get_active_libraries("app"), vec!["a"]);
        assert_eq!(tracker.sweep("app", &current, 6), 0);
    }

    #[test]
    fn stats_snapshot() {
        let tracker = LibraryTemporalTracker::new();
        tracker.update_timestamp("app", "a", 5);
        tracker.update_timestamp("app", "b", 3);
        tracker.update_timestamp("app", "b", 9);
        tracker.mark_removed("app", "a", 10);

        let stats = tracker.get_stats("app");
        assert_eq!(stats.total, 2);
        assert_eq!(stats.active, 1);
        assert_eq!(stats.removed, 1);
        assert_eq!(stats.earliest_first_seen, Some(3));
        assert_eq!(stats.latest_last_seen, Some(9));
        assert_eq!(tracker.get_stats("missing"), TrackerStats::default());
    }

    #[test]
    fn applications_are_isolated() {
        let tracker = LibraryTemporalTracker::new();
        tracker.update_timestamp("billing", "lib", 1);
        tracker.update_timestamp("search", "lib", 2);
        tracker.mark_removed("billing", "lib", 3);

        assert!(tracker.get_active_libraries("billing").is_empty());
        assert_eq!(tracker.get_active_libraries("search"), vec!["lib"]);
        assert_eq!(tracker.tracked_applications(), vec!["billing", "search"]);
        assert_eq!(tracker.total_active(), 1);
    }

    #[test]
    fn concurrent_updates_from_threads() {
        let tracker = Arc::new(LibraryTemporalTracker::new());
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let tracker = Arc::clone(&tracker);
                std::thread::spawn(move || {
                    for i in 0..100 {
                        tracker.update_timestamp("app", &format!("lib-{}", i % 10), t * 100 + i);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(tracker.get_active_libraries("app").len(), 10);
        let info = tracker.get_info("app", "lib-9").unwrap();
        assert_eq!(info.last_seen, 399);
    }
}
