//! 설정 관리 -- libtrail.toml 파싱 및 런타임 설정
//!
//! [`LibtrailConfig`]는 모든 stage processor와 데몬의 설정을 담는 최상위 구조체입니다.
//!
//! # 설정 로딩 우선순위
//! 1. CLI 인자 (최고 우선)
//! 2. 환경변수 (`LIBTRAIL_ENRICHMENT_BATCH_SIZE=50` 형식)
//! 3. 설정 파일 (`libtrail.toml`)
//! 4. 기본값 (`Default` 구현)
//!
//! # 사용 예시
//! ```no_run
//! # async fn example() -> Result<(), libtrail_core::error::LibtrailError> {
//! use libtrail_core::config::LibtrailConfig;
//!
//! // 파일에서 로드 + 환경변수 오버라이드
//! let config = LibtrailConfig::load("libtrail.toml").await?;
//!
//! // TOML 문자열에서 직접 파싱
//! let config = LibtrailConfig::parse("[general]\nlog_level = \"debug\"")?;
//! # Ok(())
//! # }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{ConfigError, LibtrailError};

/// 배치 크기 상한
const MAX_BATCH_SIZE: usize = 100_000;

/// libtrail 통합 설정
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LibtrailConfig {
    /// 일반 설정
    #[serde(default)]
    pub general: GeneralConfig,
    /// 저장소 설정
    #[serde(default)]
    pub store: StoreConfig,
    /// 스케줄러 설정
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    /// Stage0 → Stage1
    #[serde(default)]
    pub raw_to_parsed: RawToParsedConfig,
    /// Stage1 → Stage2
    #[serde(default)]
    pub parsed_to_catalog: ParsedToCatalogConfig,
    /// Stage2 보강
    #[serde(default)]
    pub enrichment: EnrichmentConfig,
    /// Prometheus 메트릭 설정
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl LibtrailConfig {
    /// TOML 파일에서 설정을 로드하고 환경변수 오버라이드를 적용합니다.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, LibtrailError> {
        let mut config = Self::from_file(path).await?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// TOML 파일에서 설정을 로드합니다 (환경변수 오버라이드 없음).
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, LibtrailError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                LibtrailError::Config(ConfigError::FileNotFound {
                    path: path.display().to_string(),
                })
            } else {
                LibtrailError::Io(e)
            }
        })?;
        let config = Self::parse(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// TOML 문자열에서 설정을 파싱합니다.
    pub fn parse(toml_str: &str) -> Result<Self, LibtrailError> {
        toml::from_str(toml_str).map_err(|e| {
            LibtrailError::Config(ConfigError::ParseFailed {
                reason: e.to_string(),
            })
        })
    }

    /// 환경변수로 설정값을 오버라이드합니다.
    ///
    /// 환경변수 네이밍 규칙: `LIBTRAIL_{SECTION}_{FIELD}`
    pub fn apply_env_overrides(&mut self) {
        // General
        override_string(&mut self.general.log_level, "LIBTRAIL_GENERAL_LOG_LEVEL");
        override_string(&mut self.general.log_format, "LIBTRAIL_GENERAL_LOG_FORMAT");
        override_string(&mut self.general.pid_file, "LIBTRAIL_GENERAL_PID_FILE");

        // Store
        override_string(&mut self.store.path, "LIBTRAIL_STORE_PATH");
        override_u64(
            &mut self.store.busy_timeout_ms,
            "LIBTRAIL_STORE_BUSY_TIMEOUT_MS",
        );

        // Scheduler
        override_u64(
            &mut self.scheduler.poll_interval_secs,
            "LIBTRAIL_SCHEDULER_POLL_INTERVAL_SECS",
        );
        override_u32(
            &mut self.scheduler.max_drain_rounds,
            "LIBTRAIL_SCHEDULER_MAX_DRAIN_ROUNDS",
        );

        // Raw → Parsed
        override_bool(
            &mut self.raw_to_parsed.enabled,
            "LIBTRAIL_RAW_TO_PARSED_ENABLED",
        );
        override_usize(
            &mut self.raw_to_parsed.batch_size,
            "LIBTRAIL_RAW_TO_PARSED_BATCH_SIZE",
        );

        // Parsed → Catalog
        override_bool(
            &mut self.parsed_to_catalog.enabled,
            "LIBTRAIL_PARSED_TO_CATALOG_ENABLED",
        );
        override_usize(
            &mut self.parsed_to_catalog.batch_size,
            "LIBTRAIL_PARSED_TO_CATALOG_BATCH_SIZE",
        );
        override_string(
            &mut self.parsed_to_catalog.library_namespace,
            "LIBTRAIL_PARSED_TO_CATALOG_LIBRARY_NAMESPACE",
        );

        // Enrichment
        override_bool(&mut self.enrichment.enabled, "LIBTRAIL_ENRICHMENT_ENABLED");
        override_usize(
            &mut self.enrichment.batch_size,
            "LIBTRAIL_ENRICHMENT_BATCH_SIZE",
        );
        override_string(
            &mut self.enrichment.vuln_db_path,
            "LIBTRAIL_ENRICHMENT_VULN_DB_PATH",
        );
        override_u64(
            &mut self.enrichment.pattern_cache_ttl_secs,
            "LIBTRAIL_ENRICHMENT_PATTERN_CACHE_TTL_SECS",
        );
        override_string(
            &mut self.enrichment.cve_feed_path,
            "LIBTRAIL_ENRICHMENT_CVE_FEED_PATH",
        );

        // Metrics
        override_bool(&mut self.metrics.enabled, "LIBTRAIL_METRICS_ENABLED");
        override_string(
            &mut self.metrics.listen_addr,
            "LIBTRAIL_METRICS_LISTEN_ADDR",
        );
        override_u16(&mut self.metrics.port, "LIBTRAIL_METRICS_PORT");
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), LibtrailError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.general.log_level.as_str()) {
            return Err(ConfigError::InvalidValue {
                field: "general.log_level".to_owned(),
                reason: format!("must be one of: {}", valid_levels.join(", ")),
            }
            .into());
        }

        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.general.log_format.as_str()) {
            return Err(ConfigError::InvalidValue {
                field: "general.log_format".to_owned(),
                reason: format!("must be one of: {}", valid_formats.join(", ")),
            }
            .into());
        }

        if self.store.path.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "store.path".to_owned(),
                reason: "must not be empty".to_owned(),
            }
            .into());
        }

        if self.scheduler.poll_interval_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "scheduler.poll_interval_secs".to_owned(),
                reason: "must be greater than 0".to_owned(),
            }
            .into());
        }

        validate_batch_size("raw_to_parsed.batch_size", self.raw_to_parsed.batch_size)?;
        validate_batch_size(
            "parsed_to_catalog.batch_size",
            self.parsed_to_catalog.batch_size,
        )?;
        validate_batch_size("enrichment.batch_size", self.enrichment.batch_size)?;

        if self.parsed_to_catalog.enabled && self.parsed_to_catalog.library_namespace.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "parsed_to_catalog.library_namespace".to_owned(),
                reason: "must not be empty when the processor is enabled".to_owned(),
            }
            .into());
        }

        if self.enrichment.pattern_cache_ttl_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "enrichment.pattern_cache_ttl_secs".to_owned(),
                reason: "must be greater than 0".to_owned(),
            }
            .into());
        }

        Ok(())
    }
}

fn validate_batch_size(field: &str, value: usize) -> Result<(), LibtrailError> {
    if value == 0 || value > MAX_BATCH_SIZE {
        return Err(ConfigError::InvalidValue {
            field: field.to_owned(),
            reason: format!("must be 1-{MAX_BATCH_SIZE}"),
        }
        .into());
    }
    Ok(())
}

/// 일반 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// 로그 레벨 (trace, debug, info, warn, error)
    pub log_level: String,
    /// 로그 형식 (json, pretty)
    pub log_format: String,
    /// PID 파일 경로 (비어있으면 기록하지 않음)
    pub pid_file: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_owned(),
            log_format: "json".to_owned(),
            pid_file: String::new(),
        }
    }
}

/// 저장소 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// SQLite 파일 경로 (`:memory:` 허용)
    pub path: String,
    /// 잠금 대기 시간 (밀리초)
    pub busy_timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: "/var/lib/libtrail/libtrail.db".to_owned(),
            busy_timeout_ms: 30_000,
        }
    }
}

/// 스케줄러 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// 폴링 주기 (초)
    pub poll_interval_secs: u64,
    /// 한 주기 안에서 가득 찬 배치를 연속 실행하는 최대 횟수
    pub max_drain_rounds: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 10,
            max_drain_rounds: 20,
        }
    }
}

/// Stage0 → Stage1 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RawToParsedConfig {
    pub enabled: bool,
    pub batch_size: usize,
}

impl Default for RawToParsedConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            batch_size: 500,
        }
    }
}

/// Stage1 → Stage2 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ParsedToCatalogConfig {
    pub enabled: bool,
    pub batch_size: usize,
    /// 라이브러리 로딩 이벤트를 나타내는 네임스페이스
    pub library_namespace: String,
}

impl Default for ParsedToCatalogConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            batch_size: 200,
            library_namespace: "library_load".to_owned(),
        }
    }
}

/// Stage2 보강 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EnrichmentConfig {
    pub enabled: bool,
    pub batch_size: usize,
    /// 로컬 JSON 취약점 엔진 DB 디렉토리 (비어있으면 엔진 비활성화)
    pub vuln_db_path: String,
    /// 패턴 캐시 TTL (초)
    pub pattern_cache_ttl_secs: u64,
    /// 시작 시 가져올 CVE 피드 파일 (비어있으면 건너뜀)
    pub cve_feed_path: String,
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            batch_size: 50,
            vuln_db_path: "/var/lib/libtrail/vuln-db".to_owned(),
            pattern_cache_ttl_secs: 3600,
            cve_feed_path: String::new(),
        }
    }
}

/// Prometheus 메트릭 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub listen_addr: String,
    pub port: u16,
    pub endpoint: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen_addr: "127.0.0.1".to_owned(),
            port: 9464,
            endpoint: "/metrics".to_owned(),
        }
    }
}

// --- 환경변수 오버라이드 헬퍼 ---

fn override_string(target: &mut String, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val;
    }
}

fn override_bool(target: &mut bool, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<bool>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse bool from env var, ignoring"
            ),
        }
    }
}

fn override_usize(target: &mut usize, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<usize>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse usize from env var, ignoring"
            ),
        }
    }
}

fn override_u16(target: &mut u16, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u16>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u16 from env var, ignoring"
            ),
        }
    }
}

fn override_u32(target: &mut u32, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u32>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u32 from env var, ignoring"
            ),
        }
    }
}

fn override_u64(target: &mut u64, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u64>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u64 from env var, ignoring"
            ),
        }
    }
}
