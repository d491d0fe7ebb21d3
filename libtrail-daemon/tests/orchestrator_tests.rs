//! Orchestrator integration tests.
//!
//! Tests the flow: config loading -> store open -> feed import ->
//! processor build -> single drain cycle.

use std::env;
use std::fs;

use libtrail_core::config::LibtrailConfig;
use libtrail_core::types::RawRecord;
use libtrail_daemon::orchestrator::Orchestrator;
use libtrail_store::{stage0, stage2};
use serial_test::serial;

fn memory_config() -> LibtrailConfig {
    let toml_str = r#"
[general]
log_level = "info"
pid_file = ""

[store]
path = ":memory:"

[scheduler]
poll_interval_secs = 1
max_drain_rounds = 5

[enrichment]
vuln_db_path = ""
"#;
    LibtrailConfig::parse(toml_str).expect("failed to parse memory config")
}

fn library_load(id: &str, ts: i64, jar: &str, sha: &str) -> RawRecord {
    RawRecord {
        event_id: id.to_owned(),
        config_file: "agent.yml".to_owned(),
        timestamp: ts,
        thread_id: "main".to_owned(),
        priority: "INFO".to_owned(),
        namespace: "library_load".to_owned(),
        aid: "checkout".to_owned(),
        cid: "prod".to_owned(),
        keypairs: format!("{{jarPath={jar}, loadMethod=URLClassLoader, sha256={sha}}}"),
    }
}

#[tokio::test]
async fn test_build_with_memory_store() {
    let orchestrator = Orchestrator::build_from_config(memory_config())
        .await
        .expect("orchestrator should build");

    let worker = orchestrator.worker().lock().expect("lock");
    assert_eq!(
        worker.processor_names(),
        vec!["raw-to-parsed", "parsed-to-catalog", "catalog-enrichment"]
    );
}

#[tokio::test]
async fn test_build_rejects_invalid_config() {
    let mut config = memory_config();
    config.raw_to_parsed.batch_size = 0;

    let result = Orchestrator::build_from_config(config).await;
    assert!(result.is_err(), "zero batch size should be rejected");
}

#[tokio::test]
async fn test_startup_feed_import_and_single_cycle() {
    let dir = tempfile::tempdir().expect("tempdir");
    let feed = dir.path().join("feed.json");
    fs::write(
        &feed,
        r#"[{"cve_id":"CVE-2021-44228","name":"Log4Shell","severity":"CRITICAL",
             "cvss_v3":10.0,"affected_libraries":["log4j-core*"],
             "fixed_versions":["2.17.1"]}]"#,
    )
    .expect("write feed");

    let mut config = memory_config();
    config.enrichment.cve_feed_path = feed.display().to_string();

    let orchestrator = Orchestrator::build_from_config(config)
        .await
        .expect("orchestrator should build");
    {
        let worker = orchestrator.worker().lock().expect("lock");
        stage0::insert_raw(
            worker.store().conn(),
            &library_load("e1", 1_000, "/opt/app/lib/log4j-core-2.14.1.jar", "F00D"),
        )
        .expect("insert raw");
    }

    let report = orchestrator.run_once().await.expect("cycle");
    assert_eq!(report.failures(), 0);
    assert_eq!(report.total_processed(), 3);

    let worker = orchestrator.worker().lock().expect("lock");
    let cves = stage2::library_cves(worker.store().conn(), "f00d").expect("cves");
    assert_eq!(cves.len(), 1);
    assert_eq!(cves[0].cve_id, "CVE-2021-44228");

    assert_eq!(
        orchestrator.tracker().get_active_libraries("checkout"),
        vec!["f00d"]
    );
}

#[tokio::test]
async fn test_missing_feed_fails_startup() {
    let mut config = memory_config();
    config.enrichment.cve_feed_path = "/nonexistent/libtrail/feed.json".to_owned();

    let err = Orchestrator::build_from_config(config)
        .await
        .err()
        .expect("missing feed should fail");
    assert!(err.to_string().contains("failed to import CVE feed"));
}

#[tokio::test]
async fn test_file_store_persists_between_builds() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut config = memory_config();
    config.store.path = dir.path().join("db").join("libtrail.db").display().to_string();

    {
        let orchestrator = Orchestrator::build_from_config(config.clone())
            .await
            .expect("first build");
        let worker = orchestrator.worker().lock().expect("lock");
        stage0::insert_raw(
            worker.store().conn(),
            &library_load("e1", 1_000, "/lib/guava-31.1.jar", "abcd"),
        )
        .expect("insert raw");
    }

    let orchestrator = Orchestrator::build_from_config(config)
        .await
        .expect("second build");
    orchestrator.run_once().await.expect("cycle");

    let worker = orchestrator.worker().lock().expect("lock");
    let lib = stage2::get_library(worker.store().conn(), "abcd")
        .expect("get")
        .expect("library persisted");
    assert_eq!(lib.library_name, "guava");
}

#[tokio::test]
#[serial]
async fn test_build_from_file_applies_env_override() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("libtrail.toml");
    let rendered = toml::to_string(&memory_config()).expect("serialize config");
    fs::write(&path, rendered).expect("write config");

    // SAFETY: serial 테스트에서만 환경변수를 변경
    unsafe {
        env::set_var("LIBTRAIL_RAW_TO_PARSED_BATCH_SIZE", "7");
    }

    let result = Orchestrator::build(&path).await;

    unsafe {
        env::remove_var("LIBTRAIL_RAW_TO_PARSED_BATCH_SIZE");
    }

    let orchestrator = result.expect("orchestrator should build from file");
    assert_eq!(orchestrator.config().raw_to_parsed.batch_size, 7);
}

#[tokio::test]
async fn test_build_from_missing_file_fails() {
    let result = Orchestrator::build(std::path::Path::new("/nonexistent/libtrail.toml")).await;
    let err = result.err().expect("missing config should fail");
    assert!(err.to_string().contains("failed to load config"));
}
