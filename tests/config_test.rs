mod common;

use common::{project, start, wait_for_jobs};
use std::time::Duration;
use tenant_controller::config::{Config, VerifyMode};
use tenant_controller::jobs::JobStatus;
use tenant_controller::mock::MockTenantService;

const CONFIG_PATH: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/testdata/config.yaml");

#[test]
fn loads_config_file() {
    let config = Config::from_file(CONFIG_PATH).unwrap();

    assert!(!config.job.sre.enabled);
    assert_eq!(config.job.backoff.initial, Duration::from_secs(10));
    assert_eq!(config.job.timeout, Duration::from_secs(30 * 60));
    assert_eq!(config.endpoints.mimir.delete_verify_mode, VerifyMode::Strict);
    assert_eq!(config.endpoints.loki.delete_verify_mode, VerifyMode::Loose);
    assert_eq!(config.endpoints.loki.backend, "http://loki-backend:3100");
}

#[tokio::test(start_paused = true)]
async fn system_from_config_file_cleans_up_with_strict_metrics_check() {
    let config = Config::from_file(CONFIG_PATH).unwrap();
    let h = start(
        config,
        MockTenantService::new("alerting monitor"),
        MockTenantService::new("sre exporter"),
    )
    .await;
    let p1 = project(1);

    h.system
        .controller
        .on_project_added(p1.clone().marked_deleted())
        .await
        .unwrap();
    wait_for_jobs(&h.system.lifecycle, |jobs| jobs.is_empty()).await;

    assert_eq!(h.alerting.cleanup_calls(), vec![p1.tenant()]);
    assert!(h.sre.cleanup_calls().is_empty());
    // Strict mode polls the compactor status at least once.
    assert!(h.http.get_count("http://mimir-compactor:8080/compactor/delete_tenant_status") >= 1);

    h.system.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn system_from_config_file_skips_sre_on_initialize() {
    let config = Config::from_file(CONFIG_PATH).unwrap();
    let h = start(
        config,
        MockTenantService::new("alerting monitor"),
        MockTenantService::new("sre exporter"),
    )
    .await;
    let p2 = project(2);

    h.system.controller.on_project_added(p2.clone()).await.unwrap();
    wait_for_jobs(&h.system.lifecycle, |jobs| {
        jobs.get(&p2.uid) == Some(&JobStatus::TenantCreated)
    })
    .await;

    assert_eq!(h.alerting.init_calls(), vec![p2.tenant()]);
    assert!(h.sre.init_calls().is_empty());

    h.system.shutdown().await.unwrap();
}
