//! Failure isolation: one bad target, server or rule never stops the others

use std::sync::Arc;
use std::time::Duration;

use infra_watch::{
    alerts::AlertEvaluator,
    monitors::{InfraSweepReport, InfrastructureSweep, MonitorSweep, Prober},
    storage::{
        NewAlertRule, ProbeStatus, RuleCondition, RuleScope, ServerKind, ServerStatus,
        StorageBackend,
    },
};
use pretty_assertions::assert_eq;
use tokio::sync::Semaphore;
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::helpers::*;

#[tokio::test]
async fn test_unreachable_targets_do_not_abort_sweep() {
    let healthy = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&healthy)
        .await;
    let hanging = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(10)))
        .mount(&hanging)
        .await;

    let storage = memory_storage();
    let ok = add_http_target(storage.as_ref(), "ok", healthy.uri()).await;
    let refused = add_http_target(storage.as_ref(), "refused", "http://127.0.0.1:9/".to_string()).await;
    let slow = add_http_target(storage.as_ref(), "slow", hanging.uri()).await;
    let garbage = add_http_target(storage.as_ref(), "garbage", "not a url".to_string()).await;

    let prober = Prober::new(Duration::from_secs(1), Duration::from_secs(1)).unwrap();
    let sweep = MonitorSweep::new(storage.clone(), prober, Arc::new(Semaphore::new(8)));
    let report = sweep.run().await;

    assert_eq!(report.targets, 4);
    assert_eq!(report.up, 1);
    assert_eq!(report.down, 3);
    assert_eq!(report.failed, 0);

    for (id, expected) in [
        (ok, ProbeStatus::Up),
        (refused, ProbeStatus::Down),
        (slow, ProbeStatus::Down),
        (garbage, ProbeStatus::Down),
    ] {
        let target = storage.get_probe_target(id).await.unwrap().unwrap();
        assert_eq!(target.status, expected, "target {}", target.name);

        let result = storage.query_latest_probe_results(id, 1).await.unwrap().remove(0);
        assert!(!result.message.is_empty());
    }
}

#[tokio::test]
async fn test_rejected_credentials_mark_server_inactive() {
    let storage = memory_storage();
    add_proxmox_server(storage.as_ref(), "cluster-a").await;

    let sweep = InfrastructureSweep::new(
        storage.clone(),
        Arc::new(RejectingCluster),
        Arc::new(Semaphore::new(4)),
    );
    let report = sweep.run().await;

    assert_eq!(
        report,
        InfraSweepReport {
            servers: 1,
            active: 0,
            inactive: 1,
            failed: 0
        }
    );
    let server = storage
        .list_managed_servers(ServerKind::Proxmox)
        .await
        .unwrap()
        .remove(0);
    assert_eq!(server.status, ServerStatus::Inactive);
    assert!(server.last_sync.is_some());
}

#[tokio::test]
async fn test_rule_for_missing_target_is_isolated() {
    let storage = memory_storage();
    let target_id = add_http_target(storage.as_ref(), "api", "http://127.0.0.1:9/".to_string()).await;
    add_monitor_rule(storage.as_ref(), target_id, RuleCondition::UptimeLow, 100.0).await;
    add_monitor_rule(storage.as_ref(), 9_999, RuleCondition::StatusDown, 0.0).await;
    storage
        .insert_alert_rule(NewAlertRule {
            name: "cpu on unknown server".to_string(),
            scope: RuleScope::Infrastructure,
            target_id: 4_242,
            condition: RuleCondition::CpuHigh,
            threshold: 1.0,
            enabled: true,
        })
        .await
        .unwrap();

    let evaluator = AlertEvaluator::new(
        storage.clone(),
        Arc::new(RejectingCluster),
        Arc::new(Semaphore::new(4)),
        chrono::Duration::minutes(5),
    );
    let report = evaluator.evaluate().await;

    // a fresh target reports 100% uptime, which satisfies "<= 100"
    assert_eq!(report.rules, 3);
    assert_eq!(report.created, 1);
    assert_eq!(report.failed, 2);
}
