//! Alert evaluation against persisted state: thresholds, dedup window and
//! the acknowledge / resolve lifecycle

use std::sync::Arc;

use chrono::{Duration, Utc};
use infra_watch::{
    alerts::AlertEvaluator,
    storage::{
        AlertStatus, ProbeStatus, RuleCondition, RuleScope, Severity, StorageBackend, TargetState,
        NewAlertRule,
    },
};
use pretty_assertions::assert_eq;
use tokio::sync::Semaphore;

use crate::helpers::*;

fn evaluator(storage: Arc<dyn StorageBackend>) -> AlertEvaluator {
    AlertEvaluator::new(
        storage,
        Arc::new(StaticCluster(vec![node("pve-1", 97.5), node("pve-2", 12.0)])),
        Arc::new(Semaphore::new(8)),
        Duration::minutes(5),
    )
}

async fn target_in_state(
    storage: &dyn StorageBackend,
    status: ProbeStatus,
    latency_ms: i64,
    uptime: f64,
) -> i64 {
    let id = add_http_target(storage, "gateway", "http://127.0.0.1:9/".to_string()).await;
    storage
        .update_probe_target_state(
            id,
            TargetState {
                status,
                last_check: Utc::now(),
                latency_ms,
                uptime,
            },
        )
        .await
        .unwrap();
    id
}

#[tokio::test]
async fn test_ten_ticks_in_three_minutes_create_one_alert() {
    let storage = memory_storage();
    let target_id = target_in_state(storage.as_ref(), ProbeStatus::Down, 0, 0.0).await;
    add_monitor_rule(storage.as_ref(), target_id, RuleCondition::StatusDown, 0.0).await;
    let evaluator = evaluator(storage.clone());

    let t0 = Utc::now();
    for tick in 0..10 {
        evaluator.evaluate_at(t0 + Duration::seconds(18 * tick)).await;
    }
    assert_eq!(storage.list_alerts(None).await.unwrap().len(), 1);

    // still down once the window has passed
    let report = evaluator
        .evaluate_at(t0 + Duration::minutes(5) + Duration::seconds(1))
        .await;
    assert_eq!(report.created, 1);
    assert_eq!(storage.list_alerts(None).await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_threshold_rules_on_persisted_target() {
    let storage = memory_storage();
    let target_id = target_in_state(storage.as_ref(), ProbeStatus::Up, 200, 50.0).await;
    add_monitor_rule(storage.as_ref(), target_id, RuleCondition::LatencyHigh, 200.0).await;
    add_monitor_rule(storage.as_ref(), target_id, RuleCondition::UptimeLow, 50.0).await;
    add_monitor_rule(storage.as_ref(), target_id, RuleCondition::StatusDown, 0.0).await;

    let report = evaluator(storage.clone()).evaluate().await;
    assert_eq!(report.rules, 3);
    assert_eq!(report.created, 2);

    let mut severities: Vec<_> = storage
        .list_alerts(None)
        .await
        .unwrap()
        .into_iter()
        .map(|a| (a.severity, a.current_value))
        .collect();
    severities.sort_by(|a, b| a.1.total_cmp(&b.1));
    assert_eq!(severities, vec![(Severity::Medium, 50.0), (Severity::High, 200.0)]);
}

#[tokio::test]
async fn test_disabled_rules_ignored() {
    let storage = memory_storage();
    let target_id = target_in_state(storage.as_ref(), ProbeStatus::Down, 0, 0.0).await;
    storage
        .insert_alert_rule(NewAlertRule {
            name: "muted".to_string(),
            scope: RuleScope::Monitor,
            target_id,
            condition: RuleCondition::StatusDown,
            threshold: 0.0,
            enabled: false,
        })
        .await
        .unwrap();

    let report = evaluator(storage.clone()).evaluate().await;
    assert_eq!(report.rules, 0);
    assert!(storage.list_alerts(None).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_acknowledged_alert_still_suppresses() {
    let storage = memory_storage();
    let target_id = target_in_state(storage.as_ref(), ProbeStatus::Down, 0, 0.0).await;
    add_monitor_rule(storage.as_ref(), target_id, RuleCondition::StatusDown, 0.0).await;
    let evaluator = evaluator(storage.clone());

    let t0 = Utc::now();
    evaluator.evaluate_at(t0).await;
    let alert = storage.list_alerts(None).await.unwrap().remove(0);
    storage
        .acknowledge_alert(alert.id, "on-call", t0 + Duration::seconds(30))
        .await
        .unwrap();

    let report = evaluator.evaluate_at(t0 + Duration::minutes(1)).await;
    assert_eq!(report.created, 0);
    assert_eq!(report.suppressed, 1);

    let alert = storage.get_alert(alert.id).await.unwrap().unwrap();
    assert_eq!(alert.status, AlertStatus::Acknowledged);
    assert_eq!(alert.acknowledged_by.as_deref(), Some("on-call"));
}

#[tokio::test]
async fn test_resolved_alert_does_not_suppress() {
    let storage = memory_storage();
    let target_id = target_in_state(storage.as_ref(), ProbeStatus::Down, 0, 0.0).await;
    add_monitor_rule(storage.as_ref(), target_id, RuleCondition::StatusDown, 0.0).await;
    let evaluator = evaluator(storage.clone());

    let t0 = Utc::now();
    evaluator.evaluate_at(t0).await;
    let alert = storage.list_alerts(None).await.unwrap().remove(0);
    storage
        .resolve_alert(alert.id, t0 + Duration::seconds(10))
        .await
        .unwrap();

    let report = evaluator.evaluate_at(t0 + Duration::minutes(1)).await;
    assert_eq!(report.created, 1);
    assert_eq!(
        storage.list_alerts(Some(AlertStatus::Active)).await.unwrap().len(),
        1
    );
}

#[tokio::test]
async fn test_cleared_condition_keeps_alert_active() {
    let storage = memory_storage();
    let target_id = target_in_state(storage.as_ref(), ProbeStatus::Down, 0, 0.0).await;
    add_monitor_rule(storage.as_ref(), target_id, RuleCondition::StatusDown, 0.0).await;
    let evaluator = evaluator(storage.clone());

    evaluator.evaluate().await;
    storage
        .update_probe_target_state(
            target_id,
            TargetState {
                status: ProbeStatus::Up,
                last_check: Utc::now(),
                latency_ms: 5,
                uptime: 50.0,
            },
        )
        .await
        .unwrap();
    evaluator.evaluate().await;

    let alerts = storage.list_alerts(None).await.unwrap();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].status, AlertStatus::Active);
}

#[tokio::test]
async fn test_cpu_rule_alerts_on_hot_node() {
    let storage = memory_storage();
    let server_id = add_proxmox_server(storage.as_ref(), "cluster-a").await;
    storage
        .insert_alert_rule(NewAlertRule {
            name: "hot cpu".to_string(),
            scope: RuleScope::Infrastructure,
            target_id: server_id,
            condition: RuleCondition::CpuHigh,
            threshold: 90.0,
            enabled: true,
        })
        .await
        .unwrap();

    let report = evaluator(storage.clone()).evaluate().await;
    assert_eq!(report.created, 1);

    let alert = storage.list_alerts(None).await.unwrap().remove(0);
    assert_eq!(alert.severity, Severity::High);
    assert_eq!(alert.target_name, "pve-1");
    assert_eq!(alert.message, "CPU usage threshold met on pve-1: 97.5% (>= 90)");
}
