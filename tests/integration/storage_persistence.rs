//! Integration tests for storage persistence
//!
//! These tests verify that:
//! - Sweep output survives closing and reopening the database
//! - The dedup window still applies across a restart

use std::sync::Arc;

use chrono::Utc;
use infra_watch::{
    alerts::AlertEvaluator,
    engine::Engine,
    storage::{AlertInsert, NewAlert, ProbeStatus, RuleCondition, RuleScope, Severity, StorageBackend},
    storage::sqlite::SqliteBackend,
};
use pretty_assertions::assert_eq;
use tempfile::tempdir;
use tokio::sync::Semaphore;
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::helpers::*;

#[tokio::test]
async fn test_sweep_results_survive_restart() {
    let service = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&service)
        .await;

    let temp_dir = tempdir().unwrap();
    let db_path = temp_dir.path().join("engine.db");

    let target_id = {
        let backend: Arc<dyn StorageBackend> = Arc::new(SqliteBackend::new(&db_path).await.unwrap());
        let target_id = add_http_target(backend.as_ref(), "web", service.uri()).await;

        let engine = Engine::new(
            test_engine_config(),
            backend.clone(),
            Arc::new(StaticCluster(Vec::new())),
        )
        .unwrap();
        engine.sweep_now().await;
        engine.sweep_now().await;

        backend.close().await.unwrap();
        target_id
    };

    let reopened = SqliteBackend::new(&db_path).await.unwrap();
    let target = reopened.get_probe_target(target_id).await.unwrap().unwrap();
    assert_eq!(target.status, ProbeStatus::Up);
    assert_eq!(target.uptime, 100.0);
    assert!(target.last_check.is_some());

    let results = reopened.query_latest_probe_results(target_id, 10).await.unwrap();
    assert_eq!(results.len(), 2);
    assert!(results[0].checked_at >= results[1].checked_at);
    assert_eq!(results[0].message, "OK: 200");
}

#[tokio::test]
async fn test_dedup_window_spans_restart() {
    let temp_dir = tempdir().unwrap();
    let db_path = temp_dir.path().join("engine.db");
    let now = Utc::now();

    let rule_id = {
        let backend = SqliteBackend::new(&db_path).await.unwrap();
        let target_id = add_http_target(&backend, "web", "http://127.0.0.1:9/".to_string()).await;
        let rule_id = add_monitor_rule(&backend, target_id, RuleCondition::StatusDown, 0.0).await;

        let inserted = backend
            .create_alert_if_absent(
                NewAlert {
                    rule_id,
                    scope: RuleScope::Monitor,
                    severity: Severity::Critical,
                    message: "Monitor web is down".to_string(),
                    current_value: 0.0,
                    target_id,
                    target_name: "web".to_string(),
                    created_at: now - chrono::Duration::minutes(1),
                },
                now - chrono::Duration::minutes(6),
            )
            .await
            .unwrap();
        assert!(matches!(inserted, AlertInsert::Created(_)));
        backend.close().await.unwrap();
        rule_id
    };

    let backend: Arc<dyn StorageBackend> = Arc::new(SqliteBackend::new(&db_path).await.unwrap());

    // the sweep marks the target down, the evaluation must not add a second alert
    let engine = Engine::new(
        test_engine_config(),
        backend.clone(),
        Arc::new(StaticCluster(Vec::new())),
    )
    .unwrap();
    engine.sweep_now().await;

    let evaluator = AlertEvaluator::new(
        backend.clone(),
        Arc::new(StaticCluster(Vec::new())),
        Arc::new(Semaphore::new(4)),
        chrono::Duration::minutes(5),
    );
    let report = evaluator.evaluate_at(now).await;
    assert_eq!(report.suppressed, 1);

    let open = backend
        .query_recent_alerts(rule_id, now - chrono::Duration::minutes(5))
        .await
        .unwrap();
    assert_eq!(open.len(), 1);
}
