//! Concurrency and race condition tests
//!
//! These tests verify:
//! - Overlapping monitor sweeps never double-record a target
//! - Concurrent evaluations of one rule create a single alert
//! - A small concurrency limit still lets every task finish

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use chrono::Utc;
use futures::future::join_all;
use infra_watch::{
    alerts::AlertEvaluator,
    monitors::{MonitorSweep, Prober},
    storage::{ProbeStatus, RuleCondition, StorageBackend, TargetState},
};
use pretty_assertions::assert_eq;
use tokio::sync::Semaphore;
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::helpers::*;

async fn overlapping_sweeps_record_once(storage: Arc<dyn StorageBackend>) {
    let service = MockServer::start().await;
    let requests = Arc::new(AtomicUsize::new(0));
    let counter = requests.clone();
    Mock::given(method("GET"))
        .respond_with(move |_req: &wiremock::Request| {
            counter.fetch_add(1, Ordering::SeqCst);
            ResponseTemplate::new(200).set_delay(Duration::from_millis(300))
        })
        .mount(&service)
        .await;

    let mut ids = Vec::new();
    for i in 0..5 {
        ids.push(add_http_target(storage.as_ref(), &format!("svc-{i}"), service.uri()).await);
    }

    let prober = Prober::new(Duration::from_secs(2), Duration::from_secs(1)).unwrap();
    let sweep = MonitorSweep::new(storage.clone(), prober, Arc::new(Semaphore::new(16)));

    let reports = join_all((0..4).map(|_| {
        let sweep = sweep.clone();
        tokio::spawn(async move { sweep.run().await })
    }))
    .await;

    let completed: Vec<_> = reports
        .into_iter()
        .map(|r| r.unwrap())
        .filter(|r| !r.skipped)
        .collect();
    assert_eq!(completed.len(), 1);
    assert_eq!(completed[0].up, 5);
    assert_eq!(requests.load(Ordering::SeqCst), 5);

    for id in ids {
        assert_eq!(storage.query_latest_probe_results(id, 10).await.unwrap().len(), 1);
        let target = storage.get_probe_target(id).await.unwrap().unwrap();
        assert_eq!(target.status, ProbeStatus::Up);
        assert_eq!(target.uptime, 100.0);
    }
}

#[tokio::test]
async fn test_overlapping_sweeps_in_memory() {
    overlapping_sweeps_record_once(memory_storage()).await;
}

#[cfg(feature = "storage-sqlite")]
#[tokio::test]
async fn test_overlapping_sweeps_in_sqlite() {
    let dir = tempfile::tempdir().unwrap();
    overlapping_sweeps_record_once(sqlite_storage(&dir).await).await;
}

async fn concurrent_evaluations_create_one_alert(storage: Arc<dyn StorageBackend>) {
    let target_id = add_http_target(storage.as_ref(), "db", "http://127.0.0.1:9/".to_string()).await;
    storage
        .update_probe_target_state(
            target_id,
            TargetState {
                status: ProbeStatus::Down,
                last_check: Utc::now(),
                latency_ms: 3,
                uptime: 0.0,
            },
        )
        .await
        .unwrap();
    add_monitor_rule(storage.as_ref(), target_id, RuleCondition::StatusDown, 0.0).await;

    // separate evaluators, as with two overlapping ticks
    let now = Utc::now();
    let tasks = (0..10).map(|_| {
        let evaluator = AlertEvaluator::new(
            storage.clone(),
            Arc::new(StaticCluster(Vec::new())),
            Arc::new(Semaphore::new(4)),
            chrono::Duration::minutes(5),
        );
        tokio::spawn(async move { evaluator.evaluate_at(now).await })
    });

    let created: usize = join_all(tasks)
        .await
        .into_iter()
        .map(|r| r.unwrap().created)
        .sum();

    assert_eq!(created, 1);
    assert_eq!(storage.list_alerts(None).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_concurrent_evaluations_in_memory() {
    concurrent_evaluations_create_one_alert(memory_storage()).await;
}

#[cfg(feature = "storage-sqlite")]
#[tokio::test]
async fn test_concurrent_evaluations_in_sqlite() {
    let dir = tempfile::tempdir().unwrap();
    concurrent_evaluations_create_one_alert(sqlite_storage(&dir).await).await;
}

#[tokio::test]
async fn test_limit_bounds_in_flight_probes() {
    let service = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(50)))
        .mount(&service)
        .await;

    let storage = memory_storage();
    for i in 0..12 {
        add_http_target(storage.as_ref(), &format!("svc-{i}"), service.uri()).await;
    }

    let prober = Prober::new(Duration::from_secs(2), Duration::from_secs(1)).unwrap();
    let limiter = Arc::new(Semaphore::new(2));
    let sweep = MonitorSweep::new(storage.clone(), prober, limiter.clone());

    let started = std::time::Instant::now();
    let report = sweep.run().await;

    assert_eq!(report.up, 12);
    // 12 targets, 2 at a time, 50ms each
    assert!(started.elapsed() >= Duration::from_millis(250));
    assert_eq!(limiter.available_permits(), 2);
}
