//! Test helpers shared by the integration tests
#![allow(dead_code)]

use std::sync::Arc;

use async_trait::async_trait;
use infra_watch::{
    config::EngineConfig,
    proxmox::{InfrastructureClient, NodeSnapshot, RemoteConnection, RemoteError},
    storage::{
        MemoryBackend, NewAlertRule, NewManagedServer, NewProbeTarget, ProbeKind, RuleCondition,
        RuleScope, ServerKind, StorageBackend,
    },
};

/// Engine settings with short timeouts, and periods long enough that only
/// the initial pass fires during a test
pub fn test_engine_config() -> EngineConfig {
    EngineConfig {
        sweep_period_secs: 3600,
        evaluation_period_secs: 3600,
        http_timeout_secs: 2,
        reachability_timeout_secs: 1,
        max_concurrency: 16,
        remote_timeout_secs: 2,
        ..EngineConfig::default()
    }
}

pub fn memory_storage() -> Arc<dyn StorageBackend> {
    Arc::new(MemoryBackend::new())
}

#[cfg(feature = "storage-sqlite")]
pub async fn sqlite_storage(dir: &tempfile::TempDir) -> Arc<dyn StorageBackend> {
    let backend = infra_watch::storage::sqlite::SqliteBackend::new(dir.path().join("engine.db"))
        .await
        .unwrap();
    Arc::new(backend)
}

pub async fn add_http_target(storage: &dyn StorageBackend, name: &str, url: String) -> i64 {
    storage
        .insert_probe_target(NewProbeTarget {
            name: name.to_string(),
            kind: ProbeKind::Http,
            address: url,
            interval_secs: 60,
        })
        .await
        .unwrap()
}

pub async fn add_monitor_rule(
    storage: &dyn StorageBackend,
    target_id: i64,
    condition: RuleCondition,
    threshold: f64,
) -> i64 {
    storage
        .insert_alert_rule(NewAlertRule {
            name: format!("{condition} on {target_id}"),
            scope: RuleScope::Monitor,
            target_id,
            condition,
            threshold,
            enabled: true,
        })
        .await
        .unwrap()
}

pub async fn add_proxmox_server(storage: &dyn StorageBackend, name: &str) -> i64 {
    storage
        .insert_managed_server(NewManagedServer {
            name: name.to_string(),
            kind: ServerKind::Proxmox,
            address: "10.0.0.10".to_string(),
            port: 8006,
            username: "root".to_string(),
            password: "secret".to_string(),
            realm: "pam".to_string(),
            verify_tls: false,
        })
        .await
        .unwrap()
}

pub fn node(name: &str, cpu_percent: f64) -> NodeSnapshot {
    NodeSnapshot {
        name: name.to_string(),
        online: true,
        cpu_percent,
        memory_used: 4 << 30,
        memory_total: 16 << 30,
        uptime_secs: 86_400,
    }
}

/// Remote client returning a fixed node list for every server
pub struct StaticCluster(pub Vec<NodeSnapshot>);

#[async_trait]
impl InfrastructureClient for StaticCluster {
    async fn fetch_nodes(&self, _conn: &RemoteConnection) -> Result<Vec<NodeSnapshot>, RemoteError> {
        Ok(self.0.clone())
    }
}

/// Remote client that always fails to authenticate
pub struct RejectingCluster;

#[async_trait]
impl InfrastructureClient for RejectingCluster {
    async fn fetch_nodes(&self, _conn: &RemoteConnection) -> Result<Vec<NodeSnapshot>, RemoteError> {
        Err(RemoteError::Authentication {
            status: 401,
            body: "authentication failure".to_string(),
        })
    }
}
