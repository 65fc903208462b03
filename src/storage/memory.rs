//! In-memory storage backend (no persistence)
//!
//! Every table lives behind a single `tokio::sync::RwLock`. It's useful for:
//! - Testing without database dependencies
//! - Running the engine with `storage.backend = "none"`
//!
//! ## Limitations
//!
//! - **No persistence**: All data lost on restart
//! - **Unbounded**: Probe results are never compacted

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::debug;

use super::backend::{HealthStatus, StorageBackend};
use super::error::{StorageError, StorageResult};
use super::schema::{
    Alert, AlertInsert, AlertRule, AlertStatus, ManagedServer, NewAlert, NewAlertRule,
    NewManagedServer, NewProbeResult, NewProbeTarget, ProbeResult, ProbeStatus, ProbeTarget,
    ServerKind, ServerStatus, TargetState, UptimeStats,
};

#[derive(Debug, Default)]
struct Tables {
    targets: Vec<ProbeTarget>,
    results: Vec<ProbeResult>,
    rules: Vec<AlertRule>,
    alerts: Vec<Alert>,
    servers: Vec<ManagedServer>,
    next_id: i64,
}

impl Tables {
    fn allocate_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn alert_mut(&mut self, id: i64) -> StorageResult<&mut Alert> {
        self.alerts
            .iter_mut()
            .find(|a| a.id == id)
            .ok_or(StorageError::NotFound { entity: "alert", id })
    }
}

/// In-memory storage backend
#[derive(Debug, Default)]
pub struct MemoryBackend {
    tables: RwLock<Tables>,
}

impl MemoryBackend {
    /// Create a new, empty in-memory backend
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    async fn list_probe_targets(&self) -> StorageResult<Vec<ProbeTarget>> {
        Ok(self.tables.read().await.targets.clone())
    }

    async fn get_probe_target(&self, id: i64) -> StorageResult<Option<ProbeTarget>> {
        let tables = self.tables.read().await;
        Ok(tables.targets.iter().find(|t| t.id == id).cloned())
    }

    async fn insert_probe_target(&self, target: NewProbeTarget) -> StorageResult<i64> {
        let mut tables = self.tables.write().await;
        let id = tables.allocate_id();
        tables.targets.push(ProbeTarget {
            id,
            name: target.name,
            kind: target.kind,
            address: target.address,
            interval_secs: target.interval_secs,
            status: ProbeStatus::Pending,
            last_check: None,
            latency_ms: 0,
            uptime: 100.0,
        });
        Ok(id)
    }

    async fn update_probe_target_state(&self, id: i64, state: TargetState) -> StorageResult<()> {
        let mut tables = self.tables.write().await;
        let target = tables
            .targets
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or(StorageError::NotFound {
                entity: "probe target",
                id,
            })?;

        target.status = state.status;
        target.last_check = Some(state.last_check);
        target.latency_ms = state.latency_ms;
        target.uptime = state.uptime;
        Ok(())
    }

    async fn append_probe_result(&self, result: NewProbeResult) -> StorageResult<i64> {
        let mut tables = self.tables.write().await;
        let id = tables.allocate_id();
        tables.results.push(ProbeResult {
            id,
            target_id: result.target_id,
            status: result.status,
            latency_ms: result.latency_ms,
            message: result.message,
            checked_at: result.checked_at,
        });
        Ok(id)
    }

    async fn calculate_uptime(&self, target_id: i64) -> StorageResult<UptimeStats> {
        let tables = self.tables.read().await;
        let stats = tables
            .results
            .iter()
            .filter(|r| r.target_id == target_id)
            .fold(UptimeStats::default(), |mut stats, r| {
                stats.total += 1;
                if r.status == ProbeStatus::Up {
                    stats.up += 1;
                }
                stats
            });
        Ok(stats)
    }

    async fn query_latest_probe_results(
        &self,
        target_id: i64,
        limit: usize,
    ) -> StorageResult<Vec<ProbeResult>> {
        let tables = self.tables.read().await;
        Ok(tables
            .results
            .iter()
            .rev()
            .filter(|r| r.target_id == target_id)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn list_enabled_alert_rules(&self) -> StorageResult<Vec<AlertRule>> {
        let tables = self.tables.read().await;
        Ok(tables.rules.iter().filter(|r| r.enabled).cloned().collect())
    }

    async fn insert_alert_rule(&self, rule: NewAlertRule) -> StorageResult<i64> {
        let mut tables = self.tables.write().await;
        let id = tables.allocate_id();
        tables.rules.push(AlertRule {
            id,
            name: rule.name,
            scope: rule.scope,
            target_id: rule.target_id,
            condition: rule.condition,
            threshold: rule.threshold,
            enabled: rule.enabled,
        });
        Ok(id)
    }

    async fn create_alert_if_absent(
        &self,
        alert: NewAlert,
        window_start: DateTime<Utc>,
    ) -> StorageResult<AlertInsert> {
        // check and insert under one write guard
        let mut tables = self.tables.write().await;

        let duplicate = tables.alerts.iter().any(|a| {
            a.rule_id == alert.rule_id && a.status.is_open() && a.created_at > window_start
        });
        if duplicate {
            debug!("open alert for rule {} inside window, suppressing", alert.rule_id);
            return Ok(AlertInsert::Suppressed);
        }

        let id = tables.allocate_id();
        tables.alerts.push(Alert {
            id,
            rule_id: alert.rule_id,
            scope: alert.scope,
            severity: alert.severity,
            message: alert.message,
            current_value: alert.current_value,
            target_id: alert.target_id,
            target_name: alert.target_name,
            status: AlertStatus::Active,
            acknowledged_at: None,
            acknowledged_by: None,
            resolved_at: None,
            created_at: alert.created_at,
        });
        Ok(AlertInsert::Created(id))
    }

    async fn query_recent_alerts(
        &self,
        rule_id: i64,
        since: DateTime<Utc>,
    ) -> StorageResult<Vec<Alert>> {
        let tables = self.tables.read().await;
        let mut alerts: Vec<Alert> = tables
            .alerts
            .iter()
            .filter(|a| a.rule_id == rule_id && a.status.is_open() && a.created_at > since)
            .cloned()
            .collect();
        alerts.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(alerts)
    }

    async fn list_alerts(&self, status: Option<AlertStatus>) -> StorageResult<Vec<Alert>> {
        let tables = self.tables.read().await;
        let mut alerts: Vec<Alert> = tables
            .alerts
            .iter()
            .filter(|a| status.is_none_or(|s| a.status == s))
            .cloned()
            .collect();
        alerts.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(alerts)
    }

    async fn get_alert(&self, id: i64) -> StorageResult<Option<Alert>> {
        let tables = self.tables.read().await;
        Ok(tables.alerts.iter().find(|a| a.id == id).cloned())
    }

    async fn acknowledge_alert(&self, id: i64, by: &str, at: DateTime<Utc>) -> StorageResult<()> {
        let mut tables = self.tables.write().await;
        let alert = tables.alert_mut(id)?;
        if alert.status != AlertStatus::Active {
            return Err(StorageError::InvalidTransition {
                id,
                from: alert.status.to_string(),
                to: "acknowledged",
            });
        }

        alert.status = AlertStatus::Acknowledged;
        alert.acknowledged_at = Some(at);
        alert.acknowledged_by = Some(by.to_string());
        Ok(())
    }

    async fn resolve_alert(&self, id: i64, at: DateTime<Utc>) -> StorageResult<()> {
        let mut tables = self.tables.write().await;
        let alert = tables.alert_mut(id)?;
        if !alert.status.is_open() {
            return Err(StorageError::InvalidTransition {
                id,
                from: alert.status.to_string(),
                to: "resolved",
            });
        }

        alert.status = AlertStatus::Resolved;
        alert.resolved_at = Some(at);
        Ok(())
    }

    async fn list_managed_servers(&self, kind: ServerKind) -> StorageResult<Vec<ManagedServer>> {
        let tables = self.tables.read().await;
        Ok(tables
            .servers
            .iter()
            .filter(|s| s.kind == kind)
            .cloned()
            .collect())
    }

    async fn insert_managed_server(&self, server: NewManagedServer) -> StorageResult<i64> {
        let mut tables = self.tables.write().await;
        let id = tables.allocate_id();
        tables.servers.push(ManagedServer {
            id,
            name: server.name,
            kind: server.kind,
            address: server.address,
            port: server.port,
            username: server.username,
            password: server.password,
            realm: server.realm,
            verify_tls: server.verify_tls,
            status: ServerStatus::Unknown,
            last_sync: None,
        });
        Ok(id)
    }

    async fn update_server_status(
        &self,
        id: i64,
        status: ServerStatus,
        last_sync: DateTime<Utc>,
    ) -> StorageResult<()> {
        let mut tables = self.tables.write().await;
        let server = tables
            .servers
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or(StorageError::NotFound {
                entity: "managed server",
                id,
            })?;

        server.status = status;
        server.last_sync = Some(last_sync);
        Ok(())
    }

    async fn health_check(&self) -> StorageResult<HealthStatus> {
        let tables = self.tables.read().await;
        Ok(HealthStatus {
            healthy: true,
            message: "In-memory storage operational".to_string(),
            metadata: HashMap::from([
                ("backend".to_string(), "memory".to_string()),
                ("probe_results".to_string(), tables.results.len().to_string()),
                ("alerts".to_string(), tables.alerts.len().to_string()),
            ]),
        })
    }

    async fn close(&self) -> StorageResult<()> {
        debug!("closing in-memory backend (no-op)");
        Ok(())
    }
}
