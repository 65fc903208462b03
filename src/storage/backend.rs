//! Storage backend trait definition
//!
//! This module defines the `StorageBackend` trait that every persistence
//! gateway implements. The engine only talks to storage through this trait.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::error::StorageResult;
use super::schema::{
    Alert, AlertInsert, AlertRule, AlertStatus, ManagedServer, NewAlert, NewAlertRule,
    NewManagedServer, NewProbeResult, NewProbeTarget, ProbeResult, ProbeTarget, ServerKind,
    ServerStatus, TargetState, UptimeStats,
};

/// Health status of the storage backend
#[derive(Debug, Clone)]
pub struct HealthStatus {
    /// Is the backend operational?
    pub healthy: bool,

    /// Human-readable status message
    pub message: String,

    /// Additional backend-specific metadata
    pub metadata: HashMap<String, String>,
}

/// Trait for persistence gateways
///
/// ## Thread Safety
///
/// Implementations must be `Send + Sync`: one instance is shared as
/// `Arc<dyn StorageBackend>` between every probe task and rule evaluation.
///
/// ## Concurrency contract
///
/// - `update_probe_target_state` writes all cached fields at once, so a
///   reader never sees a half-updated target.
/// - `create_alert_if_absent` performs the duplicate check and the insert as
///   one indivisible operation. Two concurrent callers for the same rule and
///   window produce at most one alert.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    // ========================================================================
    // Probe targets
    // ========================================================================

    /// All configured probe targets, ordered by id
    async fn list_probe_targets(&self) -> StorageResult<Vec<ProbeTarget>>;

    /// A single probe target, `None` if it does not exist
    async fn get_probe_target(&self, id: i64) -> StorageResult<Option<ProbeTarget>>;

    /// Create a target in PENDING state (external CRUD surface)
    async fn insert_probe_target(&self, target: NewProbeTarget) -> StorageResult<i64>;

    /// Overwrite the cached health fields of a target
    async fn update_probe_target_state(&self, id: i64, state: TargetState) -> StorageResult<()>;

    // ========================================================================
    // Probe results
    // ========================================================================

    /// Append one probe result and return its id
    async fn append_probe_result(&self, result: NewProbeResult) -> StorageResult<i64>;

    /// Count total and UP results over the full history of a target
    ///
    /// ## Calculation
    ///
    /// Uptime % = (successful checks / total checks) × 100
    /// Where successful = status == ProbeStatus::Up
    async fn calculate_uptime(&self, target_id: i64) -> StorageResult<UptimeStats>;

    /// The N most recent results of a target, newest first
    async fn query_latest_probe_results(
        &self,
        target_id: i64,
        limit: usize,
    ) -> StorageResult<Vec<ProbeResult>>;

    // ========================================================================
    // Alert rules and alerts
    // ========================================================================

    /// Every rule with `enabled = true`, ordered by id
    async fn list_enabled_alert_rules(&self) -> StorageResult<Vec<AlertRule>>;

    /// Create a rule (external CRUD surface)
    async fn insert_alert_rule(&self, rule: NewAlertRule) -> StorageResult<i64>;

    /// Insert `alert` unless an open alert of the same rule was created after
    /// `window_start`
    async fn create_alert_if_absent(
        &self,
        alert: NewAlert,
        window_start: DateTime<Utc>,
    ) -> StorageResult<AlertInsert>;

    /// Open (active or acknowledged) alerts of a rule created after `since`,
    /// newest first
    async fn query_recent_alerts(
        &self,
        rule_id: i64,
        since: DateTime<Utc>,
    ) -> StorageResult<Vec<Alert>>;

    /// Alerts, optionally filtered by status, newest first
    async fn list_alerts(&self, status: Option<AlertStatus>) -> StorageResult<Vec<Alert>>;

    async fn get_alert(&self, id: i64) -> StorageResult<Option<Alert>>;

    /// Move an ACTIVE alert to ACKNOWLEDGED
    async fn acknowledge_alert(&self, id: i64, by: &str, at: DateTime<Utc>) -> StorageResult<()>;

    /// Move an ACTIVE or ACKNOWLEDGED alert to RESOLVED
    async fn resolve_alert(&self, id: i64, at: DateTime<Utc>) -> StorageResult<()>;

    // ========================================================================
    // Managed servers
    // ========================================================================

    /// Managed servers of the given kind, ordered by id
    async fn list_managed_servers(&self, kind: ServerKind) -> StorageResult<Vec<ManagedServer>>;

    /// Register a server with UNKNOWN status (external CRUD surface)
    async fn insert_managed_server(&self, server: NewManagedServer) -> StorageResult<i64>;

    /// Record the outcome of an infrastructure sweep for one server
    async fn update_server_status(
        &self,
        id: i64,
        status: ServerStatus,
        last_sync: DateTime<Utc>,
    ) -> StorageResult<()>;

    // ========================================================================
    // Maintenance
    // ========================================================================

    /// Check backend health
    ///
    /// Performs a lightweight operation to verify the backend
    /// is operational (e.g., ping database, check file access).
    async fn health_check(&self) -> StorageResult<HealthStatus>;

    /// Close the backend and release resources
    async fn close(&self) -> StorageResult<()>;
}
