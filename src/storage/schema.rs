//! Row definitions for everything the engine reads and writes
//!
//! ## Ownership
//!
//! - **Probe targets, alert rules, managed servers** are created by the
//!   external CRUD layer. The engine only updates the cached health fields of
//!   targets and the status of servers.
//! - **Probe results** are append-only, one row per probe execution.
//! - **Alerts** are created only by the alert evaluator and later moved
//!   through their lifecycle by an external actor.
//!
//! All enum columns are stored as lowercase strings. The [`Display`] and
//! [`FromStr`] impls below are the single source of truth for those names.
//!
//! [`Display`]: std::fmt::Display
//! [`FromStr`]: std::str::FromStr

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::error::StorageError;
use crate::proxmox::RemoteConnection;

/// Implements `Display` and `FromStr` for a fieldless enum using its column names.
macro_rules! column_enum {
    ($ty:ident { $($variant:ident => $name:literal),+ $(,)? }) => {
        impl std::fmt::Display for $ty {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                match self {
                    $($ty::$variant => f.write_str($name),)+
                }
            }
        }

        impl std::str::FromStr for $ty {
            type Err = StorageError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($name => Ok($ty::$variant),)+
                    other => Err(StorageError::InvalidValue(format!(
                        "unknown {} '{}'",
                        stringify!($ty),
                        other
                    ))),
                }
            }
        }
    };
}

// ============================================================================
// Probe targets and results
// ============================================================================

/// How a probe target is checked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProbeKind {
    /// HTTP GET, healthy on any 2xx status
    #[serde(rename = "http")]
    Http,

    /// Single ICMP echo via the system `ping` binary
    #[serde(rename = "ping", alias = "reachability")]
    Reachability,
}

column_enum!(ProbeKind { Http => "http", Reachability => "ping" });

/// Observed health of a probe target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbeStatus {
    Up,
    Down,
    /// Never checked yet
    Pending,
}

column_enum!(ProbeStatus { Up => "up", Down => "down", Pending => "pending" });

/// A monitored endpoint together with its cached health state
///
/// `status`, `last_check`, `latency_ms` and `uptime` are a cache over the
/// probe result history and are only ever written by the monitor sweep.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeTarget {
    pub id: i64,
    pub name: String,
    pub kind: ProbeKind,

    /// URL for HTTP targets, host or IP for reachability targets
    pub address: String,

    /// Informational only; every target is polled on the global sweep period
    pub interval_secs: u32,

    pub status: ProbeStatus,
    pub last_check: Option<DateTime<Utc>>,
    pub latency_ms: i64,

    /// Percentage of UP results over the full history (0-100)
    pub uptime: f64,
}

/// Fields supplied by the CRUD layer when creating a target
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewProbeTarget {
    pub name: String,
    pub kind: ProbeKind,
    pub address: String,
    #[serde(default = "default_target_interval")]
    pub interval_secs: u32,
}

fn default_target_interval() -> u32 {
    60
}

/// Cached health fields written back after every check
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TargetState {
    pub status: ProbeStatus,
    pub last_check: DateTime<Utc>,
    pub latency_ms: i64,
    pub uptime: f64,
}

/// One stored probe execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeResult {
    pub id: i64,
    pub target_id: i64,
    pub status: ProbeStatus,
    pub latency_ms: i64,
    pub message: String,
    pub checked_at: DateTime<Utc>,
}

/// A probe execution about to be appended
#[derive(Debug, Clone, PartialEq)]
pub struct NewProbeResult {
    pub target_id: i64,
    pub status: ProbeStatus,
    pub latency_ms: i64,
    pub message: String,
    pub checked_at: DateTime<Utc>,
}

/// Aggregated result counts for one target
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UptimeStats {
    /// Total number of recorded results
    pub total: u64,

    /// Number of results with status UP
    pub up: u64,
}

impl UptimeStats {
    /// Uptime % = (UP results / all results) × 100
    ///
    /// `None` when there is no history to compute a ratio over.
    pub fn percentage(&self) -> Option<f64> {
        if self.total == 0 {
            return None;
        }
        Some(self.up as f64 / self.total as f64 * 100.0)
    }
}

// ============================================================================
// Alert rules and alerts
// ============================================================================

/// Which state an alert rule reads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleScope {
    /// Cached state of a probe target
    Monitor,

    /// Live node snapshot of a managed virtualization cluster
    Infrastructure,
}

column_enum!(RuleScope { Monitor => "monitor", Infrastructure => "infrastructure" });

/// Comparison a rule applies to the resolved metric
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleCondition {
    StatusDown,
    CpuHigh,
    MemoryHigh,
    LatencyHigh,
    UptimeLow,
}

column_enum!(RuleCondition {
    StatusDown => "status_down",
    CpuHigh => "cpu_high",
    MemoryHigh => "memory_high",
    LatencyHigh => "latency_high",
    UptimeLow => "uptime_low",
});

/// A user-defined alert rule (read-only to the engine)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRule {
    pub id: i64,
    pub name: String,
    pub scope: RuleScope,

    /// Probe target id for monitor rules, managed server id for infrastructure rules
    pub target_id: i64,

    pub condition: RuleCondition,

    /// Units depend on the condition (ms, %, unused for status_down)
    pub threshold: f64,

    pub enabled: bool,
}

/// Fields supplied by the CRUD layer when creating a rule
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewAlertRule {
    pub name: String,
    pub scope: RuleScope,
    pub target_id: i64,
    pub condition: RuleCondition,
    pub threshold: f64,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
    Info,
}

column_enum!(Severity {
    Critical => "critical",
    High => "high",
    Medium => "medium",
    Low => "low",
    Info => "info",
});

/// Alert lifecycle: `Active → Acknowledged → Resolved` or `Active → Resolved`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertStatus {
    Active,
    Acknowledged,
    Resolved,
}

column_enum!(AlertStatus {
    Active => "active",
    Acknowledged => "acknowledged",
    Resolved => "resolved",
});

impl AlertStatus {
    /// Open alerts take part in deduplication
    pub fn is_open(&self) -> bool {
        matches!(self, AlertStatus::Active | AlertStatus::Acknowledged)
    }
}

/// A stored alert
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: i64,
    pub rule_id: i64,
    pub scope: RuleScope,
    pub severity: Severity,
    pub message: String,
    pub current_value: f64,
    pub target_id: i64,
    pub target_name: String,
    pub status: AlertStatus,
    pub acknowledged_at: Option<DateTime<Utc>>,
    pub acknowledged_by: Option<String>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// An alert produced by the evaluator, always created ACTIVE
#[derive(Debug, Clone, PartialEq)]
pub struct NewAlert {
    pub rule_id: i64,
    pub scope: RuleScope,
    pub severity: Severity,
    pub message: String,
    pub current_value: f64,
    pub target_id: i64,
    pub target_name: String,
    pub created_at: DateTime<Utc>,
}

/// Outcome of an atomic create-if-absent alert insert
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertInsert {
    /// A new alert row was created with this id
    Created(i64),

    /// An open alert for the same rule already exists inside the window
    Suppressed,
}

// ============================================================================
// Managed servers
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerKind {
    Proxmox,
    Generic,
}

column_enum!(ServerKind { Proxmox => "proxmox", Generic => "generic" });

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerStatus {
    Active,
    Inactive,
    Unknown,
}

column_enum!(ServerStatus {
    Active => "active",
    Inactive => "inactive",
    Unknown => "unknown",
});

/// A managed virtualization server and its connection parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManagedServer {
    pub id: i64,
    pub name: String,
    pub kind: ServerKind,
    pub address: String,
    pub port: u16,
    pub username: String,
    #[serde(skip_serializing, default)]
    pub password: String,
    pub realm: String,
    pub verify_tls: bool,
    pub status: ServerStatus,
    pub last_sync: Option<DateTime<Utc>>,
}

impl ManagedServer {
    /// Connection parameters for the remote infrastructure client
    pub fn connection(&self) -> RemoteConnection {
        RemoteConnection {
            base_url: format!("https://{}:{}", self.address, self.port),
            username: self.username.clone(),
            password: self.password.clone(),
            realm: self.realm.clone(),
            verify_tls: self.verify_tls,
        }
    }
}

/// Fields supplied by the CRUD layer when registering a server
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewManagedServer {
    pub name: String,
    pub kind: ServerKind,
    pub address: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub realm: String,
    #[serde(default)]
    pub verify_tls: bool,
}
