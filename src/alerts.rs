//! Alert rule evaluation
//!
//! Every enabled rule is evaluated in its own task:
//!
//! ```text
//! rule ─┬─ monitor scope ──────── read ProbeTarget ─────┐
//!       └─ infrastructure scope ─ fetch node snapshots ─┴→ Trigger → create_alert_if_absent
//! ```
//!
//! Condition checks are plain functions ([`evaluate_monitor`], [`evaluate_node`]).
//! Deduplication is left to the storage backend, which checks the window and
//! inserts atomically.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::Serialize;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, instrument, warn};

use crate::proxmox::{InfrastructureClient, NodeSnapshot};
use crate::storage::StorageBackend;
use crate::storage::schema::{
    AlertInsert, AlertRule, NewAlert, ProbeStatus, ProbeTarget, RuleCondition, RuleScope,
    ServerKind, Severity,
};

/// A rule whose condition holds
#[derive(Debug, Clone, PartialEq)]
pub struct Trigger {
    pub severity: Severity,
    pub message: String,
    pub current_value: f64,
}

/// Whether `condition` can ever hold for rules of `scope`
pub fn condition_applies(scope: RuleScope, condition: RuleCondition) -> bool {
    use RuleCondition::*;

    match scope {
        RuleScope::Monitor => matches!(condition, StatusDown | LatencyHigh | UptimeLow),
        RuleScope::Infrastructure => matches!(condition, CpuHigh | MemoryHigh),
    }
}

/// Check a monitor-scoped rule against the target's cached state
pub fn evaluate_monitor(rule: &AlertRule, target: &ProbeTarget) -> Option<Trigger> {
    match rule.condition {
        RuleCondition::StatusDown => (target.status == ProbeStatus::Down).then(|| Trigger {
            severity: Severity::Critical,
            message: format!("Monitor {} is down", target.name),
            current_value: 0.0,
        }),
        RuleCondition::LatencyHigh => {
            let latency = target.latency_ms as f64;
            (latency >= rule.threshold).then(|| Trigger {
                severity: Severity::High,
                message: format!(
                    "Latency threshold met: {}ms (>= {})",
                    target.latency_ms, rule.threshold
                ),
                current_value: latency,
            })
        }
        RuleCondition::UptimeLow => (target.uptime <= rule.threshold).then(|| Trigger {
            severity: Severity::Medium,
            message: format!(
                "Uptime threshold met: {:.1}% (<= {})",
                target.uptime, rule.threshold
            ),
            current_value: target.uptime,
        }),
        RuleCondition::CpuHigh | RuleCondition::MemoryHigh => None,
    }
}

/// Check an infrastructure-scoped rule against one node; offline nodes never trigger
pub fn evaluate_node(rule: &AlertRule, node: &NodeSnapshot) -> Option<Trigger> {
    if !node.online {
        return None;
    }

    match rule.condition {
        RuleCondition::CpuHigh => (node.cpu_percent >= rule.threshold).then(|| Trigger {
            severity: Severity::High,
            message: format!(
                "CPU usage threshold met on {}: {:.1}% (>= {})",
                node.name, node.cpu_percent, rule.threshold
            ),
            current_value: node.cpu_percent,
        }),
        RuleCondition::MemoryHigh => {
            let memory = node.memory_percent()?;
            (memory >= rule.threshold).then(|| Trigger {
                severity: Severity::High,
                message: format!(
                    "Memory usage threshold met on {}: {:.1}% (>= {})",
                    node.name, memory, rule.threshold
                ),
                current_value: memory,
            })
        }
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EvaluationReport {
    pub rules: usize,
    pub created: usize,
    pub suppressed: usize,
    /// Rules that could not be fully evaluated this tick
    pub failed: usize,
}

#[derive(Debug, Default)]
struct RuleOutcome {
    created: usize,
    suppressed: usize,
    failed: bool,
}

#[derive(Clone)]
pub struct AlertEvaluator {
    storage: Arc<dyn StorageBackend>,
    client: Arc<dyn InfrastructureClient>,
    limiter: Arc<Semaphore>,
    dedup_window: chrono::Duration,
}

impl AlertEvaluator {
    pub fn new(
        storage: Arc<dyn StorageBackend>,
        client: Arc<dyn InfrastructureClient>,
        limiter: Arc<Semaphore>,
        dedup_window: chrono::Duration,
    ) -> Self {
        Self {
            storage,
            client,
            limiter,
            dedup_window,
        }
    }

    pub async fn evaluate(&self) -> EvaluationReport {
        self.evaluate_at(Utc::now()).await
    }

    /// Evaluate every enabled rule as of `now`
    #[instrument(skip(self))]
    pub async fn evaluate_at(&self, now: DateTime<Utc>) -> EvaluationReport {
        let rules = match self.storage.list_enabled_alert_rules().await {
            Ok(rules) => rules,
            Err(e) => {
                error!("failed to list alert rules: {e}");
                return EvaluationReport::default();
            }
        };

        let mut report = EvaluationReport {
            rules: rules.len(),
            ..EvaluationReport::default()
        };

        let evaluations = rules.into_iter().map(|rule| {
            let evaluator = self.clone();
            tokio::spawn(async move { evaluator.evaluate_rule(rule, now).await })
        });

        for joined in join_all(evaluations).await {
            match joined {
                Ok(outcome) => {
                    report.created += outcome.created;
                    report.suppressed += outcome.suppressed;
                    report.failed += usize::from(outcome.failed);
                }
                Err(e) => {
                    error!("rule evaluation panicked: {e}");
                    report.failed += 1;
                }
            }
        }

        info!(
            "evaluated {} rules: {} created, {} suppressed, {} failed",
            report.rules, report.created, report.suppressed, report.failed
        );
        report
    }

    async fn evaluate_rule(&self, rule: AlertRule, now: DateTime<Utc>) -> RuleOutcome {
        if !condition_applies(rule.scope, rule.condition) {
            debug!("rule {}: {} does not apply to {} scope", rule.id, rule.condition, rule.scope);
            return RuleOutcome::default();
        }

        let Ok(_permit) = self.limiter.acquire().await else {
            return RuleOutcome {
                failed: true,
                ..RuleOutcome::default()
            };
        };

        let triggers = match rule.scope {
            RuleScope::Monitor => self.monitor_triggers(&rule).await,
            RuleScope::Infrastructure => self.infrastructure_triggers(&rule).await,
        };
        let Some(triggers) = triggers else {
            return RuleOutcome {
                failed: true,
                ..RuleOutcome::default()
            };
        };

        let mut outcome = RuleOutcome::default();
        for (trigger, target_name) in triggers {
            let alert = NewAlert {
                rule_id: rule.id,
                scope: rule.scope,
                severity: trigger.severity,
                message: trigger.message,
                current_value: trigger.current_value,
                target_id: rule.target_id,
                target_name,
                created_at: now,
            };

            match self
                .storage
                .create_alert_if_absent(alert, now - self.dedup_window)
                .await
            {
                Ok(AlertInsert::Created(id)) => {
                    info!("rule {} ({}): created alert {id}", rule.id, rule.name);
                    outcome.created += 1;
                }
                Ok(AlertInsert::Suppressed) => {
                    debug!("rule {}: open alert inside dedup window", rule.id);
                    outcome.suppressed += 1;
                }
                Err(e) => {
                    error!("rule {}: failed to create alert: {e}", rule.id);
                    outcome.failed = true;
                }
            }
        }
        outcome
    }

    /// `None` when the rule could not be evaluated
    async fn monitor_triggers(&self, rule: &AlertRule) -> Option<Vec<(Trigger, String)>> {
        let target = match self.storage.get_probe_target(rule.target_id).await {
            Ok(Some(target)) => target,
            Ok(None) => {
                warn!("rule {}: probe target {} does not exist", rule.id, rule.target_id);
                return None;
            }
            Err(e) => {
                error!("rule {}: failed to read probe target: {e}", rule.id);
                return None;
            }
        };

        Some(
            evaluate_monitor(rule, &target)
                .map(|trigger| (trigger, target.name))
                .into_iter()
                .collect(),
        )
    }

    async fn infrastructure_triggers(&self, rule: &AlertRule) -> Option<Vec<(Trigger, String)>> {
        let servers = match self.storage.list_managed_servers(ServerKind::Proxmox).await {
            Ok(servers) => servers,
            Err(e) => {
                error!("rule {}: failed to list managed servers: {e}", rule.id);
                return None;
            }
        };

        let Some(server) = servers.into_iter().find(|s| s.id == rule.target_id) else {
            warn!("rule {}: managed server {} does not exist", rule.id, rule.target_id);
            return None;
        };

        let nodes = match self.client.fetch_nodes(&server.connection()).await {
            Ok(nodes) => nodes,
            Err(e) => {
                warn!("rule {}: skipping server {}: {e}", rule.id, server.name);
                return None;
            }
        };

        Some(
            nodes
                .iter()
                .filter_map(|node| evaluate_node(rule, node).map(|t| (t, node.name.clone())))
                .collect(),
        )
    }
}
