//! Monitor sweep: probe every target once and refresh its cached state
//!
//! ```text
//! list targets → [probe → append result → recompute uptime → update target] × N → SweepReport
//! ```
//!
//! One task per target, bounded by the shared semaphore. A failure on one
//! target is logged and counted, it never aborts the sweep.

use std::sync::Arc;

use chrono::Utc;
use futures::future::join_all;
use serde::Serialize;
use tokio::sync::{Mutex, Semaphore};
use tracing::{debug, error, info, instrument, warn};

use crate::storage::StorageBackend;
use crate::storage::schema::{NewProbeResult, ProbeStatus, ProbeTarget, TargetState};

use super::prober::Prober;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub targets: usize,
    pub up: usize,
    pub down: usize,
    /// Targets whose result or state could not be persisted
    pub failed: usize,
    /// Another sweep was still running, nothing was probed
    pub skipped: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TargetOutcome {
    Up,
    Down,
    Failed,
}

#[derive(Clone)]
pub struct MonitorSweep {
    storage: Arc<dyn StorageBackend>,
    prober: Arc<Prober>,
    limiter: Arc<Semaphore>,
    in_flight: Arc<Mutex<()>>,
}

impl MonitorSweep {
    pub fn new(storage: Arc<dyn StorageBackend>, prober: Prober, limiter: Arc<Semaphore>) -> Self {
        Self {
            storage,
            prober: Arc::new(prober),
            limiter,
            in_flight: Arc::new(Mutex::new(())),
        }
    }

    /// Probe every target and wait for all of them
    ///
    /// Returns immediately with `skipped = true` if a previous sweep (from
    /// this instance or a clone of it) has not finished yet.
    #[instrument(skip(self))]
    pub async fn run(&self) -> SweepReport {
        let Ok(_guard) = self.in_flight.try_lock() else {
            warn!("previous monitor sweep still running, skipping");
            return SweepReport {
                skipped: true,
                ..SweepReport::default()
            };
        };

        let targets = match self.storage.list_probe_targets().await {
            Ok(targets) => targets,
            Err(e) => {
                error!("failed to list probe targets: {e}");
                return SweepReport::default();
            }
        };

        let mut report = SweepReport {
            targets: targets.len(),
            ..SweepReport::default()
        };

        let checks = targets.into_iter().map(|target| {
            let sweep = self.clone();
            tokio::spawn(async move { sweep.check_target(target).await })
        });

        for joined in join_all(checks).await {
            match joined {
                Ok(TargetOutcome::Up) => report.up += 1,
                Ok(TargetOutcome::Down) => report.down += 1,
                Ok(TargetOutcome::Failed) => report.failed += 1,
                Err(e) => {
                    error!("probe task panicked: {e}");
                    report.failed += 1;
                }
            }
        }

        info!(
            "monitor sweep done: {} targets, {} up, {} down, {} failed",
            report.targets, report.up, report.down, report.failed
        );
        report
    }

    async fn check_target(&self, target: ProbeTarget) -> TargetOutcome {
        let Ok(_permit) = self.limiter.acquire().await else {
            return TargetOutcome::Failed;
        };

        let outcome = self.prober.probe(&target).await;
        let checked_at = Utc::now();
        debug!(
            "{}: {} in {}ms ({})",
            target.name, outcome.status, outcome.latency_ms, outcome.message
        );

        let appended = self
            .storage
            .append_probe_result(NewProbeResult {
                target_id: target.id,
                status: outcome.status,
                latency_ms: outcome.latency_ms,
                message: outcome.message,
                checked_at,
            })
            .await;
        if let Err(e) = appended {
            error!("{}: failed to record probe result: {e}", target.name);
            return TargetOutcome::Failed;
        }

        let fallback = if outcome.status == ProbeStatus::Up { 100.0 } else { 0.0 };
        let uptime = match self.storage.calculate_uptime(target.id).await {
            Ok(stats) => stats.percentage().unwrap_or(fallback),
            Err(e) => {
                warn!("{}: uptime query failed, using {fallback}: {e}", target.name);
                fallback
            }
        };

        let state = TargetState {
            status: outcome.status,
            last_check: checked_at,
            latency_ms: outcome.latency_ms,
            uptime,
        };
        if let Err(e) = self.storage.update_probe_target_state(target.id, state).await {
            error!("{}: failed to update target state: {e}", target.name);
            return TargetOutcome::Failed;
        }

        match outcome.status {
            ProbeStatus::Up => TargetOutcome::Up,
            _ => TargetOutcome::Down,
        }
    }
}
