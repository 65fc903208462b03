//! The monitoring-and-alerting engine
//!
//! One `Engine` per process, built by the entry point and owned by it. It
//! wires the sweeps and the evaluator to a shared storage backend, remote
//! client and concurrency limit, and owns the lifecycle of both actors.
//!
//! ```no_run
//! # use std::sync::Arc;
//! # use std::time::Duration;
//! # use infra_watch::{config::EngineConfig, engine::Engine, proxmox::ProxmoxClient, storage::MemoryBackend};
//! # async fn example() -> anyhow::Result<()> {
//! let client = Arc::new(ProxmoxClient::new(Duration::from_secs(30))?);
//! let mut engine = Engine::new(EngineConfig::default(), Arc::new(MemoryBackend::new()), client)?;
//! engine.start()?;
//! // ...
//! engine.stop().await;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::actors::{EvaluationHandle, SweepCycleReport, SweepHandle};
use crate::alerts::{AlertEvaluator, EvaluationReport};
use crate::config::EngineConfig;
use crate::monitors::{InfrastructureSweep, MonitorSweep, Prober};
use crate::proxmox::InfrastructureClient;
use crate::storage::StorageBackend;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid engine configuration: {0}")]
    InvalidConfig(&'static str),

    #[error("failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("engine is already running")]
    AlreadyRunning,
}

struct Running {
    sweep: SweepHandle,
    sweep_task: JoinHandle<()>,
    evaluation: EvaluationHandle,
    evaluation_task: JoinHandle<()>,
}

pub struct Engine {
    config: EngineConfig,
    monitors: MonitorSweep,
    infrastructure: InfrastructureSweep,
    evaluator: AlertEvaluator,
    running: Option<Running>,
}

impl Engine {
    pub fn new(
        config: EngineConfig,
        storage: Arc<dyn StorageBackend>,
        client: Arc<dyn InfrastructureClient>,
    ) -> Result<Self, EngineError> {
        if config.sweep_period_secs == 0 {
            return Err(EngineError::InvalidConfig("sweep period must be positive"));
        }
        if config.evaluation_period_secs == 0 {
            return Err(EngineError::InvalidConfig("evaluation period must be positive"));
        }
        if config.max_concurrency == 0 {
            return Err(EngineError::InvalidConfig("max concurrency must be positive"));
        }

        let limiter = Arc::new(Semaphore::new(config.max_concurrency));
        let prober = Prober::new(config.http_timeout(), config.reachability_timeout())?;

        Ok(Self {
            monitors: MonitorSweep::new(storage.clone(), prober, limiter.clone()),
            infrastructure: InfrastructureSweep::new(storage.clone(), client.clone(), limiter.clone()),
            evaluator: AlertEvaluator::new(storage, client, limiter, config.dedup_window()),
            config,
            running: None,
        })
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    /// Spawn both loops; each runs its first pass immediately
    pub fn start(&mut self) -> Result<(), EngineError> {
        if self.running.is_some() {
            return Err(EngineError::AlreadyRunning);
        }

        let (sweep, sweep_task) = SweepHandle::spawn(
            self.monitors.clone(),
            self.infrastructure.clone(),
            self.config.sweep_period(),
        );
        let (evaluation, evaluation_task) =
            EvaluationHandle::spawn(self.evaluator.clone(), self.config.evaluation_period());

        self.running = Some(Running {
            sweep,
            sweep_task,
            evaluation,
            evaluation_task,
        });
        info!(
            "engine started (sweep every {}s, evaluation every {}s)",
            self.config.sweep_period_secs, self.config.evaluation_period_secs
        );
        Ok(())
    }

    /// Stop issuing ticks and wait for in-flight passes to finish
    pub async fn stop(&mut self) {
        let Some(running) = self.running.take() else {
            return;
        };

        running.sweep.shutdown().await;
        running.evaluation.shutdown().await;

        for (name, task) in [
            ("sweep", running.sweep_task),
            ("evaluation", running.evaluation_task),
        ] {
            if let Err(e) = task.await {
                error!("{name} actor failed: {e}");
            }
        }
        info!("engine stopped");
    }

    /// Run a sweep pass now and return its report
    ///
    /// While the engine runs, the pass is queued on the sweep actor so it
    /// never overlaps a scheduled one.
    pub async fn sweep_now(&self) -> SweepCycleReport {
        if let Some(running) = &self.running {
            match running.sweep.run_now().await {
                Ok(report) => return report,
                Err(e) => error!("sweep actor unavailable, sweeping inline: {e}"),
            }
        }

        SweepCycleReport {
            monitors: self.monitors.run().await,
            infrastructure: self.infrastructure.run().await,
        }
    }

    /// Run an alert evaluation pass now and return its report
    pub async fn evaluate_now(&self) -> EvaluationReport {
        if let Some(running) = &self.running {
            match running.evaluation.run_now().await {
                Ok(report) => return report,
                Err(e) => error!("evaluation actor unavailable, evaluating inline: {e}"),
            }
        }

        self.evaluator.evaluate().await
    }
}
