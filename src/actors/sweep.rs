//! SweepActor - drives the monitor and infrastructure sweeps
//!
//! ## Message Flow
//!
//! ```text
//! Timer tick → MonitorSweep → InfrastructureSweep → SweepCycleReport
//!     ↑
//!     └─── Commands (RunNow, Shutdown)
//! ```
//!
//! The first tick fires immediately, so a pass runs as soon as the actor
//! starts. A pass is never interrupted: commands are only read between passes.

use std::time::Duration;

use anyhow::Result;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, instrument, warn};

use crate::monitors::{InfrastructureSweep, MonitorSweep};

use super::messages::{SweepCommand, SweepCycleReport};

pub struct SweepActor {
    monitors: MonitorSweep,
    infrastructure: InfrastructureSweep,

    /// Command receiver for control messages
    command_rx: mpsc::Receiver<SweepCommand>,

    period: Duration,
}

impl SweepActor {
    pub fn new(
        monitors: MonitorSweep,
        infrastructure: InfrastructureSweep,
        command_rx: mpsc::Receiver<SweepCommand>,
        period: Duration,
    ) -> Self {
        Self {
            monitors,
            infrastructure,
            command_rx,
            period,
        }
    }

    /// Run the actor's main loop
    ///
    /// This runs until:
    /// - A Shutdown command is received
    /// - The command channel is closed
    #[instrument(skip(self), name = "sweep_actor")]
    pub async fn run(mut self) {
        debug!("starting sweep actor with period {:?}", self.period);

        let mut ticker = interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.sweep().await;
                }

                cmd = self.command_rx.recv() => {
                    match cmd {
                        Some(SweepCommand::RunNow { respond_to }) => {
                            debug!("received RunNow command");
                            let report = self.sweep().await;
                            let _ = respond_to.send(report);
                        }

                        Some(SweepCommand::Shutdown) => {
                            debug!("received shutdown command");
                            break;
                        }

                        // every handle is gone
                        None => {
                            warn!("command channel closed, shutting down");
                            break;
                        }
                    }
                }
            }
        }

        debug!("sweep actor stopped");
    }

    async fn sweep(&self) -> SweepCycleReport {
        let monitors = self.monitors.run().await;
        let infrastructure = self.infrastructure.run().await;

        SweepCycleReport {
            monitors,
            infrastructure,
        }
    }
}

/// Handle for controlling a SweepActor
#[derive(Clone)]
pub struct SweepHandle {
    sender: mpsc::Sender<SweepCommand>,
}

impl SweepHandle {
    /// Spawn a new sweep actor
    ///
    /// Returns the handle together with the actor's task so callers can wait
    /// for it to drain.
    pub fn spawn(
        monitors: MonitorSweep,
        infrastructure: InfrastructureSweep,
        period: Duration,
    ) -> (Self, JoinHandle<()>) {
        let (cmd_tx, cmd_rx) = mpsc::channel(32);
        let actor = SweepActor::new(monitors, infrastructure, cmd_rx, period);
        let task = tokio::spawn(actor.run());

        (Self { sender: cmd_tx }, task)
    }

    /// Trigger an immediate sweep and wait for its report
    pub async fn run_now(&self) -> Result<SweepCycleReport> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(SweepCommand::RunNow { respond_to: tx })
            .await?;

        Ok(rx.await?)
    }

    /// Ask the actor to stop after the current pass
    pub async fn shutdown(&self) {
        let _ = self.sender.send(SweepCommand::Shutdown).await;
    }
}
