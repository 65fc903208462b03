//! EvaluationActor - runs the alert evaluator on its own cadence
//!
//! Independent from the sweep actor: the two loops are not coordinated and
//! each reads whatever state the other last persisted.

use std::time::Duration;

use anyhow::Result;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, instrument, warn};

use crate::alerts::{AlertEvaluator, EvaluationReport};

use super::messages::EvaluationCommand;

pub struct EvaluationActor {
    evaluator: AlertEvaluator,
    command_rx: mpsc::Receiver<EvaluationCommand>,
    period: Duration,
}

impl EvaluationActor {
    pub fn new(
        evaluator: AlertEvaluator,
        command_rx: mpsc::Receiver<EvaluationCommand>,
        period: Duration,
    ) -> Self {
        Self {
            evaluator,
            command_rx,
            period,
        }
    }

    #[instrument(skip(self), name = "evaluation_actor")]
    pub async fn run(mut self) {
        debug!("starting evaluation actor with period {:?}", self.period);

        let mut ticker = interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.evaluator.evaluate().await;
                }

                cmd = self.command_rx.recv() => {
                    match cmd {
                        Some(EvaluationCommand::RunNow { respond_to }) => {
                            debug!("received RunNow command");
                            let report = self.evaluator.evaluate().await;
                            let _ = respond_to.send(report);
                        }

                        Some(EvaluationCommand::Shutdown) => {
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

        debug!("evaluation actor stopped");
    }
}

/// Handle for controlling an EvaluationActor
#[derive(Clone)]
pub struct EvaluationHandle {
    sender: mpsc::Sender<EvaluationCommand>,
}

impl EvaluationHandle {
    pub fn spawn(evaluator: AlertEvaluator, period: Duration) -> (Self, JoinHandle<()>) {
        let (cmd_tx, cmd_rx) = mpsc::channel(32);
        let actor = EvaluationActor::new(evaluator, cmd_rx, period);
        let task = tokio::spawn(actor.run());

        (Self { sender: cmd_tx }, task)
    }

    /// Trigger an immediate evaluation and wait for its report
    pub async fn run_now(&self) -> Result<EvaluationReport> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(EvaluationCommand::RunNow { respond_to: tx })
            .await?;

        Ok(rx.await?)
    }

    pub async fn shutdown(&self) {
        let _ = self.sender.send(EvaluationCommand::Shutdown).await;
    }
}
