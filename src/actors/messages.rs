//! Message types for actor communication
//!
//! Each actor owns an mpsc command channel. Out-of-band runs reply through a
//! oneshot channel carrying the pass report.

use serde::Serialize;
use tokio::sync::oneshot;

use crate::alerts::EvaluationReport;
use crate::monitors::{InfraSweepReport, SweepReport};

/// Outcome of one loop A pass: monitor sweep followed by infrastructure sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepCycleReport {
    pub monitors: SweepReport,
    pub infrastructure: InfraSweepReport,
}

/// Commands that can be sent to the SweepActor
#[derive(Debug)]
pub enum SweepCommand {
    /// Run a full sweep now (bypassing the interval timer)
    RunNow {
        /// Channel to send the result back
        respond_to: oneshot::Sender<SweepCycleReport>,
    },

    /// Gracefully shut down the sweep actor
    ///
    /// The actor will finish any in-flight sweep and then exit.
    Shutdown,
}

/// Commands that can be sent to the EvaluationActor
#[derive(Debug)]
pub enum EvaluationCommand {
    /// Evaluate every enabled rule now
    RunNow {
        respond_to: oneshot::Sender<EvaluationReport>,
    },

    /// Gracefully shut down the evaluation actor
    Shutdown,
}
