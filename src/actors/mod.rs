//! Actor-based scheduler
//!
//! Two actors run as independent async tasks, each driven by its own
//! interval timer and controlled through an mpsc command channel.
//!
//! ## Architecture Overview
//!
//! ```text
//!                    ┌─────────────────┐
//!                    │     Engine      │
//!                    └────────┬────────┘
//!                             │ spawns
//!                ┌────────────┴────────────┐
//!                │                         │
//!        ┌───────▼────────┐       ┌────────▼────────┐
//!        │  SweepActor    │       │ EvaluationActor │
//!        │  (loop A)      │       │ (loop B)        │
//!        └───────┬────────┘       └────────┬────────┘
//!                │ writes                  │ reads state, writes alerts
//!                └────────────┬────────────┘
//!                   ┌─────────▼──────────┐
//!                   │  StorageBackend    │
//!                   └────────────────────┘
//! ```
//!
//! ## Communication Patterns
//!
//! 1. **Commands**: Each actor has an mpsc command channel for control messages
//! 2. **Request/Response**: oneshot channels for out-of-band runs

pub mod evaluation;
pub mod messages;
pub mod sweep;

pub use evaluation::EvaluationHandle;
pub use messages::SweepCycleReport;
pub use sweep::SweepHandle;
