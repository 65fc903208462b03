//! Persistence gateway for probe targets, results, rules and alerts
//!
//! This module provides a trait-based abstraction over the engine's
//! persistent state. Every sweep and evaluation goes through it.
//!
//! ## Design
//!
//! - **Trait-based**: `StorageBackend` trait allows swapping implementations
//! - **Async**: All operations are async for compatibility with Tokio actors
//! - **Atomic dedup**: alert creation checks the dedup window and inserts in
//!   one indivisible step
//!
//! ## Backends
//!
//! - **SQLite** (default): Embedded database, WAL mode, pooled connections
//! - **In-Memory**: No persistence, for tests or a throwaway engine
//!
//! ## Usage
//!
//! ```no_run
//! use infra_watch::storage::{StorageBackend, sqlite::SqliteBackend};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let backend = SqliteBackend::new("./infra-watch.db").await?;
//!     let targets = backend.list_probe_targets().await?;
//!     println!("{} targets", targets.len());
//!     Ok(())
//! }
//! ```

pub mod backend;
pub mod error;
pub mod memory;
pub mod schema;
#[cfg(feature = "storage-sqlite")]
pub mod sqlite;

pub use backend::{HealthStatus, StorageBackend};
pub use error::{StorageError, StorageResult};
pub use memory::MemoryBackend;
pub use schema::{
    Alert, AlertInsert, AlertRule, AlertStatus, ManagedServer, NewAlert, NewAlertRule,
    NewManagedServer, NewProbeResult, NewProbeTarget, ProbeKind, ProbeResult, ProbeStatus,
    ProbeTarget, RuleCondition, RuleScope, ServerKind, ServerStatus, Severity, TargetState,
    UptimeStats,
};
