//! Periodic health checks
//!
//! - [`prober`]: one check against one target
//! - [`sweep`]: every probe target, with uptime bookkeeping
//! - [`infrastructure`]: every managed Proxmox server

pub mod infrastructure;
pub mod prober;
pub mod sweep;

pub use infrastructure::{InfraSweepReport, InfrastructureSweep};
pub use prober::{ProbeOutcome, Prober};
pub use sweep::{MonitorSweep, SweepReport};
