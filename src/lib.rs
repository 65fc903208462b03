//! Monitoring and alerting engine
//!
//! Periodically probes HTTP and ICMP targets, checks managed Proxmox
//! clusters, and turns user-defined alert rules into deduplicated alerts.
//! All state lives behind [`storage::StorageBackend`].

pub mod actors;
pub mod alerts;
pub mod config;
pub mod engine;
pub mod monitors;
pub mod proxmox;
pub mod storage;
pub mod util;

pub use engine::{Engine, EngineError};
