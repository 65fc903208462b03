//! Infrastructure sweep: check every managed Proxmox server
//!
//! A server is ACTIVE when it authenticates and reports at least one node,
//! INACTIVE otherwise. Either way `last_sync` is stamped.

use std::sync::Arc;

use chrono::Utc;
use futures::future::join_all;
use serde::Serialize;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, instrument, warn};

use crate::proxmox::InfrastructureClient;
use crate::storage::StorageBackend;
use crate::storage::schema::{ManagedServer, ServerKind, ServerStatus};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct InfraSweepReport {
    pub servers: usize,
    pub active: usize,
    pub inactive: usize,
    pub failed: usize,
}

#[derive(Clone)]
pub struct InfrastructureSweep {
    storage: Arc<dyn StorageBackend>,
    client: Arc<dyn InfrastructureClient>,
    limiter: Arc<Semaphore>,
}

impl InfrastructureSweep {
    pub fn new(
        storage: Arc<dyn StorageBackend>,
        client: Arc<dyn InfrastructureClient>,
        limiter: Arc<Semaphore>,
    ) -> Self {
        Self {
            storage,
            client,
            limiter,
        }
    }

    #[instrument(skip(self))]
    pub async fn run(&self) -> InfraSweepReport {
        let servers = match self.storage.list_managed_servers(ServerKind::Proxmox).await {
            Ok(servers) => servers,
            Err(e) => {
                error!("failed to list managed servers: {e}");
                return InfraSweepReport::default();
            }
        };

        let mut report = InfraSweepReport {
            servers: servers.len(),
            ..InfraSweepReport::default()
        };

        let checks = servers.into_iter().map(|server| {
            let sweep = self.clone();
            tokio::spawn(async move { sweep.check_server(server).await })
        });

        for joined in join_all(checks).await {
            match joined {
                Ok(Some(ServerStatus::Active)) => report.active += 1,
                Ok(Some(_)) => report.inactive += 1,
                Ok(None) => report.failed += 1,
                Err(e) => {
                    error!("server check panicked: {e}");
                    report.failed += 1;
                }
            }
        }

        info!(
            "infrastructure sweep done: {} servers, {} active, {} inactive, {} failed",
            report.servers, report.active, report.inactive, report.failed
        );
        report
    }

    /// The recorded status, `None` when it could not be persisted
    async fn check_server(&self, server: ManagedServer) -> Option<ServerStatus> {
        let _permit = self.limiter.acquire().await.ok()?;

        let connected = match self.client.test_connection(&server.connection()).await {
            Ok(connected) => connected,
            Err(e) => {
                warn!("{}: connection test failed: {e}", server.name);
                false
            }
        };

        let status = if connected {
            ServerStatus::Active
        } else {
            ServerStatus::Inactive
        };
        debug!("{}: {status}", server.name);

        match self
            .storage
            .update_server_status(server.id, status, Utc::now())
            .await
        {
            Ok(()) => Some(status),
            Err(e) => {
                error!("{}: failed to update server status: {e}", server.name);
                None
            }
        }
    }
}
