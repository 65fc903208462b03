//! Remote infrastructure client
//!
//! Talks to a Proxmox VE cluster over its JSON API. The engine only depends on
//! the [`InfrastructureClient`] trait so tests can substitute a fake.
//!
//! ## Flow
//!
//! ```text
//! POST /api2/json/access/ticket (username, password) → ticket
//! GET  /api2/json/nodes  (Cookie: PVEAuthCookie=<ticket>) → [NodeSnapshot]
//! ```

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, instrument, trace, warn};

const TICKET_PATH: &str = "/api2/json/access/ticket";
const NODES_PATH: &str = "/api2/json/nodes";
const AUTH_COOKIE: &str = "PVEAuthCookie";

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("request to remote infrastructure failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("authentication failed with status {status}: {body}")]
    Authentication { status: u16, body: String },

    #[error("failed to decode response: {0}")]
    Decode(String),

    #[error("failed to build HTTP client: {0}")]
    Client(String),
}

/// Everything needed to reach one managed server
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteConnection {
    pub base_url: String,
    pub username: String,
    pub password: String,
    pub realm: String,
    pub verify_tls: bool,
}

impl RemoteConnection {
    /// Login name with the realm suffix the API expects
    pub fn login_name(&self) -> String {
        if self.username.contains('@') {
            self.username.clone()
        } else if self.realm.is_empty() {
            format!("{}@pam", self.username)
        } else {
            format!("{}@{}", self.username, self.realm)
        }
    }
}

/// Point-in-time view of one cluster node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSnapshot {
    pub name: String,
    pub online: bool,
    /// CPU usage on a 0–100 scale
    pub cpu_percent: f64,
    pub memory_used: u64,
    pub memory_total: u64,
    pub uptime_secs: u64,
}

impl NodeSnapshot {
    /// Memory usage on a 0–100 scale, `None` when the total is unknown
    pub fn memory_percent(&self) -> Option<f64> {
        if self.memory_total == 0 {
            return None;
        }
        Some(self.memory_used as f64 / self.memory_total as f64 * 100.0)
    }
}

#[async_trait]
pub trait InfrastructureClient: Send + Sync {
    /// Authenticate and list the nodes of the cluster
    async fn fetch_nodes(&self, conn: &RemoteConnection) -> Result<Vec<NodeSnapshot>, RemoteError>;

    /// A connection is healthy when it authenticates and reports at least one node
    async fn test_connection(&self, conn: &RemoteConnection) -> Result<bool, RemoteError> {
        let nodes = self.fetch_nodes(conn).await?;
        Ok(!nodes.is_empty())
    }
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    data: T,
}

#[derive(Debug, Deserialize)]
struct Ticket {
    ticket: String,
}

#[derive(Debug, Deserialize)]
struct RawNode {
    node: String,
    #[serde(default)]
    status: String,
    #[serde(default)]
    cpu: f64,
    #[serde(default)]
    mem: u64,
    #[serde(default)]
    maxmem: u64,
    #[serde(default)]
    uptime: u64,
}

impl From<RawNode> for NodeSnapshot {
    fn from(raw: RawNode) -> Self {
        Self {
            online: raw.status == "online",
            name: raw.node,
            cpu_percent: raw.cpu * 100.0,
            memory_used: raw.mem,
            memory_total: raw.maxmem,
            uptime_secs: raw.uptime,
        }
    }
}

/// Proxmox VE implementation of [`InfrastructureClient`]
///
/// Holds two HTTP clients so a server with `verify_tls = false` never
/// weakens certificate checks for the others.
#[derive(Debug, Clone)]
pub struct ProxmoxClient {
    verifying: reqwest::Client,
    insecure: reqwest::Client,
}

impl ProxmoxClient {
    pub fn new(timeout: Duration) -> Result<Self, RemoteError> {
        let verifying = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RemoteError::Client(e.to_string()))?;
        let insecure = reqwest::Client::builder()
            .timeout(timeout)
            .danger_accept_invalid_certs(true)
            .build()
            .map_err(|e| RemoteError::Client(e.to_string()))?;

        Ok(Self { verifying, insecure })
    }

    fn client_for(&self, conn: &RemoteConnection) -> &reqwest::Client {
        if conn.verify_tls {
            &self.verifying
        } else {
            &self.insecure
        }
    }

    async fn authenticate(&self, conn: &RemoteConnection) -> Result<String, RemoteError> {
        let username = conn.login_name();
        debug!("authenticating as {username}");

        let response = self
            .client_for(conn)
            .post(format!("{}{TICKET_PATH}", conn.base_url))
            .form(&[("username", username.as_str()), ("password", conn.password.as_str())])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!("authentication rejected with status {status}");
            return Err(RemoteError::Authentication {
                status: status.as_u16(),
                body,
            });
        }

        let envelope: Envelope<Ticket> = response
            .json()
            .await
            .map_err(|e| RemoteError::Decode(e.to_string()))?;
        Ok(envelope.data.ticket)
    }
}

#[async_trait]
impl InfrastructureClient for ProxmoxClient {
    #[instrument(skip_all, fields(base_url = %conn.base_url))]
    async fn fetch_nodes(&self, conn: &RemoteConnection) -> Result<Vec<NodeSnapshot>, RemoteError> {
        let ticket = self.authenticate(conn).await?;

        let response = self
            .client_for(conn)
            .get(format!("{}{NODES_PATH}", conn.base_url))
            .header(reqwest::header::COOKIE, format!("{AUTH_COOKIE}={ticket}"))
            .send()
            .await?;

        let envelope: Envelope<Vec<RawNode>> = response
            .json()
            .await
            .map_err(|e| RemoteError::Decode(e.to_string()))?;

        trace!("received {} nodes", envelope.data.len());
        Ok(envelope.data.into_iter().map(NodeSnapshot::from).collect())
    }
}
