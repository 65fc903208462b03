//! Single health checks against one probe target
//!
//! A probe never fails: every error (network, timeout, unexpected status,
//! missing `ping` binary) becomes a DOWN outcome with a descriptive message.

use std::process::Stdio;
use std::sync::OnceLock;
use std::time::{Duration, Instant};

use regex::Regex;
use tokio::process::Command;
use tracing::{instrument, trace};

use crate::storage::schema::{ProbeKind, ProbeStatus, ProbeTarget};

/// Result of one probe execution
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeOutcome {
    pub status: ProbeStatus,
    /// Time from request start to response headers (or to failure)
    pub latency_ms: i64,
    pub message: String,
}

impl ProbeOutcome {
    fn up(started: Instant, message: String) -> Self {
        Self {
            status: ProbeStatus::Up,
            latency_ms: elapsed_ms(started),
            message,
        }
    }

    fn down(started: Instant, message: String) -> Self {
        Self {
            status: ProbeStatus::Down,
            latency_ms: elapsed_ms(started),
            message,
        }
    }
}

/// Whole milliseconds, rounded up so a finished probe never reports 0
fn elapsed_ms(started: Instant) -> i64 {
    let micros = started.elapsed().as_micros().div_ceil(1000).max(1);
    i64::try_from(micros).unwrap_or(i64::MAX)
}

/// Executes HTTP and reachability checks
#[derive(Debug, Clone)]
pub struct Prober {
    /// HTTP client (reused across requests for efficiency)
    client: reqwest::Client,
    http_timeout: Duration,
    reachability_timeout: Duration,
}

impl Prober {
    pub fn new(http_timeout: Duration, reachability_timeout: Duration) -> reqwest::Result<Self> {
        let client = reqwest::Client::builder().timeout(http_timeout).build()?;

        Ok(Self {
            client,
            http_timeout,
            reachability_timeout,
        })
    }

    #[instrument(skip_all, fields(target = %target.name, kind = %target.kind))]
    pub async fn probe(&self, target: &ProbeTarget) -> ProbeOutcome {
        match target.kind {
            ProbeKind::Http => self.check_http(&target.address).await,
            ProbeKind::Reachability => self.check_reachability(&target.address).await,
        }
    }

    /// GET the URL; any 2xx status is UP
    pub async fn check_http(&self, url: &str) -> ProbeOutcome {
        trace!("checking {url}");
        let started = Instant::now();

        match self.client.get(url).send().await {
            Ok(response) => {
                let code = response.status().as_u16();
                if response.status().is_success() {
                    ProbeOutcome::up(started, format!("OK: {code}"))
                } else {
                    ProbeOutcome::down(started, format!("HTTP Error: {code}"))
                }
            }
            Err(e) if e.is_timeout() => ProbeOutcome::down(
                started,
                format!("Error: request timed out after {}s", self.http_timeout.as_secs()),
            ),
            Err(e) => ProbeOutcome::down(started, format!("Error: {e}")),
        }
    }

    /// Send a single echo request with the system `ping` command
    pub async fn check_reachability(&self, host: &str) -> ProbeOutcome {
        trace!("pinging {host}");
        let started = Instant::now();
        // -W takes whole seconds
        let wait_secs = self.reachability_timeout.as_secs().max(1).to_string();

        let mut command = Command::new("ping");
        command
            .args(["-c", "1", "-W", &wait_secs, host])
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        let child = command.output();

        let grace = self.reachability_timeout + Duration::from_secs(1);
        match tokio::time::timeout(grace, child).await {
            Ok(Ok(output)) if output.status.success() => {
                let stdout = String::from_utf8_lossy(&output.stdout);
                let message = match round_trip_ms(&stdout) {
                    Some(rtt) => format!("Ping success: {rtt} ms"),
                    None => "Ping success".to_string(),
                };
                ProbeOutcome::up(started, message)
            }
            Ok(Ok(_)) => ProbeOutcome::down(started, "Ping failed".to_string()),
            Ok(Err(e)) => ProbeOutcome::down(started, format!("Ping failed: {e}")),
            Err(_) => ProbeOutcome::down(started, "Ping failed: timed out".to_string()),
        }
    }
}

/// Round-trip time reported by `ping`, e.g. `time=0.045 ms`
fn round_trip_ms(output: &str) -> Option<&str> {
    static RTT: OnceLock<Option<Regex>> = OnceLock::new();
    let re = RTT
        .get_or_init(|| Regex::new(r"time[=<](?P<val>[0-9.]+)\s*ms").ok())
        .as_ref()?;

    re.captures(output)
        .and_then(|caps| caps.name("val"))
        .map(|m| m.as_str())
}
