use std::path::PathBuf;
use std::time::Duration;

use tracing::trace;

/// Storage backend configuration
#[derive(Debug, Clone, PartialEq, serde::Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum StorageConfig {
    /// In-memory storage (no persistence)
    #[serde(rename = "none")]
    None,

    /// SQLite database (default)
    Sqlite {
        /// Path to the SQLite database file
        #[serde(default = "default_sqlite_path")]
        path: PathBuf,
    },
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig::Sqlite {
            path: default_sqlite_path(),
        }
    }
}

fn default_sqlite_path() -> PathBuf {
    PathBuf::from("./infra-watch.db")
}

#[derive(Debug, Clone, Default, PartialEq, serde::Deserialize)]
pub struct Config {
    #[serde(default)]
    pub engine: EngineConfig,

    #[serde(default)]
    pub storage: StorageConfig,
}

/// Timing and concurrency knobs of the engine
#[derive(Debug, Clone, PartialEq, serde::Deserialize)]
pub struct EngineConfig {
    /// Period of the monitor + infrastructure sweep loop
    #[serde(default = "default_period")]
    pub sweep_period_secs: u64,

    /// Period of the alert evaluation loop
    #[serde(default = "default_period")]
    pub evaluation_period_secs: u64,

    #[serde(default = "default_http_timeout")]
    pub http_timeout_secs: u64,

    #[serde(default = "default_reachability_timeout")]
    pub reachability_timeout_secs: u64,

    /// An open alert suppresses new ones for the same rule during this window
    #[serde(default = "default_dedup_window")]
    pub dedup_window_secs: u64,

    /// Upper bound on probes, server checks or rule evaluations in flight
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    /// Per-request timeout of the remote infrastructure client
    #[serde(default = "default_remote_timeout")]
    pub remote_timeout_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sweep_period_secs: default_period(),
            evaluation_period_secs: default_period(),
            http_timeout_secs: default_http_timeout(),
            reachability_timeout_secs: default_reachability_timeout(),
            dedup_window_secs: default_dedup_window(),
            max_concurrency: default_max_concurrency(),
            remote_timeout_secs: default_remote_timeout(),
        }
    }
}

impl EngineConfig {
    pub fn sweep_period(&self) -> Duration {
        Duration::from_secs(self.sweep_period_secs)
    }

    pub fn evaluation_period(&self) -> Duration {
        Duration::from_secs(self.evaluation_period_secs)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn reachability_timeout(&self) -> Duration {
        Duration::from_secs(self.reachability_timeout_secs)
    }

    pub fn remote_timeout(&self) -> Duration {
        Duration::from_secs(self.remote_timeout_secs)
    }

    pub fn dedup_window(&self) -> chrono::Duration {
        chrono::Duration::seconds(i64::try_from(self.dedup_window_secs).unwrap_or(i64::MAX))
    }
}

fn default_period() -> u64 {
    30
}

fn default_http_timeout() -> u64 {
    10
}

fn default_reachability_timeout() -> u64 {
    2
}

fn default_dedup_window() -> u64 {
    300
}

fn default_max_concurrency() -> usize {
    64
}

fn default_remote_timeout() -> u64 {
    30
}

/// Values taken from the environment that win over the config file
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EnvOverrides {
    pub db_path: Option<PathBuf>,
    pub sweep_period_secs: Option<u64>,
    pub evaluation_period_secs: Option<u64>,
}

impl EnvOverrides {
    pub fn from_env() -> Self {
        Self {
            db_path: crate::util::get_db_path(),
            sweep_period_secs: crate::util::get_sweep_period(),
            evaluation_period_secs: crate::util::get_evaluation_period(),
        }
    }
}

impl Config {
    pub fn apply_overrides(mut self, overrides: EnvOverrides) -> Self {
        if let Some(path) = overrides.db_path {
            self.storage = StorageConfig::Sqlite { path };
        }
        if let Some(secs) = overrides.sweep_period_secs {
            self.engine.sweep_period_secs = secs;
        }
        if let Some(secs) = overrides.evaluation_period_secs {
            self.engine.evaluation_period_secs = secs;
        }
        self
    }
}

pub fn read_config_file(path: &str) -> anyhow::Result<Config> {
    let file_content = std::fs::read_to_string(path)?;
    serde_json::from_str::<Config>(&file_content)
        .map_err(|e| anyhow::anyhow!("Invalid configuration file provided: {e}"))
        .map(|config| config.apply_overrides(EnvOverrides::from_env()))
        .inspect(|config| trace!("loaded config: {config:?}"))
}
