use std::sync::Arc;

use clap::Parser;
use infra_watch::{
    config::{Config, StorageConfig, read_config_file},
    engine::Engine,
    proxmox::ProxmoxClient,
    storage::{MemoryBackend, StorageBackend},
};
use tracing::{info, level_filters::LevelFilter, trace, warn};
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone, Parser)]
struct Args {
    /// Config file
    #[arg(short)]
    file: Option<String>,
}

fn init() {
    let filter = filter::Targets::new().with_targets(vec![
        ("infra_watch", LevelFilter::DEBUG),
        ("infra_watch_engine", LevelFilter::TRACE),
    ]);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .compact()
                .with_ansi(false),
        )
        .with(filter)
        .init();
}

async fn open_storage(config: &StorageConfig) -> anyhow::Result<Arc<dyn StorageBackend>> {
    match config {
        StorageConfig::None => {
            warn!("using in-memory storage, nothing will be persisted");
            Ok(Arc::new(MemoryBackend::new()))
        }
        #[cfg(feature = "storage-sqlite")]
        StorageConfig::Sqlite { path } => {
            let backend = infra_watch::storage::sqlite::SqliteBackend::new(path).await?;
            Ok(Arc::new(backend))
        }
        #[cfg(not(feature = "storage-sqlite"))]
        StorageConfig::Sqlite { .. } => {
            anyhow::bail!("built without the storage-sqlite feature")
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    init();
    let args = Args::parse();
    trace!("started with args: {args:?}");

    let config = match &args.file {
        Some(file) => read_config_file(file)?,
        None => Config::default().apply_overrides(infra_watch::config::EnvOverrides::from_env()),
    };

    let storage = open_storage(&config.storage).await?;
    let client = Arc::new(ProxmoxClient::new(config.engine.remote_timeout())?);

    let mut engine = Engine::new(config.engine, storage.clone(), client)?;
    engine.start()?;

    tokio::signal::ctrl_c().await?;
    info!("received interrupt, draining in-flight work");

    engine.stop().await;
    storage.close().await?;

    Ok(())
}
