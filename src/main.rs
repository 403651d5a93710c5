//! Water Monitor Server
//!
//! Runs the monitor session against the configured store and serves the
//! REST/WebSocket API.
//!
//! Run with: cargo run --bin water-monitor -- --config config.toml
//!
//! Without `--config` the default locations are searched (see
//! [`Config::load_default`]); `WATER_MONITOR_*` variables override either.

use clap::Parser;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tracing_subscriber::{
    fmt, fmt::writer::BoxMakeWriter, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter,
};
use water_monitor::api::{serve, AppParts, AppState};
use water_monitor::clock::SystemClock;
use water_monitor::config::{Config, LoggingConfig, StoreBackend};
use water_monitor::store::{FirebaseStore, MemoryStore, StorePtr};

#[derive(Parser)]
#[command(name = "water-monitor")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Realtime water-quality and leak monitor")]
struct Args {
    /// Config file (default: search standard locations)
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => Config::load_with_env(path)?,
        None => Config::load_default(),
    };

    init_tracing(&config.logging)?;

    tracing::info!("Starting water monitor v{}", env!("CARGO_PKG_VERSION"));

    let store: StorePtr = match config.store.backend {
        StoreBackend::Firebase => {
            tracing::info!(
                database_url = %config.store.database_url,
                project = ?config.store.project_id,
                "Using hosted realtime database"
            );
            Arc::new(FirebaseStore::new(config.store.firebase())?)
        }
        StoreBackend::Memory => {
            tracing::warn!("Using in-memory store, nothing is persisted");
            Arc::new(MemoryStore::new())
        }
    };

    let parts = AppParts::start(&config, store, Arc::new(SystemClock)).await?;
    tracing::info!(
        permission = ?parts.adapter.permission().await,
        "Monitor session started"
    );

    let state = AppState::new(parts, config.api.clone());
    serve(state, &config.api).await?;

    tracing::info!("Water monitor stopped");
    Ok(())
}

/// Install the global subscriber: `RUST_LOG` wins over the configured level
fn init_tracing(config: &LoggingConfig) -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("water_monitor={},tower_http=info", config.level))
    });

    let writer = match &config.file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)?;
            BoxMakeWriter::new(Mutex::new(file))
        }
        None => BoxMakeWriter::new(std::io::stdout),
    };

    let registry = tracing_subscriber::registry().with(filter);
    if config.format == "json" {
        registry.with(fmt::layer().json().with_writer(writer)).init();
    } else {
        registry.with(fmt::layer().with_writer(writer)).init();
    }
    Ok(())
}
