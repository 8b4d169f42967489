//! Checkin Daily — daily check-in streak and rewards backend.
//!
//! Main entry point that wires storage, the check-in engine, analytics,
//! and the HTTP surface together.

use checkin_analytics::StatsAggregator;
use checkin_api::ApiServer;
use checkin_core::config::AppConfig;
use checkin_engine::CheckinProcessor;
use checkin_rewards::RewardsEngine;
use checkin_storage::{CheckinStore, MemoryStore, RedisStore};
use clap::Parser;
use std::sync::Arc;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "checkin-daily")]
#[command(about = "Daily check-in streak and rewards backend")]
#[command(version)]
struct Cli {
    /// Node identifier (overrides config)
    #[arg(long, env = "CHECKIN_DAILY__NODE_ID")]
    node_id: Option<String>,

    /// HTTP port (overrides config)
    #[arg(long, env = "CHECKIN_DAILY__API__HTTP_PORT")]
    http_port: Option<u16>,

    /// Run against an in-process store instead of Redis (development)
    #[arg(long, default_value_t = false)]
    memory_store: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "checkin_daily=info,tower_http=info".into()),
        )
        .json()
        .init();

    let cli = Cli::parse();

    info!("Checkin Daily starting up");

    // Load configuration
    let mut config = AppConfig::load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "Failed to load config, using defaults");
        AppConfig::default()
    });

    // Apply CLI overrides
    if let Some(node_id) = cli.node_id {
        config.node_id = node_id;
    }
    if let Some(port) = cli.http_port {
        config.api.http_port = port;
    }

    info!(
        node_id = %config.node_id,
        http_port = config.api.http_port,
        base_points = config.rewards.base_points,
        "Configuration loaded"
    );

    // Storage handle, injected into the engine and analytics. No hidden
    // process-wide client.
    let store: Arc<dyn CheckinStore> = if cli.memory_store {
        info!("Using in-process memory store");
        Arc::new(MemoryStore::new())
    } else {
        Arc::new(RedisStore::connect(&config.redis).await.map_err(|e| {
            error!(error = %e, "Failed to connect to Redis");
            e
        })?)
    };

    let rewards = RewardsEngine::new(&config.rewards);
    let processor = Arc::new(CheckinProcessor::new(store.clone(), rewards));
    let analytics = Arc::new(StatsAggregator::new(store));

    let api_server = ApiServer::new(config, processor, analytics);

    // Start metrics exporter
    if let Err(e) = api_server.start_metrics().await {
        error!(error = %e, "Failed to start metrics exporter");
    }

    info!("Checkin Daily is ready to serve traffic");

    // Start HTTP server (blocks until shutdown)
    api_server.start_http().await?;

    Ok(())
}
