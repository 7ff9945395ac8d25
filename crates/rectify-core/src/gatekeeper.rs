//! Rectify Gatekeeper: HTTP front end for the sensor engine
//!
//! Endpoints:
//! - POST /process       - Rectify a single reading
//! - POST /process/batch - Rectify readings in order
//! - GET  /health        - Health check
//! - GET  /stats         - Engine configuration and stream count
//! - GET  /metrics       - Prometheus metrics

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

use rectify_core::server::{Gatekeeper, GatekeeperConfig};

#[derive(Parser, Debug)]
#[command(name = "gatekeeper", version, about = "Sensor anomaly rectification server")]
struct Cli {
    /// TOML configuration file; without it `RECTIFY_CONFIG` is consulted
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Listen address, overrides the config file
    #[arg(short, long)]
    bind: Option<String>,

    /// Shard worker count, overrides the config file
    #[arg(short, long)]
    shards: Option<usize>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let mut config = GatekeeperConfig::load_or_default(cli.config.as_deref())?;
    if let Some(bind) = cli.bind {
        config.bind = bind;
    }
    if let Some(shards) = cli.shards {
        config.shards = shards;
    }

    info!(
        version = env!("CARGO_PKG_VERSION"),
        window_size = config.engine.window_size,
        metrics = config.engine.metrics.len(),
        "Initializing Rectify Gatekeeper"
    );

    let gatekeeper = Gatekeeper::start(&config)?;
    let app = gatekeeper.router();

    let listener = TcpListener::bind(&config.bind).await?;
    info!(addr = %config.bind, "Gatekeeper listening.");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if tokio::signal::ctrl_c().await.is_err() {
                tracing::error!("failed to install CTRL+C handler");
                std::future::pending::<()>().await;
            }
            info!("Shutting down... (Waiting for queues to drain)");
        })
        .await?;

    gatekeeper.shutdown();
    info!("Goodbye.");
    Ok(())
}
