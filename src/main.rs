//! fafgear-exporter: Prometheus exporter for the FAF gear server
//!
//! On every scrape the exporter:
//! - Connects to the gear server's status port
//! - Performs the handshake and status request exchange
//! - Decodes the eleven `;`-separated status fields
//! - Publishes them as gauges, plus an `up` gauge for reachability
//!
//! Configuration via CLI arguments or TOML file.

mod client;
mod collector;
mod config;
mod metrics;
mod protocol;
mod server;

use config::Config;
use server::Server;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::load()?;

    // Initialize logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    info!(
        listen = %config.listen_address,
        path = %config.telemetry_path,
        server = %config.fetch_address,
        fetch_timeout = ?config.fetch_timeout,
        "Starting fafgear-exporter"
    );

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    runtime.block_on(run(config))
}

/// Serve metrics until shutdown
async fn run(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    let server = Server::new(config)?;
    server.run().await
}
