#![forbid(unsafe_code)]

use anyhow::{Context, Result};
use clap::Parser;
use mixfs_common::telemetry::{self, Readiness};
use mixfs_relay::config::{Args, RelayConfig};
use mixfs_relay::{run_with_shutdown, Relay};
use tokio::net::UdpSocket;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let level = match args.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .init();

    let config = RelayConfig::from(args);
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("invalid configuration: {e}"))?;

    let readiness = Readiness::new("mixfs-relay");
    telemetry::spawn(config.metrics_addr, readiness.clone());

    let socket = UdpSocket::bind(config.listen)
        .await
        .with_context(|| format!("binding {}", config.listen))?;
    let relay = Relay::new(config, socket);
    readiness.set_ready(true);

    let (shutdown_tx, shutdown_rx) = watch::channel(());
    let task = tokio::spawn(run_with_shutdown(relay, shutdown_rx));

    tokio::signal::ctrl_c().await?;
    info!("interrupted, stopping");
    readiness.set_ready(false);
    let _ = shutdown_tx.send(());
    if let Err(e) = task.await? {
        error!("relay loop failed: {}", e);
    }
    Ok(())
}
