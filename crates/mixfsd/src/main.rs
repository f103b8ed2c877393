#![forbid(unsafe_code)]

use anyhow::{Context, Result};
use clap::Parser;
use mixfs_common::telemetry::{self, Readiness};
use mixfsd::config::{Args, ServerConfig};
use mixfsd::{run_with_shutdown, LocalFs, ServerState};
use std::sync::Arc;
use tokio::net::UdpSocket;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);

    let config = ServerConfig::from(args);
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("invalid configuration: {e}"))?;

    let readiness = Readiness::new("mixfsd");
    telemetry::spawn(config.metrics_addr, readiness.clone());

    let socket = UdpSocket::bind(config.listen)
        .await
        .with_context(|| format!("binding {}", config.listen))?;
    info!(
        semantics = ?config.semantics,
        failure_rate = config.failure_rate,
        mixnet = config.mixnet,
        "file server starting"
    );
    let state = ServerState::new(config, socket, Arc::new(LocalFs));
    readiness.set_ready(true);

    let (shutdown_tx, shutdown_rx) = watch::channel(());
    let server = tokio::spawn(run_with_shutdown(state, shutdown_rx));

    tokio::signal::ctrl_c().await?;
    info!("interrupted, stopping");
    readiness.set_ready(false);
    let _ = shutdown_tx.send(());
    if let Err(e) = server.await? {
        error!("receive loop failed: {}", e);
    }
    Ok(())
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .init();
}
