use crate::ack::AckRegistry;
use crate::config::ServerConfig;
use crate::dedup::DedupCache;
use crate::engine::handle_datagram;
use crate::error::ServerError;
use crate::fs::FileStore;
use crate::metrics::counters;
use crate::outbound::Outbound;
use std::sync::Arc;
use tokio::net::UdpSocket;
use tracing::{debug, error, info};

/// Shared state for the file server.
pub struct ServerState {
    /// Runtime server configuration.
    pub config: ServerConfig,
    /// The server's only socket, used for receiving.
    pub socket: Arc<UdpSocket>,
    /// Sender for replies and pushes over the same socket.
    pub outbound: Outbound,
    /// File capabilities invoked by requests.
    pub store: Arc<dyn FileStore>,
    /// Replies by request msg id.
    pub dedup: DedupCache,
    /// Outstanding reliable pushes.
    pub acks: AckRegistry,
}

impl ServerState {
    /// Builds the state around a bound socket.
    #[must_use]
    pub fn new(config: ServerConfig, socket: UdpSocket, store: Arc<dyn FileStore>) -> Arc<Self> {
        let socket = Arc::new(socket);
        Arc::new(Self {
            outbound: Outbound::new(Arc::clone(&socket), config.failure_rate),
            dedup: DedupCache::new(config.dedup_capacity),
            acks: AckRegistry::new(),
            socket,
            store,
            config,
        })
    }
}

/// # Errors
///
/// Returns an error if the socket's local address cannot be read.
pub async fn run(state: Arc<ServerState>) -> Result<(), ServerError> {
    let (_shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(());
    run_with_shutdown(state, shutdown_rx).await
}

/// Run the receive loop with an externally-controlled shutdown signal.
///
/// Every datagram is handled in its own task. When the sender behind
/// `shutdown_rx` signals or is dropped, the loop stops receiving; tasks
/// already spawned, including subscriptions and push retries, run until
/// their own timeouts.
///
/// # Errors
///
/// Returns an error if the socket's local address cannot be read.
pub async fn run_with_shutdown(
    state: Arc<ServerState>,
    mut shutdown_rx: tokio::sync::watch::Receiver<()>,
) -> Result<(), ServerError> {
    let local_addr = state.socket.local_addr()?;
    info!(
        "server listening on {} ({}, failure rate {}%, mixnet {})",
        local_addr, state.config.semantics, state.config.failure_rate, state.config.mixnet
    );
    let max = state.config.max_datagram;
    // One spare byte tells a full datagram apart from a truncated one.
    let mut buf = vec![0u8; max + 1];

    loop {
        tokio::select! {
            result = state.socket.recv_from(&mut buf) => {
                match result {
                    Ok((n, peer)) => {
                        counters::datagrams_received_total();
                        if n > max {
                            counters::datagrams_dropped_total("oversize");
                            let err = ServerError::Oversize { max, actual: n };
                            debug!("dropping datagram from {}: {}", peer, err);
                            continue;
                        }
                        let datagram = buf[..n].to_vec();
                        let state = Arc::clone(&state);
                        tokio::spawn(async move {
                            if let Err(e) = handle_datagram(state, peer, datagram).await {
                                counters::datagrams_dropped_total("malformed");
                                debug!("dropping datagram from {}: {}", peer, e);
                            }
                        });
                    }
                    Err(e) => {
                        error!("failed to receive datagram: {}", e);
                    }
                }
            }
            _ = shutdown_rx.changed() => {
                info!("shutdown signal received");
                break;
            }
        }
    }

    info!("server stopped receiving");
    Ok(())
}
