//! Fire-and-forget UDP helpers.

use std::io;
use std::net::SocketAddr;
use tokio::net::UdpSocket;

/// Resolves a `host:port` string to the first matching socket address.
///
/// # Errors
///
/// Returns an error if the name does not resolve.
pub async fn resolve(addr: &str) -> io::Result<SocketAddr> {
    tokio::net::lookup_host(addr)
        .await?
        .next()
        .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, format!("no address for {addr}")))
}

/// Sends one datagram to a `host:port` destination.
///
/// Only the local send is awaited; nothing confirms delivery.
///
/// # Errors
///
/// Returns an error if resolution or the local send fails.
pub async fn send_to_host(socket: &UdpSocket, addr: &str, bytes: &[u8]) -> io::Result<()> {
    let target = resolve(addr).await?;
    socket.send_to(bytes, target).await?;
    Ok(())
}
