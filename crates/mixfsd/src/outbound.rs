use crate::metrics::counters;
use mixfs_common::transport::send_to_host;
use mixfs_common::HopEnvelope;
use rand::Rng;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::UdpSocket;
use tracing::{debug, trace};

/// Where replies and pushes for one request go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyPath {
    /// Straight back to the sender's socket address.
    Direct(SocketAddr),
    /// Through the return route carried in the request's hop envelope.
    Relayed(HopEnvelope),
}

/// Fire-and-forget sender with a synthetic loss rate.
#[derive(Debug, Clone)]
pub struct Outbound {
    socket: Arc<UdpSocket>,
    failure_rate: u8,
}

impl Outbound {
    /// Sends on `socket`, dropping `failure_rate` percent of datagrams.
    #[must_use]
    pub fn new(socket: Arc<UdpSocket>, failure_rate: u8) -> Self {
        Self {
            socket,
            failure_rate,
        }
    }

    /// Sends `bytes` along `to`. Returns `false` when the datagram was
    /// dropped, either on purpose or because the local send failed.
    ///
    /// Nothing confirms delivery; callers that need it retransmit.
    pub async fn send(&self, to: &ReplyPath, bytes: &[u8]) -> bool {
        if should_drop(self.failure_rate) {
            counters::sends_total("dropped");
            debug!("simulated send failure");
            return false;
        }
        let result = match to {
            ReplyPath::Direct(addr) => self.socket.send_to(bytes, addr).await.map(|_| ()),
            ReplyPath::Relayed(envelope) => {
                let datagram = envelope.forward_payload(bytes);
                send_to_host(&self.socket, &envelope.next_hop, &datagram).await
            }
        };
        match result {
            Ok(()) => {
                counters::sends_total("sent");
                trace!(len = bytes.len(), "datagram sent");
                true
            }
            Err(e) => {
                counters::sends_total("dropped");
                debug!("send to {:?} failed: {}", to, e);
                false
            }
        }
    }
}

/// Rolls `r` in `[0, 100)` and drops when `r < failure_rate`.
fn should_drop(failure_rate: u8) -> bool {
    rand::thread_rng().gen_range(0..100u8) < failure_rate
}

#[cfg(test)]
mod tests {
    use super::*;
    use mixfs_common::hop::{onion, Wrapped};
    use std::time::Duration;

    async fn pair() -> (Arc<UdpSocket>, UdpSocket) {
        let tx = Arc::new(UdpSocket::bind("127.0.0.1:0").await.unwrap());
        let rx = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        (tx, rx)
    }

    async fn recv(rx: &UdpSocket) -> Option<Vec<u8>> {
        let mut buf = [0u8; 1024];
        let (n, _) = tokio::time::timeout(Duration::from_millis(200), rx.recv_from(&mut buf))
            .await
            .ok()?
            .ok()?;
        Some(buf[..n].to_vec())
    }

    #[test]
    fn zero_rate_never_drops_and_full_rate_always_drops() {
        for _ in 0..1000 {
            assert!(!should_drop(0));
            assert!(should_drop(100));
        }
    }

    #[tokio::test]
    async fn direct_send_reaches_peer() {
        let (tx, rx) = pair().await;
        let out = Outbound::new(tx, 0);
        let to = ReplyPath::Direct(rx.local_addr().unwrap());
        assert!(out.send(&to, b"1,\"ok\"").await);
        assert_eq!(recv(&rx).await.unwrap(), b"1,\"ok\"");
    }

    #[tokio::test]
    async fn full_failure_rate_sends_nothing() {
        let (tx, rx) = pair().await;
        let out = Outbound::new(tx, 100);
        let to = ReplyPath::Direct(rx.local_addr().unwrap());
        assert!(!out.send(&to, b"1,\"ok\"").await);
        assert!(recv(&rx).await.is_none());
    }

    #[tokio::test]
    async fn relayed_send_peels_one_layer() {
        let (tx, rx) = pair().await;
        let out = Outbound::new(tx, 0);
        let relay = rx.local_addr().unwrap().to_string();
        let envelope = HopEnvelope::new(relay, onion(&["client:5005"]));
        assert!(out.send(&ReplyPath::Relayed(envelope), b"2,\"ok\"").await);

        let wrapped = Wrapped::decode(&recv(&rx).await.unwrap()).unwrap();
        assert_eq!(wrapped.envelope.next_hop, "client:5005");
        assert!(wrapped.envelope.is_last());
        assert_eq!(wrapped.payload, b"2,\"ok\"");
    }

    #[tokio::test]
    async fn relayed_send_to_last_hop_is_bare() {
        let (tx, rx) = pair().await;
        let out = Outbound::new(tx, 0);
        let envelope = HopEnvelope::new(rx.local_addr().unwrap().to_string(), Vec::new());
        assert!(out.send(&ReplyPath::Relayed(envelope), b"3,\"ok\"").await);
        assert_eq!(recv(&rx).await.unwrap(), b"3,\"ok\"");
    }
}
