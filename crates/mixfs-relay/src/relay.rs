use crate::config::RelayConfig;
use crate::error::RelayError;
use crate::metrics::{counters, histograms};
use crate::mixing::{add_decoys, shuffle, ForwardJob};
use mixfs_common::hop::Wrapped;
use mixfs_common::transport::send_to_host;
use mixfs_common::Message;
use rand::rngs::OsRng;
use std::mem;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::net::UdpSocket;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info, trace};

/// What a received datagram turns into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Peeled {
    /// The decoy sentinel; dropped.
    Decoy,
    /// A payload to forward with one routing layer removed.
    Forward(ForwardJob),
}

/// Classifies a datagram and removes its outer routing layer.
///
/// Only the routing layer is decoded; the payload is copied as opaque bytes.
///
/// # Errors
///
/// Fails if the datagram is neither a decoy nor `[envelope, payload]`.
pub fn peel(datagram: &[u8]) -> Result<Peeled, RelayError> {
    let msg = Message::decode(datagram, 2)?;
    if msg.is_decoy() {
        return Ok(Peeled::Decoy);
    }
    let Wrapped { envelope, payload } = Wrapped::from_message(&msg)?;
    Ok(Peeled::Forward(ForwardJob {
        payload: envelope.forward_payload(&payload),
        next_hop: envelope.next_hop,
    }))
}

/// A mix relay: one socket, one pending batch, one flush timer.
pub struct Relay {
    /// Runtime relay configuration.
    pub config: RelayConfig,
    socket: Arc<UdpSocket>,
    batch: Mutex<Vec<ForwardJob>>,
}

impl Relay {
    /// Builds a relay around a bound socket.
    #[must_use]
    pub fn new(config: RelayConfig, socket: UdpSocket) -> Arc<Self> {
        Arc::new(Self {
            config,
            socket: Arc::new(socket),
            batch: Mutex::new(Vec::new()),
        })
    }

    /// The bound socket address.
    ///
    /// # Errors
    ///
    /// Returns an error if the socket's local address cannot be read.
    pub fn local_addr(&self) -> Result<std::net::SocketAddr, RelayError> {
        Ok(self.socket.local_addr()?)
    }

    /// Peels `datagram` and queues the result for the next flush.
    ///
    /// # Errors
    ///
    /// Returns the decoding error for a malformed datagram; nothing is queued.
    pub fn on_receive(&self, datagram: &[u8]) -> Result<(), RelayError> {
        match peel(datagram)? {
            Peeled::Decoy => {
                counters::datagrams_dropped_total("decoy");
                trace!("decoy dropped");
            }
            Peeled::Forward(job) => {
                trace!(next_hop = %job.next_hop, "queued for next flush");
                self.batch
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .push(job);
            }
        }
        Ok(())
    }

    /// Number of jobs waiting for the next flush.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.batch.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Swaps the pending batch out, pads it with decoys, shuffles it and
    /// sends every entry in its own task. Returns the number of datagrams
    /// dispatched.
    pub fn flush(&self) -> usize {
        let mut jobs = mem::take(&mut *self.batch.lock().unwrap_or_else(PoisonError::into_inner));
        if jobs.is_empty() {
            return 0;
        }
        let real = jobs.len();
        let decoys = add_decoys(&mut jobs, &self.config.known_relays, &mut OsRng);
        shuffle(&mut jobs, &mut OsRng);

        histograms::batch_size(real);
        counters::forwarded_total("real", real as u64);
        counters::forwarded_total("decoy", decoys as u64);
        debug!(real, decoys, "flushing batch");

        let total = jobs.len();
        for job in jobs {
            let socket = Arc::clone(&self.socket);
            tokio::spawn(async move {
                if let Err(e) = send_to_host(&socket, &job.next_hop, &job.payload).await {
                    counters::send_failures_total();
                    debug!("forward to {} failed: {}", job.next_hop, e);
                }
            });
        }
        total
    }
}

/// # Errors
///
/// Returns an error if the socket's local address cannot be read.
pub async fn run(relay: Arc<Relay>) -> Result<(), RelayError> {
    let (_shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(());
    run_with_shutdown(relay, shutdown_rx).await
}

/// Runs the receive loop and the flush timer until the sender behind
/// `shutdown_rx` signals or is dropped.
///
/// Flushes happen on this one task, so two flushes never overlap.
///
/// # Errors
///
/// Returns an error if the socket's local address cannot be read.
pub async fn run_with_shutdown(
    relay: Arc<Relay>,
    mut shutdown_rx: tokio::sync::watch::Receiver<()>,
) -> Result<(), RelayError> {
    let local_addr = relay.local_addr()?;
    info!(
        "relay listening on {} (flush every {:?}, {} known relays)",
        local_addr,
        relay.config.flush_interval,
        relay.config.known_relays.len()
    );
    let period = relay.config.flush_interval;
    let mut flush = interval_at(Instant::now() + period, period);
    flush.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let max = relay.config.max_datagram;
    let mut buf = vec![0u8; max + 1];

    loop {
        tokio::select! {
            result = relay.socket.recv_from(&mut buf) => {
                match result {
                    Ok((n, peer)) => {
                        counters::datagrams_received_total();
                        if n > max {
                            counters::datagrams_dropped_total("oversize");
                            debug!("dropping oversize datagram from {}", peer);
                            continue;
                        }
                        let datagram = buf[..n].to_vec();
                        let relay = Arc::clone(&relay);
                        tokio::spawn(async move {
                            if let Err(e) = relay.on_receive(&datagram) {
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
            _ = flush.tick() => {
                relay.flush();
            }
            _ = shutdown_rx.changed() => {
                info!("shutdown signal received");
                break;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use mixfs_common::hop::onion;
    use mixfs_common::wire::{encode, Field};
    use mixfs_common::HopEnvelope;

    fn wrapped(envelope: &HopEnvelope, payload: &[u8]) -> Vec<u8> {
        encode(&[Field::from(envelope.encode()), Field::bytes(payload)]).unwrap()
    }

    #[test]
    fn decoy_sentinel_is_dropped() {
        assert_eq!(peel(b"0").unwrap(), Peeled::Decoy);
        assert_eq!(peel(b"000000000000000000").unwrap(), Peeled::Decoy);
    }

    #[test]
    fn quoted_zero_is_not_a_decoy() {
        assert!(peel(b"\"0\"").is_err());
    }

    #[test]
    fn last_layer_forwards_payload_unchanged() {
        let env = HopEnvelope::new("srv:5006", Vec::new());
        let job = match peel(&wrapped(&env, b"5,\"read\",\"f\",0,3")).unwrap() {
            Peeled::Forward(job) => job,
            Peeled::Decoy => panic!("not a decoy"),
        };
        assert_eq!(job.next_hop, "srv:5006");
        assert_eq!(job.payload, b"5,\"read\",\"f\",0,3");
    }

    #[test]
    fn inner_layer_forwards_rest_and_payload() {
        let rest = onion(&["srv:5006"]);
        let env = HopEnvelope::new("r2:5101", rest.clone());
        let Peeled::Forward(job) = peel(&wrapped(&env, b"opaque")).unwrap() else {
            panic!("not a decoy");
        };
        assert_eq!(job.next_hop, "r2:5101");
        assert_eq!(
            job.payload,
            encode(&[Field::from(rest), Field::from("opaque")]).unwrap()
        );
    }

    #[test]
    fn payload_is_never_decoded() {
        // not a valid message on its own
        let env = HopEnvelope::new("srv:5006", Vec::new());
        let Peeled::Forward(job) = peel(&wrapped(&env, b"\x00,,\"")).unwrap() else {
            panic!("not a decoy");
        };
        assert_eq!(job.payload, b"\x00,,\"");
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(peel(b"").is_err());
        assert!(peel(b"hello").is_err());
        assert!(peel(b"1,2,3").is_err());
        assert!(peel(b"\"not an envelope\",\"x\"").is_err());
    }

    #[tokio::test]
    async fn flush_empties_batch_and_skips_empty() {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let config = RelayConfig {
            listen: socket.local_addr().unwrap(),
            known_relays: vec!["127.0.0.1:9".to_string()],
            flush_interval: std::time::Duration::from_secs(3),
            max_datagram: 1000,
            metrics_addr: "127.0.0.1:0".parse().unwrap(),
        };
        let relay = Relay::new(config, socket);
        assert_eq!(relay.flush(), 0);

        let env = HopEnvelope::new("127.0.0.1:9", Vec::new());
        relay.on_receive(&wrapped(&env, b"a")).unwrap();
        relay.on_receive(&wrapped(&env, b"b")).unwrap();
        relay.on_receive(b"0").unwrap();
        assert_eq!(relay.pending(), 2);

        let sent = relay.flush();
        assert!((2..6).contains(&sent));
        assert_eq!(relay.pending(), 0);
    }
}
