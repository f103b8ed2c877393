use clap::Parser;
use mixfs_common::types::MAX_DATAGRAM_SIZE;
use std::net::SocketAddr;
use std::time::Duration;

/// CLI arguments for the mix relay.
#[derive(Parser, Debug, Clone)]
#[command(name = "mixfs-relay")]
#[command(about = "Batching, shuffling mix relay")]
#[command(version)]
pub struct Args {
    /// Socket address to listen on.
    #[arg(long, default_value = "0.0.0.0:5100", env = "MIXFS_RELAY_LISTEN")]
    pub listen: SocketAddr,
    /// Relay addresses decoys are sent to (repeatable).
    #[arg(
        long = "known-relay",
        default_values_t = [String::from("localhost:5100"), String::from("localhost:5101")],
        env = "MIXFS_RELAY_KNOWN",
        value_delimiter = ','
    )]
    pub known_relays: Vec<String>,
    /// Interval between batch flushes, in ms.
    #[arg(long, default_value = "3000", env = "MIXFS_RELAY_FLUSH_MS")]
    pub flush_interval_ms: u64,
    /// Largest datagram accepted, in bytes.
    #[arg(long, default_value_t = MAX_DATAGRAM_SIZE, env = "MIXFS_RELAY_MAX_DATAGRAM")]
    pub max_datagram: usize,
    /// Socket address for the metrics endpoint.
    #[arg(long, default_value = "127.0.0.1:9107", env = "MIXFS_RELAY_METRICS")]
    pub metrics_addr: SocketAddr,
    /// Increase log verbosity (repeat for more detail).
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

/// Runtime configuration derived from [`Args`].
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Socket address to listen on.
    pub listen: SocketAddr,
    /// Relay addresses decoys are sent to.
    pub known_relays: Vec<String>,
    /// Interval between batch flushes.
    pub flush_interval: Duration,
    /// Largest datagram accepted, in bytes.
    pub max_datagram: usize,
    /// Socket address for the metrics endpoint.
    pub metrics_addr: SocketAddr,
}

impl RelayConfig {
    /// Validates the configuration values are within acceptable bounds.
    pub fn validate(&self) -> Result<(), String> {
        if self.known_relays.is_empty() {
            return Err("at least one known relay is required for decoys".to_string());
        }
        if self.known_relays.iter().any(String::is_empty) {
            return Err("known relay addresses must not be empty".to_string());
        }
        if self.flush_interval.is_zero() {
            return Err("flush_interval_ms must be greater than 0".to_string());
        }
        if self.max_datagram == 0 || self.max_datagram > 65_507 {
            return Err("max_datagram must be in [1, 65507]".to_string());
        }
        Ok(())
    }
}

impl From<Args> for RelayConfig {
    fn from(args: Args) -> Self {
        Self {
            listen: args.listen,
            known_relays: args.known_relays,
            flush_interval: Duration::from_millis(args.flush_interval_ms),
            max_datagram: args.max_datagram,
            metrics_addr: args.metrics_addr,
        }
    }
}
