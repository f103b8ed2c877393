use clap::{Parser, ValueEnum};
use mixfs_common::types::{MAX_DATAGRAM_SIZE, MAX_FIELDS};
use std::net::SocketAddr;
use std::time::Duration;

/// Duplicate-filtering mode for incoming requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Semantics {
    /// Every received request is executed, duplicates included.
    AtLeastOnce,
    /// A request id seen before is answered from the reply cache.
    AtMostOnce,
}

impl std::fmt::Display for Semantics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AtLeastOnce => f.write_str("at-least-once"),
            Self::AtMostOnce => f.write_str("at-most-once"),
        }
    }
}

/// CLI arguments for the file server.
#[derive(Parser, Debug, Clone)]
#[command(name = "mixfsd")]
#[command(about = "UDP file-access RPC server")]
#[command(version)]
pub struct Args {
    /// Socket address to listen on.
    #[arg(long, default_value = "0.0.0.0:5006", env = "MIXFSD_LISTEN")]
    pub listen: SocketAddr,
    /// Invocation semantics.
    #[arg(long, value_enum, default_value_t = Semantics::AtLeastOnce, env = "MIXFSD_SEMANTICS")]
    pub semantics: Semantics,
    /// Percentage of outgoing datagrams to drop on purpose (0-100).
    #[arg(long, default_value = "0", env = "MIXFSD_FAILURE_RATE")]
    pub failure_rate: u8,
    /// Expect requests wrapped in a hop envelope and reply through relays.
    #[arg(long, env = "MIXFSD_MIXNET")]
    pub mixnet: bool,
    /// Socket address for the metrics endpoint.
    #[arg(long, default_value = "127.0.0.1:9106", env = "MIXFSD_METRICS")]
    pub metrics_addr: SocketAddr,
    /// Number of replies kept for duplicate suppression.
    #[arg(long, default_value = "65536", env = "MIXFSD_DEDUP_CAPACITY")]
    pub dedup_capacity: usize,
    /// Largest datagram accepted or sent, in bytes.
    #[arg(long, default_value_t = MAX_DATAGRAM_SIZE, env = "MIXFSD_MAX_DATAGRAM")]
    pub max_datagram: usize,
    /// Largest field count accepted in a request.
    #[arg(long, default_value_t = MAX_FIELDS, env = "MIXFSD_MAX_FIELDS")]
    pub max_fields: usize,
    /// Interval between retransmissions of an unacknowledged push, in ms.
    #[arg(long, default_value = "1000", env = "MIXFSD_PUSH_RETRY_MS")]
    pub push_retry_ms: u64,
    /// Time after which an unacknowledged push is abandoned, in ms.
    #[arg(long, default_value = "5000", env = "MIXFSD_PUSH_TIMEOUT_MS")]
    pub push_timeout_ms: u64,
    /// Upper bound for a subscription's requested duration, in ms.
    #[arg(long, default_value = "600000", env = "MIXFSD_MAX_SUBSCRIPTION_MS")]
    pub max_subscription_ms: u64,
    /// Increase log verbosity (repeat for more detail).
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

/// Runtime configuration derived from [`Args`].
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Socket address to listen on.
    pub listen: SocketAddr,
    /// Invocation semantics.
    pub semantics: Semantics,
    /// Percentage of outgoing datagrams to drop on purpose.
    pub failure_rate: u8,
    /// Whether requests arrive wrapped in a hop envelope.
    pub mixnet: bool,
    /// Socket address for the metrics endpoint.
    pub metrics_addr: SocketAddr,
    /// Number of replies kept for duplicate suppression.
    pub dedup_capacity: usize,
    /// Largest datagram accepted or sent, in bytes.
    pub max_datagram: usize,
    /// Largest field count accepted in a request.
    pub max_fields: usize,
    /// Interval between push retransmissions.
    pub push_retry: Duration,
    /// Time after which an unacknowledged push is abandoned.
    pub push_timeout: Duration,
    /// Upper bound for a subscription's duration.
    pub max_subscription: Duration,
}

impl ServerConfig {
    /// Validates the configuration values are within acceptable bounds.
    /// Returns Ok(()) if valid, Err with description otherwise.
    pub fn validate(&self) -> Result<(), String> {
        if self.failure_rate > 100 {
            return Err("failure_rate must be in [0, 100]".to_string());
        }
        if self.dedup_capacity == 0 {
            return Err("dedup_capacity must be greater than 0".to_string());
        }
        if self.max_datagram == 0 {
            return Err("max_datagram must be greater than 0".to_string());
        }
        if self.max_datagram > 65_507 {
            return Err("max_datagram exceeds the UDP payload limit (65507 bytes)".to_string());
        }
        // msg id, operation, path and the widest operation's two arguments
        if self.max_fields < 5 {
            return Err("max_fields must be at least 5".to_string());
        }
        if self.push_retry.is_zero() {
            return Err("push_retry_ms must be greater than 0".to_string());
        }
        if self.push_timeout < self.push_retry {
            return Err("push_timeout_ms must be >= push_retry_ms".to_string());
        }
        if self.max_subscription.is_zero() {
            return Err("max_subscription_ms must be greater than 0".to_string());
        }
        Ok(())
    }

    /// Returns `true` when duplicate requests are answered from the cache.
    #[must_use]
    pub fn filters_duplicates(&self) -> bool {
        self.semantics == Semantics::AtMostOnce
    }
}

impl From<Args> for ServerConfig {
    fn from(args: Args) -> Self {
        Self {
            listen: args.listen,
            semantics: args.semantics,
            failure_rate: args.failure_rate,
            mixnet: args.mixnet,
            metrics_addr: args.metrics_addr,
            dedup_capacity: args.dedup_capacity,
            max_datagram: args.max_datagram,
            max_fields: args.max_fields,
            push_retry: Duration::from_millis(args.push_retry_ms),
            push_timeout: Duration::from_millis(args.push_timeout_ms),
            max_subscription: Duration::from_millis(args.max_subscription_ms),
        }
    }
}
