//! mixfs mix relay: peels one routing layer per datagram and forwards
//! batches padded with decoys in a cryptographically shuffled order.
#![forbid(unsafe_code)]
#![warn(missing_docs)]

/// CLI argument parsing and relay configuration.
pub mod config;
/// Error types for relay operations.
pub mod error;
pub mod metrics;
pub mod mixing;
/// Peeling, the pending batch and the receive/flush loop.
pub mod relay;

pub use config::RelayConfig;
pub use relay::{peel, run, run_with_shutdown, Peeled, Relay};
