//! mixfs client: request/retry loop, read cache and subscription updates,
//! optionally routed through mix relays.
#![forbid(unsafe_code)]
#![warn(missing_docs)]

/// Read cache validated against modification times.
pub mod cache;
/// The client and its typed operations.
pub mod client;
/// Client configuration from defaults, TOML and environment.
pub mod config;
/// Client error type.
pub mod error;
/// Onion routes through relays.
pub mod route;

pub use client::{Client, Push};
pub use config::{load_config, ClientConfig};
pub use error::ClientError;
pub use route::MixRoute;
