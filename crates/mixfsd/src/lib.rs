//! mixfs file server: UDP file-access RPC with selectable invocation
//! semantics and reliable subscription pushes.
#![forbid(unsafe_code)]
#![warn(missing_docs)]

/// Outstanding reliable pushes awaiting an ack.
pub mod ack;
/// CLI argument parsing and server configuration.
pub mod config;
/// Reply cache for duplicate suppression.
pub mod dedup;
pub mod engine;
/// Error types for server operations.
pub mod error;
pub mod fs;
pub mod metrics;
/// Reply routing and the lossy send primitive.
pub mod outbound;
pub mod push;
pub mod request;
/// Receive loop and shared server state.
pub mod server;

pub use config::{Semantics, ServerConfig};
pub use fs::{FileStore, LocalFs};
pub use server::{run, run_with_shutdown, ServerState};
