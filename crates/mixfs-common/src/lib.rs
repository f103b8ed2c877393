//! Common types and utilities shared across the mixfs stack.
//!
//! This crate provides:
//! - The comma-delimited datagram codec ([`wire`])
//! - Onion routing layers for the relay network ([`hop`])
//! - Protocol constants ([`types`])
//! - UDP send helpers ([`transport`])

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod hop;
/// Prometheus and health HTTP endpoint (feature-gated).
#[cfg(feature = "metrics-server")]
pub mod telemetry;
pub mod transport;
pub mod types;
pub mod wire;

pub use hop::HopEnvelope;
pub use wire::{Field, Message, WireError};
