//! Counters recorded by the file server.
//!
//! The HTTP endpoint lives in `mixfs_common::telemetry`; these are no-ops
//! until a recorder is installed.

/// Event counters.
pub mod counters {
    /// Increment the received-datagrams counter.
    pub fn datagrams_received_total() {
        metrics::counter!("mixfs_datagrams_received_total").increment(1);
    }

    /// Record a datagram dropped before dispatch with the given reason label.
    pub fn datagrams_dropped_total(reason: &'static str) {
        metrics::counter!("mixfs_datagrams_dropped_total", "reason" => reason).increment(1);
    }

    /// Record a dispatched request with its operation label.
    pub fn requests_total(op: &'static str) {
        metrics::counter!("mixfs_requests_total", "op" => op).increment(1);
    }

    /// Increment the counter of duplicates answered from the reply cache.
    pub fn duplicates_replayed_total() {
        metrics::counter!("mixfs_duplicates_replayed_total").increment(1);
    }

    /// Record an outgoing datagram as `sent` or `dropped`.
    pub fn sends_total(outcome: &'static str) {
        metrics::counter!("mixfs_sends_total", "outcome" => outcome).increment(1);
    }

    /// Record a finished push as `acked` or `expired`.
    pub fn pushes_total(outcome: &'static str) {
        metrics::counter!("mixfs_pushes_total", "outcome" => outcome).increment(1);
    }
}

/// Gauges.
pub mod gauges {
    /// Increment the active-subscriptions gauge.
    pub fn inc_subscriptions_active() {
        metrics::gauge!("mixfs_subscriptions_active").increment(1.0);
    }

    /// Decrement the active-subscriptions gauge.
    pub fn dec_subscriptions_active() {
        metrics::gauge!("mixfs_subscriptions_active").decrement(1.0);
    }
}
